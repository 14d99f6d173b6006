// src/motion_detection.rs
//
// Foreground blobs from a static camera: MOG2 background subtraction,
// a hard threshold to drop shadow pixels (MOG2 marks them 127), external
// contours, then an area filter.

use crate::types::{BoundingBox, MotionConfig};
use anyhow::Result;
use opencv::{
    core::{self, Mat, Ptr, Vector},
    imgproc,
    prelude::*,
    video::{self, BackgroundSubtractorMOG2},
};
use tracing::debug;

pub struct MotionDetector {
    subtractor: Ptr<BackgroundSubtractorMOG2>,
    min_contour_area: f64,
    binary_threshold: f64,
}

impl MotionDetector {
    pub fn new(config: &MotionConfig) -> Result<Self> {
        let subtractor = video::create_background_subtractor_mog2(
            config.history,
            config.var_threshold,
            config.detect_shadows,
        )?;

        Ok(Self {
            subtractor,
            min_contour_area: config.min_contour_area,
            binary_threshold: config.binary_threshold,
        })
    }

    /// Bounding boxes of moving regions larger than the area threshold,
    /// in contour order.
    pub fn detect(&mut self, frame: &Mat) -> Result<Vec<BoundingBox>> {
        let mut fg_mask = Mat::default();
        self.subtractor.apply(frame, &mut fg_mask, -1.0)?;

        let mut binary = Mat::default();
        imgproc::threshold(
            &fg_mask,
            &mut binary,
            self.binary_threshold,
            255.0,
            imgproc::THRESH_BINARY,
        )?;

        let mut contours = Vector::<Vector<core::Point>>::new();
        imgproc::find_contours(
            &binary,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            core::Point::new(0, 0),
        )?;

        let mut detections = Vec::new();
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if area <= self.min_contour_area {
                continue;
            }
            let rect = imgproc::bounding_rect(&contour)?;
            detections.push(BoundingBox {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            });
        }

        debug!(
            "{} contours, {} above area threshold",
            contours.len(),
            detections.len()
        );
        Ok(detections)
    }
}
