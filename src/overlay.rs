// src/overlay.rs
//
// Frame annotation and anomaly snapshots.

use crate::pipeline::frame_context::VehicleAnnotation;
use crate::sinks::AnomalySink;
use crate::tracking::SpeedMeasurement;
use crate::types::{BoundingBox, SpeedConfig};
use anyhow::{bail, Result};
use opencv::{
    core::{self, Mat, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use std::path::{Path, PathBuf};

fn box_color() -> core::Scalar {
    core::Scalar::new(0.0, 255.0, 0.0, 0.0)
}

fn text_color() -> core::Scalar {
    core::Scalar::new(255.0, 0.0, 0.0, 0.0)
}

fn put_label(frame: &mut Mat, text: &str, bbox: &BoundingBox) -> Result<()> {
    imgproc::put_text(
        frame,
        text,
        core::Point::new(bbox.x, bbox.y - 10),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        text_color(),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

/// Boxes for every detection, plus the last known speed above the box.
pub fn draw_vehicles(frame: &mut Mat, annotations: &[VehicleAnnotation]) -> Result<()> {
    for annotation in annotations {
        let bbox = &annotation.bbox;
        imgproc::rectangle(
            frame,
            core::Rect::new(bbox.x, bbox.y, bbox.width, bbox.height),
            box_color(),
            2,
            imgproc::LINE_8,
            0,
        )?;

        if let Some(label) = annotation.speed_label() {
            put_label(frame, &label, bbox)?;
        }
    }
    Ok(())
}

pub fn draw_reference_lines(frame: &mut Mat, speed: &SpeedConfig) -> Result<()> {
    let width = frame.cols();
    for y in [speed.line1_y, speed.line2_y] {
        imgproc::line(
            frame,
            core::Point::new(0, y),
            core::Point::new(width, y),
            text_color(),
            1,
            imgproc::LINE_8,
            0,
        )?;
    }
    Ok(())
}

pub fn snapshot_path(capture_dir: &Path, measurement: &SpeedMeasurement) -> PathBuf {
    capture_dir.join(format!(
        "vehicle_{}_speed_{:.2}.png",
        measurement.vehicle_id.0, measurement.rounded_kmh
    ))
}

/// Writes the current annotated frame for each anomaly.
pub struct SnapshotWriter<'a> {
    frame: &'a mut Mat,
    capture_dir: &'a Path,
}

impl<'a> SnapshotWriter<'a> {
    pub fn new(frame: &'a mut Mat, capture_dir: &'a Path) -> Self {
        Self { frame, capture_dir }
    }
}

impl AnomalySink for SnapshotWriter<'_> {
    fn capture_anomaly(&mut self, _frame_id: u64, measurement: &SpeedMeasurement) -> Result<()> {
        let label = format!("Speed: {:.2} km/h", measurement.rounded_kmh);
        put_label(self.frame, &label, &measurement.bbox)?;

        let path = snapshot_path(self.capture_dir, measurement);
        let path_str = path.to_string_lossy();
        if !imgcodecs::imwrite(&path_str, &*self.frame, &Vector::new())? {
            bail!("OpenCV refused to write {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VehicleId;

    #[test]
    fn test_snapshot_path_uses_rounded_speed() {
        let measurement = SpeedMeasurement {
            vehicle_id: VehicleId(12),
            speed_kmh: 85.714_285,
            rounded_kmh: 85.71,
            elapsed_secs: 0.336,
            bbox: BoundingBox {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
            plausible: true,
            anomaly: true,
        };
        let path = snapshot_path(Path::new("captured_images"), &measurement);
        assert_eq!(
            path,
            Path::new("captured_images").join("vehicle_12_speed_85.71.png")
        );
    }
}
