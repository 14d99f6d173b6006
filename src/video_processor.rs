// src/video_processor.rs

use crate::types::VideoConfig;
use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];
const DEFAULT_FPS: f64 = 30.0;

pub struct VideoProcessor {
    config: VideoConfig,
    resize_factor: f64,
}

impl VideoProcessor {
    pub fn new(config: VideoConfig, resize_factor: f64) -> Self {
        Self {
            config,
            resize_factor,
        }
    }

    /// `video.input` may be a single file or a directory to scan.
    pub fn find_video_files(&self) -> Result<Vec<PathBuf>> {
        let input = Path::new(&self.config.input);
        if input.is_file() {
            return Ok(vec![input.to_path_buf()]);
        }

        let mut videos: Vec<PathBuf> = WalkDir::new(input)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        videos.sort();

        info!("Found {} video files", videos.len());
        Ok(videos)
    }

    pub fn open_video(&self, path: &Path) -> Result<VideoReader> {
        info!("Opening video: {}", path.display());

        let path_str = path.to_str().context("Video path is not valid UTF-8")?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video file {}", path.display());
        }

        let mut fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        if fps <= 0.0 {
            warn!("Video reports no frame rate, assuming {} FPS", DEFAULT_FPS);
            fps = DEFAULT_FPS;
        }
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames (processing at {:.0}%)",
            width,
            height,
            fps,
            total_frames,
            self.resize_factor * 100.0
        );

        Ok(VideoReader {
            cap,
            fps,
            total_frames,
            current_frame: 0,
            width: scaled(width, self.resize_factor),
            height: scaled(height, self.resize_factor),
            resize_factor: self.resize_factor,
        })
    }

    pub fn create_writer(
        &self,
        input_path: &Path,
        width: i32,
        height: i32,
        fps: f64,
    ) -> Result<Option<VideoWriter>> {
        if !self.config.save_annotated {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.config.output_dir)?;

        let input_name = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let output_path = PathBuf::from(&self.config.output_dir)
            .join(format!("{}_annotated.mp4", input_name));

        info!("Output video: {}", output_path.display());

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            output_path.to_str().context("Output path is not valid UTF-8")?,
            fourcc,
            fps,
            core::Size::new(width, height),
            true,
        )?;

        Ok(Some(writer))
    }
}

fn scaled(dimension: i32, factor: f64) -> i32 {
    (dimension as f64 * factor).round() as i32
}

/// A decoded, resized BGR frame.
pub struct VideoFrame {
    pub mat: Mat,
    pub frame_id: u64,
    pub timestamp_ms: f64,
}

pub struct VideoReader {
    pub cap: VideoCapture,
    pub fps: f64,
    pub total_frames: i32,
    pub current_frame: i32,
    /// Dimensions after resizing
    pub width: i32,
    pub height: i32,
    resize_factor: f64,
}

impl VideoReader {
    pub fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();

        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        let timestamp_ms = (self.current_frame as f64 / self.fps) * 1000.0;

        let mut resized = Mat::default();
        imgproc::resize(
            &mat,
            &mut resized,
            core::Size::new(0, 0),
            self.resize_factor,
            self.resize_factor,
            imgproc::INTER_LINEAR,
        )?;

        Ok(Some(VideoFrame {
            mat: resized,
            frame_id: self.current_frame as u64,
            timestamp_ms,
        }))
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.total_frames as f32) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_rounds() {
        assert_eq!(scaled(1280, 0.6), 768);
        assert_eq!(scaled(721, 0.5), 361);
    }

    #[test]
    fn test_find_video_files_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.MP4"), b"").unwrap();
        std::fs::write(dir.path().join("a.avi"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let config = VideoConfig {
            input: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let videos = VideoProcessor::new(config, 0.6).find_video_files().unwrap();
        let names: Vec<String> = videos
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.avi", "b.MP4"]);
    }
}
