// src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub speed: SpeedConfig,
    pub association: AssociationConfig,
    pub motion: MotionConfig,
    pub video: VideoConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Geometry of the two reference lines and the speed classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Real-world distance between line 1 and line 2, in meters
    pub distance_m: f64,
    pub line1_y: i32,
    pub line2_y: i32,
    /// A line is crossed while |cy - line_y| < band_half_width_px
    pub band_half_width_px: i32,
    pub plausible_min_kmh: f64,
    pub plausible_max_kmh: f64,
    /// Speeds strictly above this are captured as anomalies
    pub anomaly_kmh: f64,
    /// Clear the line 1 timestamp once a speed has been computed.
    /// Off by default: a vehicle lingering in the line 2 band is re-measured every frame.
    pub rearm_after_measurement: bool,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            distance_m: 8.0,
            line1_y: 220,
            line2_y: 330,
            band_half_width_px: 10,
            plausible_min_kmh: 10.0,
            plausible_max_kmh: 300.0,
            anomaly_kmh: 70.0,
            rearm_after_measurement: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Max vertical center distance (exclusive) to keep an identity
    pub proximity_px: i32,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self { proximity_px: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub resize_factor: f64,
    pub min_contour_area: f64,
    pub binary_threshold: f64,
    pub history: i32,
    pub var_threshold: f64,
    pub detect_shadows: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            resize_factor: 0.6,
            min_contour_area: 1350.0,
            binary_threshold: 250.0,
            history: 500,
            var_threshold: 16.0,
            detect_shadows: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    /// Monotonic tick clock sampled when the frame is processed
    Wall,
    /// Frame presentation timestamp mapped onto a fixed origin
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// A single video file or a directory to scan for videos
    pub input: String,
    pub output_dir: String,
    pub capture_dir: String,
    pub save_annotated: bool,
    pub display: bool,
    pub clock: ClockSource,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input: "test.mp4".to_string(),
            output_dir: "output".to_string(),
            capture_dir: "captured_images".to_string(),
            save_annotated: false,
            display: true,
            clock: ClockSource::Wall,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub speeds_path: String,
    pub anomalies_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            speeds_path: "output/speeds.jsonl".to_string(),
            anomalies_path: "output/anomalies.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Run-scoped vehicle handle. Allocated sequentially from 1, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned foreground region in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    /// Integer center, saturating for boxes at the edge of the `i32` range
    pub fn center_y(&self) -> i32 {
        self.y.saturating_add(self.height / 2)
    }
}

/// Detections for one frame, as produced by motion detection or read from a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    #[serde(default)]
    pub detections: Vec<BoundingBox>,
}
