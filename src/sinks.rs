// src/sinks.rs
//
// Persistence and capture collaborators. Every sink failure is logged and
// counted, then skipped; nothing here can stop the frame loop.

use crate::pipeline::{PipelineMetrics, SpeedEvent};
use crate::tracking::SpeedMeasurement;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};

/// One stored speed. `speed_kmh` is the value rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedRecord {
    pub vehicle_id: u32,
    pub speed_kmh: f64,
    pub frame_id: u64,
    pub recorded_at: DateTime<Utc>,
}

impl SpeedRecord {
    pub fn from_measurement(frame_id: u64, measurement: &SpeedMeasurement) -> Self {
        Self {
            vehicle_id: measurement.vehicle_id.0,
            speed_kmh: measurement.rounded_kmh,
            frame_id,
            recorded_at: Utc::now(),
        }
    }
}

pub trait SpeedSink {
    fn persist_speed(&mut self, record: &SpeedRecord) -> Result<()>;
}

pub trait AnomalySink {
    fn capture_anomaly(&mut self, frame_id: u64, measurement: &SpeedMeasurement) -> Result<()>;
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Appends one JSON object per stored speed.
pub struct JsonlSpeedSink {
    file: File,
}

impl JsonlSpeedSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = open_append(path)?;
        info!("💾 Speeds will be written to: {}", path.display());
        Ok(Self { file })
    }
}

impl SpeedSink for JsonlSpeedSink {
    fn persist_speed(&mut self, record: &SpeedRecord) -> Result<()> {
        let json_line = serde_json::to_string(record)?;
        writeln!(self.file, "{}", json_line)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Anomaly sink for runs without pixels: records the event instead of an image.
pub struct JsonlAnomalyLog {
    file: File,
}

impl JsonlAnomalyLog {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = open_append(path.as_ref())?;
        Ok(Self { file })
    }
}

impl AnomalySink for JsonlAnomalyLog {
    fn capture_anomaly(&mut self, frame_id: u64, measurement: &SpeedMeasurement) -> Result<()> {
        let json_value = serde_json::json!({
            "type": "speed_anomaly",
            "vehicle_id": measurement.vehicle_id.0,
            "speed_kmh": measurement.rounded_kmh,
            "elapsed_secs": measurement.elapsed_secs,
            "plausible": measurement.plausible,
            "bbox": measurement.bbox,
            "frame_id": frame_id,
            "recorded_at": Utc::now(),
        });
        writeln!(self.file, "{}", serde_json::to_string(&json_value)?)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Route a frame's events to the sinks.
pub fn dispatch_events(
    events: &[SpeedEvent],
    speed_sink: &mut dyn SpeedSink,
    anomaly_sink: &mut dyn AnomalySink,
    metrics: &mut PipelineMetrics,
) {
    for event in events {
        match event {
            SpeedEvent::PersistSpeed {
                frame_id,
                measurement,
            } => {
                let record = SpeedRecord::from_measurement(*frame_id, measurement);
                match speed_sink.persist_speed(&record) {
                    Ok(()) => {
                        metrics.speeds_persisted += 1;
                        info!(
                            "💾 Speed {:.2} km/h for Vehicle {} stored",
                            measurement.speed_kmh, measurement.vehicle_id
                        );
                    }
                    Err(e) => {
                        metrics.sink_failures += 1;
                        error!(
                            "Failed to store speed for Vehicle {}: {:#}",
                            measurement.vehicle_id, e
                        );
                    }
                }
            }
            SpeedEvent::SpeedRejected { measurement, .. } => {
                warn!(
                    "Vehicle {}: {:.2} km/h outside plausible range, not stored",
                    measurement.vehicle_id, measurement.speed_kmh
                );
            }
            SpeedEvent::CaptureAnomaly {
                frame_id,
                measurement,
            } => match anomaly_sink.capture_anomaly(*frame_id, measurement) {
                Ok(()) => {
                    metrics.anomalies_captured += 1;
                    info!(
                        "📸 Captured Vehicle {} with speed {:.2} km/h",
                        measurement.vehicle_id, measurement.speed_kmh
                    );
                }
                Err(e) => {
                    metrics.sink_failures += 1;
                    warn!(
                        "Capture failed for Vehicle {}: {:#}",
                        measurement.vehicle_id, e
                    );
                }
            },
            SpeedEvent::LineCrossed { .. } => {}
        }
    }
}
