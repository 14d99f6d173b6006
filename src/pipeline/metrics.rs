// src/pipeline/metrics.rs
//
// Run counters, logged as a summary when processing ends.

use super::event_bus::SpeedEvent;
use super::frame_context::FrameReport;
use crate::tracking::ReferenceLine;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: u64,
    pub frames_with_vehicles: u64,
    pub identities_created: u64,
    pub identities_dropped: u64,
    pub line1_crossings: u64,
    pub line2_crossings: u64,
    pub speeds_measured: u64,
    pub speeds_persisted: u64,
    pub speeds_rejected: u64,
    pub anomalies_flagged: u64,
    pub anomalies_captured: u64,
    pub sink_failures: u64,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: 0,
            frames_with_vehicles: 0,
            identities_created: 0,
            identities_dropped: 0,
            line1_crossings: 0,
            line2_crossings: 0,
            speeds_measured: 0,
            speeds_persisted: 0,
            speeds_rejected: 0,
            anomalies_flagged: 0,
            anomalies_captured: 0,
            sink_failures: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record_frame(&mut self, report: &FrameReport) {
        self.total_frames += 1;
        if report.has_detections() {
            self.frames_with_vehicles += 1;
        }
        self.identities_created += report.new_identities as u64;
        self.identities_dropped += report.dropped_identities as u64;

        for event in &report.events {
            match event {
                SpeedEvent::LineCrossed { line, .. } => match line {
                    ReferenceLine::Line1 => self.line1_crossings += 1,
                    ReferenceLine::Line2 => self.line2_crossings += 1,
                },
                SpeedEvent::PersistSpeed { .. } => self.speeds_measured += 1,
                SpeedEvent::SpeedRejected { .. } => {
                    self.speeds_measured += 1;
                    self.speeds_rejected += 1;
                }
                SpeedEvent::CaptureAnomaly { .. } => self.anomalies_flagged += 1,
            }
        }
    }

    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.total_frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames,
            frames_with_vehicles: self.frames_with_vehicles,
            fps: self.fps(),
            identities_created: self.identities_created,
            identities_dropped: self.identities_dropped,
            line1_crossings: self.line1_crossings,
            line2_crossings: self.line2_crossings,
            speeds_measured: self.speeds_measured,
            speeds_persisted: self.speeds_persisted,
            speeds_rejected: self.speeds_rejected,
            anomalies_flagged: self.anomalies_flagged,
            anomalies_captured: self.anomalies_captured,
            sink_failures: self.sink_failures,
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub frames_with_vehicles: u64,
    pub fps: f64,
    pub identities_created: u64,
    pub identities_dropped: u64,
    pub line1_crossings: u64,
    pub line2_crossings: u64,
    pub speeds_measured: u64,
    pub speeds_persisted: u64,
    pub speeds_rejected: u64,
    pub anomalies_flagged: u64,
    pub anomalies_captured: u64,
    pub sink_failures: u64,
    pub elapsed_secs: f64,
}
