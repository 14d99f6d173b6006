// src/tracking/speed_estimator.rs
//
// Line-crossing timing and speed classification.
//
// Per identity the only crossing state is the line 1 timestamp:
//   - unset                 -> idle, a line 2 crossing is ignored
//   - set (line 1 band hit) -> timing; a later line 1 hit restarts it
//   - line 2 band while set -> speed computed from the elapsed time
//
// The timestamp is kept after a measurement unless `rearm_after_measurement`
// is enabled, so a vehicle lingering in the line 2 band is re-measured on
// every frame with a growing elapsed time.

use crate::types::{BoundingBox, SpeedConfig, VehicleId};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferenceLine {
    Line1,
    Line2,
}

/// Converts elapsed time into km/h and classifies the result.
#[derive(Debug, Clone, Copy)]
pub struct SpeedPolicy {
    pub distance_m: f64,
    pub plausible_min_kmh: f64,
    pub plausible_max_kmh: f64,
    pub anomaly_kmh: f64,
}

impl SpeedPolicy {
    pub fn from_config(config: &SpeedConfig) -> Self {
        Self {
            distance_m: config.distance_m,
            plausible_min_kmh: config.plausible_min_kmh,
            plausible_max_kmh: config.plausible_max_kmh,
            anomaly_kmh: config.anomaly_kmh,
        }
    }

    pub fn speed_kmh(&self, elapsed_secs: f64) -> f64 {
        (self.distance_m / elapsed_secs) * MPS_TO_KMH
    }

    /// Inclusive on both bounds
    pub fn is_plausible(&self, speed_kmh: f64) -> bool {
        self.plausible_min_kmh <= speed_kmh && speed_kmh <= self.plausible_max_kmh
    }

    pub fn is_anomaly(&self, speed_kmh: f64) -> bool {
        speed_kmh > self.anomaly_kmh
    }
}

pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackState {
    pub last_vertical_position: i32,
    pub line1_timestamp: Option<Instant>,
    pub last_speed: Option<f64>,
}

impl TrackState {
    fn new(cy: i32) -> Self {
        Self {
            last_vertical_position: cy,
            line1_timestamp: None,
            last_speed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedMeasurement {
    pub vehicle_id: VehicleId,
    pub speed_kmh: f64,
    pub rounded_kmh: f64,
    pub elapsed_secs: f64,
    pub bbox: BoundingBox,
    pub plausible: bool,
    pub anomaly: bool,
}

/// What happened to one identity on one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackObservation {
    pub crossed_line1: bool,
    pub crossed_line2: bool,
    pub measurement: Option<SpeedMeasurement>,
}

pub struct SpeedEstimator {
    line1_y: i32,
    line2_y: i32,
    band_half_width: i32,
    rearm_after_measurement: bool,
    policy: SpeedPolicy,
    tracks: HashMap<VehicleId, TrackState>,
}

impl SpeedEstimator {
    pub fn new(config: &SpeedConfig) -> Self {
        Self {
            line1_y: config.line1_y,
            line2_y: config.line2_y,
            band_half_width: config.band_half_width_px,
            rearm_after_measurement: config.rearm_after_measurement,
            policy: SpeedPolicy::from_config(config),
            tracks: HashMap::new(),
        }
    }

    fn in_band(&self, cy: i32, line_y: i32) -> bool {
        line_y - self.band_half_width < cy && cy < line_y + self.band_half_width
    }

    /// Feed one tagged detection observed at `now`.
    pub fn observe(
        &mut self,
        vehicle_id: VehicleId,
        bbox: BoundingBox,
        now: Instant,
    ) -> TrackObservation {
        let cy = bbox.center_y();
        let in_line1 = self.in_band(cy, self.line1_y);
        let in_line2 = self.in_band(cy, self.line2_y);
        let policy = self.policy;
        let rearm = self.rearm_after_measurement;

        let track = self
            .tracks
            .entry(vehicle_id)
            .or_insert_with(|| TrackState::new(cy));
        if track.last_vertical_position != cy {
            debug!(
                "Vehicle {} moved y={} -> y={}",
                vehicle_id, track.last_vertical_position, cy
            );
        }
        track.last_vertical_position = cy;

        let mut observation = TrackObservation::default();

        if in_line1 {
            track.line1_timestamp = Some(now);
            observation.crossed_line1 = true;
            info!("Vehicle {} crossed Line 1", vehicle_id);
        }

        if !in_line2 {
            return observation;
        }
        observation.crossed_line2 = true;

        let Some(started) = track.line1_timestamp else {
            debug!("Vehicle {} in Line 2 band without a Line 1 time", vehicle_id);
            return observation;
        };

        let elapsed = match now.checked_duration_since(started) {
            Some(elapsed) if !elapsed.is_zero() => elapsed.as_secs_f64(),
            _ => {
                debug!("Vehicle {}: non-positive elapsed time, skipping", vehicle_id);
                return observation;
            }
        };

        let speed_kmh = policy.speed_kmh(elapsed);
        let measurement = SpeedMeasurement {
            vehicle_id,
            speed_kmh,
            rounded_kmh: round_to_hundredths(speed_kmh),
            elapsed_secs: elapsed,
            bbox,
            plausible: policy.is_plausible(speed_kmh),
            anomaly: policy.is_anomaly(speed_kmh),
        };

        track.last_speed = Some(speed_kmh);
        if rearm {
            track.line1_timestamp = None;
        }

        info!(
            "Vehicle {} crossed Line 2. Speed: {:.2} km/h ({:.3}s)",
            vehicle_id, speed_kmh, elapsed
        );

        observation.measurement = Some(measurement);
        observation
    }

    pub fn forget(&mut self, ids: &[VehicleId]) {
        for id in ids {
            self.tracks.remove(id);
        }
    }

    pub fn last_speed(&self, id: VehicleId) -> Option<f64> {
        self.tracks.get(&id).and_then(|t| t.last_speed)
    }
}
