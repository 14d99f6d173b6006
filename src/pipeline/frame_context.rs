// src/pipeline/frame_context.rs
//
// Everything the annotation and sink collaborators need from one processed
// frame, so none of them reach into tracker state directly.

use super::event_bus::SpeedEvent;
use crate::types::{BoundingBox, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleAnnotation {
    pub vehicle_id: VehicleId,
    pub bbox: BoundingBox,
    /// Most recent speed for this identity, shown above the box
    pub last_speed: Option<f64>,
}

impl VehicleAnnotation {
    pub fn speed_label(&self) -> Option<String> {
        self.last_speed.map(|s| format!("{:.2} km/h", s))
    }
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_id: u64,
    pub annotations: Vec<VehicleAnnotation>,
    pub events: Vec<SpeedEvent>,
    pub new_identities: usize,
    pub dropped_identities: usize,
}

impl FrameReport {
    pub fn has_detections(&self) -> bool {
        !self.annotations.is_empty()
    }
}
