// src/tracking/associator.rs
//
// Vertical-proximity identity association.
//
// Design:
//   - Each detection is compared against the previous frame's positions only
//   - First match wins, scanning identities in ascending order. Identities
//     are allocated sequentially, so this is also insertion order
//   - No exclusivity inside a frame: two detections close to the same
//     identity both receive it (known source of identity flicker)
//   - An identity with no detection this frame is dropped immediately
//   - Horizontal position is ignored

use crate::types::{BoundingBox, VehicleId};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedDetection {
    pub vehicle_id: VehicleId,
    pub bbox: BoundingBox,
    /// True when this detection allocated `vehicle_id`
    pub is_new: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Association {
    /// One entry per input detection, in input order
    pub tagged: Vec<TaggedDetection>,
    /// Identities that were live last frame and received no detection
    pub dropped: Vec<VehicleId>,
}

impl Association {
    pub fn new_identities(&self) -> usize {
        self.tagged.iter().filter(|t| t.is_new).count()
    }
}

pub struct IdentityAssociator {
    next_id: u32,
    /// identity -> last center y
    positions: BTreeMap<VehicleId, i32>,
    proximity_px: i32,
}

impl IdentityAssociator {
    pub fn new(proximity_px: i32) -> Self {
        Self {
            next_id: 0,
            positions: BTreeMap::new(),
            proximity_px,
        }
    }

    pub fn associate(&mut self, detections: &[BoundingBox]) -> Association {
        let mut tagged = Vec::with_capacity(detections.len());
        let mut observed: BTreeMap<VehicleId, i32> = BTreeMap::new();

        for bbox in detections {
            let cy = bbox.center_y();

            let (vehicle_id, is_new) = match self.find_match(cy) {
                Some(id) => (id, false),
                None => {
                    self.next_id += 1;
                    let id = VehicleId(self.next_id);
                    info!("🆕 New vehicle tracked: ID {} at y={}", id, cy);
                    (id, true)
                }
            };

            // Several detections on one identity: the last one's position sticks
            observed.insert(vehicle_id, cy);
            tagged.push(TaggedDetection {
                vehicle_id,
                bbox: *bbox,
                is_new,
            });
        }

        let dropped: Vec<VehicleId> = self
            .positions
            .keys()
            .filter(|id| !observed.contains_key(id))
            .copied()
            .collect();

        for id in &dropped {
            debug!("🗑️  Vehicle {} not seen this frame, dropping", id);
        }

        self.positions = observed;

        Association { tagged, dropped }
    }

    fn find_match(&self, cy: i32) -> Option<VehicleId> {
        self.positions
            .iter()
            .find(|(_, &last_cy)| last_cy.abs_diff(cy) < self.proximity_px.unsigned_abs())
            .map(|(id, _)| *id)
    }

    /// Forget every live identity. The counter is kept so identities stay unique.
    pub fn clear(&mut self) -> Vec<VehicleId> {
        let dropped = self.positions.keys().copied().collect();
        self.positions.clear();
        dropped
    }

    pub fn active_count(&self) -> usize {
        self.positions.len()
    }

    pub fn total_allocated(&self) -> u32 {
        self.next_id
    }
}
