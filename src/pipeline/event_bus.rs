// src/pipeline/event_bus.rs
//
// Decoupled event system. The state machine publishes what happened on a
// frame; sinks consume the drained events after the frame is processed.
//
// The bound only ever sheds `LineCrossed` notices. Measurement events are
// always kept, since each one is a stored speed or a capture.

use crate::tracking::{ReferenceLine, SpeedMeasurement};
use crate::types::VehicleId;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum SpeedEvent {
    LineCrossed {
        frame_id: u64,
        vehicle_id: VehicleId,
        line: ReferenceLine,
    },

    /// Plausible speed, to be stored
    PersistSpeed {
        frame_id: u64,
        measurement: SpeedMeasurement,
    },

    /// Outside the plausibility bounds; displayed but never stored
    SpeedRejected {
        frame_id: u64,
        measurement: SpeedMeasurement,
    },

    /// Above the anomaly threshold; annotate and capture the frame
    CaptureAnomaly {
        frame_id: u64,
        measurement: SpeedMeasurement,
    },
}

impl SpeedEvent {
    pub fn frame_id(&self) -> u64 {
        match self {
            SpeedEvent::LineCrossed { frame_id, .. }
            | SpeedEvent::PersistSpeed { frame_id, .. }
            | SpeedEvent::SpeedRejected { frame_id, .. }
            | SpeedEvent::CaptureAnomaly { frame_id, .. } => *frame_id,
        }
    }
}

pub struct EventBus {
    events: VecDeque<SpeedEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: SpeedEvent) {
        if self.events.len() >= self.max_pending {
            let oldest_crossing = self
                .events
                .iter()
                .position(|e| matches!(e, SpeedEvent::LineCrossed { .. }));
            if let Some(dropped) = oldest_crossing.and_then(|idx| self.events.remove(idx)) {
                warn!(
                    "Event bus full ({} events), dropping crossing from frame {}",
                    self.max_pending,
                    dropped.frame_id()
                );
            }
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<SpeedEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn crossing(frame_id: u64) -> SpeedEvent {
        SpeedEvent::LineCrossed {
            frame_id,
            vehicle_id: VehicleId(1),
            line: ReferenceLine::Line1,
        }
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let mut bus = EventBus::new(8);
        bus.publish(crossing(1));
        bus.publish(crossing(2));
        let drained = bus.drain();
        assert_eq!(drained.iter().map(|e| e.frame_id()).collect::<Vec<_>>(), vec![1, 2]);
        assert!(bus.drain().is_empty());
    }

    fn stored(frame_id: u64) -> SpeedEvent {
        SpeedEvent::PersistSpeed {
            frame_id,
            measurement: SpeedMeasurement {
                vehicle_id: VehicleId(frame_id as u32),
                speed_kmh: 50.0,
                rounded_kmh: 50.0,
                elapsed_secs: 0.576,
                bbox: BoundingBox {
                    x: 0,
                    y: 310,
                    width: 40,
                    height: 40,
                },
                plausible: true,
                anomaly: false,
            },
        }
    }

    #[test]
    fn test_full_bus_drops_oldest_crossing() {
        let mut bus = EventBus::new(2);
        for frame_id in 1..=3 {
            bus.publish(crossing(frame_id));
        }
        let drained = bus.drain();
        assert_eq!(drained.iter().map(|e| e.frame_id()).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_full_bus_never_drops_measurements() {
        let mut bus = EventBus::new(2);
        bus.publish(stored(1));
        bus.publish(crossing(2));
        bus.publish(stored(3));
        bus.publish(stored(4));
        let drained = bus.drain();
        // The crossing makes room for frame 3; frame 4 grows the queue
        assert_eq!(drained, vec![stored(1), stored(3), stored(4)]);
    }
}
