// src/pipeline/orchestrator.rs
//
// Per-frame driver for the core: associate, drop vanished tracks, run the
// crossing state machine for each tagged detection, then hand back a report.

use super::event_bus::{EventBus, SpeedEvent};
use super::frame_context::{FrameReport, VehicleAnnotation};
use crate::tracking::{IdentityAssociator, ReferenceLine, SpeedEstimator};
use crate::types::{BoundingBox, Config};
use std::time::Instant;

const MAX_PENDING_EVENTS: usize = 256;

pub struct SpeedPipeline {
    associator: IdentityAssociator,
    estimator: SpeedEstimator,
    bus: EventBus,
}

impl SpeedPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            associator: IdentityAssociator::new(config.association.proximity_px),
            estimator: SpeedEstimator::new(&config.speed),
            bus: EventBus::new(MAX_PENDING_EVENTS),
        }
    }

    pub fn process_frame(
        &mut self,
        frame_id: u64,
        detections: &[BoundingBox],
        now: Instant,
    ) -> FrameReport {
        let association = self.associator.associate(detections);
        self.estimator.forget(&association.dropped);

        let mut annotations = Vec::with_capacity(association.tagged.len());

        for tagged in &association.tagged {
            let observation = self.estimator.observe(tagged.vehicle_id, tagged.bbox, now);

            if observation.crossed_line1 {
                self.bus.publish(SpeedEvent::LineCrossed {
                    frame_id,
                    vehicle_id: tagged.vehicle_id,
                    line: ReferenceLine::Line1,
                });
            }

            if observation.crossed_line2 {
                self.bus.publish(SpeedEvent::LineCrossed {
                    frame_id,
                    vehicle_id: tagged.vehicle_id,
                    line: ReferenceLine::Line2,
                });
            }

            if let Some(measurement) = observation.measurement {
                if measurement.plausible {
                    self.bus.publish(SpeedEvent::PersistSpeed {
                        frame_id,
                        measurement,
                    });
                } else {
                    self.bus.publish(SpeedEvent::SpeedRejected {
                        frame_id,
                        measurement,
                    });
                }
                if measurement.anomaly {
                    self.bus.publish(SpeedEvent::CaptureAnomaly {
                        frame_id,
                        measurement,
                    });
                }
            }

            // Read back right away: a later detection sharing this identity may overwrite it
            annotations.push(VehicleAnnotation {
                vehicle_id: tagged.vehicle_id,
                bbox: tagged.bbox,
                last_speed: self.estimator.last_speed(tagged.vehicle_id),
            });
        }

        FrameReport {
            frame_id,
            annotations,
            events: self.bus.drain(),
            new_identities: association.new_identities(),
            dropped_identities: association.dropped.len(),
        }
    }

    /// Drop all live tracks between independent sequences (e.g. the next video file).
    pub fn end_sequence(&mut self) {
        let dropped = self.associator.clear();
        self.estimator.forget(&dropped);
    }

    pub fn active_vehicles(&self) -> usize {
        self.associator.active_count()
    }

    pub fn total_unique_vehicles(&self) -> u32 {
        self.associator.total_allocated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VehicleId;
    use std::time::Duration;

    fn at_y(cy: i32) -> BoundingBox {
        BoundingBox {
            x: 200,
            y: cy - 20,
            width: 90,
            height: 40,
        }
    }

    fn kinds(report: &FrameReport) -> Vec<&'static str> {
        report
            .events
            .iter()
            .map(|e| match e {
                SpeedEvent::LineCrossed {
                    line: ReferenceLine::Line1,
                    ..
                } => "line1",
                SpeedEvent::LineCrossed {
                    line: ReferenceLine::Line2,
                    ..
                } => "line2",
                SpeedEvent::PersistSpeed { .. } => "persist",
                SpeedEvent::SpeedRejected { .. } => "rejected",
                SpeedEvent::CaptureAnomaly { .. } => "anomaly",
            })
            .collect()
    }

    /// Drive one vehicle down the frame in 30px steps, `step` apart in time
    fn drive(pipeline: &mut SpeedPipeline, t0: Instant, step: Duration) -> Vec<FrameReport> {
        (0..9)
            .map(|i| {
                let cy = 190 + 30 * i as i32;
                pipeline.process_frame(i + 1, &[at_y(cy)], t0 + step * i as u32)
            })
            .collect()
    }

    #[test]
    fn test_line2_band_can_be_stepped_over() {
        let mut pipeline = SpeedPipeline::new(&Config::default());
        let t0 = Instant::now();
        // cy: 190, 220(line 1), 250, 280, 310, 340, ... line 2 band is (320, 340)
        let reports = drive(&mut pipeline, t0, Duration::from_millis(200));

        assert_eq!(kinds(&reports[1]), vec!["line1"]);
        let all: Vec<&str> = reports.iter().flat_map(|r| kinds(r)).collect();
        // 340 sits on the band edge, so line 2 is never hit at this step size
        assert_eq!(all, vec!["line1"]);
        assert!(reports.iter().all(|r| r.annotations[0].vehicle_id == VehicleId(1)));
    }

    #[test]
    fn test_speed_measured_and_displayed() {
        let mut pipeline = SpeedPipeline::new(&Config::default());
        let t0 = Instant::now();

        pipeline.process_frame(1, &[at_y(220)], t0);
        pipeline.process_frame(2, &[at_y(260)], t0 + Duration::from_millis(250));
        pipeline.process_frame(3, &[at_y(300)], t0 + Duration::from_millis(500));
        let report = pipeline.process_frame(4, &[at_y(330)], t0 + Duration::from_secs(1));

        assert_eq!(kinds(&report), vec!["line2", "persist"]);
        match &report.events[1] {
            SpeedEvent::PersistSpeed { measurement, .. } => {
                assert_eq!(measurement.rounded_kmh, 28.8);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(report.annotations[0].speed_label().as_deref(), Some("28.80 km/h"));

        // Still displayed after leaving the band
        let later = pipeline.process_frame(5, &[at_y(370)], t0 + Duration::from_millis(1200));
        assert_eq!(later.annotations[0].last_speed.map(|s| s.round()), Some(29.0));
        assert!(later.events.is_empty());
    }

    #[test]
    fn test_fast_vehicle_persists_and_captures() {
        let mut pipeline = SpeedPipeline::new(&Config::default());
        let t0 = Instant::now();
        pipeline.process_frame(1, &[at_y(220)], t0);
        pipeline.process_frame(2, &[at_y(265)], t0 + Duration::from_millis(100));
        pipeline.process_frame(3, &[at_y(300)], t0 + Duration::from_millis(200));
        let report = pipeline.process_frame(4, &[at_y(330)], t0 + Duration::from_millis(300));
        // 8m in 0.3s = 96 km/h
        assert_eq!(kinds(&report), vec!["line2", "persist", "anomaly"]);
    }

    #[test]
    fn test_slow_vehicle_is_rejected_not_persisted() {
        let mut pipeline = SpeedPipeline::new(&Config::default());
        let t0 = Instant::now();
        pipeline.process_frame(1, &[at_y(220)], t0);
        pipeline.process_frame(2, &[at_y(265)], t0 + Duration::from_secs(5));
        pipeline.process_frame(3, &[at_y(300)], t0 + Duration::from_secs(8));
        let report = pipeline.process_frame(4, &[at_y(330)], t0 + Duration::from_secs(10));
        assert_eq!(kinds(&report), vec!["line2", "rejected"]);
        assert!(report.annotations[0].last_speed.is_some());
    }

    #[test]
    fn test_missed_frame_loses_timing() {
        let mut pipeline = SpeedPipeline::new(&Config::default());
        let t0 = Instant::now();
        pipeline.process_frame(1, &[at_y(220)], t0);
        pipeline.process_frame(2, &[at_y(260)], t0 + Duration::from_millis(200));
        let gap = pipeline.process_frame(3, &[], t0 + Duration::from_millis(400));
        assert_eq!(gap.dropped_identities, 1);

        let report = pipeline.process_frame(4, &[at_y(330)], t0 + Duration::from_secs(1));
        assert_eq!(report.new_identities, 1);
        assert_eq!(report.annotations[0].vehicle_id, VehicleId(2));
        // Line 2 band reached, but the new identity was never timed
        assert_eq!(kinds(&report), vec!["line2"]);
    }

    #[test]
    fn test_end_sequence_keeps_identities_unique() {
        let mut pipeline = SpeedPipeline::new(&Config::default());
        let t0 = Instant::now();
        pipeline.process_frame(1, &[at_y(100)], t0);
        pipeline.end_sequence();
        assert_eq!(pipeline.active_vehicles(), 0);
        let report = pipeline.process_frame(1, &[at_y(100)], t0);
        assert_eq!(report.annotations[0].vehicle_id, VehicleId(2));
        assert_eq!(pipeline.total_unique_vehicles(), 2);
    }
}
