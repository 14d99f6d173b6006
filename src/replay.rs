// src/replay.rs
//
// Offline detection traces: one JSON object per line,
//   {"frame_id": 1, "timestamp_ms": 33.3, "detections": [{"x":..,"y":..,"width":..,"height":..}]}
// Replays always run on the video clock so results do not depend on how
// fast the trace is read.

use crate::clock::FrameClock;
use crate::pipeline::{PipelineMetrics, SpeedPipeline};
use crate::sinks::{dispatch_events, AnomalySink, SpeedSink};
use crate::types::{ClockSource, DetectionFrame};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

pub struct TraceReader<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl TraceReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open trace {}", path.display()))?;
        info!("Replaying detections from {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<DetectionFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            self.line_no += 1;
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            return Some(
                serde_json::from_str(line)
                    .with_context(|| format!("Invalid trace line {}", self.line_no)),
            );
        }
    }
}

/// Run every frame of a trace through the pipeline and dispatch its events.
pub fn replay_trace<R: BufRead>(
    trace: TraceReader<R>,
    pipeline: &mut SpeedPipeline,
    speed_sink: &mut dyn SpeedSink,
    anomaly_sink: &mut dyn AnomalySink,
    metrics: &mut PipelineMetrics,
) -> Result<()> {
    let clock = FrameClock::new(ClockSource::Video);

    for frame in trace {
        let frame = frame?;
        let now = clock.now(frame.timestamp_ms).with_context(|| {
            format!(
                "Frame {}: timestamp {} ms is out of range",
                frame.frame_id, frame.timestamp_ms
            )
        })?;
        let report = pipeline.process_frame(frame.frame_id, &frame.detections, now);

        for annotation in &report.annotations {
            if let Some(label) = annotation.speed_label() {
                debug!(
                    "Frame {}: Vehicle {} at y={} {}",
                    report.frame_id,
                    annotation.vehicle_id,
                    annotation.bbox.center_y(),
                    label
                );
            }
        }

        metrics.record_frame(&report);
        dispatch_events(&report.events, speed_sink, anomaly_sink, metrics);

        if metrics.total_frames % 100 == 0 {
            info!(
                "Progress: {} frames | Active vehicles: {} | Stored speeds: {}",
                metrics.total_frames,
                pipeline.active_vehicles(),
                metrics.speeds_persisted
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::SpeedRecord;
    use crate::tracking::SpeedMeasurement;
    use crate::types::Config;
    use std::io::Cursor;

    #[derive(Default)]
    struct Collect {
        speeds: Vec<SpeedRecord>,
    }

    impl SpeedSink for Collect {
        fn persist_speed(&mut self, record: &SpeedRecord) -> Result<()> {
            self.speeds.push(record.clone());
            Ok(())
        }
    }

    struct Anomalies(Vec<u64>);

    impl AnomalySink for Anomalies {
        fn capture_anomaly(&mut self, frame_id: u64, _m: &SpeedMeasurement) -> Result<()> {
            self.0.push(frame_id);
            Ok(())
        }
    }

    fn frame_line(frame_id: u64, timestamp_ms: f64, cys: &[i32]) -> String {
        let detections: Vec<String> = cys
            .iter()
            .map(|cy| format!(r#"{{"x":100,"y":{},"width":60,"height":40}}"#, cy - 20))
            .collect();
        format!(
            r#"{{"frame_id":{},"timestamp_ms":{},"detections":[{}]}}"#,
            frame_id,
            timestamp_ms,
            detections.join(",")
        )
    }

    #[test]
    fn test_reader_skips_blank_lines_and_defaults_detections() {
        let input = format!(
            "\n{}\n\n{{\"frame_id\":2,\"timestamp_ms\":40.0}}\n",
            frame_line(1, 0.0, &[100])
        );
        let frames: Vec<DetectionFrame> = TraceReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].detections[0].center_y(), 100);
        assert!(frames[1].detections.is_empty());
    }

    #[test]
    fn test_reader_reports_bad_line_number() {
        let input = format!("{}\nnot json\n", frame_line(1, 0.0, &[]));
        let mut reader = TraceReader::new(Cursor::new(input));
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"), "{:#}", err);
    }

    #[test]
    fn test_replay_two_vehicles() {
        // Car A: line 1 at 0ms, line 2 at 300ms -> 96 km/h (stored + anomaly)
        // Car B: line 1 at 400ms, line 2 at 1400ms -> 28.8 km/h (stored)
        let lines = [
            frame_line(1, 0.0, &[220]),
            frame_line(2, 100.0, &[265]),
            frame_line(3, 200.0, &[300]),
            frame_line(4, 300.0, &[330]),
            frame_line(5, 400.0, &[370, 220]),
            frame_line(6, 700.0, &[260]),
            frame_line(7, 1000.0, &[300]),
            frame_line(8, 1400.0, &[330]),
        ];
        let trace = TraceReader::new(Cursor::new(lines.join("\n")));

        let mut pipeline = SpeedPipeline::new(&Config::default());
        let mut speeds = Collect::default();
        let mut anomalies = Anomalies(Vec::new());
        let mut metrics = PipelineMetrics::new();

        replay_trace(trace, &mut pipeline, &mut speeds, &mut anomalies, &mut metrics).unwrap();

        assert_eq!(metrics.total_frames, 8);
        assert_eq!(anomalies.0, vec![4]);
        let stored: Vec<(u32, f64)> = speeds
            .speeds
            .iter()
            .map(|r| (r.vehicle_id, r.speed_kmh))
            .collect();
        assert_eq!(stored, vec![(1, 96.0), (2, 28.8)]);
        assert_eq!(metrics.speeds_persisted, 2);
        assert_eq!(metrics.identities_created, 2);
        assert_eq!(metrics.line1_crossings, 2);
    }

    fn replay_str(input: String) -> (Result<()>, PipelineMetrics) {
        let mut pipeline = SpeedPipeline::new(&Config::default());
        let mut metrics = PipelineMetrics::new();
        let result = replay_trace(
            TraceReader::new(Cursor::new(input)),
            &mut pipeline,
            &mut Collect::default(),
            &mut Anomalies(Vec::new()),
            &mut metrics,
        );
        (result, metrics)
    }

    #[test]
    fn test_replay_rejects_out_of_range_timestamp() {
        let input = format!(
            "{}\n{{\"frame_id\":2,\"timestamp_ms\":1e22,\"detections\":[]}}\n",
            frame_line(1, 0.0, &[100])
        );
        let (result, metrics) = replay_str(input);
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Frame 2"), "{:#}", err);
        assert_eq!(metrics.total_frames, 1);
    }

    #[test]
    fn test_replay_survives_extreme_boxes() {
        let input = [
            r#"{"frame_id":1,"timestamp_ms":0,"detections":[{"x":0,"y":2147483600,"width":10,"height":400}]}"#,
            r#"{"frame_id":2,"timestamp_ms":40,"detections":[{"x":0,"y":-2147483600,"width":10,"height":10}]}"#,
        ]
        .join("\n");
        let (result, metrics) = replay_str(input);
        result.unwrap();
        assert_eq!(metrics.total_frames, 2);
        assert_eq!(metrics.identities_created, 2);
        assert_eq!(metrics.identities_dropped, 1);
        assert_eq!(metrics.speeds_measured, 0);
    }
}
