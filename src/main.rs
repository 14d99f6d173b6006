// src/main.rs

mod clock;
mod config;
#[cfg(feature = "video")]
mod motion_detection;
#[cfg(feature = "video")]
mod overlay;
mod pipeline;
mod replay;
mod sinks;
mod tracking;
mod types;
#[cfg(feature = "video")]
mod video_processor;

use anyhow::Result;
use clap::Parser;
use pipeline::{MetricsSummary, PipelineMetrics, SpeedPipeline};
use replay::TraceReader;
use sinks::{JsonlAnomalyLog, JsonlSpeedSink};
#[cfg(feature = "video")]
use std::path::Path;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use types::Config;

#[derive(Parser, Debug)]
#[command(
    name = "vehicle-speed-detection",
    about = "Estimate vehicle speeds from blobs crossing two reference lines"
)]
struct Args {
    /// YAML configuration; built-in defaults are used if the file is missing
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Replay JSONL detection traces instead of decoding video
    #[arg(long, value_name = "TRACE", num_args = 1..)]
    replay: Vec<PathBuf>,

    /// Override video.input
    #[arg(long, value_name = "PATH")]
    input: Option<String>,

    /// Do not open a display window
    #[arg(long)]
    headless: bool,

    /// Clear the line 1 time after each measurement (one speed per crossing)
    #[arg(long)]
    rearm: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default(&args.config)?;
    if let Some(input) = &args.input {
        config.video.input = input.clone();
    }
    if args.headless {
        config.video.display = false;
    }
    if args.rearm {
        config.speed.rearm_after_measurement = true;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vehicle_speed_detection={}",
            config.logging.level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚗 Vehicle Speed Detection Starting");
    info!(
        "Lines: y={} / y={} ({:.1} m apart) | band ±{}px | proximity {}px",
        config.speed.line1_y,
        config.speed.line2_y,
        config.speed.distance_m,
        config.speed.band_half_width_px,
        config.association.proximity_px
    );
    info!(
        "Speed policy: store {:.0}-{:.0} km/h, capture above {:.0} km/h, rearm={}",
        config.speed.plausible_min_kmh,
        config.speed.plausible_max_kmh,
        config.speed.anomaly_kmh,
        config.speed.rearm_after_measurement
    );
    if !config.speed.rearm_after_measurement {
        info!("Line 1 time is kept after a measurement; vehicles lingering on line 2 are re-measured each frame");
    }

    let summary = if args.replay.is_empty() {
        run_video(&config)?
    } else {
        run_replay(&config, &args.replay)?
    };

    log_summary(&summary);
    Ok(())
}

fn run_replay(config: &Config, trace_paths: &[PathBuf]) -> Result<MetricsSummary> {
    let mut pipeline = SpeedPipeline::new(config);
    let mut speed_sink = JsonlSpeedSink::create(&config.output.speeds_path)?;
    let mut anomaly_log = JsonlAnomalyLog::create(&config.output.anomalies_path)?;
    let mut metrics = PipelineMetrics::new();

    for trace_path in trace_paths {
        let trace = TraceReader::open(trace_path)?;
        replay::replay_trace(
            trace,
            &mut pipeline,
            &mut speed_sink,
            &mut anomaly_log,
            &mut metrics,
        )?;
        pipeline.end_sequence();
    }

    info!("🔢 Unique vehicles tracked: {}", pipeline.total_unique_vehicles());
    Ok(metrics.summary())
}

#[cfg(not(feature = "video"))]
fn run_video(_config: &Config) -> Result<MetricsSummary> {
    anyhow::bail!("built without the `video` feature; rebuild with --features video or pass --replay <TRACE>")
}

#[cfg(feature = "video")]
fn run_video(config: &Config) -> Result<MetricsSummary> {
    use tracing::error;
    use video_processor::VideoProcessor;

    let video_processor = VideoProcessor::new(config.video.clone(), config.motion.resize_factor);
    let video_files = video_processor.find_video_files()?;

    let mut metrics = PipelineMetrics::new();
    if video_files.is_empty() {
        error!("No video files found at {}", config.video.input);
        return Ok(metrics.summary());
    }

    std::fs::create_dir_all(&config.video.capture_dir)?;
    let mut pipeline = SpeedPipeline::new(config);
    let mut speed_sink = JsonlSpeedSink::create(&config.output.speeds_path)?;

    for (idx, video_path) in video_files.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing video {}/{}: {}",
            idx + 1,
            video_files.len(),
            video_path.display()
        );
        info!("========================================");

        let outcome = process_video(
            video_path,
            &video_processor,
            config,
            &mut pipeline,
            &mut speed_sink,
            &mut metrics,
        );
        pipeline.end_sequence();

        match outcome {
            Ok(VideoOutcome::Finished) => info!("✓ Video processed"),
            Ok(VideoOutcome::Quit) => {
                info!("Stopped by user");
                break;
            }
            Err(e) => error!("Failed to process video: {:#}", e),
        }
    }

    if config.video.display {
        opencv::highgui::destroy_all_windows()?;
    }

    info!("🔢 Unique vehicles tracked: {}", pipeline.total_unique_vehicles());
    Ok(metrics.summary())
}

#[cfg(feature = "video")]
enum VideoOutcome {
    Finished,
    Quit,
}

#[cfg(feature = "video")]
fn process_video(
    video_path: &Path,
    video_processor: &video_processor::VideoProcessor,
    config: &Config,
    pipeline: &mut SpeedPipeline,
    speed_sink: &mut JsonlSpeedSink,
    metrics: &mut PipelineMetrics,
) -> Result<VideoOutcome> {
    use anyhow::Context;
    use clock::FrameClock;
    use motion_detection::MotionDetector;
    use opencv::{highgui, prelude::*};
    use overlay::SnapshotWriter;

    const WINDOW_NAME: &str = "Vehicle Speed Detection";

    let mut reader = video_processor.open_video(video_path)?;
    let mut writer =
        video_processor.create_writer(video_path, reader.width, reader.height, reader.fps)?;
    let mut detector = MotionDetector::new(&config.motion)?;
    let clock = FrameClock::new(config.video.clock);
    let capture_dir = Path::new(&config.video.capture_dir);

    while let Some(mut frame) = reader.read_frame()? {
        let now = clock.now(frame.timestamp_ms).with_context(|| {
            format!(
                "Frame {}: timestamp {} ms is out of range",
                frame.frame_id, frame.timestamp_ms
            )
        })?;

        let detections = match detector.detect(&frame.mat) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Motion detection failed on frame {}: {:#}", frame.frame_id, e);
                Vec::new()
            }
        };

        let report = pipeline.process_frame(frame.frame_id, &detections, now);
        metrics.record_frame(&report);

        overlay::draw_vehicles(&mut frame.mat, &report.annotations)?;
        overlay::draw_reference_lines(&mut frame.mat, &config.speed)?;

        {
            let mut snapshots = SnapshotWriter::new(&mut frame.mat, capture_dir);
            sinks::dispatch_events(&report.events, speed_sink, &mut snapshots, metrics);
        }

        if let Some(writer) = writer.as_mut() {
            writer.write(&frame.mat)?;
        }

        if frame.frame_id % 50 == 0 {
            info!(
                "Progress: {:.1}% ({}/{}) | Active vehicles: {} | Stored speeds: {}",
                reader.progress(),
                reader.current_frame,
                reader.total_frames,
                pipeline.active_vehicles(),
                metrics.speeds_persisted
            );
        }

        if config.video.display {
            highgui::imshow(WINDOW_NAME, &frame.mat)?;
            if highgui::wait_key(1)? & 0xFF == 'q' as i32 {
                return Ok(VideoOutcome::Quit);
            }
        }
    }

    Ok(VideoOutcome::Finished)
}

fn log_summary(summary: &MetricsSummary) {
    info!("✓ Processing finished");
    info!("  Total frames: {}", summary.total_frames);
    info!(
        "  Frames with vehicles: {} ({:.1}%)",
        summary.frames_with_vehicles,
        100.0 * summary.frames_with_vehicles as f64 / summary.total_frames.max(1) as f64
    );
    info!(
        "  Vehicles tracked: {} (lost from view: {})",
        summary.identities_created, summary.identities_dropped
    );
    info!(
        "  Line crossings: {} (line 1) / {} (line 2)",
        summary.line1_crossings, summary.line2_crossings
    );
    info!(
        "  Speeds measured: {} (stored: {}, out of range: {})",
        summary.speeds_measured, summary.speeds_persisted, summary.speeds_rejected
    );
    info!(
        "  📸 Anomalies: {} flagged, {} captured",
        summary.anomalies_flagged, summary.anomalies_captured
    );
    if summary.sink_failures > 0 {
        warn!("  ⚠️  Sink failures: {}", summary.sink_failures);
    }
    info!("  Processing Speed: {:.1} FPS", summary.fps);
}
