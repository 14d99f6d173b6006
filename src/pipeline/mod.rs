// src/pipeline/mod.rs

pub mod event_bus;
pub mod frame_context;
pub mod metrics;
pub mod orchestrator;

pub use event_bus::SpeedEvent;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::SpeedPipeline;
