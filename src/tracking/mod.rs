// src/tracking/mod.rs

pub mod associator;
pub mod speed_estimator;

pub use associator::IdentityAssociator;
pub use speed_estimator::{ReferenceLine, SpeedEstimator, SpeedMeasurement};
