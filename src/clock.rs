// src/clock.rs

use crate::types::ClockSource;
use std::time::{Duration, Instant};

/// Supplies the monotonic instant used to time line crossings.
///
/// `Wall` samples `Instant::now()` when the frame is processed, so timing
/// includes decode and processing latency. `Video` maps the frame's
/// presentation timestamp onto a fixed origin, which makes offline runs
/// independent of processing speed.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    source: ClockSource,
    origin: Instant,
}

impl FrameClock {
    pub fn new(source: ClockSource) -> Self {
        Self {
            source,
            origin: Instant::now(),
        }
    }

    /// `None` when a video timestamp is too large to be represented as an
    /// instant. Negative and NaN timestamps map to the origin.
    pub fn now(&self, frame_timestamp_ms: f64) -> Option<Instant> {
        match self.source {
            ClockSource::Wall => Some(Instant::now()),
            ClockSource::Video => {
                let secs = frame_timestamp_ms / 1000.0;
                if secs.is_nan() || secs <= 0.0 {
                    return Some(self.origin);
                }
                let offset = Duration::try_from_secs_f64(secs).ok()?;
                self.origin.checked_add(offset)
            }
        }
    }
}
