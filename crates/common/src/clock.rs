//! Clock and timing utilities for recording sessions.
//!
//! Each capture session and each pipeline phase is anchored to a monotonic
//! epoch plus the wall-clock time at that epoch, so reports can show both
//! "when" and "how long" without mixing clocks.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// A clock that provides monotonic timestamps relative to a fixed epoch.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant the clock started.
    epoch: Instant,

    /// Wall-clock time at epoch.
    epoch_wall: DateTime<Utc>,
}

impl RecordingClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
        }
    }

    /// Seconds elapsed since the clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at start.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.epoch_wall
    }
}

/// Convert fractional seconds to a `Duration`, treating negative or NaN as zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(clock.started_at() <= Utc::now());
    }

    #[test]
    fn test_secs_to_duration_clamps_bad_input() {
        assert_eq!(secs_to_duration(-1.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
    }
}
