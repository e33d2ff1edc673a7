//! Duration budget calculator.
//!
//! A job asks for a total length `T`. The rendered view spends a fixed
//! `intro` at the start and a fixed `final` hold at the end; whatever is
//! left is the content window. Content is revealed one non-whitespace
//! character at a time, so the pacing delay is `content / N`, clamped to a
//! range that still looks like typing. When the clamp applies, the paced
//! content no longer fills its window exactly; the post-processor restores
//! the exact length afterwards.

use reelcast_common::error::{ReelError, ReelResult};
use serde::{Deserialize, Serialize};

/// Fixed phases around the content window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub intro_secs: f64,
    pub final_secs: f64,
}

/// Inclusive bounds for the per-unit pacing delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacingBounds {
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
}

/// The decomposition of one job's duration. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationBudget {
    pub target_secs: f64,
    pub intro_secs: f64,
    pub content_secs: f64,
    pub final_secs: f64,
    pub per_unit_delay_secs: f64,
    /// Non-whitespace characters the delay was computed for (at least 1).
    pub content_units: usize,
}

impl DurationBudget {
    /// Compute the full budget for a target duration and a content body.
    pub fn compute(
        target_secs: f64,
        phases: PhaseConfig,
        bounds: PacingBounds,
        content: &str,
    ) -> ReelResult<Self> {
        let content_secs = content_seconds(target_secs, phases)?;
        let content_units = count_content_units(content);
        let per_unit_delay_secs = pacing_delay(content_secs, content_units, bounds);

        Ok(Self {
            target_secs,
            intro_secs: phases.intro_secs,
            content_secs,
            final_secs: phases.final_secs,
            per_unit_delay_secs,
            content_units,
        })
    }

    /// Time the content actually takes at the clamped delay.
    pub fn paced_content_secs(&self) -> f64 {
        self.per_unit_delay_secs * self.content_units as f64
    }

    /// Whether clamping changed the delay away from the exact fit.
    pub fn is_clamped(&self) -> bool {
        let exact = self.content_secs / self.content_units as f64;
        (exact - self.per_unit_delay_secs).abs() > f64::EPSILON
    }
}

/// `target − intro − final`, or `InvalidBudget` when that is not positive.
pub fn content_seconds(target_secs: f64, phases: PhaseConfig) -> ReelResult<f64> {
    let invalid = || ReelError::InvalidBudget {
        target_secs,
        intro_secs: phases.intro_secs,
        final_secs: phases.final_secs,
    };

    let inputs_ok = target_secs.is_finite()
        && target_secs > 0.0
        && phases.intro_secs.is_finite()
        && phases.intro_secs >= 0.0
        && phases.final_secs.is_finite()
        && phases.final_secs >= 0.0;
    if !inputs_ok {
        return Err(invalid());
    }

    let content_secs = target_secs - phases.intro_secs - phases.final_secs;
    if content_secs <= 0.0 {
        return Err(invalid());
    }
    Ok(content_secs)
}

/// Per-unit delay for `units` characters over `content_secs`, clamped to `bounds`.
///
/// `units == 0` is treated as 1.
pub fn pacing_delay(content_secs: f64, units: usize, bounds: PacingBounds) -> f64 {
    let units = units.max(1) as f64;
    let delay = content_secs / units;
    delay.max(bounds.min_delay_secs).min(bounds.max_delay_secs)
}

/// Number of non-whitespace characters, never less than 1.
pub fn count_content_units(content: &str) -> usize {
    content.chars().filter(|c| !c.is_whitespace()).count().max(1)
}
