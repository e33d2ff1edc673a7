//! Show the duration budget for a content file.

use std::path::PathBuf;

use anyhow::Context;
use reelcast_common::config::AppConfig;
use reelcast_timing::{DurationBudget, PacingBounds, PhaseConfig};

pub fn run(config: &AppConfig, content: PathBuf, duration: u32, json: bool) -> anyhow::Result<()> {
    let body = std::fs::read_to_string(&content)
        .with_context(|| format!("Failed to read {}", content.display()))?;

    let timing = &config.timing;
    let budget = DurationBudget::compute(
        f64::from(duration),
        PhaseConfig {
            intro_secs: timing.intro_secs,
            final_secs: timing.final_secs,
        },
        PacingBounds {
            min_delay_secs: timing.min_delay_secs,
            max_delay_secs: timing.max_delay_secs,
        },
        &body,
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&budget)?);
        return Ok(());
    }

    println!("Budget for {} ({}s)", content.display(), duration);
    println!("  Intro:   {:>8.2}s", budget.intro_secs);
    println!("  Content: {:>8.2}s", budget.content_secs);
    println!("  Final:   {:>8.2}s", budget.final_secs);
    println!();
    println!("  Units:   {:>8}", budget.content_units);
    println!(
        "  Delay:   {:>8.4}s per unit{}",
        budget.per_unit_delay_secs,
        if budget.is_clamped() { " (clamped)" } else { "" }
    );
    if budget.is_clamped() {
        println!(
            "  Paced content runs {:.2}s; post-processing restores {}s total.",
            budget.paced_content_secs(),
            duration
        );
    }
    Ok(())
}
