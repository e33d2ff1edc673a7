//! Find the most recent recording.

use reelcast_capture_engine::ArtifactLocator;
use reelcast_common::config::AppConfig;

pub fn run(config: &AppConfig, window: Option<u64>) -> anyhow::Result<()> {
    let mut locator_config = config.locator.clone();
    if let Some(secs) = window {
        locator_config.recency_window_secs = secs;
    }

    let locator = ArtifactLocator::from_config(&locator_config, &[]);
    println!(
        "Searching {} directories (window {}s):",
        locator.candidates().len(),
        locator_config.recency_window_secs
    );
    for dir in locator.candidates() {
        if dir.is_dir() {
            println!("  {}", dir.display());
        } else {
            println!("  {} (missing)", dir.display());
        }
    }
    println!();

    let Some(artifact) = locator.locate() else {
        anyhow::bail!(
            "No recording modified in the last {}s",
            locator_config.recency_window_secs
        );
    };

    println!("Found: {}", artifact.path.display());
    println!("  Size: {} bytes", artifact.size_bytes);
    println!(
        "  Modified: {} ({:.0}s ago)",
        artifact.modified_at,
        artifact.age_secs(chrono::Utc::now())
    );
    Ok(())
}
