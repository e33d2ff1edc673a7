//! Run the cleanup manager outside of a job.

use std::sync::Arc;

use reelcast_common::config::AppConfig;
use reelcast_pipeline::{CleanupManager, CleanupTargets, WindowHandle};
use reelcast_platform::SystemProcessControl;

pub async fn run(
    config: &AppConfig,
    job_id: Option<String>,
    pid: Option<u32>,
    window_title: Option<String>,
) -> anyhow::Result<()> {
    let window = match (pid, window_title) {
        (None, None) => None,
        (pid, title) => Some(WindowHandle {
            pid,
            title: title.unwrap_or_else(|| config.view.window_title.clone()),
        }),
    };

    let mut manager =
        CleanupManager::from_config(Arc::new(SystemProcessControl::new()), &config.cleanup);
    let job_id = job_id.unwrap_or_default();
    let warnings = manager
        .run(
            &job_id,
            &CleanupTargets {
                window,
                temp_paths: Vec::new(),
            },
        )
        .await;

    if warnings.is_empty() {
        println!("Cleanup finished.");
    } else {
        for warning in &warnings {
            println!("[WARN] {}: {}", warning.step, warning.message);
        }
        println!("Cleanup finished with {} warning(s).", warnings.len());
    }
    Ok(())
}
