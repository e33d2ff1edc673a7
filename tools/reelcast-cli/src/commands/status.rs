//! Show the remote recorder's state.

use reelcast_capture_engine::{CaptureBackend, RemoteControlledRecorder};
use reelcast_common::config::{AppConfig, BackendConfig};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let remote = match &config.backend {
        BackendConfig::Remote(remote) => remote.clone(),
        BackendConfig::Headless(headless) => {
            println!("Backend: headless browser ({})", headless.program);
            println!("  Runs one process per job; nothing to query between jobs.");
            return Ok(());
        }
    };

    println!("Backend: remote recorder at {}:{}", remote.host, remote.port);
    let mut recorder = RemoteControlledRecorder::connect(remote)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect: {e}"))?;

    let result = print_state(&mut recorder).await;
    if let Err(e) = recorder.release().await {
        tracing::warn!(error = %e, "Failed to close recorder connection");
    }
    result
}

async fn print_state(recorder: &mut RemoteControlledRecorder) -> anyhow::Result<()> {
    let recording = recorder
        .is_recording()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to query record status: {e}"))?;
    println!("  State: {}", if recording { "recording" } else { "idle" });

    match recorder.record_directory().await {
        Ok(Some(dir)) => println!("  Record directory: {}", dir.display()),
        Ok(None) => println!("  Record directory: (not reported)"),
        Err(e) => println!("  Record directory: unavailable ({e})"),
    }
    Ok(())
}
