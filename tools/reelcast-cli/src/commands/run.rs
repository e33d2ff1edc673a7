//! Record one job end to end.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use reelcast_capture_engine::connect_backend;
use reelcast_common::config::AppConfig;
use reelcast_job_model::{Job, JobRequest};
use reelcast_pipeline::postprocess::PostProcessProgress;
use reelcast_pipeline::{
    CleanupManager, FfmpegPostProcessor, JobOutcome, PhaseReport, PhaseStatus,
    PipelineCoordinator, PostProcessor, StaticViewProvisioner,
};
use reelcast_platform::{ProcessControl, SystemProcessControl};

pub fn build_request(
    job_id: Option<String>,
    content: Option<PathBuf>,
    title: Option<String>,
    intro_title: Option<String>,
    music_style: Option<String>,
    duration: u32,
) -> anyhow::Result<JobRequest> {
    Ok(JobRequest {
        job_id: job_id.unwrap_or_else(default_job_id),
        content_source_path: content.context("--content is required")?,
        title: title.context("--title is required")?,
        intro_title,
        music_style,
        target_duration_seconds: duration,
    })
}

/// Read a JSON job request. `job_id` overrides the file's id.
pub fn read_request(path: &Path, job_id: Option<String>) -> anyhow::Result<JobRequest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job request {}", path.display()))?;
    let mut request: JobRequest = serde_json::from_str(&text)
        .with_context(|| format!("Invalid job request {}", path.display()))?;
    if let Some(id) = job_id {
        request.job_id = id;
    }
    Ok(request)
}

fn default_job_id() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

pub async fn run(
    config: AppConfig,
    request: JobRequest,
    report: Option<PathBuf>,
) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("{e}; no job was run"))?;

    let job = Job::accept(request, &config.post_process.default_music_style)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("Job {}: {}", job.id(), job.title());
    println!("  Content: {}", job.content_source_path().display());
    println!("  Duration: {}s", job.target_duration_seconds());
    println!("  Music: {}", job.music_style());
    println!();

    let post = FfmpegPostProcessor::new(&config.post_process).with_progress(Arc::new(
        |p: PostProcessProgress| {
            tracing::debug!(
                progress = p.progress,
                out_time_secs = p.out_time_secs,
                "Encoding"
            );
        },
    ));
    if !post.is_available() {
        anyhow::bail!(
            "Post-processor {} ({}) was not found on PATH; no job was run",
            post.name(),
            config.post_process.ffmpeg
        );
    }

    let backend = connect_backend(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect capture backend: {e}"))?;

    let process: Arc<dyn ProcessControl> = Arc::new(SystemProcessControl::new());
    let view = StaticViewProvisioner::new(config.view.clone(), process.clone());
    let cleanup = CleanupManager::from_config(process, &config.cleanup);

    let mut coordinator =
        PipelineCoordinator::new(config, backend, Box::new(view), Box::new(post), cleanup)
            .with_progress(Box::new(print_progress));

    let outcome = coordinator.run(&job).await;

    if let Some(path) = report {
        outcome
            .write_json(&path)
            .map_err(|e| anyhow::anyhow!("Failed to write report {}: {e}", path.display()))?;
        println!("Report written to: {}", path.display());
    }

    print_outcome(&outcome);
    if outcome.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Job {} failed", outcome.job_id)
    }
}

fn print_progress(report: &PhaseReport) {
    let marker = match report.status {
        PhaseStatus::Started => return,
        PhaseStatus::Completed => "[OK]  ",
        PhaseStatus::Skipped => "[SKIP]",
        PhaseStatus::Failed => "[FAIL]",
    };
    match &report.message {
        Some(message) => println!(
            "{marker} {:<14} {message} ({:.1}s)",
            report.phase.as_str(),
            report.elapsed_secs
        ),
        None => println!(
            "{marker} {:<14} ({:.1}s)",
            report.phase.as_str(),
            report.elapsed_secs
        ),
    }
}

fn print_outcome(outcome: &JobOutcome) {
    println!();
    for warning in &outcome.cleanup_warnings {
        println!("[WARN] cleanup/{}: {}", warning.step, warning.message);
    }
    match (&outcome.final_artifact, &outcome.error) {
        (Some(artifact), None) => println!(
            "Video saved to: {} ({} bytes, {:.1}s total)",
            artifact.path.display(),
            artifact.size_bytes,
            outcome.duration_secs()
        ),
        (_, Some(error)) => println!(
            "Failed during {} [{}]: {}",
            error.phase.as_str(),
            error.kind,
            error.message
        ),
        (None, None) => println!("Job ended in state {}", outcome.state),
    }
}
