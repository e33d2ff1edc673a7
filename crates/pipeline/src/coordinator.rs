//! Pipeline Coordinator.
//!
//! Drives one job through budget, view, capture, locate and post-process in
//! strict order. The first fatal error stops the sequence; cleanup runs
//! afterwards no matter where the job stopped, and its warnings never replace
//! that error. The backend is released after cleanup, so a coordinator runs
//! a single job.

use std::path::{Path, PathBuf};

use chrono::Utc;
use reelcast_capture_engine::{
    ArtifactLocator, CaptureBackend, CaptureRequest, CaptureSession, CaptureTiming,
};
use reelcast_common::clock::{secs_to_duration, RecordingClock};
use reelcast_common::config::AppConfig;
use reelcast_common::error::{CleanupWarning, ReelError, ReelResult};
use reelcast_job_model::{Artifact, Job, JobLifecycle, PipelineState};
use reelcast_timing::{DurationBudget, PacingBounds, PhaseConfig};

use crate::cleanup::{CleanupManager, CleanupTargets};
use crate::postprocess::{final_output_path, resolve_music, PostProcessJob, PostProcessor};
use crate::report::{FailureReport, JobOutcome, Phase, PhaseReport, PhaseStatus, ProgressCallback};
use crate::view::{ReadySignal, ViewProvisioner};

/// Scratch directory name some recorder scripts create next to their output.
const RECORDER_SCRATCH_DIR: &str = "playwright-temp";

const RAW_SUBDIR: &str = "raw";

/// Mutable state for one job. Only the coordinator touches it.
struct JobRun {
    job_id: String,
    clock: RecordingClock,
    lifecycle: JobLifecycle,
    phase: Phase,
    phases: Vec<PhaseReport>,
    targets: CleanupTargets,
    budget: Option<DurationBudget>,
    raw: Option<Artifact>,
    final_artifact: Option<Artifact>,
    /// A capture session was started and has not been stopped cleanly.
    capturing: bool,
}

impl JobRun {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            clock: RecordingClock::start(),
            lifecycle: JobLifecycle::new(),
            phase: Phase::Budget,
            phases: Vec::new(),
            targets: CleanupTargets::default(),
            budget: None,
            raw: None,
            final_artifact: None,
            capturing: false,
        }
    }
}

pub struct PipelineCoordinator {
    config: AppConfig,
    backend: Box<dyn CaptureBackend>,
    view: Box<dyn ViewProvisioner>,
    post: Box<dyn PostProcessor>,
    cleanup: CleanupManager,
    progress: Option<ProgressCallback>,
}

impl PipelineCoordinator {
    pub fn new(
        config: AppConfig,
        backend: Box<dyn CaptureBackend>,
        view: Box<dyn ViewProvisioner>,
        post: Box<dyn PostProcessor>,
        cleanup: CleanupManager,
    ) -> Self {
        Self {
            config,
            backend,
            view,
            post,
            cleanup,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run `job` to a terminal state. Never panics or returns early; every
    /// failure is folded into the outcome.
    pub async fn run(&mut self, job: &Job) -> JobOutcome {
        let mut run = JobRun::new(job.id());
        tracing::info!(
            job_id = %run.job_id,
            backend = %self.backend.kind(),
            target_secs = job.target_duration_seconds(),
            "Starting job"
        );

        let result = self.execute(job, &mut run).await;

        let failure = match result {
            Ok(()) => None,
            Err(error) => {
                let phase = run.phase;
                tracing::error!(
                    job_id = %run.job_id,
                    phase = phase.as_str(),
                    kind = error.kind(),
                    error = %error,
                    "Job failed"
                );
                run.lifecycle.fail();
                self.report(&mut run, phase, PhaseStatus::Failed, Some(error.to_string()));
                if run.capturing {
                    if let Err(e) = self.backend.abort().await {
                        tracing::warn!(job_id = %run.job_id, error = %e, "Backend abort failed");
                    }
                    run.capturing = false;
                }
                Some(FailureReport::from_error(&error, phase))
            }
        };

        self.report(&mut run, Phase::Cleanup, PhaseStatus::Started, None);
        let mut cleanup_warnings = self.cleanup.run(&run.job_id, &run.targets).await;
        if let Err(e) = self.backend.release().await {
            tracing::warn!(job_id = %run.job_id, error = %e, "Backend release failed");
            cleanup_warnings.push(CleanupWarning::new(
                "backend",
                format!("failed to release {}: {e}", self.backend.kind()),
            ));
        }
        let message = (!cleanup_warnings.is_empty())
            .then(|| format!("{} warning(s)", cleanup_warnings.len()));
        self.report(&mut run, Phase::Cleanup, PhaseStatus::Completed, message);

        if failure.is_none() {
            if let Err(e) = run.lifecycle.advance(PipelineState::CleanedUp) {
                tracing::error!(job_id = %run.job_id, error = %e, "Could not finish lifecycle");
            }
        }

        let outcome = JobOutcome {
            job_id: run.job_id.clone(),
            state: run.lifecycle.state(),
            final_artifact: run.final_artifact,
            raw_artifact: run.raw,
            error: failure,
            budget: run.budget,
            phases: run.phases,
            transitions: run.lifecycle.history().to_vec(),
            cleanup_warnings,
            started_at: run.clock.started_at(),
            finished_at: Utc::now(),
        };

        match &outcome.final_artifact {
            Some(artifact) if outcome.is_success() => tracing::info!(
                job_id = %outcome.job_id,
                path = %artifact.path.display(),
                size_bytes = artifact.size_bytes,
                elapsed_secs = run.clock.elapsed_secs(),
                "Job finished"
            ),
            _ => tracing::warn!(
                job_id = %outcome.job_id,
                state = %outcome.state,
                elapsed_secs = run.clock.elapsed_secs(),
                "Job did not produce a final video"
            ),
        }
        outcome
    }

    async fn execute(&mut self, job: &Job, run: &mut JobRun) -> ReelResult<()> {
        // Budget
        self.begin(run, Phase::Budget);
        let budget = self.compute_budget(job)?;
        run.budget = Some(budget);
        let clamped = if budget.is_clamped() {
            format!(" (clamped, paced content runs {:.2}s)", budget.paced_content_secs())
        } else {
            String::new()
        };
        self.complete(
            run,
            Phase::Budget,
            format!(
                "content {:.2}s over {} units, delay {:.4}s{clamped}",
                budget.content_secs, budget.content_units, budget.per_unit_delay_secs
            ),
        );

        // View
        self.begin(run, Phase::PrepareView);
        let view = self.view.prepare(job, &budget).await?;
        run.targets.window = view.window.clone();
        run.targets.temp_paths.extend(view.temp_files.iter().cloned());
        run.lifecycle.advance(PipelineState::ViewReady)?;
        self.complete(run, Phase::PrepareView, view.target.to_string());

        self.begin(run, Phase::Stabilize);
        let stabilization = secs_to_duration(self.config.timing.stabilization_secs);
        let signal = self.view.wait_until_ready(&view, stabilization).await?;
        let message = match signal {
            ReadySignal::Probed { waited_secs } => {
                format!(
                    "view answered after {waited_secs:.2}s, then waited {:.2}s",
                    stabilization.as_secs_f64()
                )
            }
            ReadySignal::FixedDelay { secs } => format!("fixed delay of {secs:.2}s"),
        };
        self.complete(run, Phase::Stabilize, message);

        // Capture
        self.begin(run, Phase::StartCapture);
        let request = CaptureRequest {
            job_id: run.job_id.clone(),
            view: view.target.clone(),
            duration_secs: budget.target_secs,
            output_path: self.raw_output_path(job),
            geometry: self.config.capture,
        };
        if let Some(scratch) = request.output_path.parent() {
            run.targets.temp_paths.push(scratch.join(RECORDER_SCRATCH_DIR));
        }
        let kind = self.backend.kind();
        self.backend
            .configure(&request)
            .await
            .map_err(|e| e.into_capture_start(kind.as_str()))?;
        let session = self
            .backend
            .start(&request)
            .await
            .map_err(|e| e.into_capture_start(kind.as_str()))?;
        run.capturing = true;
        run.lifecycle.advance(PipelineState::Recording)?;
        self.complete(run, Phase::StartCapture, format!("session {}", session.id()));

        self.record(run, &budget).await;

        self.begin(run, Phase::StopCapture);
        let stopped = self
            .backend
            .stop(&session)
            .await
            .map_err(|e| e.into_capture_stop(kind.as_str()))?;
        run.capturing = false;
        run.lifecycle.advance(PipelineState::Stopped)?;
        self.complete(
            run,
            Phase::StopCapture,
            format!("recorded for {:.1}s", session.elapsed_secs()),
        );

        // Locate
        self.begin(run, Phase::Locate);
        let raw = self.resolve_artifact(stopped, &session)?;
        run.raw = Some(raw.clone());
        if raw.is_empty() {
            return Err(ReelError::capture_stop(
                kind.as_str(),
                format!("recording at {} is empty", raw.path.display()),
            ));
        }
        run.lifecycle.advance(PipelineState::Located)?;
        self.complete(run, Phase::Locate, raw.path.display().to_string());

        // Post-process
        self.begin(run, Phase::PostProcess);
        let post_job = PostProcessJob {
            input: raw.path.clone(),
            output: final_output_path(&self.config.output_dir, &job.file_stem()),
            target_duration_secs: budget.target_secs,
            music: resolve_music(&self.config.post_process, job.music_style()),
        };
        let finished = self.post.process(&post_job).await?;
        // Only a recording we asked for is ours to delete.
        if raw.path == request.output_path {
            run.targets.temp_paths.push(raw.path.clone());
        }
        run.final_artifact = Some(finished.clone());
        run.lifecycle.advance(PipelineState::PostProcessed)?;
        self.complete(run, Phase::PostProcess, finished.path.display().to_string());

        Ok(())
    }

    fn compute_budget(&self, job: &Job) -> ReelResult<DurationBudget> {
        let content = read_content(job.content_source_path())?;
        let timing = &self.config.timing;
        DurationBudget::compute(
            f64::from(job.target_duration_seconds()),
            PhaseConfig {
                intro_secs: timing.intro_secs,
                final_secs: timing.final_secs,
            },
            PacingBounds {
                min_delay_secs: timing.min_delay_secs,
                max_delay_secs: timing.max_delay_secs,
            },
            &content,
        )
    }

    /// Wait out the recording when the backend does not time itself.
    async fn record(&self, run: &mut JobRun, budget: &DurationBudget) {
        self.begin(run, Phase::Record);
        match self.backend.timing() {
            CaptureTiming::CoordinatorWaits => {
                let wait = budget.target_secs + self.config.timing.safety_margin_secs;
                tracing::info!(job_id = %run.job_id, wait_secs = wait, "Recording");
                tokio::time::sleep(secs_to_duration(wait)).await;
                self.complete(run, Phase::Record, format!("waited {wait:.1}s"));
            }
            CaptureTiming::SelfTimed => {
                self.report(
                    run,
                    Phase::Record,
                    PhaseStatus::Skipped,
                    Some("backend times its own recording".to_string()),
                );
            }
        }
    }

    fn resolve_artifact(
        &self,
        stopped: Option<Artifact>,
        session: &CaptureSession,
    ) -> ReelResult<Artifact> {
        if let Some(artifact) = stopped {
            return Ok(artifact);
        }

        let hints = self.backend.locator_hints();
        let locator = ArtifactLocator::from_config(&self.config.locator, &hints);
        tracing::info!(
            session = %session.id(),
            candidates = locator.candidates().len(),
            "Backend reported no path; searching for the recording"
        );
        locator.locate().ok_or_else(|| ReelError::ArtifactNotFound {
            searched: locator.candidates().to_vec(),
        })
    }

    /// Raw recordings are removed only after post-processing succeeds.
    fn raw_output_path(&self, job: &Job) -> PathBuf {
        self.config
            .output_dir
            .join(RAW_SUBDIR)
            .join(format!("{}.mp4", job.file_stem()))
    }

    fn begin(&self, run: &mut JobRun, phase: Phase) {
        run.phase = phase;
        self.report(run, phase, PhaseStatus::Started, None);
    }

    fn complete(&self, run: &mut JobRun, phase: Phase, message: String) {
        self.report(run, phase, PhaseStatus::Completed, Some(message));
    }

    fn report(&self, run: &mut JobRun, phase: Phase, status: PhaseStatus, message: Option<String>) {
        let report = PhaseReport {
            job_id: run.job_id.clone(),
            phase,
            status,
            state: run.lifecycle.state(),
            message,
            elapsed_secs: run.clock.elapsed_secs(),
            at: Utc::now(),
        };

        match status {
            PhaseStatus::Failed => {}
            PhaseStatus::Started => tracing::debug!(
                job_id = %report.job_id,
                phase = phase.as_str(),
                state = %report.state,
                "Phase started"
            ),
            _ => tracing::info!(
                job_id = %report.job_id,
                phase = phase.as_str(),
                status = ?status,
                state = %report.state,
                elapsed_secs = report.elapsed_secs,
                message = report.message.as_deref().unwrap_or(""),
                "Phase finished"
            ),
        }

        if let Some(cb) = &self.progress {
            cb(&report);
        }
        run.phases.push(report);
    }
}

fn read_content(path: &Path) -> ReelResult<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ReelError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ReelError::Io(e),
    })
}
