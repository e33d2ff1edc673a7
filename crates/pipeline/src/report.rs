//! Per-phase progress reports and the final job outcome.

use std::path::Path;

use chrono::{DateTime, Utc};
use reelcast_common::error::{CleanupWarning, ReelError, ReelResult};
use reelcast_job_model::{Artifact, PipelineState, StateTransition};
use reelcast_timing::DurationBudget;
use serde::{Deserialize, Serialize};

/// Progress callback invoked once per phase event.
pub type ProgressCallback = Box<dyn Fn(&PhaseReport) + Send + Sync>;

/// Pipeline steps as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Budget,
    PrepareView,
    Stabilize,
    StartCapture,
    Record,
    StopCapture,
    Locate,
    PostProcess,
    Cleanup,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::PrepareView => "prepare_view",
            Self::Stabilize => "stabilize",
            Self::StartCapture => "start_capture",
            Self::Record => "record",
            Self::StopCapture => "stop_capture",
            Self::Locate => "locate",
            Self::PostProcess => "post_process",
            Self::Cleanup => "cleanup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Started,
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub job_id: String,
    pub phase: Phase,
    pub status: PhaseStatus,
    /// Lifecycle state when the report was emitted.
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Seconds since the job started.
    pub elapsed_secs: f64,
    pub at: DateTime<Utc>,
}

/// The first fatal error, in reportable form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: String,
    pub message: String,
    pub phase: Phase,
}

impl FailureReport {
    pub fn from_error(error: &ReelError, phase: Phase) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            phase,
        }
    }
}

/// Single pass/fail result for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_artifact: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_artifact: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<DurationBudget>,
    pub phases: Vec<PhaseReport>,
    pub transitions: Vec<StateTransition>,
    pub cleanup_warnings: Vec<CleanupWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.state == PipelineState::CleanedUp
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Write the outcome as pretty JSON.
    pub fn write_json(&self, path: &Path) -> ReelResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(state: PipelineState, error: Option<FailureReport>) -> JobOutcome {
        let now = Utc::now();
        JobOutcome {
            job_id: "j".into(),
            state,
            final_artifact: None,
            raw_artifact: None,
            error,
            budget: None,
            phases: Vec::new(),
            transitions: Vec::new(),
            cleanup_warnings: vec![CleanupWarning::new("servers", "port 8766 busy")],
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_success_requires_cleaned_up_and_no_error() {
        assert!(outcome(PipelineState::CleanedUp, None).is_success());
        assert!(!outcome(PipelineState::Failed, None).is_success());

        let err = ReelError::post_process("ffmpeg exited 1");
        let failure = FailureReport::from_error(&err, Phase::PostProcess);
        assert_eq!(failure.kind, "post_process_error");
        assert!(!outcome(PipelineState::Failed, Some(failure)).is_success());
    }

    #[test]
    fn test_outcome_json_uses_snake_case_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/job.json");
        outcome(PipelineState::CleanedUp, None)
            .write_json(&path)
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["state"], "cleaned_up");
        assert_eq!(json["cleanup_warnings"][0]["step"], "servers");
        assert!(json.get("error").is_none());
    }
}
