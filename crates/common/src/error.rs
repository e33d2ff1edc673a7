//! Error types shared across Reelcast crates.

use std::path::PathBuf;

/// Top-level error type for Reelcast operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid job: {message}")]
    InvalidJob { message: String },

    #[error("View provisioning error: {message}")]
    ViewProvisioning { message: String },

    #[error("Capture start error [{backend}]: {message}")]
    CaptureStart { backend: String, message: String },

    #[error("Capture stop error [{backend}]: {message}")]
    CaptureStop { backend: String, message: String },

    #[error("Recorded artifact not found (searched {} directories)", .searched.len())]
    ArtifactNotFound { searched: Vec<PathBuf> },

    #[error("Post-processing error: {message}")]
    PostProcess { message: String },

    #[error(
        "Invalid duration budget: target {target_secs}s leaves no content time after intro {intro_secs}s + final {final_secs}s"
    )]
    InvalidBudget {
        target_secs: f64,
        intro_secs: f64,
        final_secs: f64,
    },

    #[error("A capture session is already active (session {session_id})")]
    SessionActive { session_id: String },

    #[error("Invalid pipeline transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Recorder protocol error: {message}")]
    Protocol { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

impl ReelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob {
            message: msg.into(),
        }
    }

    pub fn view(msg: impl Into<String>) -> Self {
        Self::ViewProvisioning {
            message: msg.into(),
        }
    }

    pub fn capture_start(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CaptureStart {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    pub fn capture_stop(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CaptureStop {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    pub fn post_process(msg: impl Into<String>) -> Self {
        Self::PostProcess {
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    /// Stable machine-readable label used in job reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "configuration_error",
            Self::InvalidJob { .. } => "invalid_job",
            Self::ViewProvisioning { .. } => "view_provisioning_error",
            Self::CaptureStart { .. } | Self::SessionActive { .. } => "capture_start_error",
            Self::CaptureStop { .. } => "capture_stop_error",
            Self::ArtifactNotFound { .. } => "artifact_not_found_error",
            Self::PostProcess { .. } => "post_process_error",
            Self::InvalidBudget { .. } => "invalid_budget",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Protocol { .. } => "protocol_error",
            Self::Platform { .. } => "platform_error",
            Self::FileNotFound { .. } => "file_not_found",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Other(_) => "other",
        }
    }

    /// Re-wrap a lower-level error as a capture start failure, keeping its message.
    pub fn into_capture_start(self, backend: &str) -> Self {
        match self {
            Self::CaptureStart { .. } | Self::SessionActive { .. } => self,
            other => Self::capture_start(backend, other.to_string()),
        }
    }

    /// Re-wrap a lower-level error as a capture stop failure, keeping its message.
    pub fn into_capture_stop(self, backend: &str) -> Self {
        match self {
            Self::CaptureStop { .. } => self,
            other => Self::capture_stop(backend, other.to_string()),
        }
    }
}

/// A non-fatal problem observed during cleanup. Logged and reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CleanupWarning {
    /// Which cleanup sub-step produced the warning.
    pub step: String,
    pub message: String,
}

impl CleanupWarning {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(ReelError::config("x").kind(), "configuration_error");
        assert_eq!(
            ReelError::ArtifactNotFound { searched: vec![] }.kind(),
            "artifact_not_found_error"
        );
        assert_eq!(
            ReelError::SessionActive {
                session_id: "s".into()
            }
            .kind(),
            "capture_start_error"
        );
    }

    #[test]
    fn test_capture_errors_carry_backend_context() {
        let err = ReelError::protocol("socket closed").into_capture_stop("remote-recorder");
        let text = err.to_string();
        assert!(text.contains("remote-recorder"));
        assert!(text.contains("socket closed"));
        assert_eq!(err.kind(), "capture_stop_error");
    }

    #[test]
    fn test_rewrap_keeps_existing_capture_error() {
        let err = ReelError::capture_start("headless-browser", "spawn failed")
            .into_capture_start("other");
        match err {
            ReelError::CaptureStart { backend, .. } => assert_eq!(backend, "headless-browser"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
