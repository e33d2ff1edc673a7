use std::fmt;
use std::path::PathBuf;

use reelcast_common::config::{AppConfig, BackendConfig, CaptureGeometry};
use reelcast_common::error::ReelResult;
use reelcast_job_model::Artifact;
use serde::{Deserialize, Serialize};

use crate::session::CaptureSession;

pub mod headless;
pub mod remote;

pub use headless::HeadlessBrowserRecorder;
pub use remote::RemoteControlledRecorder;

/// Which capture variant is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    RemoteRecorder,
    HeadlessBrowser,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RemoteRecorder => "remote-recorder",
            Self::HeadlessBrowser => "headless-browser",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is responsible for waiting out the recording duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTiming {
    /// `start` returns immediately; the caller waits before calling `stop`.
    CoordinatorWaits,
    /// The backend's own process lifetime is the duration; `stop` blocks until it ends.
    SelfTimed,
}

/// Recording state reported by [`CaptureBackend::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Recording,
    Idle,
}

/// The rendered presentation a backend should capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "location", rename_all = "snake_case")]
pub enum ViewTarget {
    File(PathBuf),
    Url(String),
}

impl ViewTarget {
    /// A URL form suitable for a browser source.
    pub fn to_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::File(path) => {
                let normalized = path.to_string_lossy().replace('\\', "/");
                if normalized.starts_with('/') {
                    format!("file://{normalized}")
                } else {
                    format!("file:///{normalized}")
                }
            }
        }
    }
}

impl fmt::Display for ViewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Everything a backend needs to record one job.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub job_id: String,
    pub view: ViewTarget,
    /// Intended recording length in seconds.
    pub duration_secs: f64,
    /// Where the raw recording should land, for backends that accept a path.
    pub output_path: PathBuf,
    pub geometry: CaptureGeometry,
}

/// Abstract interface over the ways a view becomes a raw video file.
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    fn kind(&self) -> BackendKind;

    fn timing(&self) -> CaptureTiming;

    /// One-time provisioning before `start` (resolution, scene, capture source).
    async fn configure(&mut self, _request: &CaptureRequest) -> ReelResult<()> {
        Ok(())
    }

    /// Begin recording. Fails fast if a previous session is unresolved.
    async fn start(&mut self, request: &CaptureRequest) -> ReelResult<CaptureSession>;

    /// End recording. `None` means the recording finished but its path is unknown.
    async fn stop(&mut self, session: &CaptureSession) -> ReelResult<Option<Artifact>>;

    async fn status(&mut self, session: &CaptureSession) -> ReelResult<CaptureStatus>;

    /// Extra directories the artifact locator should search.
    fn locator_hints(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Best-effort release of anything still held after a failure.
    async fn abort(&mut self) -> ReelResult<()> {
        Ok(())
    }

    /// Give up connections to external programs once a job is finished.
    /// Safe to call more than once.
    async fn release(&mut self) -> ReelResult<()> {
        Ok(())
    }
}

/// Build the backend selected by configuration.
pub async fn connect_backend(config: &AppConfig) -> ReelResult<Box<dyn CaptureBackend>> {
    match &config.backend {
        BackendConfig::Remote(remote) => {
            let recorder = RemoteControlledRecorder::connect(remote.clone())
                .await
                .map_err(|e| e.into_capture_start(BackendKind::RemoteRecorder.as_str()))?;
            Ok(Box::new(recorder))
        }
        BackendConfig::Headless(headless) => {
            Ok(Box::new(HeadlessBrowserRecorder::new(headless.clone())))
        }
    }
}
