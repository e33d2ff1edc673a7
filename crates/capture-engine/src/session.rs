//! Capture session handles and the single-session guard.

use chrono::{DateTime, Utc};
use reelcast_common::clock::RecordingClock;
use reelcast_common::error::{ReelError, ReelResult};

use crate::backend::BackendKind;

/// Runtime handle for one recording, valid between `start` and `stop`.
///
/// Only the backend that issued it knows what it refers to; callers pass it
/// back unchanged.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    id: String,
    backend: BackendKind,
    clock: RecordingClock,
}

impl CaptureSession {
    pub fn new(backend: BackendKind, job_id: &str) -> Self {
        let clock = RecordingClock::start();
        let id = format!(
            "{}-{}-{}",
            backend.as_str(),
            job_id,
            clock.started_at().timestamp_millis()
        );
        Self { id, backend, clock }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.clock.started_at()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.clock.elapsed_secs()
    }
}

/// Holds the id of the one session a backend currently owns.
#[derive(Debug, Default)]
pub struct SessionSlot {
    active: Option<String>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Fail fast if a session is still unresolved.
    pub fn ensure_idle(&self) -> ReelResult<()> {
        match &self.active {
            Some(id) => Err(ReelError::SessionActive {
                session_id: id.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn occupy(&mut self, session: &CaptureSession) -> ReelResult<()> {
        self.ensure_idle()?;
        self.active = Some(session.id().to_string());
        Ok(())
    }

    /// Release `session`. Errors if a different (or no) session holds the slot.
    pub fn release(&mut self, session: &CaptureSession) -> ReelResult<()> {
        match self.active.as_deref() {
            Some(id) if id == session.id() => {
                self.active = None;
                Ok(())
            }
            Some(id) => Err(ReelError::capture_stop(
                session.backend().as_str(),
                format!("session {} is not the active session {id}", session.id()),
            )),
            None => Err(ReelError::capture_stop(
                session.backend().as_str(),
                format!("session {} is not active", session.id()),
            )),
        }
    }

    /// Drop whatever session is held. Used when aborting.
    pub fn clear(&mut self) -> Option<String> {
        self.active.take()
    }
}
