//! Cleanup Manager.
//!
//! Runs after every job, successful or not. Each step logs and records its
//! own failures as [`CleanupWarning`]s; nothing here returns an error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reelcast_common::config::{AuxServer, CleanupConfig};
use reelcast_common::error::CleanupWarning;
use reelcast_job_model::{belongs_to_stem, file_stem_for};
use reelcast_platform::{ProcessControl, TerminateOutcome};

use crate::view::WindowHandle;

/// What one job left behind.
#[derive(Debug, Clone, Default)]
pub struct CleanupTargets {
    pub window: Option<WindowHandle>,
    pub temp_paths: Vec<PathBuf>,
}

pub struct CleanupManager {
    process: Arc<dyn ProcessControl>,
    servers: Vec<AuxServer>,
    temp_dir: Option<PathBuf>,
    grace: Duration,
    completed: HashSet<String>,
}

impl CleanupManager {
    pub fn new(process: Arc<dyn ProcessControl>, servers: Vec<AuxServer>, grace: Duration) -> Self {
        Self {
            process,
            servers,
            temp_dir: None,
            grace,
            completed: HashSet::new(),
        }
    }

    pub fn from_config(process: Arc<dyn ProcessControl>, config: &CleanupConfig) -> Self {
        let mut manager = Self::new(
            process,
            config.servers.clone(),
            Duration::from_secs(config.termination_grace_secs),
        );
        manager.temp_dir = config.temp_dir.clone();
        manager
    }

    /// Also sweep `dir` for entries named after the job's file stem.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn has_run(&self, job_id: &str) -> bool {
        self.completed.contains(job_id)
    }

    /// Release everything `targets` names. A second call for the same job is a no-op.
    pub async fn run(&mut self, job_id: &str, targets: &CleanupTargets) -> Vec<CleanupWarning> {
        if !self.completed.insert(job_id.to_string()) {
            tracing::debug!(job_id, "Cleanup already ran for this job");
            return Vec::new();
        }

        tracing::info!(
            job_id,
            window = ?targets.window,
            servers = self.servers.len(),
            temp_paths = targets.temp_paths.len(),
            "Running cleanup"
        );

        let mut warnings = Vec::new();
        if let Some(window) = &targets.window {
            self.close_window(window, &mut warnings).await;
        }
        self.stop_servers(&mut warnings).await;
        self.remove_temp_paths(job_id, &targets.temp_paths, &mut warnings);

        for warning in &warnings {
            tracing::warn!(job_id, step = %warning.step, "{}", warning.message);
        }
        warnings
    }

    async fn close_window(&self, window: &WindowHandle, warnings: &mut Vec<CleanupWarning>) {
        if let Some(pid) = window.pid {
            match self.process.terminate_pid(pid, self.grace).await {
                Ok(TerminateOutcome::NotRunning) => {
                    tracing::debug!(pid, "Window process already gone; sweeping by title");
                }
                Ok(outcome) => {
                    tracing::info!(pid, ?outcome, "Closed view window");
                    return;
                }
                Err(e) => {
                    tracing::debug!(pid, error = %e, "Terminate by pid failed; sweeping by title");
                }
            }
        }

        if window.title.trim().is_empty() {
            return;
        }
        match self.process.terminate_by_title(&window.title).await {
            Ok(0) => tracing::debug!(title = %window.title, "No windows matched title"),
            Ok(count) => tracing::info!(title = %window.title, count, "Closed windows by title"),
            Err(e) => warnings.push(CleanupWarning::new(
                "window",
                format!("failed to close windows titled {:?}: {e}", window.title),
            )),
        }
    }

    async fn stop_servers(&self, warnings: &mut Vec<CleanupWarning>) {
        for server in &self.servers {
            if !self.process.is_port_listening(server.port).await {
                tracing::debug!(server = %server.name, port = server.port, "Server not listening");
                continue;
            }

            match self
                .process
                .find_and_stop_by_identity(&server.identity, self.grace)
                .await
            {
                Ok(0) => warnings.push(CleanupWarning::new(
                    "servers",
                    format!(
                        "{} is listening on port {} but no process matches {:?}",
                        server.name, server.port, server.identity
                    ),
                )),
                Ok(count) => {
                    tracing::info!(server = %server.name, port = server.port, count, "Stopped server")
                }
                Err(e) => warnings.push(CleanupWarning::new(
                    "servers",
                    format!("failed to stop {} on port {}: {e}", server.name, server.port),
                )),
            }
        }
    }

    fn remove_temp_paths(
        &self,
        job_id: &str,
        explicit: &[PathBuf],
        warnings: &mut Vec<CleanupWarning>,
    ) {
        let mut paths: Vec<PathBuf> = explicit.to_vec();
        if let Some(dir) = &self.temp_dir {
            for path in job_entries(dir, job_id) {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }

        for path in paths {
            match remove_path(&path) {
                Ok(true) => tracing::debug!(path = %path.display(), "Removed temp path"),
                Ok(false) => {}
                Err(e) => warnings.push(CleanupWarning::new(
                    "temp_files",
                    format!("failed to remove {}: {e}", path.display()),
                )),
            }
        }
    }
}

/// Entries directly under `dir` named `job-<id>` or `job-<id>.<ext>`.
fn job_entries(dir: &Path, job_id: &str) -> Vec<PathBuf> {
    if job_id.is_empty() {
        return Vec::new();
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let stem = file_stem_for(job_id);
    entries
        .filter_map(Result::ok)
        .filter(|e| belongs_to_stem(&e.file_name().to_string_lossy(), &stem))
        .map(|e| e.path())
        .collect()
}

/// Remove a file or directory tree. `Ok(false)` when it was already gone.
fn remove_path(path: &Path) -> std::io::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
