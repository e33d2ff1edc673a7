//! View provisioning.
//!
//! A view is whatever the capture backend points at: a local html page or a
//! URL. The static provisioner does not render anything itself; it picks the
//! target, attaches the per-job pacing parameters to URLs, and optionally
//! launches a window showing the view.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reelcast_capture_engine::ViewTarget;
use reelcast_common::config::ViewConfig;
use reelcast_common::error::{ReelError, ReelResult};
use reelcast_job_model::Job;
use reelcast_platform::ProcessControl;
use reelcast_timing::DurationBudget;
use serde::Serialize;

const PROBE_INTERVAL: Duration = Duration::from_millis(200);

/// A window showing the view, if one was launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowHandle {
    pub pid: Option<u32>,
    pub title: String,
}

/// What the provisioner produced for one job.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    pub target: ViewTarget,
    pub window: Option<WindowHandle>,
    /// Transient files to delete during cleanup.
    pub temp_files: Vec<PathBuf>,
}

/// How the view was judged ready.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadySignal {
    /// The view's server accepted connections, then the stabilization delay ran.
    Probed { waited_secs: f64 },
    /// Only the fixed stabilization delay was available.
    FixedDelay { secs: f64 },
}

#[async_trait::async_trait]
pub trait ViewProvisioner: Send + Sync {
    async fn prepare(&self, job: &Job, budget: &DurationBudget) -> ReelResult<ViewHandle>;

    /// Block until the view is ready to be captured.
    ///
    /// The default is a fixed delay: time-based, so a view that takes longer
    /// than `stabilization` to set itself up will be captured early.
    async fn wait_until_ready(
        &self,
        _view: &ViewHandle,
        stabilization: Duration,
    ) -> ReelResult<ReadySignal> {
        tokio::time::sleep(stabilization).await;
        Ok(ReadySignal::FixedDelay {
            secs: stabilization.as_secs_f64(),
        })
    }
}

/// Serves either a configured base URL or the job's own html file.
pub struct StaticViewProvisioner {
    config: ViewConfig,
    process: Arc<dyn ProcessControl>,
}

impl StaticViewProvisioner {
    pub fn new(config: ViewConfig, process: Arc<dyn ProcessControl>) -> Self {
        Self { config, process }
    }

    fn target_for(&self, job: &Job, budget: &DurationBudget) -> ReelResult<ViewTarget> {
        if let Some(base) = &self.config.base_url {
            return Ok(ViewTarget::Url(with_job_params(base, job, budget)));
        }

        let path = job.content_source_path();
        let is_html = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
            .unwrap_or(false);
        if !is_html {
            return Err(ReelError::view(format!(
                "no view.base_url configured and {} is not an html page",
                path.display()
            )));
        }
        let absolute = std::fs::canonicalize(path).map_err(|e| {
            ReelError::view(format!("cannot resolve {}: {e}", path.display()))
        })?;
        Ok(ViewTarget::File(absolute))
    }

    fn launch_window(&self, target: &ViewTarget) -> ReelResult<Option<WindowHandle>> {
        let Some(launcher) = &self.config.launcher else {
            return Ok(None);
        };

        let url = target.to_url();
        let path = match target {
            ViewTarget::File(p) => p.to_string_lossy().into_owned(),
            ViewTarget::Url(u) => u.clone(),
        };
        let args: Vec<String> = launcher
            .args
            .iter()
            .map(|a| a.replace("{url}", &url).replace("{path}", &path))
            .collect();

        let mut child = tokio::process::Command::new(&launcher.program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                ReelError::view(format!("failed to launch `{}`: {e}", launcher.program))
            })?;

        let pid = child.id();
        tracing::info!(pid = ?pid, program = %launcher.program, "Launched view window");

        // Reap the launcher so an early exit leaves no zombie behind the pid.
        let program = launcher.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!(%program, %status, "View launcher exited"),
                Err(e) => tracing::debug!(%program, error = %e, "Failed to wait for view launcher"),
            }
        });

        Ok(Some(WindowHandle {
            pid,
            title: self.config.window_title.clone(),
        }))
    }
}

#[async_trait::async_trait]
impl ViewProvisioner for StaticViewProvisioner {
    async fn prepare(&self, job: &Job, budget: &DurationBudget) -> ReelResult<ViewHandle> {
        let target = self.target_for(job, budget)?;
        let window = self.launch_window(&target)?;
        tracing::info!(job_id = %job.id(), view = %target, "View prepared");
        Ok(ViewHandle {
            target,
            window,
            temp_files: Vec::new(),
        })
    }

    async fn wait_until_ready(
        &self,
        view: &ViewHandle,
        stabilization: Duration,
    ) -> ReelResult<ReadySignal> {
        let port = match &view.target {
            ViewTarget::Url(url) => local_http_port(url),
            ViewTarget::File(_) => None,
        };

        let Some(port) = port else {
            tracing::warn!(
                stabilization_secs = stabilization.as_secs_f64(),
                "View readiness is time-based; a slow view may be captured before it is set up"
            );
            tokio::time::sleep(stabilization).await;
            return Ok(ReadySignal::FixedDelay {
                secs: stabilization.as_secs_f64(),
            });
        };

        let timeout = Duration::from_secs(self.config.readiness_timeout_secs);
        let started = tokio::time::Instant::now();
        while !self.process.is_port_listening(port).await {
            if started.elapsed() >= timeout {
                return Err(ReelError::view(format!(
                    "view server on port {port} did not accept connections within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
        tracing::debug!(port, "View server is accepting connections");

        tokio::time::sleep(stabilization).await;
        Ok(ReadySignal::Probed {
            waited_secs: started.elapsed().as_secs_f64(),
        })
    }
}

/// Append per-job title and pacing parameters to `base`.
pub fn with_job_params(base: &str, job: &Job, budget: &DurationBudget) -> String {
    let params = [
        ("title", job.title().to_string()),
        ("intro_title", job.intro_title().to_string()),
        ("delay", format!("{:.4}", budget.per_unit_delay_secs)),
        ("intro", format!("{}", budget.intro_secs)),
        ("content", format!("{}", budget.content_secs)),
        ("final", format!("{}", budget.final_secs)),
    ];
    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let (head, fragment) = match base.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (base, None),
    };
    let separator = if head.contains('?') { '&' } else { '?' };
    let mut url = format!("{head}{separator}{query}");
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }
    url
}

/// Port of an `http(s)` URL on a loopback host, if it is one.
pub fn local_http_port(url: &str) -> Option<u16> {
    let (rest, default_port) = if let Some(rest) = url.strip_prefix("http://") {
        (rest, 80)
    } else if let Some(rest) = url.strip_prefix("https://") {
        (rest, 443)
    } else {
        return None;
    };

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let (host, port) = if let Some(end) = authority.find(']') {
        let port = match authority[end + 1..].strip_prefix(':') {
            Some(port) => port.parse().ok()?,
            None => default_port,
        };
        (&authority[..=end], port)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (authority, default_port),
        }
    };

    match host {
        "localhost" | "127.0.0.1" | "[::1]" => Some(port),
        _ => None,
    }
}
