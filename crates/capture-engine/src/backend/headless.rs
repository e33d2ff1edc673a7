//! Headless-browser recorder.
//!
//! Spawns a browser automation script that loads the view, records it for
//! the requested duration, and exits. The process lifetime is the recording:
//! `stop` waits for exit under a hard deadline of `duration + overhead`
//! counted from `start`, and kills the process if the deadline passes.
//! On unix the recorder leads its own process group so helpers it leaves
//! behind die with it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use reelcast_common::clock::secs_to_duration;
use reelcast_common::config::HeadlessRecorderConfig;
use reelcast_common::error::{ReelError, ReelResult};
use reelcast_job_model::Artifact;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{
    BackendKind, CaptureBackend, CaptureRequest, CaptureStatus, CaptureTiming, ViewTarget,
};
use crate::session::{CaptureSession, SessionSlot};

const BACKEND: &str = "headless-browser";

/// Marker the recorder script prints before the path it actually wrote.
pub const OUTPUT_PATH_MARKER: &str = "OUTPUT_PATH:";

const STDERR_TAIL_LINES: usize = 20;

/// How long output readers may run after the recorder exits. A helper that
/// inherited the pipes keeps them open past that.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

struct RunningRecorder {
    child: Child,
    /// Process group of the recorder, which is also its pid.
    group: Option<u32>,
    command: String,
    output_path: PathBuf,
    deadline: Instant,
    timeout_secs: f64,
    stdout_task: JoinHandle<Option<PathBuf>>,
    stderr_task: JoinHandle<Vec<String>>,
}

pub struct HeadlessBrowserRecorder {
    config: HeadlessRecorderConfig,
    slot: SessionSlot,
    running: Option<RunningRecorder>,
}

impl HeadlessBrowserRecorder {
    pub fn new(config: HeadlessRecorderConfig) -> Self {
        Self {
            config,
            slot: SessionSlot::new(),
            running: None,
        }
    }

    fn build_command(&self, html: &Path, req: &CaptureRequest) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--html")
            .arg(html)
            .arg("--output")
            .arg(&req.output_path)
            .arg("--duration")
            .arg(format_duration_arg(req.duration_secs))
            .arg("--width")
            .arg(req.geometry.width.to_string())
            .arg("--height")
            .arg(req.geometry.height.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    fn describe(&self, html: &Path, req: &CaptureRequest) -> String {
        let mut parts = vec![self.config.program.clone()];
        parts.extend(self.config.args.iter().cloned());
        parts.push(format!(
            "--html {} --output {} --duration {} --width {} --height {}",
            html.display(),
            req.output_path.display(),
            format_duration_arg(req.duration_secs),
            req.geometry.width,
            req.geometry.height
        ));
        parts.join(" ")
    }

    async fn finish(running: RunningRecorder) -> ReelResult<Artifact> {
        let RunningRecorder {
            mut child,
            group,
            command,
            output_path,
            deadline,
            timeout_secs,
            mut stdout_task,
            mut stderr_task,
        } = running;

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => status.map_err(|e| {
                ReelError::capture_stop(BACKEND, format!("failed to wait for `{command}`: {e}"))
            })?,
            Err(_) => {
                tracing::error!(%command, timeout_secs, "Recorder exceeded its deadline; killing");
                kill_recorder(&mut child, group).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(ReelError::capture_stop(
                    BACKEND,
                    format!("`{command}` timed out after {timeout_secs:.1}s and was terminated"),
                ));
            }
        };

        let drain_deadline = Instant::now() + PIPE_DRAIN_GRACE;
        let reported = match tokio::time::timeout_at(drain_deadline, &mut stdout_task).await {
            Ok(joined) => joined.ok().flatten(),
            Err(_) => None,
        };
        let stderr_tail = match tokio::time::timeout_at(drain_deadline, &mut stderr_task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        if !stdout_task.is_finished() || !stderr_task.is_finished() {
            tracing::warn!(
                %command,
                "Recorder exited but a leftover process still holds its output; killing its group"
            );
            stdout_task.abort();
            stderr_task.abort();
            kill_group(group);
        }

        if !status.success() {
            return Err(ReelError::capture_stop(
                BACKEND,
                format!(
                    "`{command}` exited with {status}: {}",
                    if stderr_tail.is_empty() {
                        "no diagnostic output".to_string()
                    } else {
                        stderr_tail.join("\n")
                    }
                ),
            ));
        }

        let path = match reported {
            Some(path) if path.is_file() => path,
            _ => output_path,
        };
        Artifact::from_path(&path).map_err(|_| {
            ReelError::capture_stop(
                BACKEND,
                format!(
                    "`{command}` exited successfully but wrote no file at {}",
                    path.display()
                ),
            )
        })
    }
}

#[async_trait::async_trait]
impl CaptureBackend for HeadlessBrowserRecorder {
    fn kind(&self) -> BackendKind {
        BackendKind::HeadlessBrowser
    }

    fn timing(&self) -> CaptureTiming {
        CaptureTiming::SelfTimed
    }

    async fn start(&mut self, req: &CaptureRequest) -> ReelResult<CaptureSession> {
        self.slot.ensure_idle()?;

        let html = match &req.view {
            ViewTarget::File(path) => path.clone(),
            ViewTarget::Url(url) => {
                return Err(ReelError::capture_start(
                    BACKEND,
                    format!("needs a local html file, got url {url}"),
                ));
            }
        };

        if let Some(parent) = req.output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReelError::capture_start(
                    BACKEND,
                    format!("cannot create output directory {}: {e}", parent.display()),
                )
            })?;
        }

        let command = self.describe(&html, req);
        let mut child = self.build_command(&html, req).spawn().map_err(|e| {
            ReelError::capture_start(BACKEND, format!("failed to launch `{command}`: {e}"))
        })?;

        let stdout_task = match child.stdout.take() {
            Some(stdout) => tokio::spawn(scan_stdout(stdout)),
            None => tokio::spawn(async { None }),
        };
        let stderr_task = match child.stderr.take() {
            Some(stderr) => tokio::spawn(collect_stderr_tail(stderr)),
            None => tokio::spawn(async { Vec::new() }),
        };

        let timeout_secs = req.duration_secs.max(0.0) + self.config.overhead_secs as f64;
        let session = CaptureSession::new(BackendKind::HeadlessBrowser, &req.job_id);
        self.slot.occupy(&session)?;
        tracing::info!(
            session = %session.id(),
            pid = ?child.id(),
            timeout_secs,
            "Headless recorder started"
        );

        self.running = Some(RunningRecorder {
            group: child.id(),
            child,
            command,
            output_path: req.output_path.clone(),
            deadline: Instant::now() + secs_to_duration(timeout_secs),
            timeout_secs,
            stdout_task,
            stderr_task,
        });
        Ok(session)
    }

    async fn stop(&mut self, session: &CaptureSession) -> ReelResult<Option<Artifact>> {
        self.slot.release(session)?;
        let running = self.running.take().ok_or_else(|| {
            ReelError::capture_stop(BACKEND, "no recorder process is running")
        })?;

        let artifact = Self::finish(running).await?;
        tracing::info!(
            session = %session.id(),
            path = %artifact.path.display(),
            size_bytes = artifact.size_bytes,
            elapsed_secs = session.elapsed_secs(),
            "Headless recording finished"
        );
        Ok(Some(artifact))
    }

    async fn status(&mut self, _session: &CaptureSession) -> ReelResult<CaptureStatus> {
        let Some(running) = self.running.as_mut() else {
            return Ok(CaptureStatus::Idle);
        };
        match running.child.try_wait()? {
            None => Ok(CaptureStatus::Recording),
            Some(_) => Ok(CaptureStatus::Idle),
        }
    }

    async fn abort(&mut self) -> ReelResult<()> {
        self.slot.clear();
        if let Some(mut running) = self.running.take() {
            tracing::warn!(command = %running.command, "Killing headless recorder");
            kill_recorder(&mut running.child, running.group).await;
            running.stdout_task.abort();
            running.stderr_task.abort();
        }
        Ok(())
    }
}

async fn kill_recorder(child: &mut Child, group: Option<u32>) {
    kill_group(group);
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill headless recorder");
    }
}

/// SIGKILL every process left in the recorder's group.
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    let Some(pgid) = group else {
        return;
    };
    match std::process::Command::new("kill")
        .args(["-KILL", "--", &format!("-{pgid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => tracing::debug!(pgid, "Killed recorder process group"),
        Ok(_) => {}
        Err(e) => tracing::warn!(pgid, error = %e, "Failed to kill recorder process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

/// Whole seconds print without a fraction so scripts that `parseInt` still work.
fn format_duration_arg(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs:.3}")
    }
}

/// Parse an `OUTPUT_PATH:` line.
pub fn parse_output_line(line: &str) -> Option<PathBuf> {
    line.trim()
        .strip_prefix(OUTPUT_PATH_MARKER)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

async fn scan_stdout<R: AsyncRead + Unpin>(stdout: R) -> Option<PathBuf> {
    let mut lines = BufReader::new(stdout).lines();
    let mut reported = None;
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(path) = parse_output_line(&line) {
            reported = Some(path);
        } else {
            tracing::debug!(target: "reelcast::headless", "{line}");
        }
    }
    reported
}

async fn collect_stderr_tail<R: AsyncRead + Unpin>(stderr: R) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "reelcast::headless", stderr = %line);
        tail.push(line);
        if tail.len() > STDERR_TAIL_LINES {
            tail.remove(0);
        }
    }
    tail
}
