//! Process termination and local port probing.
//!
//! Helper servers and view windows are started by someone else and may or
//! may not still be alive when the pipeline finishes. Everything here treats
//! "already gone" as success.

use std::net::SocketAddr;
use std::time::Duration;

use reelcast_common::error::{ReelError, ReelResult};
use sysinfo::{Pid, ProcessStatus, Signal, System};
use tokio::net::TcpStream;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// How a termination request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Exited within the grace period after a polite request.
    Graceful,
    /// Had to be force-killed.
    Killed,
    /// No such process.
    NotRunning,
}

/// Capability to find and stop external processes.
#[async_trait::async_trait]
pub trait ProcessControl: Send + Sync {
    /// Ask `pid` to exit, force-killing it after `grace`.
    async fn terminate_pid(&self, pid: u32, grace: Duration) -> ReelResult<TerminateOutcome>;

    /// Close every window whose title starts with `title`. Returns how many were targeted.
    async fn terminate_by_title(&self, title: &str) -> ReelResult<usize>;

    /// Whether something accepts TCP connections on `127.0.0.1:port`.
    async fn is_port_listening(&self, port: u16) -> bool;

    /// Stop every process whose command line contains `identity`. Returns how many were stopped.
    async fn find_and_stop_by_identity(&self, identity: &str, grace: Duration)
        -> ReelResult<usize>;
}

/// [`ProcessControl`] backed by the host process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessControl;

impl SystemProcessControl {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ProcessControl for SystemProcessControl {
    async fn terminate_pid(&self, pid: u32, grace: Duration) -> ReelResult<TerminateOutcome> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        if !is_alive(&mut system, pid) {
            return Ok(TerminateOutcome::NotRunning);
        }

        let polite = system
            .process(pid)
            .and_then(|process| process.kill_with(Signal::Term));
        if polite.is_none() {
            // SIGTERM is not available everywhere; go straight to kill.
            return force_kill(&mut system, pid);
        }

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(POLL_INTERVAL).await;
            if !is_alive(&mut system, pid) {
                tracing::debug!(pid = pid.as_u32(), "Process exited after terminate");
                return Ok(TerminateOutcome::Graceful);
            }
        }

        force_kill(&mut system, pid)
    }

    async fn terminate_by_title(&self, title: &str) -> ReelResult<usize> {
        terminate_windows_by_title(title).await
    }

    async fn is_port_listening(&self, port: u16) -> bool {
        port_is_listening(port).await
    }

    async fn find_and_stop_by_identity(
        &self,
        identity: &str,
        grace: Duration,
    ) -> ReelResult<usize> {
        if identity.trim().is_empty() {
            return Err(ReelError::platform("process identity must not be empty"));
        }

        let own_pid = std::process::id();
        let mut system = System::new();
        system.refresh_processes();
        let matches: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .filter(|(_, process)| command_line_matches(process.cmd(), identity))
            .map(|(pid, _)| pid.as_u32())
            .collect();

        stop_pids(self, matches, identity, grace).await
    }
}

/// Terminate every pid in `pids`, continuing past failures. Errors only if
/// some pid could not be stopped; the message says how many were.
pub async fn stop_pids<C: ProcessControl + ?Sized>(
    control: &C,
    pids: Vec<u32>,
    identity: &str,
    grace: Duration,
) -> ReelResult<usize> {
    let total = pids.len();
    let mut stopped = 0;
    let mut failures = Vec::new();
    for pid in pids {
        match control.terminate_pid(pid, grace).await {
            Ok(TerminateOutcome::NotRunning) => {}
            Ok(outcome) => {
                tracing::info!(pid, identity, ?outcome, "Stopped helper process");
                stopped += 1;
            }
            Err(e) => {
                tracing::warn!(pid, identity, error = %e, "Failed to stop helper process");
                failures.push(format!("pid {pid}: {e}"));
            }
        }
    }

    if failures.is_empty() {
        Ok(stopped)
    } else {
        Err(ReelError::platform(format!(
            "stopped {stopped} of {total} processes matching {identity:?}; {}",
            failures.join("; ")
        )))
    }
}

/// Whether `pid` exists and has not exited. A zombie has exited; only its
/// parent has not collected it yet.
fn is_alive(system: &mut System, pid: Pid) -> bool {
    system.refresh_process(pid)
        && system
            .process(pid)
            .map(|process| process.status() != ProcessStatus::Zombie)
            .unwrap_or(false)
}

fn force_kill(system: &mut System, pid: Pid) -> ReelResult<TerminateOutcome> {
    match system.process(pid) {
        Some(process) => {
            if process.kill() {
                Ok(TerminateOutcome::Killed)
            } else if !is_alive(system, pid) {
                Ok(TerminateOutcome::NotRunning)
            } else {
                Err(ReelError::platform(format!(
                    "failed to kill process {}",
                    pid.as_u32()
                )))
            }
        }
        None => Ok(TerminateOutcome::NotRunning),
    }
}

/// Whether a command line contains `identity` in any argument.
pub fn command_line_matches(cmd: &[String], identity: &str) -> bool {
    cmd.iter().any(|arg| arg.contains(identity))
}

/// Probe `127.0.0.1:port` with a short connect timeout.
pub async fn port_is_listening(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    matches!(
        tokio::time::timeout(PORT_PROBE_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(target_os = "windows")]
async fn terminate_windows_by_title(title: &str) -> ReelResult<usize> {
    let output = tokio::process::Command::new("taskkill")
        .args(["/F", "/FI"])
        .arg(format!("WINDOWTITLE eq {title}*"))
        .output()
        .await
        .map_err(|e| ReelError::platform(format!("failed to run taskkill: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().filter(|l| l.contains("SUCCESS")).count())
}

#[cfg(not(target_os = "windows"))]
async fn terminate_windows_by_title(title: &str) -> ReelResult<usize> {
    let listing = match tokio::process::Command::new("wmctrl")
        .arg("-l")
        .output()
        .await
    {
        Ok(output) if output.status.success() => output,
        Ok(_) | Err(_) => {
            return Err(ReelError::platform(
                "wmctrl is not available; cannot close windows by title",
            ));
        }
    };

    let matching = window_titles_matching(&String::from_utf8_lossy(&listing.stdout), title);
    let mut closed = 0;
    for _ in 0..matching {
        let status = tokio::process::Command::new("wmctrl")
            .args(["-c", title])
            .status()
            .await
            .map_err(|e| ReelError::platform(format!("failed to run wmctrl: {e}")))?;
        if status.success() {
            closed += 1;
        }
    }
    Ok(closed)
}

/// Count `wmctrl -l` rows whose title starts with `title`.
///
/// Rows look like `0x04400003  0 host Window Title`.
pub fn window_titles_matching(listing: &str, title: &str) -> usize {
    listing
        .lines()
        .filter_map(|line| {
            // Skip id, desktop and host columns.
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(fields[3..].join(" "))
        })
        .filter(|window_title| window_title.starts_with(title))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_matches_any_argument() {
        let cmd = vec![
            "python3".to_string(),
            "/opt/reels/scripts/music_server.py".to_string(),
        ];
        assert!(command_line_matches(&cmd, "music_server.py"));
        assert!(!command_line_matches(&cmd, "simple_server.py"));
        assert!(!command_line_matches(&[], "music_server.py"));
    }

    #[test]
    fn test_window_titles_matching() {
        let listing = "0x04400003  0 host Reelcast Stream View\n\
                       0x04400010  0 host Terminal\n\
                       0x04400011  1 host Reelcast Stream View - job 7\n";
        assert_eq!(window_titles_matching(listing, "Reelcast Stream View"), 2);
        assert_eq!(window_titles_matching(listing, "Nothing"), 0);
    }

    #[tokio::test]
    async fn test_port_probe_on_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_is_listening(port).await);
        drop(listener);
        assert!(!port_is_listening(port).await);
    }

    #[tokio::test]
    async fn test_terminate_missing_pid_is_not_running() {
        let control = SystemProcessControl::new();
        let outcome = control
            .terminate_pid(u32::MAX - 7, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(outcome, TerminateOutcome::NotRunning);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_running_child() {
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        let control = SystemProcessControl::new();
        let outcome = control
            .terminate_pid(pid, Duration::from_secs(2))
            .await
            .unwrap();
        assert_ne!(outcome, TerminateOutcome::NotRunning);
        drop(child);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_unreaped_child_is_not_running() {
        let child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        drop(child);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let control = SystemProcessControl::new();
        let started = std::time::Instant::now();
        let outcome = control
            .terminate_pid(pid, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(outcome, TerminateOutcome::NotRunning);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    /// Fails for one pid and records every attempt.
    struct Stubborn {
        stubborn_pid: u32,
        attempts: std::sync::Mutex<Vec<u32>>,
    }

    #[async_trait::async_trait]
    impl ProcessControl for Stubborn {
        async fn terminate_pid(&self, pid: u32, _: Duration) -> ReelResult<TerminateOutcome> {
            self.attempts.lock().unwrap().push(pid);
            if pid == self.stubborn_pid {
                Err(ReelError::platform("operation not permitted"))
            } else {
                Ok(TerminateOutcome::Graceful)
            }
        }
        async fn terminate_by_title(&self, _: &str) -> ReelResult<usize> {
            Ok(0)
        }
        async fn is_port_listening(&self, _: u16) -> bool {
            false
        }
        async fn find_and_stop_by_identity(&self, _: &str, _: Duration) -> ReelResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_one_stubborn_process_does_not_stop_the_rest() {
        let control = Stubborn {
            stubborn_pid: 11,
            attempts: std::sync::Mutex::new(Vec::new()),
        };
        let err = stop_pids(&control, vec![10, 11, 12], "music_server.py", Duration::ZERO)
            .await
            .unwrap_err();

        assert_eq!(*control.attempts.lock().unwrap(), vec![10, 11, 12]);
        let message = err.to_string();
        assert!(message.contains("stopped 2 of 3"), "{message}");
        assert!(message.contains("pid 11"), "{message}");
    }

    #[tokio::test]
    async fn test_identity_must_not_be_empty() {
        let err = SystemProcessControl::new()
            .find_and_stop_by_identity("  ", Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "platform_error");
    }
}
