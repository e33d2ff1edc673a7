//! Environment checks and guidance.
//!
//! Reelcast drives several external programs. This module reports which of
//! them are reachable for the configured backend before a job is attempted.

use std::path::Path;

use reelcast_common::config::{AppConfig, BackendConfig};
use serde::Serialize;

use crate::process::port_is_listening;

/// A host capability Reelcast may need.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

impl Capability {
    fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        available: bool,
        required: bool,
        fix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            available,
            required,
            fix_instructions: if available { None } else { Some(fix.into()) },
        }
    }
}

/// Check everything the configured pipeline depends on.
pub async fn check_capabilities(config: &AppConfig) -> Vec<Capability> {
    let mut capabilities = vec![check_ffmpeg(&config.post_process.ffmpeg)];

    match &config.backend {
        BackendConfig::Remote(remote) => {
            capabilities.push(check_recorder_port(&remote.host, remote.port).await);
        }
        BackendConfig::Headless(headless) => {
            capabilities.push(check_headless_program(&headless.program));
        }
    }

    capabilities.push(check_music_dir(&config.post_process.music_dir));
    capabilities.push(check_output_dir(&config.output_dir));
    capabilities.push(check_window_control());
    capabilities
}

/// Whether every required capability is available.
pub fn all_required_available(capabilities: &[Capability]) -> bool {
    capabilities.iter().all(|c| c.available || !c.required)
}

fn check_ffmpeg(binary: &str) -> Capability {
    Capability::new(
        "FFmpeg",
        format!("`{binary}` for trimming, padding and mixing music"),
        command_exists(binary),
        true,
        "Install FFmpeg and make sure it is on PATH (e.g. sudo apt install ffmpeg)",
    )
}

async fn check_recorder_port(host: &str, port: u16) -> Capability {
    let local = matches!(host, "localhost" | "127.0.0.1" | "::1");
    // Remote hosts cannot be probed cheaply; assume reachable and let connect fail.
    let available = !local || port_is_listening(port).await;
    Capability::new(
        "Recorder Control Socket",
        format!("Recording software websocket at {host}:{port}"),
        available,
        true,
        "Start OBS Studio and enable Tools > WebSocket Server Settings",
    )
}

fn check_headless_program(program: &str) -> Capability {
    Capability::new(
        "Headless Recorder",
        format!("`{program}` driving the headless browser recorder"),
        command_exists(program),
        true,
        format!("Install `{program}` and the browser automation package it runs"),
    )
}

fn check_music_dir(dir: &Path) -> Capability {
    Capability::new(
        "Music Library",
        format!("Background tracks in {}", dir.display()),
        dir.is_dir(),
        false,
        format!(
            "Create {} and add the configured tracks; reels render without music otherwise",
            dir.display()
        ),
    )
}

fn check_output_dir(dir: &Path) -> Capability {
    let writable = std::fs::create_dir_all(dir).is_ok()
        && std::fs::metadata(dir)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false);
    Capability::new(
        "Output Directory",
        format!("Final reels are written to {}", dir.display()),
        writable,
        true,
        "Set `output_dir` in the config to a writable directory",
    )
}

fn check_window_control() -> Capability {
    let (tool, available) = if cfg!(target_os = "windows") {
        ("taskkill", true)
    } else {
        ("wmctrl", command_exists("wmctrl"))
    };
    Capability::new(
        "Window Control",
        format!("`{tool}` to close leftover view windows by title"),
        available,
        false,
        format!("Install {tool}; cleanup falls back to process termination"),
    )
}

/// Whether `binary` resolves on PATH. A value with a directory part is
/// checked as a file path instead.
pub fn command_exists(binary: &str) -> bool {
    let path = Path::new(binary);
    if path.components().count() > 1 {
        return path.is_file();
    }
    which::which(binary).is_ok()
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Reelcast Environment Check:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}
