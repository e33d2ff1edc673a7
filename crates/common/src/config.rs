//! Application configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReelError, ReelResult};

/// Environment variable that overrides the remote recorder password.
pub const RECORDER_PASSWORD_ENV: &str = "REELCAST_RECORDER_PASSWORD";

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where raw and final videos are written.
    pub output_dir: PathBuf,

    /// Which capture backend to drive.
    pub backend: BackendConfig,

    /// Duration budget and synchronization delays.
    pub timing: TimingConfig,

    /// Capture geometry.
    pub capture: CaptureGeometry,

    /// Artifact search settings.
    pub locator: LocatorConfig,

    /// View provisioning settings.
    pub view: ViewConfig,

    /// Cleanup targets.
    pub cleanup: CleanupConfig,

    /// Post-processing settings.
    pub post_process: PostProcessConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Capture backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Long-lived desktop recorder driven over its control channel.
    Remote(RemoteRecorderConfig),
    /// Self-timed headless browser recording process.
    Headless(HeadlessRecorderConfig),
}

/// Connection and scene settings for the remote-controlled recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRecorderConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,

    /// Scene that holds the capture source.
    pub scene_name: String,

    /// Prefix for capture source names. A timestamp suffix makes each name unique.
    pub source_prefix: String,

    /// Wait after "stop recording" so the recorder can flush the file.
    pub settle_secs: f64,

    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

/// Invocation settings for the headless browser recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessRecorderConfig {
    /// Program to execute (e.g. `node`).
    pub program: String,

    /// Arguments placed before the `--html/--output/--duration/--width/--height` flags.
    pub args: Vec<String>,

    /// Added to the job duration to form the hard process timeout.
    pub overhead_secs: u64,
}

/// Fixed phases, pacing bounds and synchronization delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub intro_secs: f64,
    pub final_secs: f64,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,

    /// Time-based barrier between view provisioning and capture start.
    pub stabilization_secs: f64,

    /// Extra recording time beyond the job's target duration.
    pub safety_margin_secs: f64,
}

/// Capture resolution and frame rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Artifact Locator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Explicitly configured recorder output directory (searched first).
    pub output_dir: Option<PathBuf>,

    /// Only files modified within this window count as fresh.
    pub recency_window_secs: u64,

    /// Known video file extensions, lowercase, without the dot.
    pub extensions: Vec<String>,

    /// User-profile media directories.
    pub media_dirs: Vec<PathBuf>,

    /// Roots searched recursively for the recorder's settings file.
    pub settings_roots: Vec<PathBuf>,

    /// File name of the recorder's profile settings.
    pub settings_file_name: String,
}

/// View provisioning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// When set, views are served from this base URL instead of handed over as files.
    pub base_url: Option<String>,

    /// Optional window launcher. `{url}` and `{path}` are substituted in args.
    pub launcher: Option<LauncherConfig>,

    /// Title of the launched view window.
    pub window_title: String,

    /// Upper bound for the explicit readiness probe.
    pub readiness_timeout_secs: u64,
}

/// External program that opens the view in a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// An auxiliary local server the pipeline may need to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxServer {
    pub name: String,
    pub port: u16,
    /// Substring matched against the owning process command line.
    pub identity: String,
}

/// Cleanup Manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub servers: Vec<AuxServer>,

    /// Files in this directory whose names contain the job id are removed.
    pub temp_dir: Option<PathBuf>,

    /// Grace period between terminate and kill.
    pub termination_grace_secs: u64,
}

/// Post-processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    pub ffmpeg: String,

    /// Directory holding background tracks.
    pub music_dir: PathBuf,

    /// Music style to file name (relative to `music_dir`).
    pub tracks: BTreeMap<String, String>,

    pub default_music_style: String,
    pub music_volume: f64,
    pub video_codec_args: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelcast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_data_dir().join("out"),
            backend: BackendConfig::Remote(RemoteRecorderConfig::default()),
            timing: TimingConfig::default(),
            capture: CaptureGeometry::default(),
            locator: LocatorConfig::default(),
            view: ViewConfig::default(),
            cleanup: CleanupConfig::default(),
            post_process: PostProcessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RemoteRecorderConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
            password: None,
            scene_name: "Reelcast".to_string(),
            source_prefix: "reelcast-view".to_string(),
            settle_secs: 2.0,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
        }
    }
}

impl Default for HeadlessRecorderConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: vec!["scripts/record_playwright.js".to_string()],
            overhead_secs: 60,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            intro_secs: 5.0,
            final_secs: 8.0,
            min_delay_secs: 0.01,
            max_delay_secs: 0.5,
            stabilization_secs: 3.0,
            safety_margin_secs: 2.0,
        }
    }
}

impl Default for CaptureGeometry {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            output_dir: None,
            recency_window_secs: 300,
            extensions: ["mkv", "mp4", "mov", "flv", "webm", "ts", "m4v"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            media_dirs: vec![home.join("Videos"), home.join("Movies")],
            settings_roots: default_recorder_settings_roots(&home),
            settings_file_name: "basic.ini".to_string(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            launcher: None,
            window_title: "Reelcast Stream View".to_string(),
            readiness_timeout_secs: 10,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                AuxServer {
                    name: "view-server".to_string(),
                    port: 8765,
                    identity: "simple_server.py".to_string(),
                },
                AuxServer {
                    name: "music-server".to_string(),
                    port: 8766,
                    identity: "music_server.py".to_string(),
                },
            ],
            temp_dir: None,
            termination_grace_secs: 3,
        }
    }
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        let tracks = [
            ("tech/energetic", "tech-energy.mp3"),
            ("lofi/chill", "lofi-chill.mp3"),
            ("cinematic/epic", "cinematic-epic.mp3"),
        ]
        .into_iter()
        .map(|(style, file)| (style.to_string(), file.to_string()))
        .collect();

        Self {
            ffmpeg: "ffmpeg".to_string(),
            music_dir: default_data_dir().join("music"),
            tracks,
            default_music_style: "tech/energetic".to_string(),
            music_volume: 0.3,
            video_codec_args: ["-c:v", "libx264", "-preset", "fast", "-pix_fmt", "yuv420p"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        let mut config = Self::default();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(parsed) => config = parsed,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        config.apply_env_overrides();
        config
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], failures are errors.
    pub fn load_from(path: &Path) -> ReelResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReelError::config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let mut config: Self = serde_json::from_str(&content).map_err(|e| {
            ReelError::config(format!("Failed to parse config {}: {e}", path.display()))
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&config_path, json)?;
        Ok(config_path)
    }

    /// Check settings that would make every job fail.
    pub fn validate(&self) -> ReelResult<()> {
        let geometry = &self.capture;
        if geometry.width == 0 || geometry.height == 0 || geometry.fps == 0 {
            return Err(ReelError::config(format!(
                "Capture geometry must be positive (got {}x{}@{})",
                geometry.width, geometry.height, geometry.fps
            )));
        }

        let timing = &self.timing;
        if timing.intro_secs < 0.0 || timing.final_secs < 0.0 {
            return Err(ReelError::config(
                "intro_secs and final_secs must be non-negative",
            ));
        }
        if timing.min_delay_secs <= 0.0 || timing.min_delay_secs > timing.max_delay_secs {
            return Err(ReelError::config(format!(
                "Pacing delay range is invalid: [{}, {}]",
                timing.min_delay_secs, timing.max_delay_secs
            )));
        }
        if timing.stabilization_secs < 0.0 || timing.safety_margin_secs < 0.0 {
            return Err(ReelError::config(
                "stabilization_secs and safety_margin_secs must be non-negative",
            ));
        }

        match &self.backend {
            BackendConfig::Remote(remote) => {
                if remote.host.trim().is_empty() || remote.port == 0 {
                    return Err(ReelError::config(
                        "Remote recorder requires a host and a non-zero port",
                    ));
                }
                if remote.scene_name.trim().is_empty() || remote.source_prefix.trim().is_empty()
                {
                    return Err(ReelError::config(
                        "Remote recorder requires a scene name and a source prefix",
                    ));
                }
            }
            BackendConfig::Headless(headless) => {
                if headless.program.trim().is_empty() {
                    return Err(ReelError::config(
                        "Headless recorder requires a program to run",
                    ));
                }
            }
        }

        if self.locator.extensions.is_empty() {
            return Err(ReelError::config(
                "Locator needs at least one video extension",
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let BackendConfig::Remote(remote) = &mut self.backend {
            if let Ok(password) = std::env::var(RECORDER_PASSWORD_ENV) {
                remote.password = Some(password);
            }
        }
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("reelcast").join("config.json")
}

/// The current user's home directory.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Default data directory.
fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"));
    base.join("reelcast")
}

/// Where desktop recorders keep their profile settings on each platform.
fn default_recorder_settings_roots(home: &Path) -> Vec<PathBuf> {
    let mut roots = vec![home.join(".config").join("obs-studio")];
    if let Ok(appdata) = std::env::var("APPDATA") {
        roots.push(PathBuf::from(appdata).join("obs-studio"));
    }
    roots.push(
        home.join("Library")
            .join("Application Support")
            .join("obs-studio"),
    );
    roots
}
