//! Logging and tracing initialization.

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. An invalid level falls
/// back to `info`. Returns `false` if a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = build_filter(&config.level);
    let writer = match config.file.as_deref() {
        Some(path) => file_writer(path),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().with_current_span(false).finish())
    } else {
        tracing::subscriber::set_global_default(
            builder
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .finish(),
        )
    };
    installed.is_ok()
}

/// Initialize logging with defaults (useful for tests and quick scripts).
pub fn init_default_logging() -> bool {
    init_logging(&LoggingConfig::default())
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level {level:?}; using info");
            EnvFilter::new("info")
        })
}

/// Append to `path`, creating its directory. Falls back to stderr.
fn file_writer(path: &Path) -> BoxMakeWriter {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {e}", parent.display());
        }
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}", path.display());
            BoxMakeWriter::new(std::io::stderr)
        }
    }
}
