//! Files produced by capture and post-processing.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use reelcast_common::error::{ReelError, ReelResult};
use serde::{Deserialize, Serialize};

/// A file identified by path, size and modification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

impl Artifact {
    /// Read an artifact's metadata from disk.
    pub fn from_path(path: impl AsRef<Path>) -> ReelResult<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ReelError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => ReelError::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(ReelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let modified = metadata.modified()?;
        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            modified_at: DateTime::<Utc>::from(modified),
        })
    }

    /// Build from already-read metadata.
    pub fn from_parts(path: PathBuf, size_bytes: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size_bytes,
            modified_at: DateTime::<Utc>::from(modified),
        }
    }

    /// Seconds since last modification, relative to `now`. Future timestamps count as zero.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        let age = now.signed_duration_since(self.modified_at);
        (age.num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }
}
