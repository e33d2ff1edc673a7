//! Job requests and validated jobs.

use std::fmt;
use std::path::PathBuf;

use reelcast_common::error::{ReelError, ReelResult};
use serde::{Deserialize, Serialize};

/// Music style used when a request does not name one.
pub const DEFAULT_MUSIC_STYLE: &str = "tech/energetic";

/// A job as submitted by a caller. Optional fields get defaults on acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_id: String,
    pub content_source_path: PathBuf,
    pub title: String,
    #[serde(default)]
    pub intro_title: Option<String>,
    #[serde(default)]
    pub music_style: Option<String>,
    pub target_duration_seconds: u32,
}

/// Selects a background audio track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MusicStyle(String);

impl MusicStyle {
    pub fn new(style: impl Into<String>) -> Self {
        Self(style.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MusicStyle {
    fn default() -> Self {
        Self(DEFAULT_MUSIC_STYLE.to_string())
    }
}

impl fmt::Display for MusicStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One accepted recording request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    id: String,
    content_source_path: PathBuf,
    title: String,
    intro_title: String,
    music_style: MusicStyle,
    target_duration_seconds: u32,
}

impl Job {
    /// Validate a request and fill in defaults.
    ///
    /// `introTitle` defaults to the title, `musicStyle` to `default_style`.
    pub fn accept(request: JobRequest, default_style: &str) -> ReelResult<Self> {
        let id = request.job_id.trim().to_string();
        if id.is_empty() {
            return Err(ReelError::invalid_job("job id must not be empty"));
        }
        if id.contains(['/', '\\']) {
            return Err(ReelError::invalid_job(format!(
                "job id {id:?} must not contain path separators"
            )));
        }
        if request.target_duration_seconds == 0 {
            return Err(ReelError::invalid_job(
                "targetDurationSeconds must be a positive integer",
            ));
        }
        if request.title.trim().is_empty() {
            return Err(ReelError::invalid_job("title must not be empty"));
        }

        let intro_title = request
            .intro_title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| request.title.clone());
        let music_style = request
            .music_style
            .filter(|s| !s.trim().is_empty())
            .map(MusicStyle::new)
            .unwrap_or_else(|| MusicStyle::new(default_style));

        Ok(Self {
            id,
            content_source_path: request.content_source_path,
            title: request.title,
            intro_title,
            music_style,
            target_duration_seconds: request.target_duration_seconds,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content_source_path(&self) -> &PathBuf {
        &self.content_source_path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn intro_title(&self) -> &str {
        &self.intro_title
    }

    pub fn music_style(&self) -> &MusicStyle {
        &self.music_style
    }

    pub fn target_duration_seconds(&self) -> u32 {
        self.target_duration_seconds
    }

    /// File name stem used for every artifact this job produces.
    pub fn file_stem(&self) -> String {
        file_stem_for(&self.id)
    }
}

/// File name stem for the job with id `job_id`.
pub fn file_stem_for(job_id: &str) -> String {
    format!("job-{job_id}")
}

/// Whether `file_name` was produced for the job with stem `stem`: the stem
/// itself or the stem followed by an extension. Job ids may contain `-`, so
/// `job-1-x` is left to job `1-x`.
pub fn belongs_to_stem(file_name: &str, stem: &str) -> bool {
    match file_name.strip_prefix(stem) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}
