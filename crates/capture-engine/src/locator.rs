//! Artifact Locator.
//!
//! Finds the raw recording when the backend could not say where it went.
//! Candidate directories are searched in priority order, but the result is
//! always the globally most recent match inside the recency window. Earlier
//! candidates only win exact mtime ties.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use reelcast_common::config::LocatorConfig;
use reelcast_job_model::Artifact;

/// How deep to descend when looking for the recorder's settings file.
const SETTINGS_SEARCH_DEPTH: usize = 4;

/// Settings keys that hold a recording directory, per section.
const OUTPUT_KEYS: &[(&str, &str)] = &[
    ("SimpleOutput", "FilePath"),
    ("AdvOut", "RecFilePath"),
    ("AdvOut", "FFFilePath"),
];

#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    candidates: Vec<PathBuf>,
    extensions: Vec<String>,
    recency_window: Duration,
}

impl ArtifactLocator {
    pub fn new(candidates: Vec<PathBuf>, extensions: Vec<String>, recency_window: Duration) -> Self {
        Self {
            candidates: dedup_paths(candidates),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            recency_window,
        }
    }

    /// Candidates in priority order: explicit output dir, media dirs,
    /// recorder settings hints, then backend-supplied hints.
    pub fn from_config(config: &LocatorConfig, backend_hints: &[PathBuf]) -> Self {
        let mut candidates = Vec::new();
        candidates.extend(config.output_dir.iter().cloned());
        candidates.extend(config.media_dirs.iter().cloned());
        candidates.extend(settings_output_hints(
            &config.settings_roots,
            &config.settings_file_name,
        ));
        candidates.extend(backend_hints.iter().cloned());

        Self::new(
            candidates,
            config.extensions.clone(),
            Duration::from_secs(config.recency_window_secs),
        )
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn locate(&self) -> Option<Artifact> {
        self.locate_at(SystemTime::now())
    }

    /// Most recently modified matching file across all candidates, as of `now`.
    pub fn locate_at(&self, now: SystemTime) -> Option<Artifact> {
        let mut best: Option<Artifact> = None;

        for dir in &self.candidates {
            for artifact in self.scan_dir(dir, now) {
                let newer = best
                    .as_ref()
                    .map(|b| artifact.modified_at > b.modified_at)
                    .unwrap_or(true);
                if newer {
                    best = Some(artifact);
                }
            }
        }

        match &best {
            Some(found) => tracing::info!(
                path = %found.path.display(),
                size_bytes = found.size_bytes,
                "Located recording"
            ),
            None => tracing::warn!(
                searched = self.candidates.len(),
                window_secs = self.recency_window.as_secs(),
                "No recent recording found"
            ),
        }
        best
    }

    fn scan_dir(&self, dir: &Path, now: SystemTime) -> Vec<Artifact> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Skipping candidate directory");
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| self.has_video_extension(&entry.path()))
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                let modified = metadata.modified().ok()?;
                if !self.is_recent(modified, now) {
                    return None;
                }
                Some(Artifact::from_parts(entry.path(), metadata.len(), modified))
            })
            .collect()
    }

    fn has_video_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|known| *known == e)
            })
            .unwrap_or(false)
    }

    /// Within the window, or modified in the future (clock skew).
    fn is_recent(&self, modified: SystemTime, now: SystemTime) -> bool {
        match now.duration_since(modified) {
            Ok(age) => age <= self.recency_window,
            Err(_) => true,
        }
    }
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Output directories named in every settings file under `roots`.
pub fn settings_output_hints(roots: &[PathBuf], file_name: &str) -> Vec<PathBuf> {
    let mut hints = Vec::new();
    for root in roots {
        let mut files = Vec::new();
        find_files_named(root, file_name, SETTINGS_SEARCH_DEPTH, &mut files);
        for file in files {
            match std::fs::read_to_string(&file) {
                Ok(contents) => {
                    let parsed = parse_output_hints(&contents);
                    tracing::debug!(file = %file.display(), hints = parsed.len(), "Parsed recorder settings");
                    hints.extend(parsed);
                }
                Err(e) => {
                    tracing::debug!(file = %file.display(), error = %e, "Unreadable settings file");
                }
            }
        }
    }
    hints
}

fn find_files_named(dir: &Path, name: &str, depth: usize, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut subdirs = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        match entry.file_type() {
            Ok(ft) if ft.is_file() && entry.file_name() == name => out.push(path),
            Ok(ft) if ft.is_dir() => subdirs.push(path),
            _ => {}
        }
    }
    if depth == 0 {
        return;
    }
    subdirs.sort();
    for sub in subdirs {
        find_files_named(&sub, name, depth - 1, out);
    }
}

/// Pull recording directories out of an ini-style settings file.
pub fn parse_output_hints(contents: &str) -> Vec<PathBuf> {
    let mut section = "";
    let mut hints = Vec::new();

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim().trim_matches('"'));
        if value.is_empty() {
            continue;
        }
        if OUTPUT_KEYS.iter().any(|(s, k)| *s == section && *k == key) {
            let path = PathBuf::from(value);
            if !hints.contains(&path) {
                hints.push(path);
            }
        }
    }
    hints
}
