//! Post-processing: conform the raw recording to the exact target length and
//! mix in background music.
//!
//! The raw capture is rarely the exact length (pacing clamps, recorder
//! latency), so the video is padded by cloning its last frame and then cut at
//! exactly the target duration. Music loops under it, attenuated, with a
//! one-second fade-out at the end.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use reelcast_common::config::PostProcessConfig;
use reelcast_common::error::{ReelError, ReelResult};
use reelcast_job_model::{Artifact, MusicStyle};

const FADE_OUT_SECS: f64 = 1.0;
const AUDIO_BITRATE: &str = "192k";

/// Progress callback for long encodes.
pub type PostProgressCallback = Arc<dyn Fn(PostProcessProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,
    pub out_time_secs: f64,
}

/// A background track and the volume to mix it at.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicTrack {
    pub path: PathBuf,
    pub volume: f64,
}

#[derive(Debug, Clone)]
pub struct PostProcessJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub target_duration_secs: f64,
    pub music: Option<MusicTrack>,
}

/// Trait for post-processing backends.
#[async_trait::async_trait]
pub trait PostProcessor: Send + Sync {
    /// Produce the finished file at `job.output`.
    async fn process(&self, job: &PostProcessJob) -> ReelResult<Artifact>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// Map a music style to a track file. A missing mapping or file is a warning.
pub fn resolve_music(config: &PostProcessConfig, style: &MusicStyle) -> Option<MusicTrack> {
    let Some(file) = config.tracks.get(style.as_str()) else {
        tracing::warn!(style = %style, "No track configured for music style; continuing without music");
        return None;
    };

    let path = config.music_dir.join(file);
    if !path.is_file() {
        tracing::warn!(
            style = %style,
            path = %path.display(),
            "Music track not found; continuing without music"
        );
        return None;
    }

    Some(MusicTrack {
        path,
        volume: config.music_volume,
    })
}

/// ffmpeg-backed post-processor.
pub struct FfmpegPostProcessor {
    program: String,
    video_codec_args: Vec<String>,
    progress: Option<PostProgressCallback>,
}

impl FfmpegPostProcessor {
    pub fn new(config: &PostProcessConfig) -> Self {
        Self {
            program: config.ffmpeg.clone(),
            video_codec_args: config.video_codec_args.clone(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: PostProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[async_trait::async_trait]
impl PostProcessor for FfmpegPostProcessor {
    async fn process(&self, job: &PostProcessJob) -> ReelResult<Artifact> {
        if !job.input.is_file() {
            return Err(ReelError::post_process(format!(
                "raw recording {} does not exist",
                job.input.display()
            )));
        }
        if !(job.target_duration_secs.is_finite() && job.target_duration_secs > 0.0) {
            return Err(ReelError::post_process(format!(
                "invalid target duration {}",
                job.target_duration_secs
            )));
        }
        if let Some(parent) = job.output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReelError::post_process(format!(
                    "cannot create output directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let args = build_ffmpeg_args(job, &self.video_codec_args);
        let program = self.program.clone();
        let duration = job.target_duration_secs;
        let progress = self.progress.clone();

        tracing::info!(
            input = %job.input.display(),
            output = %job.output.display(),
            target_secs = duration,
            music = ?job.music.as_ref().map(|m| &m.path),
            "Starting post-processing"
        );

        tokio::task::spawn_blocking(move || run_ffmpeg(&program, &args, duration, progress))
            .await
            .map_err(|e| ReelError::post_process(format!("ffmpeg task failed: {e}")))??;

        Artifact::from_path(&job.output).map_err(|_| {
            ReelError::post_process(format!(
                "ffmpeg reported success but {} is missing",
                job.output.display()
            ))
        })
    }

    fn is_available(&self) -> bool {
        reelcast_platform::capabilities::command_exists(&self.program)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Full ffmpeg argument list for `job`.
pub fn build_ffmpeg_args(job: &PostProcessJob, video_codec_args: &[String]) -> Vec<String> {
    let t = format_secs(job.target_duration_secs);
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-nostats".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-i".into(),
        job.input.to_string_lossy().into_owned(),
    ];

    let video_filter =
        format!("[0:v]tpad=stop_mode=clone:stop_duration={t},trim=duration={t},setpts=PTS-STARTPTS[v]");

    match &job.music {
        Some(music) => {
            let fade_start = format_secs((job.target_duration_secs - FADE_OUT_SECS).max(0.0));
            args.extend([
                "-stream_loop".into(),
                "-1".into(),
                "-i".into(),
                music.path.to_string_lossy().into_owned(),
                "-filter_complex".into(),
                format!(
                    "{video_filter};[1:a]volume={:.2},afade=t=out:st={fade_start}:d={},atrim=duration={t}[a]",
                    music.volume,
                    format_secs(FADE_OUT_SECS)
                ),
                "-map".into(),
                "[v]".into(),
                "-map".into(),
                "[a]".into(),
            ]);
            args.extend(video_codec_args.iter().cloned());
            args.extend([
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                AUDIO_BITRATE.into(),
            ]);
        }
        None => {
            args.extend([
                "-filter_complex".into(),
                video_filter,
                "-map".into(),
                "[v]".into(),
                "-an".into(),
            ]);
            args.extend(video_codec_args.iter().cloned());
        }
    }

    args.extend([
        "-t".into(),
        t,
        "-movflags".into(),
        "+faststart".into(),
        job.output.to_string_lossy().into_owned(),
    ]);
    args
}

fn format_secs(secs: f64) -> String {
    let s = format!("{secs:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        // `out_time_ms` is in microseconds despite its name.
        if key == "out_time_ms" || key == "out_time_us" {
            if let Ok(us) = value.trim().parse::<f64>() {
                self.out_time_secs = us / 1_000_000.0;
            }
        }
    }
}

fn run_ffmpeg(
    program: &str,
    args: &[String],
    duration_secs: f64,
    progress: Option<PostProgressCallback>,
) -> ReelResult<()> {
    tracing::debug!(?args, "Running ffmpeg");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ReelError::post_process(format!("failed to start {program}: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ReelError::post_process("failed to capture ffmpeg stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ReelError::post_process("failed to capture ffmpeg stderr"))?;

    // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
    let stderr_task = std::thread::spawn(move || -> String {
        let mut output = String::new();
        match BufReader::new(stderr).read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    });

    let mut state = ProgressState::default();
    for line in BufReader::new(stdout).lines() {
        let line = line
            .map_err(|e| ReelError::post_process(format!("failed reading ffmpeg progress: {e}")))?;
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        state.update(key, value);
        if key == "progress" {
            if let Some(cb) = &progress {
                cb(PostProcessProgress {
                    progress: (state.out_time_secs / duration_secs).clamp(0.0, 1.0),
                    out_time_secs: state.out_time_secs,
                });
            }
        }
    }

    let status = child
        .wait()
        .map_err(|e| ReelError::post_process(format!("failed to wait on ffmpeg: {e}")))?;
    let stderr_output = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    if !status.success() {
        return Err(ReelError::post_process(format!(
            "ffmpeg failed (status {status}): {}",
            stderr_output.trim()
        )));
    }
    Ok(())
}

/// Default output path for a job's finished reel.
pub fn final_output_path(output_dir: &Path, file_stem: &str) -> PathBuf {
    output_dir.join(format!("{file_stem}.mp4"))
}
