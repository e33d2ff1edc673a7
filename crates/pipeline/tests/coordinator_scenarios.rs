use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use reelcast_capture_engine::{
    BackendKind, CaptureBackend, CaptureRequest, CaptureSession, CaptureStatus, CaptureTiming,
    ViewTarget,
};
use reelcast_common::config::{AppConfig, AuxServer};
use reelcast_common::error::{ReelError, ReelResult};
use reelcast_job_model::{Artifact, Job, JobRequest, PipelineState};
use reelcast_pipeline::{
    CleanupManager, Phase, PhaseReport, PhaseStatus, PipelineCoordinator, PostProcessJob,
    PostProcessor, ViewHandle, ViewProvisioner, WindowHandle,
};
use reelcast_platform::{ProcessControl, TerminateOutcome};
use reelcast_timing::DurationBudget;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum StopBehavior {
    /// Write the raw file where asked and report it.
    Report,
    /// Succeed without a path.
    NoPath,
    /// Report a zero-byte file.
    Empty,
    Fail,
}

type CallLog = Arc<Mutex<Vec<&'static str>>>;

struct FakeBackend {
    timing: CaptureTiming,
    stop: StopBehavior,
    log: CallLog,
    output_path: Option<PathBuf>,
}

impl FakeBackend {
    fn new(timing: CaptureTiming, stop: StopBehavior, log: CallLog) -> Self {
        Self {
            timing,
            stop,
            log,
            output_path: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteRecorder
    }

    fn timing(&self) -> CaptureTiming {
        self.timing
    }

    async fn configure(&mut self, _request: &CaptureRequest) -> ReelResult<()> {
        self.log.lock().unwrap().push("configure");
        Ok(())
    }

    async fn start(&mut self, request: &CaptureRequest) -> ReelResult<CaptureSession> {
        self.log.lock().unwrap().push("start");
        self.output_path = Some(request.output_path.clone());
        Ok(CaptureSession::new(self.kind(), &request.job_id))
    }

    async fn stop(&mut self, _session: &CaptureSession) -> ReelResult<Option<Artifact>> {
        self.log.lock().unwrap().push("stop");
        match self.stop {
            StopBehavior::Report => {
                let path = self.output_path.clone().unwrap();
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(&path, b"raw frames").unwrap();
                Ok(Some(Artifact::from_path(&path)?))
            }
            StopBehavior::NoPath => Ok(None),
            StopBehavior::Empty => {
                let path = self.output_path.clone().unwrap();
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                File::create(&path).unwrap();
                Ok(Some(Artifact::from_path(&path)?))
            }
            StopBehavior::Fail => Err(ReelError::capture_stop(
                "remote-recorder",
                "control connection closed",
            )),
        }
    }

    async fn status(&mut self, _session: &CaptureSession) -> ReelResult<CaptureStatus> {
        Ok(CaptureStatus::Idle)
    }

    async fn abort(&mut self) -> ReelResult<()> {
        self.log.lock().unwrap().push("abort");
        Ok(())
    }

    async fn release(&mut self) -> ReelResult<()> {
        self.log.lock().unwrap().push("release");
        Ok(())
    }
}

struct FakeView {
    fail: bool,
}

#[async_trait::async_trait]
impl ViewProvisioner for FakeView {
    async fn prepare(&self, job: &Job, _budget: &DurationBudget) -> ReelResult<ViewHandle> {
        if self.fail {
            return Err(ReelError::view("view server refused the page"));
        }
        Ok(ViewHandle {
            target: ViewTarget::File(job.content_source_path().clone()),
            window: Some(WindowHandle {
                pid: Some(31337),
                title: "Reelcast View".into(),
            }),
            temp_files: Vec::new(),
        })
    }
}

/// Copies the raw input to the output, or fails.
struct FakePost {
    fail: bool,
    seen: Arc<Mutex<Vec<PostProcessJob>>>,
}

#[async_trait::async_trait]
impl PostProcessor for FakePost {
    async fn process(&self, job: &PostProcessJob) -> ReelResult<Artifact> {
        self.seen.lock().unwrap().push(job.clone());
        if self.fail {
            return Err(ReelError::post_process("ffmpeg exited with status 1"));
        }
        std::fs::create_dir_all(job.output.parent().unwrap())?;
        std::fs::copy(&job.input, &job.output)?;
        Artifact::from_path(&job.output)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
struct CountingControl {
    window_closes: AtomicUsize,
    fail_identity: bool,
}

#[async_trait::async_trait]
impl ProcessControl for CountingControl {
    async fn terminate_pid(&self, _pid: u32, _grace: Duration) -> ReelResult<TerminateOutcome> {
        self.window_closes.fetch_add(1, Ordering::SeqCst);
        Ok(TerminateOutcome::Graceful)
    }

    async fn terminate_by_title(&self, _title: &str) -> ReelResult<usize> {
        Ok(0)
    }

    async fn is_port_listening(&self, _port: u16) -> bool {
        true
    }

    async fn find_and_stop_by_identity(&self, identity: &str, _grace: Duration) -> ReelResult<usize> {
        if self.fail_identity {
            Err(ReelError::platform(format!("cannot inspect processes for {identity}")))
        } else {
            Ok(1)
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture {
    dir: tempfile::TempDir,
    config: AppConfig,
    control: Arc<CountingControl>,
    log: CallLog,
    post_jobs: Arc<Mutex<Vec<PostProcessJob>>>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_control(CountingControl::default())
    }

    fn with_control(control: CountingControl) -> Self {
        reelcast_common::logging::init_default_logging();
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.output_dir = dir.path().join("out");
        config.timing.stabilization_secs = 0.0;
        config.cleanup.temp_dir = Some(dir.path().join("tmp"));
        config.cleanup.servers = Vec::new();
        config.locator.output_dir = None;
        config.locator.media_dirs = Vec::new();
        config.locator.settings_roots = Vec::new();
        config.post_process.music_dir = dir.path().join("music");

        let content = "<p>".to_string() + &"x".repeat(193) + "</p>";
        std::fs::write(dir.path().join("content.html"), content).unwrap();

        Self {
            dir,
            config,
            control: Arc::new(control),
            log: Arc::new(Mutex::new(Vec::new())),
            post_jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn job(&self) -> Job {
        Job::accept(
            JobRequest {
                job_id: "scenario".into(),
                content_source_path: self.dir.path().join("content.html"),
                title: "Ownership in five lines".into(),
                intro_title: None,
                music_style: None,
                target_duration_seconds: 17,
            },
            "tech/energetic",
        )
        .unwrap()
    }

    fn coordinator(
        &self,
        backend: Box<dyn CaptureBackend>,
        view_fails: bool,
        post_fails: bool,
    ) -> PipelineCoordinator {
        let cleanup = CleanupManager::from_config(self.control.clone(), &self.config.cleanup);
        PipelineCoordinator::new(
            self.config.clone(),
            backend,
            Box::new(FakeView { fail: view_fails }),
            Box::new(FakePost {
                fail: post_fails,
                seen: self.post_jobs.clone(),
            }),
            cleanup,
        )
    }

    fn fake_backend(&self, timing: CaptureTiming, stop: StopBehavior) -> Box<dyn CaptureBackend> {
        Box::new(FakeBackend::new(timing, stop, self.log.clone()))
    }

    fn calls(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }

    fn cleanup_runs(&self) -> usize {
        self.control.window_closes.load(Ordering::SeqCst)
    }
}

fn touch(path: &Path, age: Duration) {
    std::fs::write(path, b"frames").unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn missing_stop_path_falls_back_to_locator() {
    let mut fixture = Fixture::new();
    let media_a = fixture.dir.path().join("Videos");
    let media_b = fixture.dir.path().join("Movies");
    std::fs::create_dir_all(&media_a).unwrap();
    std::fs::create_dir_all(&media_b).unwrap();
    std::fs::write(media_a.join("notes.txt"), b"not a video").unwrap();
    let recording = media_b.join("2026-10-16 10-00-00.mkv");
    touch(&recording, Duration::from_secs(5));
    fixture.config.locator.media_dirs = vec![media_a, media_b];

    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = phases.clone();
    let mut coordinator = fixture
        .coordinator(
            fixture.fake_backend(CaptureTiming::CoordinatorWaits, StopBehavior::NoPath),
            false,
            false,
        )
        .with_progress(Box::new(move |report: &PhaseReport| {
            if report.status == PhaseStatus::Completed {
                sink.lock().unwrap().push(report.phase);
            }
        }));

    let outcome = coordinator.run(&fixture.job()).await;

    assert!(outcome.is_success(), "unexpected failure: {:?}", outcome.error);
    assert_eq!(outcome.state, PipelineState::CleanedUp);
    assert_eq!(outcome.raw_artifact.unwrap().path, recording);
    assert!(outcome
        .transitions
        .iter()
        .any(|t| t.to == PipelineState::PostProcessed));
    assert_eq!(
        outcome.final_artifact.unwrap().path,
        fixture.config.output_dir.join("job-scenario.mp4")
    );

    // Budget from the worked example: 17 - 5 - 8 = 4s over 200 units.
    let budget = outcome.budget.unwrap();
    assert_eq!(budget.content_secs, 4.0);
    assert_eq!(budget.content_units, 200);
    assert!((budget.per_unit_delay_secs - 0.02).abs() < 1e-12);

    // The located file belongs to the recorder, not to the job.
    assert!(recording.exists());
    assert_eq!(fixture.cleanup_runs(), 1);
    assert_eq!(fixture.calls(), vec!["configure", "start", "stop", "release"]);
    assert_eq!(
        *phases.lock().unwrap(),
        vec![
            Phase::Budget,
            Phase::PrepareView,
            Phase::Stabilize,
            Phase::StartCapture,
            Phase::Record,
            Phase::StopCapture,
            Phase::Locate,
            Phase::PostProcess,
            Phase::Cleanup,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn coordinator_waits_target_plus_margin() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator(
        fixture.fake_backend(CaptureTiming::CoordinatorWaits, StopBehavior::Report),
        false,
        false,
    );

    let started = tokio::time::Instant::now();
    let outcome = coordinator.run(&fixture.job()).await;

    assert!(outcome.is_success());
    let waited = started.elapsed();
    let expected = Duration::from_secs_f64(17.0 + fixture.config.timing.safety_margin_secs);
    assert!(waited >= expected, "waited only {waited:?}");

    // Our own raw recording is removed once the final video exists.
    let raw = outcome.raw_artifact.unwrap().path;
    assert!(!raw.exists());
    assert!(outcome.final_artifact.unwrap().path.exists());
}

#[tokio::test(start_paused = true)]
async fn self_timed_backend_skips_the_wait() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator(
        fixture.fake_backend(CaptureTiming::SelfTimed, StopBehavior::Report),
        false,
        false,
    );

    let started = tokio::time::Instant::now();
    let outcome = coordinator.run(&fixture.job()).await;

    assert!(outcome.is_success());
    assert!(started.elapsed() < Duration::from_secs(1));
    let record = outcome
        .phases
        .iter()
        .find(|p| p.phase == Phase::Record && p.status != PhaseStatus::Started)
        .unwrap();
    assert_eq!(record.status, PhaseStatus::Skipped);
}

#[tokio::test]
async fn view_failure_still_runs_cleanup() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator(
        fixture.fake_backend(CaptureTiming::CoordinatorWaits, StopBehavior::Report),
        true,
        false,
    );

    let outcome = coordinator.run(&fixture.job()).await;

    assert_eq!(outcome.state, PipelineState::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, "view_provisioning_error");
    assert_eq!(error.phase, Phase::PrepareView);
    assert_eq!(fixture.calls(), vec!["release"]);
    assert!(outcome
        .phases
        .iter()
        .any(|p| p.phase == Phase::Cleanup && p.status == PhaseStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn stop_error_is_not_masked_by_cleanup_warnings() {
    let mut fixture = Fixture::with_control(CountingControl {
        fail_identity: true,
        ..Default::default()
    });
    fixture.config.cleanup.servers = vec![AuxServer {
        name: "view server".into(),
        port: 8765,
        identity: "simple_server.py".into(),
    }];
    let mut coordinator = fixture.coordinator(
        fixture.fake_backend(CaptureTiming::CoordinatorWaits, StopBehavior::Fail),
        false,
        false,
    );

    let outcome = coordinator.run(&fixture.job()).await;

    assert_eq!(outcome.state, PipelineState::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, "capture_stop_error");
    assert!(error.message.contains("control connection closed"));
    assert_eq!(outcome.cleanup_warnings.len(), 1);
    assert_eq!(outcome.cleanup_warnings[0].step, "servers");
    assert_eq!(fixture.calls(), vec!["configure", "start", "stop", "abort", "release"]);
    assert_eq!(fixture.cleanup_runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_recordings_are_not_found() {
    let mut fixture = Fixture::new();
    let media = fixture.dir.path().join("Videos");
    std::fs::create_dir_all(&media).unwrap();
    touch(&media.join("yesterday.mp4"), Duration::from_secs(86_400));
    fixture.config.locator.media_dirs = vec![media.clone()];

    let mut coordinator = fixture.coordinator(
        fixture.fake_backend(CaptureTiming::CoordinatorWaits, StopBehavior::NoPath),
        false,
        false,
    );
    let outcome = coordinator.run(&fixture.job()).await;

    assert_eq!(outcome.state, PipelineState::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, "artifact_not_found_error");
    assert_eq!(error.phase, Phase::Locate);
    assert!(fixture.post_jobs.lock().unwrap().is_empty());
    assert_eq!(fixture.cleanup_runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_recording_is_rejected_before_post_processing() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator(
        fixture.fake_backend(CaptureTiming::CoordinatorWaits, StopBehavior::Empty),
        false,
        false,
    );

    let outcome = coordinator.run(&fixture.job()).await;

    assert_eq!(outcome.state, PipelineState::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, "capture_stop_error");
    assert_eq!(error.phase, Phase::Locate);
    assert!(error.message.contains("empty"));
    assert!(fixture.post_jobs.lock().unwrap().is_empty());
    assert_eq!(fixture.calls(), vec!["configure", "start", "stop", "release"]);
}

#[tokio::test(start_paused = true)]
async fn post_process_failure_keeps_the_raw_recording() {
    let fixture = Fixture::new();
    let mut coordinator = fixture.coordinator(
        fixture.fake_backend(CaptureTiming::CoordinatorWaits, StopBehavior::Report),
        false,
        true,
    );

    let outcome = coordinator.run(&fixture.job()).await;

    assert_eq!(outcome.state, PipelineState::Failed);
    assert_eq!(outcome.error.unwrap().kind, "post_process_error");
    let raw = outcome.raw_artifact.unwrap().path;
    assert!(raw.exists());

    let jobs = fixture.post_jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].target_duration_secs, 17.0);
    // No track file exists under the fixture's music dir.
    assert!(jobs[0].music.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn headless_timeout_fails_the_job_and_cleans_up() {
    use reelcast_capture_engine::HeadlessBrowserRecorder;
    use reelcast_common::config::HeadlessRecorderConfig;

    let mut fixture = Fixture::new();
    fixture.config.timing.intro_secs = 0.0;
    fixture.config.timing.final_secs = 0.5;

    let recorder = HeadlessBrowserRecorder::new(HeadlessRecorderConfig {
        program: "sh".into(),
        args: vec!["-c".into(), "sleep 30".into(), "recorder".into()],
        overhead_secs: 1,
    });
    let mut coordinator = fixture.coordinator(Box::new(recorder), false, false);

    let job = Job::accept(
        JobRequest {
            job_id: "hang".into(),
            content_source_path: fixture.dir.path().join("content.html"),
            title: "Hangs forever".into(),
            intro_title: None,
            music_style: None,
            target_duration_seconds: 1,
        },
        "tech/energetic",
    )
    .unwrap();

    let started = std::time::Instant::now();
    let outcome = coordinator.run(&job).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome.state, PipelineState::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, "capture_stop_error");
    assert!(error.message.contains("timed out"));
    assert_eq!(fixture.cleanup_runs(), 1);
}
