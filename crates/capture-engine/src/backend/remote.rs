//! Remote-controlled desktop recorder.
//!
//! The recorder is a long-lived external application. `start` only asks it
//! to begin recording; the caller waits out the duration. Each job binds a
//! freshly named browser source to the view, after removing every source
//! this backend created earlier plus any stale ones carrying our prefix.

use std::path::{Path, PathBuf};

use chrono::Utc;
use reelcast_common::clock::secs_to_duration;
use reelcast_common::config::RemoteRecorderConfig;
use reelcast_common::error::{ReelError, ReelResult};
use reelcast_job_model::Artifact;
use serde_json::{json, Value};

use crate::backend::{BackendKind, CaptureBackend, CaptureRequest, CaptureStatus, CaptureTiming};
use crate::control::protocol::{request, RESOURCE_NOT_FOUND};
use crate::control::{RecorderControl, WebSocketRecorderClient};
use crate::session::{CaptureSession, SessionSlot};

const BACKEND: &str = "remote-recorder";

pub struct RemoteControlledRecorder {
    config: RemoteRecorderConfig,
    control: Box<dyn RecorderControl>,
    slot: SessionSlot,
    /// Sources created by this backend that have not been removed yet.
    owned_sources: Vec<String>,
    source_sequence: u32,
    record_directory: Option<PathBuf>,
}

impl RemoteControlledRecorder {
    /// Connect to the recorder described by `config`.
    pub async fn connect(config: RemoteRecorderConfig) -> ReelResult<Self> {
        let client = WebSocketRecorderClient::connect(&config).await?;
        Ok(Self::with_control(config, Box::new(client)))
    }

    /// Use an already-established control channel.
    pub fn with_control(config: RemoteRecorderConfig, control: Box<dyn RecorderControl>) -> Self {
        Self {
            config,
            control,
            slot: SessionSlot::new(),
            owned_sources: Vec::new(),
            source_sequence: 0,
            record_directory: None,
        }
    }

    /// Sources currently owned by this backend.
    pub fn owned_sources(&self) -> &[String] {
        &self.owned_sources
    }

    /// Whether the recorder reports an active recording output.
    pub async fn is_recording(&mut self) -> ReelResult<bool> {
        let status = self.control.request(request::GET_RECORD_STATUS, None).await?;
        Ok(status
            .get("outputActive")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// The recorder's configured output directory.
    pub async fn record_directory(&mut self) -> ReelResult<Option<PathBuf>> {
        let data = self
            .control
            .request(request::GET_RECORD_DIRECTORY, None)
            .await?;
        Ok(data
            .get("recordDirectory")
            .and_then(Value::as_str)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from))
    }

    /// Remove every owned source plus any stale source carrying our prefix.
    pub async fn clear_sources(&mut self) -> ReelResult<usize> {
        let items = self
            .control
            .request(
                request::GET_SCENE_ITEM_LIST,
                Some(json!({ "sceneName": self.config.scene_name })),
            )
            .await?;

        let mut doomed: Vec<String> = std::mem::take(&mut self.owned_sources);
        for name in scene_source_names(&items) {
            if name.starts_with(&self.config.source_prefix) && !doomed.contains(&name) {
                doomed.push(name);
            }
        }

        let mut removed = 0;
        for name in doomed {
            match self
                .control
                .request(request::REMOVE_INPUT, Some(json!({ "inputName": name })))
                .await
            {
                Ok(_) => {
                    tracing::debug!(source = %name, "Removed capture source");
                    removed += 1;
                }
                Err(e) if is_not_found(&e) => {}
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "Failed to remove capture source");
                }
            }
        }
        Ok(removed)
    }

    async fn ensure_scene(&mut self) -> ReelResult<()> {
        let scenes = self.control.request(request::GET_SCENE_LIST, None).await?;
        let exists = scenes
            .get("scenes")
            .and_then(Value::as_array)
            .map(|scenes| {
                scenes.iter().any(|scene| {
                    scene.get("sceneName").and_then(Value::as_str)
                        == Some(self.config.scene_name.as_str())
                })
            })
            .unwrap_or(false);

        if !exists {
            tracing::info!(scene = %self.config.scene_name, "Creating recorder scene");
            self.control
                .request(
                    request::CREATE_SCENE,
                    Some(json!({ "sceneName": self.config.scene_name })),
                )
                .await?;
        }

        self.control
            .request(
                request::SET_CURRENT_PROGRAM_SCENE,
                Some(json!({ "sceneName": self.config.scene_name })),
            )
            .await?;
        Ok(())
    }

    fn next_source_name(&mut self) -> String {
        self.source_sequence += 1;
        format!(
            "{}-{}-{}",
            self.config.source_prefix,
            Utc::now().timestamp_millis(),
            self.source_sequence
        )
    }

    async fn provision(&mut self, req: &CaptureRequest) -> ReelResult<()> {
        let geometry = req.geometry;
        self.control
            .request(
                request::SET_VIDEO_SETTINGS,
                Some(json!({
                    "baseWidth": geometry.width,
                    "baseHeight": geometry.height,
                    "outputWidth": geometry.width,
                    "outputHeight": geometry.height,
                    "fpsNumerator": geometry.fps,
                    "fpsDenominator": 1,
                })),
            )
            .await?;

        self.ensure_scene().await?;

        let removed = self.clear_sources().await?;
        if removed > 0 {
            tracing::info!(removed, "Cleared previous capture sources");
        }

        let source = self.next_source_name();
        self.control
            .request(
                request::CREATE_INPUT,
                Some(json!({
                    "sceneName": self.config.scene_name,
                    "inputName": source,
                    "inputKind": "browser_source",
                    "inputSettings": {
                        "url": req.view.to_url(),
                        "width": geometry.width,
                        "height": geometry.height,
                        "fps": geometry.fps,
                    },
                    "sceneItemEnabled": true,
                })),
            )
            .await?;
        tracing::info!(source = %source, view = %req.view, "Bound capture source to view");
        self.owned_sources.push(source);

        match self.record_directory().await {
            Ok(dir) => self.record_directory = dir,
            Err(e) => tracing::warn!(error = %e, "Could not read recorder output directory"),
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CaptureBackend for RemoteControlledRecorder {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteRecorder
    }

    fn timing(&self) -> CaptureTiming {
        CaptureTiming::CoordinatorWaits
    }

    async fn configure(&mut self, req: &CaptureRequest) -> ReelResult<()> {
        self.slot.ensure_idle()?;
        self.provision(req)
            .await
            .map_err(|e| e.into_capture_start(BACKEND))
    }

    async fn start(&mut self, req: &CaptureRequest) -> ReelResult<CaptureSession> {
        self.slot.ensure_idle()?;

        let already = self
            .is_recording()
            .await
            .map_err(|e| e.into_capture_start(BACKEND))?;
        if already {
            return Err(ReelError::capture_start(
                BACKEND,
                "recorder is already recording; refusing to start a second session",
            ));
        }

        self.control
            .request(request::START_RECORD, None)
            .await
            .map_err(|e| e.into_capture_start(BACKEND))?;

        let session = CaptureSession::new(BackendKind::RemoteRecorder, &req.job_id);
        self.slot.occupy(&session)?;
        tracing::info!(session = %session.id(), job_id = %req.job_id, "Recording started");
        Ok(session)
    }

    async fn stop(&mut self, session: &CaptureSession) -> ReelResult<Option<Artifact>> {
        self.slot.release(session)?;

        let response = self
            .control
            .request(request::STOP_RECORD, None)
            .await
            .map_err(|e| e.into_capture_stop(BACKEND))?;

        let settle = secs_to_duration(self.config.settle_secs);
        tracing::debug!(settle_secs = self.config.settle_secs, "Waiting for recorder to flush");
        tokio::time::sleep(settle).await;

        let reported = response
            .get("outputPath")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        tracing::info!(
            session = %session.id(),
            elapsed_secs = session.elapsed_secs(),
            output = ?reported,
            "Recording stopped"
        );
        Ok(reported.as_deref().and_then(existing_artifact))
    }

    async fn status(&mut self, _session: &CaptureSession) -> ReelResult<CaptureStatus> {
        let recording = self.is_recording().await?;
        Ok(if recording {
            CaptureStatus::Recording
        } else {
            CaptureStatus::Idle
        })
    }

    fn locator_hints(&self) -> Vec<PathBuf> {
        self.record_directory.iter().cloned().collect()
    }

    async fn abort(&mut self) -> ReelResult<()> {
        let stopped = match self.slot.clear() {
            Some(session) => {
                tracing::warn!(%session, "Aborting active recording");
                self.control
                    .request(request::STOP_RECORD, None)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.into_capture_stop(BACKEND))
            }
            None => Ok(()),
        };
        let closed = self.release().await;
        stopped.and(closed)
    }

    async fn release(&mut self) -> ReelResult<()> {
        tracing::debug!("Closing recorder control channel");
        self.control.close().await
    }
}

impl Drop for RemoteControlledRecorder {
    fn drop(&mut self) {
        if self.slot.is_active() {
            tracing::warn!("Remote recorder dropped while a session was still active");
        }
    }
}

fn scene_source_names(items: &Value) -> Vec<String> {
    items
        .get("sceneItems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("sourceName").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_not_found(error: &ReelError) -> bool {
    matches!(error, ReelError::Protocol { message } if message.contains(&format!("code {RESOURCE_NOT_FOUND}")))
}

fn existing_artifact(path: &Path) -> Option<Artifact> {
    match Artifact::from_path(path) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Reported recording path is unusable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use reelcast_common::config::CaptureGeometry;

    use super::*;
    use crate::backend::ViewTarget;

    type Log = Arc<Mutex<Vec<(String, Option<Value>)>>>;

    /// Replays canned responses per request type and records every call,
    /// including `close` as a request of type `"close"`.
    struct ScriptedRecorder {
        log: Log,
        responses: Vec<(&'static str, VecDeque<Result<Value, &'static str>>)>,
    }

    impl ScriptedRecorder {
        fn new(log: Log) -> Self {
            Self {
                log,
                responses: Vec::new(),
            }
        }

        fn respond(
            mut self,
            request_type: &'static str,
            response: Result<Value, &'static str>,
        ) -> Self {
            match self.responses.iter_mut().find(|(t, _)| *t == request_type) {
                Some((_, queue)) => queue.push_back(response),
                None => self
                    .responses
                    .push((request_type, VecDeque::from([response]))),
            }
            self
        }
    }

    #[async_trait::async_trait]
    impl RecorderControl for ScriptedRecorder {
        async fn request(&mut self, request_type: &str, data: Option<Value>) -> ReelResult<Value> {
            self.log
                .lock()
                .unwrap()
                .push((request_type.to_string(), data));
            // The last queued response repeats.
            let response = match self.responses.iter_mut().find(|(t, _)| *t == request_type) {
                Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some((_, queue)) => queue.front().cloned().unwrap(),
                None => Ok(Value::Null),
            };
            response.map_err(ReelError::protocol)
        }

        async fn close(&mut self) -> ReelResult<()> {
            self.log.lock().unwrap().push(("close".to_string(), None));
            Ok(())
        }
    }

    fn config() -> RemoteRecorderConfig {
        RemoteRecorderConfig {
            settle_secs: 2.0,
            ..RemoteRecorderConfig::default()
        }
    }

    fn capture_request(dir: &Path) -> CaptureRequest {
        CaptureRequest {
            job_id: "job-1".into(),
            view: ViewTarget::Url("http://localhost:8765/view.html".into()),
            duration_secs: 17.0,
            output_path: dir.join("raw.mkv"),
            geometry: CaptureGeometry::default(),
        }
    }

    fn calls(log: &Log, request_type: &str) -> Vec<Option<Value>> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == request_type)
            .map(|(_, d)| d.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_configure_clears_stale_sources_and_creates_unique_source() {
        let dir = tempfile::tempdir().unwrap();
        let log: Log = Default::default();
        let control = ScriptedRecorder::new(log.clone())
            .respond(
                request::GET_SCENE_LIST,
                Ok(json!({ "scenes": [{ "sceneName": "Reelcast" }] })),
            )
            .respond(
                request::GET_SCENE_ITEM_LIST,
                Ok(json!({ "sceneItems": [
                    { "sourceName": "reelcast-view-1700000000000-1" },
                    { "sourceName": "Webcam" }
                ]})),
            );
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));

        recorder.configure(&capture_request(dir.path())).await.unwrap();

        let removed = calls(&log, request::REMOVE_INPUT);
        assert_eq!(removed.len(), 1);
        assert_eq!(
            removed[0].as_ref().unwrap()["inputName"],
            "reelcast-view-1700000000000-1"
        );
        assert!(calls(&log, request::CREATE_SCENE).is_empty());

        let created = calls(&log, request::CREATE_INPUT);
        assert_eq!(created.len(), 1);
        let data = created[0].as_ref().unwrap();
        assert_eq!(data["inputKind"], "browser_source");
        assert_eq!(data["inputSettings"]["url"], "http://localhost:8765/view.html");
        assert_eq!(data["inputSettings"]["width"], 1080);
        assert_eq!(recorder.owned_sources().len(), 1);
    }

    #[tokio::test]
    async fn test_second_configure_removes_the_source_it_created() {
        let dir = tempfile::tempdir().unwrap();
        let log: Log = Default::default();
        let control = ScriptedRecorder::new(log.clone());
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));
        let req = capture_request(dir.path());

        recorder.configure(&req).await.unwrap();
        let first = recorder.owned_sources()[0].clone();
        recorder.configure(&req).await.unwrap();
        let second = recorder.owned_sources()[0].clone();

        assert_ne!(first, second);
        assert_eq!(recorder.owned_sources().len(), 1);
        let removed = calls(&log, request::REMOVE_INPUT);
        assert_eq!(removed[0].as_ref().unwrap()["inputName"], first.as_str());
        // Missing scene is created once per configure.
        assert_eq!(calls(&log, request::CREATE_SCENE).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_path_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let log: Log = Default::default();
        let control = ScriptedRecorder::new(log.clone())
            .respond(request::GET_RECORD_STATUS, Ok(json!({ "outputActive": false })))
            .respond(request::STOP_RECORD, Ok(json!({})));
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));

        let session = recorder.start(&capture_request(dir.path())).await.unwrap();
        let before = tokio::time::Instant::now();
        let artifact = recorder.stop(&session).await.unwrap();

        assert!(artifact.is_none());
        assert!(before.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_reported_path() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("2024-01-01 10-00-00.mkv");
        std::fs::write(&raw, b"video").unwrap();

        let control = ScriptedRecorder::new(Default::default())
            .respond(request::GET_RECORD_STATUS, Ok(json!({ "outputActive": false })))
            .respond(
                request::STOP_RECORD,
                Ok(json!({ "outputPath": raw.to_string_lossy() })),
            );
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));

        let session = recorder.start(&capture_request(dir.path())).await.unwrap();
        let artifact = recorder.stop(&session).await.unwrap().unwrap();
        assert_eq!(artifact.path, raw);
        assert_eq!(artifact.size_bytes, 5);
    }

    #[tokio::test]
    async fn test_start_twice_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let log: Log = Default::default();
        let control = ScriptedRecorder::new(log.clone())
            .respond(request::GET_RECORD_STATUS, Ok(json!({ "outputActive": false })));
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));
        let req = capture_request(dir.path());

        recorder.start(&req).await.unwrap();
        let err = recorder.start(&req).await.unwrap_err();
        assert!(matches!(err, ReelError::SessionActive { .. }));
        assert_eq!(calls(&log, request::START_RECORD).len(), 1);
    }

    #[tokio::test]
    async fn test_start_refuses_when_recorder_busy() {
        let dir = tempfile::tempdir().unwrap();
        let control = ScriptedRecorder::new(Default::default())
            .respond(request::GET_RECORD_STATUS, Ok(json!({ "outputActive": true })));
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));

        let err = recorder.start(&capture_request(dir.path())).await.unwrap_err();
        assert_eq!(err.kind(), "capture_start_error");
    }

    #[tokio::test]
    async fn test_start_failure_is_wrapped_with_backend() {
        let dir = tempfile::tempdir().unwrap();
        let control = ScriptedRecorder::new(Default::default())
            .respond(request::GET_RECORD_STATUS, Ok(json!({ "outputActive": false })))
            .respond(
                request::START_RECORD,
                Err("StartRecord failed with code 500: boom"),
            );
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));

        let err = recorder.start(&capture_request(dir.path())).await.unwrap_err();
        match err {
            ReelError::CaptureStart { backend, message } => {
                assert_eq!(backend, "remote-recorder");
                assert!(message.contains("StartRecord"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_abort_stops_recording_and_closes_channel() {
        let dir = tempfile::tempdir().unwrap();
        let log: Log = Default::default();
        let control = ScriptedRecorder::new(log.clone())
            .respond(request::GET_RECORD_STATUS, Ok(json!({ "outputActive": false })));
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));

        recorder.start(&capture_request(dir.path())).await.unwrap();
        recorder.abort().await.unwrap();

        let types: Vec<String> = log.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(
            types,
            vec![
                request::GET_RECORD_STATUS.to_string(),
                request::START_RECORD.to_string(),
                request::STOP_RECORD.to_string(),
                "close".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_abort_closes_channel_even_when_stop_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log: Log = Default::default();
        let control = ScriptedRecorder::new(log.clone())
            .respond(request::GET_RECORD_STATUS, Ok(json!({ "outputActive": false })))
            .respond(request::STOP_RECORD, Err("StopRecord failed with code 501: not active"));
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));

        recorder.start(&capture_request(dir.path())).await.unwrap();
        let err = recorder.abort().await.unwrap_err();

        assert_eq!(err.kind(), "capture_stop_error");
        assert_eq!(calls(&log, "close").len(), 1);
    }

    #[tokio::test]
    async fn test_release_closes_channel() {
        let log: Log = Default::default();
        let mut recorder =
            RemoteControlledRecorder::with_control(config(), Box::new(ScriptedRecorder::new(log.clone())));
        recorder.release().await.unwrap();
        assert_eq!(calls(&log, "close").len(), 1);
    }

    #[tokio::test]
    async fn test_record_directory_becomes_locator_hint() {
        let dir = tempfile::tempdir().unwrap();
        let control = ScriptedRecorder::new(Default::default()).respond(
            request::GET_RECORD_DIRECTORY,
            Ok(json!({ "recordDirectory": "/home/user/Videos/obs" })),
        );
        let mut recorder = RemoteControlledRecorder::with_control(config(), Box::new(control));
        recorder.configure(&capture_request(dir.path())).await.unwrap();
        assert_eq!(
            recorder.locator_hints(),
            vec![PathBuf::from("/home/user/Videos/obs")]
        );
    }
}
