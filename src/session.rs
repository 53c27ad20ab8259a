//! Scan session: one mount of the scanning view.
//!
//! Lifecycle: `Idle → Acquiring → Streaming → Destroyed`, with `Faulted`
//! when the camera could not be acquired. The session owns the stream, the
//! decode loop and the submission gate exclusively; nothing outlives it.
//!
//! Validation calls run on a short-lived worker thread and report back over
//! a channel, so frames keep flowing (and are dropped by the gate) while a
//! call is in flight. Teardown drops the receiving end: a call that finishes
//! afterwards is discarded without touching the sink or the navigator.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::{CameraDevice, CameraRequest, MediaStream};
use crate::config::ScannerConfig;
use crate::decode::{DecodeAttempt, DecodeLoop, DecodeStats, QrDecoder};
use crate::error::{CameraError, ValidationError};
use crate::gate::SubmissionGate;
use crate::outcome::{report_outcome, Destination, Navigator, OutcomeSink};
use crate::token::ScanToken;
use crate::validate::{AttendanceResponse, ValidationResult, Validator};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Streaming,
    /// Camera acquisition failed; only teardown remains.
    Faulted,
    Destroyed,
}

/// Collaborators a session is mounted with.
pub struct SessionCapabilities {
    pub camera: Box<dyn CameraDevice>,
    pub decoder: Box<dyn QrDecoder>,
    pub validator: Arc<dyn Validator>,
    pub sink: Box<dyn OutcomeSink>,
    pub navigator: Box<dyn Navigator>,
}

/// What one `step` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// A frame was analysed and held no code.
    NoCode,
    /// A code was decoded and a validation call started.
    Submitted,
    /// A code was decoded while the gate was closed.
    Dropped,
    /// An in-flight validation finished and its outcome was reported.
    Completed { success: bool },
    /// The video stream ended.
    StreamEnded,
    /// The session is not streaming.
    Inactive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub submitted: u64,
    pub dropped: u64,
    pub succeeded: u64,
    pub failed: u64,
}

struct Completion {
    result: Result<AttendanceResponse, ValidationError>,
    completed_at: Instant,
}

pub struct ScanSession {
    state: SessionState,
    camera: Box<dyn CameraDevice>,
    request: CameraRequest,
    stream: Option<MediaStream>,
    decode_loop: DecodeLoop,
    gate: SubmissionGate,
    validator: Arc<dyn Validator>,
    sink: Box<dyn OutcomeSink>,
    navigator: Box<dyn Navigator>,
    destination: Destination,
    camera_error: Option<CameraError>,
    pending: Option<Receiver<Completion>>,
    navigated: bool,
    stats: SessionStats,
}

impl ScanSession {
    pub fn new(config: &ScannerConfig, capabilities: SessionCapabilities) -> Self {
        Self {
            state: SessionState::Idle,
            camera: capabilities.camera,
            request: CameraRequest::from(&config.camera),
            stream: None,
            decode_loop: DecodeLoop::new(capabilities.decoder),
            gate: SubmissionGate::new(config.cooldown),
            validator: capabilities.validator,
            sink: capabilities.sink,
            navigator: capabilities.navigator,
            destination: config.success_destination.clone(),
            camera_error: None,
            pending: None,
            navigated: false,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn camera_error(&self) -> Option<&CameraError> {
        self.camera_error.as_ref()
    }

    /// Message to show in place of the video, if acquisition failed.
    pub fn camera_error_message(&self) -> Option<&'static str> {
        self.camera_error.as_ref().map(CameraError::user_message)
    }

    pub fn gate(&self) -> &SubmissionGate {
        &self.gate
    }

    pub fn is_submitting(&self) -> bool {
        self.gate.is_in_flight()
    }

    pub fn has_navigated(&self) -> bool {
        self.navigated
    }

    pub fn is_decoding(&self) -> bool {
        self.decode_loop.is_running()
    }

    pub fn decode_stats(&self) -> DecodeStats {
        self.decode_loop.stats()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            dropped: self.gate.dropped(),
            ..self.stats
        }
    }

    pub fn live_track_count(&self) -> usize {
        self.stream
            .as_ref()
            .map(MediaStream::live_track_count)
            .unwrap_or(0)
    }

    /// Acquire the camera and start decoding.
    ///
    /// A camera failure is recorded (see `camera_error`), moves the session
    /// to `Faulted` and is also returned. There is no automatic retry.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle | SessionState::Streaming => {}
            SessionState::Acquiring => return Err(anyhow!("session is already acquiring")),
            SessionState::Faulted => {
                return Err(anyhow!("camera failed for this session; remount to retry"))
            }
            SessionState::Destroyed => return Err(anyhow!("session has been torn down")),
        }

        self.state = SessionState::Acquiring;
        if let Some(mut previous) = self.stream.take() {
            let stopped = previous.stop_all();
            log::warn!(
                "re-acquiring camera; stopped {} track(s) on {}",
                stopped,
                previous.label()
            );
        }

        log::info!(
            "acquiring camera {} (facing {:?})",
            self.camera.name(),
            self.request.facing
        );
        match self.camera.acquire(&self.request) {
            Ok(stream) => {
                log::info!(
                    "camera stream {} bound ({} live track(s))",
                    stream.label(),
                    stream.live_track_count()
                );
                self.stream = Some(stream);
                if let Err(err) = self.decode_loop.start() {
                    self.teardown();
                    return Err(err);
                }
                self.state = SessionState::Streaming;
                Ok(())
            }
            Err(err) => {
                log::error!("camera acquisition failed: {}", err);
                self.decode_loop.stop();
                if self.camera_error.is_none() {
                    self.camera_error = Some(err.clone());
                }
                self.state = SessionState::Faulted;
                Err(err.into())
            }
        }
    }

    /// Handle a finished validation, or analyse one frame.
    pub fn step(&mut self) -> StepOutcome {
        if let Some(success) = self.poll_completion() {
            return StepOutcome::Completed { success };
        }
        if self.state != SessionState::Streaming {
            return StepOutcome::Inactive;
        }
        let Some(stream) = self.stream.as_mut() else {
            return StepOutcome::Inactive;
        };
        match self.decode_loop.poll(stream) {
            None => StepOutcome::StreamEnded,
            Some(DecodeAttempt::NoCode) => StepOutcome::NoCode,
            Some(DecodeAttempt::Payload(token)) => {
                if self.submit(token) {
                    StepOutcome::Submitted
                } else {
                    StepOutcome::Dropped
                }
            }
        }
    }

    /// Pass a decoded token through the gate.
    ///
    /// Returns `true` when a validation call was started; `false` when the
    /// token was dropped because a call is in flight or cooling down, or the
    /// session is not streaming.
    pub fn submit(&mut self, token: ScanToken) -> bool {
        if self.state != SessionState::Streaming {
            log::debug!(
                "session {:?}; ignored token {}",
                self.state,
                token.fingerprint()
            );
            return false;
        }
        let now = Instant::now();
        if !self.gate.try_begin(now) {
            log::debug!("gate closed; dropped token {}", token.fingerprint());
            return false;
        }
        log::info!("scanned code {}; validating", token.fingerprint());
        self.stats.submitted += 1;

        let (tx, rx) = mpsc::channel();
        let validator = Arc::clone(&self.validator);
        let spawned = std::thread::Builder::new()
            .name("attendance-validate".to_string())
            .spawn(move || {
                let result = validator.validate(&token);
                // The receiver is gone when the session was torn down mid-call.
                let _ = tx.send(Completion {
                    result,
                    completed_at: Instant::now(),
                });
            });

        match spawned {
            Ok(_) => {
                self.pending = Some(rx);
            }
            Err(err) => {
                log::error!("failed to spawn validation worker: {}", err);
                self.finish(Completion {
                    result: Err(ValidationError::Transport(err.to_string())),
                    completed_at: Instant::now(),
                });
            }
        }
        true
    }

    /// Non-blocking check for a finished validation call.
    ///
    /// Returns whether it succeeded when one was handled.
    pub fn poll_completion(&mut self) -> Option<bool> {
        let rx = self.pending.as_ref()?;
        let completion = match rx.try_recv() {
            Ok(completion) => completion,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => worker_lost(),
        };
        self.pending = None;
        Some(self.finish(completion))
    }

    /// Block until the in-flight call finishes, up to `timeout`.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> Option<bool> {
        let rx = self.pending.as_ref()?;
        let completion = match rx.recv_timeout(timeout) {
            Ok(completion) => completion,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => worker_lost(),
        };
        self.pending = None;
        Some(self.finish(completion))
    }

    fn finish(&mut self, completion: Completion) -> bool {
        self.gate.complete(completion.completed_at);
        let result = ValidationResult::from_call(completion.result);
        let success = result.is_success();
        if success {
            self.stats.succeeded += 1;
        } else {
            self.stats.failed += 1;
        }
        let navigated = report_outcome(
            &result,
            self.sink.as_mut(),
            self.navigator.as_mut(),
            &self.destination,
        );
        if navigated {
            self.navigated = true;
        }
        success
    }

    /// Step until `stop` is raised, the navigator has been invoked, or the
    /// stream ends. A call still in flight when the stream ends is awaited.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<SessionStats> {
        if self.state != SessionState::Streaming {
            return Err(anyhow!("session is not streaming ({:?})", self.state));
        }
        while !stop.load(Ordering::SeqCst) && !self.navigated {
            match self.step() {
                StepOutcome::StreamEnded | StepOutcome::Inactive => {
                    while self.pending.is_some() && !stop.load(Ordering::SeqCst) {
                        self.wait_for_completion(Duration::from_millis(100));
                    }
                    break;
                }
                StepOutcome::Completed { success } => {
                    log::debug!("validation finished (success={})", success);
                }
                StepOutcome::NoCode | StepOutcome::Submitted | StepOutcome::Dropped => {}
            }
        }
        Ok(self.stats())
    }

    /// Release everything, in order: decoder, tracks, stream reference.
    ///
    /// Safe from any state and idempotent. An in-flight validation is not
    /// aborted; its result is discarded.
    pub fn teardown(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }
        self.decode_loop.stop();
        if let Some(mut stream) = self.stream.take() {
            let stopped = stream.stop_all();
            log::info!("released camera {} ({} track(s))", stream.label(), stopped);
        }
        if self.pending.take().is_some() {
            log::info!("session torn down with a validation in flight; result will be ignored");
        }
        self.state = SessionState::Destroyed;
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn worker_lost() -> Completion {
    Completion {
        result: Err(ValidationError::Transport(
            "validation worker exited without a result".to_string(),
        )),
        completed_at: Instant::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::StubCamera;
    use crate::decode::ScriptedDecoder;
    use crate::outcome::LogSink;

    struct Approve;

    impl Validator for Approve {
        fn validate(&self, _token: &ScanToken) -> Result<AttendanceResponse, ValidationError> {
            Ok(AttendanceResponse {
                status: Some("success".into()),
                ..AttendanceResponse::default()
            })
        }
    }

    struct Stay;

    impl Navigator for Stay {
        fn go_to(&mut self, _destination: &Destination) {}
    }

    fn session(camera: StubCamera, decoder: ScriptedDecoder) -> ScanSession {
        let mut config = ScannerConfig::new("http://127.0.0.1:9").unwrap();
        config.camera.width = 8;
        config.camera.height = 8;
        config.cooldown = Duration::from_millis(20);
        ScanSession::new(
            &config,
            SessionCapabilities {
                camera: Box::new(camera),
                decoder: Box::new(decoder),
                validator: Arc::new(Approve),
                sink: Box::new(LogSink),
                navigator: Box::new(Stay),
            },
        )
    }

    #[test]
    fn state_machine_walks_idle_streaming_destroyed() -> Result<()> {
        let mut session = session(StubCamera::new("stub://s"), ScriptedDecoder::default());
        assert_eq!(session.state(), SessionState::Idle);
        session.start()?;
        assert_eq!(session.state(), SessionState::Streaming);
        assert!(session.is_decoding());
        assert_eq!(session.live_track_count(), 1);

        session.teardown();
        assert_eq!(session.state(), SessionState::Destroyed);
        assert!(!session.is_decoding());
        assert_eq!(session.live_track_count(), 0);
        assert!(session.start().is_err());
        assert_eq!(session.step(), StepOutcome::Inactive);
        Ok(())
    }

    #[test]
    fn restart_while_streaming_stops_previous_tracks() -> Result<()> {
        let camera = StubCamera::new("stub://s");
        let live = camera.live_tracks();
        let mut session = session(camera, ScriptedDecoder::default());
        session.start()?;
        session.start()?;
        assert_eq!(live.count(), 1);
        drop(session);
        assert_eq!(live.count(), 0);
        Ok(())
    }

    #[test]
    fn faulted_session_cannot_restart() {
        let camera = StubCamera::failing("stub://s", CameraError::NotFound);
        let mut session = session(camera, ScriptedDecoder::default());
        assert!(session.start().is_err());
        assert_eq!(session.state(), SessionState::Faulted);
        assert_eq!(session.camera_error(), Some(&CameraError::NotFound));
        assert!(session.start().is_err());
        assert_eq!(session.camera_error(), Some(&CameraError::NotFound));
    }

    /// Hands out one stub stream, then fails every later acquisition.
    struct FlakyCamera {
        inner: StubCamera,
        acquired: bool,
    }

    impl CameraDevice for FlakyCamera {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn acquire(&mut self, request: &CameraRequest) -> Result<MediaStream, CameraError> {
            if self.acquired {
                return Err(CameraError::PermissionDenied);
            }
            self.acquired = true;
            self.inner.acquire(request)
        }
    }

    #[test]
    fn failed_reacquire_stops_decoding_and_releases_tracks() -> Result<()> {
        let inner = StubCamera::new("stub://flaky");
        let live = inner.live_tracks();
        let mut config = ScannerConfig::new("http://127.0.0.1:9")?;
        config.camera.width = 8;
        config.camera.height = 8;
        let mut session = ScanSession::new(
            &config,
            SessionCapabilities {
                camera: Box::new(FlakyCamera {
                    inner,
                    acquired: false,
                }),
                decoder: Box::new(ScriptedDecoder::repeating("abc")),
                validator: Arc::new(Approve),
                sink: Box::new(LogSink),
                navigator: Box::new(Stay),
            },
        );

        session.start()?;
        assert!(session.is_decoding());
        assert!(session.start().is_err());
        assert_eq!(session.state(), SessionState::Faulted);
        assert!(!session.is_decoding());
        assert_eq!(session.live_track_count(), 0);
        assert_eq!(live.count(), 0);
        assert_eq!(session.step(), StepOutcome::Inactive);
        assert!(!session.submit(ScanToken::new("abc").unwrap()));
        Ok(())
    }

    #[test]
    fn submit_outside_streaming_is_refused() -> Result<()> {
        let mut idle = session(StubCamera::new("stub://s"), ScriptedDecoder::default());
        assert!(!idle.submit(ScanToken::new("abc").unwrap()));
        assert_eq!(idle.stats().submitted, 0);
        assert!(!idle.is_submitting());

        let mut faulted = session(
            StubCamera::failing("stub://s", CameraError::NotFound),
            ScriptedDecoder::default(),
        );
        assert!(faulted.start().is_err());
        assert!(!faulted.submit(ScanToken::new("abc").unwrap()));
        assert_eq!(faulted.stats().submitted, 0);

        let mut streaming = session(StubCamera::new("stub://s"), ScriptedDecoder::default());
        streaming.start()?;
        assert!(streaming.submit(ScanToken::new("abc").unwrap()));
        assert_eq!(streaming.wait_for_completion(Duration::from_secs(10)), Some(true));
        Ok(())
    }

    #[test]
    fn submit_after_teardown_is_refused() {
        let mut session = session(StubCamera::new("stub://s"), ScriptedDecoder::default());
        session.teardown();
        assert!(!session.submit(ScanToken::new("abc").unwrap()));
        assert_eq!(session.stats().submitted, 0);
    }
}
