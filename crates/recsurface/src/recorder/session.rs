use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::RecorderError;
use crate::recorder::input::EncoderInput;

/// Asynchronous failure reported by a running encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderFailure {
    pub message: String,
}

/// Informational events reported by a running encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderInfo {
    Started { output: PathBuf },
    Progress {
        frame: Option<u64>,
        time: Option<String>,
        bitrate: Option<String>,
        speed: Option<String>,
    },
    Finished { success: bool },
}

pub type ErrorCallback = Arc<dyn Fn(&RecorderFailure) + Send + Sync>;
pub type InfoCallback = Arc<dyn Fn(&RecorderInfo) + Send + Sync>;

/// Optional listeners handed to [`RecordingSession::prepare`].
#[derive(Clone, Default)]
pub struct RecorderListeners {
    pub on_error: Option<ErrorCallback>,
    pub on_info: Option<InfoCallback>,
}

impl RecorderListeners {
    pub fn error(&self, failure: RecorderFailure) {
        if let Some(callback) = &self.on_error {
            callback(&failure);
        }
    }

    pub fn info(&self, info: RecorderInfo) {
        if let Some(callback) = &self.on_info {
            callback(&info);
        }
    }
}

impl fmt::Debug for RecorderListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderListeners")
            .field("on_error", &self.on_error.is_some())
            .field("on_info", &self.on_info.is_some())
            .finish()
    }
}

/// Everything an encoder needs to configure itself.
#[derive(Debug, Clone)]
pub struct EncoderRequest {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub input: EncoderInput,
    pub listeners: RecorderListeners,
}

/// Audio/video encoder driven by a [`RecordingSession`].
pub trait MediaEncoder: Send {
    /// Validates the output target and configures video (from the encoder
    /// input) plus an audio input.
    fn prepare(&mut self, request: &EncoderRequest) -> Result<(), RecorderError>;

    fn start(&mut self) -> Result<(), RecorderError>;

    /// Graceful stop; finalises the container.
    fn stop(&mut self) -> Result<(), RecorderError>;

    /// Returns the encoder to its unconfigured state.
    fn reset(&mut self);

    /// Frees every underlying resource. Returns false if something could not
    /// be reclaimed cleanly.
    fn release(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Prepared,
    Recording,
}

/// Result of [`RecordingSession::stop`]: whether the encoder stopped
/// gracefully and whether its resources were released, reported separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub stopped: bool,
    pub released: bool,
}

/// Encoder lifecycle: Idle → Prepared → Recording → Idle.
pub struct RecordingSession<E: MediaEncoder> {
    encoder: E,
    state: SessionState,
    output: Option<PathBuf>,
}

impl<E: MediaEncoder> RecordingSession<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            encoder,
            state: SessionState::Idle,
            output: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn prepare(
        &mut self,
        output: &Path,
        width: u32,
        height: u32,
        input: &EncoderInput,
        listeners: RecorderListeners,
    ) -> Result<(), RecorderError> {
        if self.state != SessionState::Idle {
            return Err(RecorderError::InvalidState(
                "recorder must be idle before it can be prepared",
            ));
        }
        let unsupported = |reason: String| {
            RecorderError::io(output, std::io::Error::new(std::io::ErrorKind::InvalidInput, reason))
        };
        if width == 0 || height == 0 {
            return Err(unsupported(format!("video size {width}x{height} is empty")));
        }
        if let Some(max) = input.max_dimension() {
            if width > max || height > max {
                return Err(unsupported(format!(
                    "video size {width}x{height} exceeds the GPU texture limit of {max}"
                )));
            }
        }

        input.configure(width, height);
        let request = EncoderRequest {
            output: output.to_path_buf(),
            width,
            height,
            input: input.clone(),
            listeners,
        };
        if let Err(err) = self.encoder.prepare(&request) {
            self.encoder.reset();
            return Err(err);
        }

        debug!(output = %output.display(), width, height, "recorder prepared");
        self.output = Some(request.output);
        self.state = SessionState::Prepared;
        Ok(())
    }

    /// Starts a prepared session.
    ///
    /// Any failure, including a call in the wrong state, resets and releases
    /// the encoder; the caller has to prepare again before retrying.
    pub fn start(&mut self) -> bool {
        if self.state != SessionState::Prepared {
            warn!(state = ?self.state, "cannot start recorder; releasing session");
            self.abandon();
            return false;
        }

        match self.encoder.start() {
            Ok(()) => {
                info!(output = ?self.output, "recording started");
                self.state = SessionState::Recording;
                true
            }
            Err(err) => {
                warn!(error = %err, "recorder failed to start; releasing session");
                self.abandon();
                false
            }
        }
    }

    /// Stops a running session. Resources are released whether or not the
    /// graceful stop succeeded.
    pub fn stop(&mut self) -> Result<StopOutcome, RecorderError> {
        if self.state != SessionState::Recording {
            return Err(RecorderError::InvalidState("cannot stop; not recording"));
        }

        let stopped = match self.encoder.stop() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "recorder did not stop cleanly");
                false
            }
        };
        let released = self.encoder.release();
        self.state = SessionState::Idle;
        info!(output = ?self.output, stopped, released, "recording stopped");
        Ok(StopOutcome { stopped, released })
    }

    /// Drops any configuration or running encoder without a graceful stop.
    pub fn abandon(&mut self) {
        self.encoder.reset();
        let released = self.encoder.release();
        if !released {
            warn!("recorder resources were not fully released");
        }
        self.state = SessionState::Idle;
    }
}

impl<E: MediaEncoder> Drop for RecordingSession<E> {
    fn drop(&mut self) {
        if self.state != SessionState::Idle {
            self.abandon();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Encoder that records every call and fails on demand.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedEncoder {
        pub calls: Arc<Mutex<Vec<&'static str>>>,
        pub fail_prepare: bool,
        pub fail_start: bool,
        pub fail_stop: bool,
    }

    impl ScriptedEncoder {
        pub fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl MediaEncoder for ScriptedEncoder {
        fn prepare(&mut self, request: &EncoderRequest) -> Result<(), RecorderError> {
            self.push("prepare");
            if self.fail_prepare {
                return Err(RecorderError::io(
                    &request.output,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                ));
            }
            Ok(())
        }

        fn start(&mut self) -> Result<(), RecorderError> {
            self.push("start");
            if self.fail_start {
                return Err(RecorderError::Rejected("busy".into()));
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), RecorderError> {
            self.push("stop");
            if self.fail_stop {
                return Err(RecorderError::Rejected("no frames".into()));
            }
            Ok(())
        }

        fn reset(&mut self) {
            self.push("reset");
        }

        fn release(&mut self) -> bool {
            self.push("release");
            true
        }
    }

    fn prepared(encoder: ScriptedEncoder) -> RecordingSession<ScriptedEncoder> {
        let mut session = RecordingSession::new(encoder);
        session
            .prepare(
                Path::new("/tmp/out.mp4"),
                640,
                480,
                &EncoderInput::new(),
                RecorderListeners::default(),
            )
            .unwrap();
        session
    }

    #[test]
    fn full_lifecycle_returns_to_idle() {
        let encoder = ScriptedEncoder::default();
        let mut session = prepared(encoder.clone());
        assert_eq!(session.state(), SessionState::Prepared);
        assert!(session.start());
        assert_eq!(session.state(), SessionState::Recording);
        let outcome = session.stop().unwrap();
        assert_eq!(
            outcome,
            StopOutcome {
                stopped: true,
                released: true
            }
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(encoder.calls(), vec!["prepare", "start", "stop", "release"]);
    }

    #[test]
    fn stop_while_idle_performs_no_encoder_io() {
        let encoder = ScriptedEncoder::default();
        let mut session = RecordingSession::new(encoder.clone());
        let err = session.stop().unwrap_err();
        assert!(matches!(err, RecorderError::InvalidState(_)));
        assert!(encoder.calls().is_empty());
    }

    #[test]
    fn second_start_fails_and_releases_first_session() {
        let encoder = ScriptedEncoder::default();
        let mut session = prepared(encoder.clone());
        assert!(session.start());
        assert!(!session.start());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            encoder.calls(),
            vec!["prepare", "start", "reset", "release"]
        );
    }

    #[test]
    fn start_failure_resets_and_requires_prepare() {
        let encoder = ScriptedEncoder {
            fail_start: true,
            ..Default::default()
        };
        let mut session = prepared(encoder.clone());
        assert!(!session.start());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.start());
    }

    #[test]
    fn failed_stop_still_releases() {
        let encoder = ScriptedEncoder {
            fail_stop: true,
            ..Default::default()
        };
        let mut session = prepared(encoder.clone());
        assert!(session.start());
        let outcome = session.stop().unwrap();
        assert!(!outcome.stopped);
        assert!(outcome.released);
        assert_eq!(encoder.calls().last(), Some(&"release"));
    }

    #[test]
    fn prepare_failure_surfaces_io_error() {
        let encoder = ScriptedEncoder {
            fail_prepare: true,
            ..Default::default()
        };
        let mut session = RecordingSession::new(encoder.clone());
        let err = session
            .prepare(
                Path::new("/read-only/out.mp4"),
                640,
                480,
                &EncoderInput::new(),
                RecorderListeners::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RecorderError::Io { .. }));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(encoder.calls(), vec!["prepare", "reset"]);
    }

    #[test]
    fn prepare_rejects_sizes_the_gpu_cannot_hold() {
        let encoder = ScriptedEncoder::default();
        let mut session = RecordingSession::new(encoder.clone());
        let input = EncoderInput::new();
        input.set_max_dimension(4096);

        for (width, height) in [(8192, 720), (1280, 8192), (0, 720)] {
            let err = session
                .prepare(
                    Path::new("/tmp/out.mp4"),
                    width,
                    height,
                    &input,
                    RecorderListeners::default(),
                )
                .unwrap_err();
            assert!(matches!(err, RecorderError::Io { .. }), "{width}x{height}");
        }
        assert!(encoder.calls().is_empty());
        assert_eq!(input.size(), None);

        session
            .prepare(
                Path::new("/tmp/out.mp4"),
                4096,
                2160,
                &input,
                RecorderListeners::default(),
            )
            .unwrap();
        assert_eq!(session.state(), SessionState::Prepared);
    }
}
