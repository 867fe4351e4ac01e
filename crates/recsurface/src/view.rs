//! Host-facing view that ties the surface provider, the render thread, and
//! the recorder together.
//!
//! Everything here runs on the control thread. It only flips shared flags or
//! starts/joins render threads; the graphics context itself is never touched
//! from this side.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::BackendFactory;
use crate::callbacks::{CallbackSlot, RendererCallbacks};
use crate::error::RecorderError;
use crate::recorder::{
    EncoderInput, ErrorCallback, FfmpegEncoder, FfmpegSettings, InfoCallback, MediaEncoder,
    RecorderListeners, RecordingSession,
};
use crate::render_loop::{LoopPhase, RenderThread};
use crate::state::SharedState;
use crate::types::{RenderMode, DEFAULT_FRAME_INTERVAL};

/// Knobs fixed for the lifetime of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    pub frame_interval: Duration,
    pub render_mode: RenderMode,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            render_mode: RenderMode::Continuous,
        }
    }
}

type EncoderSource<E> = Box<dyn FnMut() -> E + Send>;

/// A render surface that can mirror its frames into a recording.
pub struct RecordableView<F: BackendFactory, E: MediaEncoder = FfmpegEncoder> {
    // The recorder goes first so a live session is abandoned before the
    // render thread is joined.
    recorder: Option<RecordingSession<E>>,
    thread: Option<RenderThread>,
    factory: F,
    make_encoder: EncoderSource<E>,
    surface: Option<F::Window>,
    input: EncoderInput,
    state: Arc<SharedState>,
    callbacks: CallbackSlot,
    options: ViewOptions,
}

impl<F: BackendFactory> RecordableView<F, FfmpegEncoder> {
    /// View that records through an `ffmpeg` child process.
    pub fn new(factory: F, options: ViewOptions, ffmpeg: FfmpegSettings) -> Self {
        Self::with_encoder(factory, options, move || FfmpegEncoder::new(ffmpeg.clone()))
    }
}

impl<F: BackendFactory, E: MediaEncoder> RecordableView<F, E> {
    pub fn with_encoder<M>(factory: F, options: ViewOptions, make_encoder: M) -> Self
    where
        M: FnMut() -> E + Send + 'static,
    {
        let state = Arc::new(SharedState::new());
        state.set_render_mode(options.render_mode);
        Self {
            recorder: None,
            thread: None,
            factory,
            make_encoder: Box::new(make_encoder),
            surface: None,
            input: EncoderInput::new(),
            state,
            callbacks: CallbackSlot::new(),
            options,
        }
    }

    /// Builds the render pipeline if none is alive, starts it when a surface
    /// is already available, and leaves the view paused.
    pub fn setup(&mut self) {
        let phase = self.thread.as_ref().map(RenderThread::phase);
        let needs_thread = !self.state.has_context()
            && matches!(phase, None | Some(LoopPhase::Stopped));
        if needs_thread {
            if let Some(mut previous) = self.thread.take() {
                if let Err(err) = previous.join() {
                    warn!(error = %err, "previous render thread ended with an error");
                }
            }
            self.input = EncoderInput::new();
            self.thread = Some(RenderThread::new(
                self.state.clone(),
                self.callbacks.clone(),
                self.input.clone(),
                self.options.frame_interval,
            ));
            debug!("created render thread");
        }
        self.state.set_paused(true);
        self.start_if_ready();
    }

    pub fn pause(&self) {
        debug!("pausing render loop");
        self.state.set_paused(true);
    }

    /// Resumes drawing, rebuilding the pipeline first when it was torn down.
    pub fn resume(&mut self) {
        self.setup();
        debug!("resuming render loop");
        self.state.set_paused(false);
    }

    /// Same as [`RecordableView::pause`]; nothing is torn down.
    pub fn stop(&self) {
        self.pause();
    }

    pub fn set_render_mode(&self, mode: RenderMode) {
        debug!(%mode, "render mode changed");
        self.state.set_render_mode(mode);
    }

    pub fn render_mode(&self) -> RenderMode {
        self.state.render_mode()
    }

    pub fn request_render(&self) {
        self.state.request_render();
    }

    /// Stores a non-owning reference; the client keeps `sink` alive.
    pub fn set_renderer_callbacks(&self, sink: &Arc<dyn RendererCallbacks>) {
        self.callbacks.set(sink);
    }

    pub fn renderer_callbacks(&self) -> Option<Arc<dyn RendererCallbacks>> {
        self.callbacks.get()
    }

    pub fn has_context(&self) -> bool {
        self.state.has_context()
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Replaces any previous recorder with a freshly prepared one.
    ///
    /// Every preparation failure is `RecorderError::Io`: an unwritable
    /// target, an unusable encoder binary, or a size the GPU cannot hold.
    pub fn init_recorder(
        &mut self,
        output: &Path,
        width: u32,
        height: u32,
        on_error: Option<ErrorCallback>,
        on_info: Option<InfoCallback>,
    ) -> Result<(), RecorderError> {
        if self.state.is_recording() {
            return Err(RecorderError::InvalidState(
                "cannot initialise a recorder while recording",
            ));
        }
        self.recorder = None;

        let mut session = RecordingSession::new((self.make_encoder)());
        session.prepare(
            output,
            width,
            height,
            &self.input,
            RecorderListeners { on_error, on_info },
        )?;
        info!(output = %output.display(), width, height, "recorder initialised");
        self.recorder = Some(session);
        Ok(())
    }

    /// Returns false when no recorder is prepared or the encoder refused to
    /// start; in both cases the view is left not recording.
    pub fn start_recording(&mut self) -> bool {
        let Some(session) = self.recorder.as_mut() else {
            warn!("start_recording called before init_recorder");
            self.state.set_recording(false);
            return false;
        };
        let started = session.start();
        self.state.set_recording(started);
        started
    }

    /// Stops the active recording; `Ok(false)` means the encoder did not
    /// finish cleanly, though its resources were still released.
    pub fn stop_recording(&mut self) -> Result<bool, RecorderError> {
        if !self.state.is_recording() {
            return Err(RecorderError::InvalidState("cannot stop; not recording"));
        }
        self.state.set_recording(false);
        let session = self
            .recorder
            .as_mut()
            .ok_or(RecorderError::InvalidState("cannot stop; no recorder"))?;
        let outcome = session.stop()?;
        if !outcome.released {
            warn!("recorder resources were not fully released");
        }
        Ok(outcome.stopped)
    }

    /// The provider has a live native surface.
    pub fn surface_created(&mut self, window: F::Window) {
        debug!("surface created");
        self.surface = Some(window);
        self.start_if_ready();
    }

    /// Records the new size; the render thread applies it on its next tick.
    pub fn surface_changed(&self, width: u32, height: u32) {
        if self.state.record_size(width, height) {
            debug!(width, height, "surface size recorded");
        }
    }

    /// Interrupts the render thread and waits for teardown to finish.
    pub fn surface_destroyed(&mut self) {
        debug!("surface destroyed");
        if let Some(thread) = self.thread.as_mut() {
            if let Err(err) = thread.join() {
                warn!(error = %err, "render thread ended with an error");
            }
        }
        if self.state.is_recording() {
            warn!("surface destroyed while recording; stopping recorder");
            if let Err(err) = self.stop_recording() {
                warn!(error = %err, "failed to stop recorder");
            }
        }
        self.surface = None;
    }

    fn start_if_ready(&mut self) {
        let (Some(thread), Some(window)) = (self.thread.as_mut(), self.surface.as_ref()) else {
            return;
        };
        if thread.is_started() {
            return;
        }
        let backend = self.factory.create(window.clone(), self.input.clone());
        thread.start(backend);
    }
}

impl<F: BackendFactory, E: MediaEncoder> Drop for RecordableView<F, E> {
    fn drop(&mut self) {
        if self.state.is_recording() {
            if let Err(err) = self.stop_recording() {
                warn!(error = %err, "failed to stop recorder on drop");
            }
        }
        if let Some(thread) = self.thread.as_mut() {
            if let Err(err) = thread.join() {
                warn!(error = %err, "render thread ended with an error");
            }
        }
    }
}
