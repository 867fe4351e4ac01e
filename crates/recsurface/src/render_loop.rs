//! The render thread.
//!
//! One [`RenderThread`] drives one graphics context from creation to
//! teardown. Its only suspension point is the per-tick wait on the interrupt
//! channel; an interrupt there (or the sender going away) is the shutdown
//! signal. Once stopped, an instance never runs again: the view builds a new
//! one for the next surface.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, trace, warn};
use winit::dpi::PhysicalSize;

use crate::backend::RenderBackend;
use crate::callbacks::CallbackSlot;
use crate::error::ContextError;
use crate::recorder::EncoderInput;
use crate::state::SharedState;
use crate::types::{Drawable, RenderMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Created,
    Running,
    Stopped,
}

impl LoopPhase {
    fn as_u8(self) -> u8 {
        match self {
            LoopPhase::Created => 0,
            LoopPhase::Running => 1,
            LoopPhase::Stopped => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopPhase::Created,
            1 => LoopPhase::Running,
            _ => LoopPhase::Stopped,
        }
    }
}

pub(crate) struct RenderLoop<B: RenderBackend> {
    backend: B,
    state: Arc<SharedState>,
    callbacks: CallbackSlot,
    input: EncoderInput,
    frame_interval: Duration,
    delivered_size: Option<PhysicalSize<u32>>,
    frames: u64,
}

impl<B: RenderBackend> RenderLoop<B> {
    pub(crate) fn new(
        backend: B,
        state: Arc<SharedState>,
        callbacks: CallbackSlot,
        input: EncoderInput,
        frame_interval: Duration,
    ) -> Self {
        Self {
            backend,
            state,
            callbacks,
            input,
            frame_interval,
            delivered_size: None,
            frames: 0,
        }
    }

    pub(crate) fn run(mut self, interrupt: Receiver<()>) -> Result<(), ContextError> {
        if let Err(err) = self.startup() {
            error!(error = %err, "failed to create graphics context");
            self.backend.teardown();
            self.input.release();
            return Err(err);
        }

        let mut result = Ok(());
        loop {
            if let Err(err) = self.tick() {
                if err.is_fatal() {
                    error!(error = %err, "graphics context failed; stopping render thread");
                    result = Err(err);
                    break;
                }
                warn!(error = %err, "skipping frame");
            }

            match interrupt.recv_timeout(self.frame_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("render thread interrupted");
                    break;
                }
            }
        }

        self.shutdown();
        result
    }

    pub(crate) fn startup(&mut self) -> Result<(), ContextError> {
        self.backend.initialize()?;
        self.callbacks.with(|sink| sink.on_surface_created());
        if let Err(err) = self.backend.create_encoder_drawable() {
            self.callbacks.with(|sink| sink.on_surface_destroyed());
            return Err(err);
        }
        self.state.set_has_context(true);
        self.callbacks.with(|sink| sink.on_context_created());

        // Whatever size is already known becomes the viewport; callbacks only
        // hear about it through a pending resize.
        let size = self.state.size();
        if size.width > 0 && size.height > 0 {
            self.backend.set_viewport(size);
        }
        debug!("render thread running");
        Ok(())
    }

    /// Runs one iteration; returns whether a frame was drawn.
    pub(crate) fn tick(&mut self) -> Result<bool, ContextError> {
        if self.state.is_paused() {
            trace!("paused; skipping tick");
            return Ok(false);
        }

        let requested = self.state.take_render_request();
        let should_render = match self.state.render_mode() {
            RenderMode::Continuous => true,
            RenderMode::OnDemand => requested,
        };

        if let Some(size) = self.state.take_resize() {
            self.backend.set_viewport(size);
            if self.delivered_size != Some(size) {
                debug!(width = size.width, height = size.height, "surface changed");
                self.delivered_size = Some(size);
                self.callbacks
                    .with(|sink| sink.on_surface_changed(size.width, size.height));
            }
        }

        if !should_render {
            return Ok(false);
        }

        self.callbacks.with(|sink| sink.on_pre_draw_frame());
        self.draw_and_present(Drawable::Onscreen)?;

        if self.state.is_recording() {
            self.backend.make_current(Drawable::Encoder)?;
            let encoded = self.draw_and_present(Drawable::Encoder);
            self.backend.make_current(Drawable::Onscreen)?;
            encoded?;
        }

        self.frames += 1;
        Ok(true)
    }

    fn draw_and_present(&mut self, drawable: Drawable) -> Result<(), ContextError> {
        let frame = self.backend.begin_frame()?;
        debug_assert_eq!(frame.drawable(), drawable);
        self.callbacks.with(|sink| sink.on_draw_frame(&frame));
        self.backend.present()
    }

    pub(crate) fn shutdown(&mut self) {
        self.callbacks.with(|sink| sink.on_surface_destroyed());
        self.backend.teardown();
        self.input.release();
        self.state.set_has_context(false);
        info!(frames = self.frames, "render thread stopped");
    }
}

/// Lifecycle handle for one render-thread instance.
///
/// `Created → Running → Stopped`; a stopped instance is never restarted.
pub struct RenderThread {
    phase: Arc<AtomicU8>,
    interrupt: Option<Sender<()>>,
    handle: Option<JoinHandle<Result<(), ContextError>>>,
    state: Arc<SharedState>,
    callbacks: CallbackSlot,
    input: EncoderInput,
    frame_interval: Duration,
}

impl RenderThread {
    pub fn new(
        state: Arc<SharedState>,
        callbacks: CallbackSlot,
        input: EncoderInput,
        frame_interval: Duration,
    ) -> Self {
        Self {
            phase: Arc::new(AtomicU8::new(LoopPhase::Created.as_u8())),
            interrupt: None,
            handle: None,
            state,
            callbacks,
            input,
            frame_interval,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        LoopPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_started(&self) -> bool {
        self.phase() != LoopPhase::Created
    }

    pub fn is_terminated(&self) -> bool {
        self.phase() == LoopPhase::Stopped
    }

    /// Spawns the thread. Refused unless the instance is still `Created`.
    pub fn start<B: RenderBackend>(&mut self, backend: B) -> bool {
        let claimed = self.phase.compare_exchange(
            LoopPhase::Created.as_u8(),
            LoopPhase::Running.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if claimed.is_err() {
            warn!(phase = ?self.phase(), "render thread already started; ignoring start");
            return false;
        }

        let (tx, rx) = bounded(1);
        let render_loop = RenderLoop::new(
            backend,
            self.state.clone(),
            self.callbacks.clone(),
            self.input.clone(),
            self.frame_interval,
        );
        let phase = self.phase.clone();
        let spawned = thread::Builder::new()
            .name("recsurface-render".into())
            .spawn(move || {
                let result = render_loop.run(rx);
                phase.store(LoopPhase::Stopped.as_u8(), Ordering::SeqCst);
                result
            });

        match spawned {
            Ok(handle) => {
                debug!("render thread started");
                self.interrupt = Some(tx);
                self.handle = Some(handle);
                true
            }
            Err(err) => {
                error!(error = %err, "failed to spawn render thread");
                self.phase
                    .store(LoopPhase::Stopped.as_u8(), Ordering::SeqCst);
                false
            }
        }
    }

    /// Wakes the thread out of its per-tick wait and asks it to stop.
    pub fn interrupt(&mut self) {
        if let Some(tx) = self.interrupt.take() {
            let _ = tx.try_send(());
        }
    }

    /// Interrupts and waits for the thread; returns its exit status.
    pub fn join(&mut self) -> Result<(), ContextError> {
        self.interrupt();
        let Some(handle) = self.handle.take() else {
            if self.phase() == LoopPhase::Created {
                self.phase
                    .store(LoopPhase::Stopped.as_u8(), Ordering::SeqCst);
            }
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                error!("render thread panicked");
                self.phase
                    .store(LoopPhase::Stopped.as_u8(), Ordering::SeqCst);
                self.input.release();
                self.state.set_has_context(false);
                Err(ContextError::Panicked)
            }
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.join() {
                warn!(error = %err, "render thread exited with an error");
            }
        }
    }
}

impl std::fmt::Debug for RenderThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderThread")
            .field("phase", &self.phase())
            .field("frame_interval", &self.frame_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::RendererCallbacks;
    use crate::testing::{Event, EventLog, FakeBackend};

    struct Harness {
        state: Arc<SharedState>,
        log: Arc<EventLog>,
        _sink: Arc<dyn RendererCallbacks>,
        slot: CallbackSlot,
        input: EncoderInput,
    }

    fn harness() -> Harness {
        let log = Arc::new(EventLog::default());
        let sink: Arc<dyn RendererCallbacks> = log.clone();
        let slot = CallbackSlot::new();
        slot.set(&sink);
        Harness {
            state: Arc::new(SharedState::new()),
            log,
            _sink: sink,
            slot,
            input: EncoderInput::new(),
        }
    }

    fn render_loop(h: &Harness) -> RenderLoop<FakeBackend> {
        RenderLoop::new(
            FakeBackend::new(h.input.clone()),
            h.state.clone(),
            h.slot.clone(),
            h.input.clone(),
            Duration::from_millis(1),
        )
    }

    fn draws(events: &[Event]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, Event::Draw(_)))
            .count()
    }

    #[test]
    fn surface_created_precedes_context_created() {
        let h = harness();
        let mut lp = render_loop(&h);
        lp.startup().unwrap();
        assert_eq!(h.log.events(), vec![Event::Created, Event::Context]);
        assert!(h.state.has_context());
    }

    /// Snapshots the backend's operation log at each lifecycle callback.
    struct OpsAtCallback {
        ops: Arc<std::sync::Mutex<Vec<String>>>,
        at_created: std::sync::Mutex<Vec<String>>,
        at_context: std::sync::Mutex<Vec<String>>,
    }

    impl RendererCallbacks for OpsAtCallback {
        fn on_surface_created(&self) {
            *self.at_created.lock().unwrap() = self.ops.lock().unwrap().clone();
        }

        fn on_context_created(&self) {
            *self.at_context.lock().unwrap() = self.ops.lock().unwrap().clone();
        }
    }

    #[test]
    fn surface_created_fires_before_encoder_drawable_exists() {
        let h = harness();
        let mut lp = render_loop(&h);
        let sink = Arc::new(OpsAtCallback {
            ops: lp.backend.ops.clone(),
            at_created: Default::default(),
            at_context: Default::default(),
        });
        let dyn_sink: Arc<dyn RendererCallbacks> = sink.clone();
        h.slot.set(&dyn_sink);

        lp.startup().unwrap();
        assert_eq!(*sink.at_created.lock().unwrap(), vec!["initialize"]);
        assert_eq!(
            *sink.at_context.lock().unwrap(),
            vec!["initialize", "encoder drawable"]
        );
    }

    #[test]
    fn on_demand_requests_coalesce_into_one_draw() {
        let h = harness();
        h.state.set_render_mode(RenderMode::OnDemand);
        let mut lp = render_loop(&h);
        lp.startup().unwrap();
        h.log.clear();

        assert!(!lp.tick().unwrap());
        for _ in 0..5 {
            h.state.request_render();
        }
        assert!(lp.tick().unwrap());
        assert!(!lp.tick().unwrap());
        assert_eq!(draws(&h.log.events()), 1);
        assert_eq!(h.log.count(&Event::PreDraw), 1);
    }

    #[test]
    fn surface_changed_only_fires_on_new_dimensions() {
        let h = harness();
        h.state.set_render_mode(RenderMode::OnDemand);
        let mut lp = render_loop(&h);
        lp.startup().unwrap();

        h.state.record_size(800, 600);
        lp.tick().unwrap();
        h.state.record_size(800, 600);
        lp.tick().unwrap();
        h.state.record_size(1024, 768);
        h.state.record_size(800, 600);
        lp.tick().unwrap();
        h.state.record_size(1024, 768);
        lp.tick().unwrap();

        let changes: Vec<_> = h
            .log
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Changed(..)))
            .collect();
        assert_eq!(
            changes,
            vec![Event::Changed(800, 600), Event::Changed(1024, 768)]
        );
    }

    #[test]
    fn recording_draws_twice_and_rebinds_onscreen() {
        let h = harness();
        let mut lp = render_loop(&h);
        let ops = lp.backend.ops.clone();
        lp.startup().unwrap();
        h.log.clear();

        lp.tick().unwrap();
        assert_eq!(h.log.events(), vec![Event::PreDraw, Event::Draw(Drawable::Onscreen)]);

        h.state.set_recording(true);
        h.log.clear();
        ops.lock().unwrap().clear();
        lp.tick().unwrap();
        assert_eq!(
            h.log.events(),
            vec![
                Event::PreDraw,
                Event::Draw(Drawable::Onscreen),
                Event::Draw(Drawable::Encoder)
            ]
        );
        assert_eq!(
            *ops.lock().unwrap(),
            vec![
                "present Onscreen",
                "current Encoder",
                "present Encoder",
                "current Onscreen"
            ]
        );
    }

    #[test]
    fn paused_ticks_draw_nothing() {
        let h = harness();
        let mut lp = render_loop(&h);
        lp.startup().unwrap();
        h.log.clear();

        h.state.set_paused(true);
        h.state.record_size(640, 480);
        assert!(!lp.tick().unwrap());
        assert!(h.log.events().is_empty());

        h.state.set_paused(false);
        assert!(lp.tick().unwrap());
        assert_eq!(h.log.events()[0], Event::Changed(640, 480));
    }

    #[test]
    fn lapsed_sink_is_skipped() {
        let h = harness();
        let mut lp = render_loop(&h);
        h.slot.clear();
        lp.startup().unwrap();
        assert!(lp.tick().unwrap());
        assert!(h.log.events().is_empty());
    }

    #[test]
    fn failed_initialize_stops_thread_with_configuration_error() {
        let h = harness();
        let mut backend = FakeBackend::new(h.input.clone());
        backend.fail_initialize = true;
        let mut thread = RenderThread::new(
            h.state.clone(),
            h.slot.clone(),
            h.input.clone(),
            Duration::from_millis(1),
        );
        assert!(thread.start(backend));
        let err = thread.join().unwrap_err();
        assert!(matches!(err, ContextError::Configuration(_)));
        assert!(thread.is_terminated());
        assert!(!h.state.has_context());
        assert!(h.log.events().is_empty());
        assert!(h.input.is_released());
    }

    #[test]
    fn thread_runs_until_interrupted_and_never_restarts() {
        let h = harness();
        let mut thread = RenderThread::new(
            h.state.clone(),
            h.slot.clone(),
            h.input.clone(),
            Duration::from_millis(1),
        );
        assert_eq!(thread.phase(), LoopPhase::Created);
        assert!(thread.start(FakeBackend::new(h.input.clone())));
        assert!(!thread.start(FakeBackend::new(h.input.clone())));
        assert!(h.log.wait_for(|events| draws(events) >= 3));

        thread.join().unwrap();
        assert!(thread.is_terminated());
        assert_eq!(h.log.events().last(), Some(&Event::Destroyed));
        assert!(!h.state.has_context());
        assert!(!thread.start(FakeBackend::new(h.input.clone())));
    }
}
