//! Headless doubles shared by the render-loop and view tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use winit::dpi::PhysicalSize;

use crate::backend::{BackendFactory, Frame, RenderBackend};
use crate::callbacks::RendererCallbacks;
use crate::error::ContextError;
use crate::recorder::EncoderInput;
use crate::types::Drawable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Created,
    Changed(u32, u32),
    Destroyed,
    Context,
    PreDraw,
    Draw(Drawable),
}

/// Callback sink that appends every invocation to a shared log.
#[derive(Default)]
pub(crate) struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Polls until `predicate` holds over the log or two seconds pass.
    pub fn wait_for<P>(&self, predicate: P) -> bool
    where
        P: Fn(&[Event]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if predicate(&self.events()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        predicate(&self.events())
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl RendererCallbacks for EventLog {
    fn on_surface_created(&self) {
        self.push(Event::Created);
    }

    fn on_surface_changed(&self, width: u32, height: u32) {
        self.push(Event::Changed(width, height));
    }

    fn on_surface_destroyed(&self) {
        self.push(Event::Destroyed);
    }

    fn on_context_created(&self) {
        self.push(Event::Context);
    }

    fn on_pre_draw_frame(&self) {
        self.push(Event::PreDraw);
    }

    fn on_draw_frame(&self, frame: &Frame<'_>) {
        self.push(Event::Draw(frame.drawable()));
    }
}

/// Texture limit the headless backend publishes, as a real device would.
pub(crate) const FAKE_MAX_DIMENSION: u32 = 8192;

/// Backend that records operations instead of touching a GPU.
pub(crate) struct FakeBackend {
    pub ops: Arc<Mutex<Vec<String>>>,
    pub fail_initialize: bool,
    current: Option<Drawable>,
    viewport: PhysicalSize<u32>,
    input: EncoderInput,
}

impl FakeBackend {
    pub fn new(input: EncoderInput) -> Self {
        Self {
            ops: Arc::default(),
            fail_initialize: false,
            current: None,
            viewport: PhysicalSize::new(1, 1),
            input,
        }
    }

    fn log(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }
}

impl RenderBackend for FakeBackend {
    fn initialize(&mut self) -> Result<(), ContextError> {
        self.log("initialize");
        if self.fail_initialize {
            return Err(ContextError::Configuration("no 8888 config".into()));
        }
        self.input.set_max_dimension(FAKE_MAX_DIMENSION);
        self.current = Some(Drawable::Onscreen);
        Ok(())
    }

    fn create_encoder_drawable(&mut self) -> Result<(), ContextError> {
        self.log("encoder drawable");
        if self.current != Some(Drawable::Onscreen) {
            return Err(ContextError::NotCurrent);
        }
        Ok(())
    }

    fn set_viewport(&mut self, size: PhysicalSize<u32>) {
        self.log(format!("viewport {}x{}", size.width, size.height));
        self.viewport = size;
    }

    fn make_current(&mut self, drawable: Drawable) -> Result<(), ContextError> {
        self.log(format!("current {drawable:?}"));
        self.current = Some(drawable);
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<Frame<'_>, ContextError> {
        let drawable = self.current.ok_or(ContextError::NotCurrent)?;
        let size = match drawable {
            Drawable::Onscreen => self.viewport,
            Drawable::Encoder => self.input.size().unwrap_or(self.viewport),
        };
        Ok(Frame::detached(drawable, size))
    }

    fn present(&mut self) -> Result<(), ContextError> {
        let drawable = self.current.ok_or(ContextError::NotCurrent)?;
        self.log(format!("present {drawable:?}"));
        Ok(())
    }

    fn teardown(&mut self) {
        self.log("teardown");
        self.current = None;
    }
}

/// Hands out [`FakeBackend`]s that share one operation log.
#[derive(Clone, Default)]
pub(crate) struct FakeFactory {
    pub ops: Arc<Mutex<Vec<String>>>,
    pub fail_initialize: bool,
    pub created: Arc<Mutex<usize>>,
}

impl FakeFactory {
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        *self.created.lock().unwrap()
    }
}

impl BackendFactory for FakeFactory {
    type Window = ();
    type Backend = FakeBackend;

    fn create(&mut self, _window: (), encoder_input: EncoderInput) -> FakeBackend {
        *self.created.lock().unwrap() += 1;
        let mut backend = FakeBackend::new(encoder_input);
        backend.ops = self.ops.clone();
        backend.fail_initialize = self.fail_initialize;
        backend
    }
}
