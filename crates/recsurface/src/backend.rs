//! Seam between the render loop and whatever owns the graphics context.
//!
//! The loop only ever talks to a [`RenderBackend`]: build the context and the
//! onscreen drawable, then the encoder drawable, bind one of them, hand a [`Frame`] to the callbacks,
//! present, tear down. [`crate::gpu::WgpuBackend`] is the production
//! implementation; tests drive the loop with a headless backend.

use winit::dpi::PhysicalSize;

use crate::error::ContextError;
use crate::recorder::EncoderInput;
use crate::types::Drawable;

/// GPU handles for the drawable currently bound.
#[derive(Clone, Copy)]
pub struct FrameTarget<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

/// One draw request handed to [`crate::RendererCallbacks::on_draw_frame`].
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    drawable: Drawable,
    size: PhysicalSize<u32>,
    target: Option<FrameTarget<'a>>,
}

impl<'a> Frame<'a> {
    pub fn new(drawable: Drawable, size: PhysicalSize<u32>, target: FrameTarget<'a>) -> Self {
        Self {
            drawable,
            size,
            target: Some(target),
        }
    }

    /// Frame without GPU handles, for backends that do not expose wgpu.
    pub fn detached(drawable: Drawable, size: PhysicalSize<u32>) -> Self {
        Self {
            drawable,
            size,
            target: None,
        }
    }

    pub fn drawable(&self) -> Drawable {
        self.drawable
    }

    pub fn is_encoder(&self) -> bool {
        self.drawable == Drawable::Encoder
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn target(&self) -> Option<&FrameTarget<'a>> {
        self.target.as_ref()
    }
}

/// Graphics context operations the render thread needs.
///
/// Every method is called from the render thread only.
pub trait RenderBackend: Send + 'static {
    /// Creates the context and the onscreen drawable, and binds it current.
    fn initialize(&mut self) -> Result<(), ContextError>;

    /// Creates the encoder drawable; only valid after [`RenderBackend::initialize`].
    fn create_encoder_drawable(&mut self) -> Result<(), ContextError>;

    fn set_viewport(&mut self, size: PhysicalSize<u32>);

    /// Binds `drawable` as the target for the next frame.
    fn make_current(&mut self, drawable: Drawable) -> Result<(), ContextError>;

    /// Acquires the bound drawable's next image.
    fn begin_frame(&mut self) -> Result<Frame<'_>, ContextError>;

    /// Presents the image acquired by [`RenderBackend::begin_frame`].
    fn present(&mut self) -> Result<(), ContextError>;

    /// Unbinds and destroys everything. Safe to call more than once.
    fn teardown(&mut self);
}

/// Builds a fresh backend for each render-thread instance.
pub trait BackendFactory {
    /// Native window type handed over by the surface provider.
    type Window: Clone;
    type Backend: RenderBackend;

    fn create(&mut self, window: Self::Window, encoder_input: EncoderInput) -> Self::Backend;
}
