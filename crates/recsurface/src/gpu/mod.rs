//! wgpu implementation of the graphics context and its two drawables.
//!
//! - `context` owns the instance/adapter/device wiring and the onscreen
//!   surface, and rebuilds swapchain state on resize or loss.
//! - `encoder_target` is the offscreen drawable mirrored into the encoder
//!   input: an RGBA texture plus a mapped readback buffer.
//!
//! [`WgpuBackend`] binds them together behind [`RenderBackend`].

mod context;
mod encoder_target;

use std::sync::Arc;

use tracing::{debug, warn};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::{BackendFactory, Frame, FrameTarget, RenderBackend};
use crate::error::ContextError;
use crate::recorder::EncoderInput;
use crate::types::{Drawable, PixelConfig, CLEAR_COLOR};

use self::context::GraphicsContext;
use self::encoder_target::{EncoderTarget, ENCODER_FORMAT};

enum Acquired {
    Onscreen {
        texture: wgpu::SurfaceTexture,
        view: wgpu::TextureView,
    },
    Encoder,
}

/// Render-thread owner of the wgpu context and both drawables.
pub struct WgpuBackend {
    // Field order matters: GPU state is dropped before the window it renders into.
    acquired: Option<Acquired>,
    encoder: Option<EncoderTarget>,
    context: Option<GraphicsContext>,
    current: Option<Drawable>,
    viewport: PhysicalSize<u32>,
    pixel: PixelConfig,
    input: EncoderInput,
    window: Arc<Window>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>, input: EncoderInput, pixel: PixelConfig) -> Self {
        let viewport = window.inner_size();
        Self {
            acquired: None,
            encoder: None,
            context: None,
            current: None,
            viewport,
            pixel,
            input,
            window,
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn initialize(&mut self) -> Result<(), ContextError> {
        let size = self.window.inner_size();
        let context = GraphicsContext::new(self.window.as_ref(), size, &self.pixel)?;
        self.viewport = context.size;
        self.input.set_max_dimension(context.max_dimension());
        debug!(format = ?context.format(), "graphics context ready");
        self.context = Some(context);
        self.current = Some(Drawable::Onscreen);
        Ok(())
    }

    fn create_encoder_drawable(&mut self) -> Result<(), ContextError> {
        if self.current != Some(Drawable::Onscreen) {
            return Err(ContextError::NotCurrent);
        }
        let context = self.context.as_ref().ok_or(ContextError::NotCurrent)?;
        let wanted = self.input.size().unwrap_or(self.viewport);
        self.encoder = Some(EncoderTarget::new(
            &context.device,
            wanted,
            context.max_dimension(),
            self.input.clone(),
        ));
        Ok(())
    }

    fn set_viewport(&mut self, size: PhysicalSize<u32>) {
        self.viewport = size;
        if let Some(context) = self.context.as_mut() {
            context.resize(size);
        }
    }

    fn make_current(&mut self, drawable: Drawable) -> Result<(), ContextError> {
        if self.context.is_none() {
            return Err(ContextError::NotCurrent);
        }
        if drawable == Drawable::Encoder && self.encoder.is_none() {
            return Err(ContextError::NotCurrent);
        }
        if self.acquired.take().is_some() {
            debug!("dropping unpresented frame on rebind");
        }
        self.current = Some(drawable);
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<Frame<'_>, ContextError> {
        let drawable = self.current.ok_or(ContextError::NotCurrent)?;
        match drawable {
            Drawable::Onscreen => {
                let context = self.context.as_mut().ok_or(ContextError::NotCurrent)?;
                let texture = context.acquire()?;
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                clear_view(&context.device, &context.queue, &view);
                self.acquired = Some(Acquired::Onscreen { texture, view });
            }
            Drawable::Encoder => {
                let viewport = self.viewport;
                let context = self.context.as_ref().ok_or(ContextError::NotCurrent)?;
                let target = self.encoder.as_mut().ok_or(ContextError::NotCurrent)?;
                target.sync_size(&context.device, viewport);
                clear_view(&context.device, &context.queue, target.view());
                self.acquired = Some(Acquired::Encoder);
            }
        }

        let context = self.context.as_ref().ok_or(ContextError::NotCurrent)?;
        let (view, format, size) = match (&self.acquired, &self.encoder) {
            (Some(Acquired::Onscreen { view, .. }), _) => (view, context.format(), context.size),
            (Some(Acquired::Encoder), Some(target)) => (target.view(), ENCODER_FORMAT, target.size()),
            _ => return Err(ContextError::NotCurrent),
        };
        Ok(Frame::new(
            drawable,
            size,
            FrameTarget {
                device: &context.device,
                queue: &context.queue,
                view,
                format,
            },
        ))
    }

    fn present(&mut self) -> Result<(), ContextError> {
        match self.acquired.take() {
            Some(Acquired::Onscreen { texture, view }) => {
                drop(view);
                self.window.pre_present_notify();
                texture.present();
                Ok(())
            }
            Some(Acquired::Encoder) => {
                let context = self.context.as_ref().ok_or(ContextError::NotCurrent)?;
                let target = self.encoder.as_ref().ok_or(ContextError::NotCurrent)?;
                target.present(&context.device, &context.queue)?;
                Ok(())
            }
            None => Err(ContextError::NotCurrent),
        }
    }

    fn teardown(&mut self) {
        self.current = None;
        self.acquired = None;
        if let Some(target) = self.encoder.take() {
            target.release();
        }
        if let Some(context) = self.context.take() {
            drop(context);
            debug!("graphics context destroyed");
        }
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        if self.context.is_some() {
            warn!("graphics context dropped without teardown");
            self.teardown();
        }
    }
}

fn clear_view(device: &wgpu::Device, queue: &wgpu::Queue, view: &wgpu::TextureView) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("clear encoder"),
    });
    {
        let [r, g, b, a] = CLEAR_COLOR;
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
    }
    queue.submit(std::iter::once(encoder.finish()));
}

/// Builds a [`WgpuBackend`] per render-thread instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct WgpuBackendFactory {
    pub pixel: PixelConfig,
}

impl WgpuBackendFactory {
    pub fn new(pixel: PixelConfig) -> Self {
        Self { pixel }
    }
}

impl BackendFactory for WgpuBackendFactory {
    type Window = Arc<Window>;
    type Backend = WgpuBackend;

    fn create(&mut self, window: Arc<Window>, encoder_input: EncoderInput) -> WgpuBackend {
        WgpuBackend::new(window, encoder_input, self.pixel)
    }
}
