use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;

use crate::error::ContextError;
use crate::types::{clamp_size, PixelConfig};

use super::encoder_target::{ENCODER_FORMAT, ENCODER_USAGES};

/// wgpu device plus the onscreen surface it presents to.
pub(crate) struct GraphicsContext {
    // Dropped before the instance.
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    max_dimension: u32,
    _instance: wgpu::Instance,
}

impl GraphicsContext {
    /// Builds the context and configures the onscreen surface.
    ///
    /// `target` must outlive the returned context: the surface holds raw
    /// handles into it.
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        pixel: &PixelConfig,
    ) -> Result<Self, ContextError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::default();

        let window_handle = target.window_handle()?;
        let display_handle = target.display_handle()?;

        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let adapter_info = adapter.get_info();
        info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        if pixel.shader_capable {
            let downlevel = adapter.get_downlevel_capabilities();
            if matches!(downlevel.shader_model, wgpu::ShaderModel::Sm2) {
                return Err(ContextError::Configuration(format!(
                    "adapter {} does not support programmable shaders",
                    adapter_info.name
                )));
            }
        }

        let limits = adapter.limits();
        let max_dimension = limits.max_texture_dimension_2d;
        let size = clamp_size(initial_size);
        if size.width > max_dimension || size.height > max_dimension {
            return Err(ContextError::Configuration(format!(
                "GPU max texture dimension is {max_dimension}, requested surface is {}x{}",
                size.width, size.height
            )));
        }

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| pixel.matches(*format))
            .ok_or_else(|| {
                ContextError::Configuration(format!(
                    "surface offers none of the requested {}-{}-{}-{} formats (available: {:?})",
                    pixel.red_bits,
                    pixel.green_bits,
                    pixel.blue_bits,
                    pixel.alpha_bits,
                    surface_caps.formats
                ))
            })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("recsurface device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;

        if pixel.recordable {
            let allowed = adapter
                .get_texture_format_features(ENCODER_FORMAT)
                .allowed_usages;
            if !supports_encoder_usages(allowed) {
                return Err(ContextError::Configuration(format!(
                    "adapter {} cannot render and read back {ENCODER_FORMAT:?} (allowed: {allowed:?})",
                    adapter_info.name
                )));
            }
        }

        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| surface_caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        debug!(?surface_format, ?present_mode, width = size.width, height = size.height, "configured onscreen surface");

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            max_dimension,
            _instance: instance,
        })
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub(crate) fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let width = new_size.width.min(self.max_dimension);
        let height = new_size.height.min(self.max_dimension);
        if (width, height) != (new_size.width, new_size.height) {
            warn!(
                requested_width = new_size.width,
                requested_height = new_size.height,
                max = self.max_dimension,
                "clamping surface to GPU texture limit"
            );
        }

        self.size = PhysicalSize::new(width, height);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Acquires the next swapchain image, reconfiguring once if the surface
    /// was lost or went stale.
    pub(crate) fn acquire(&mut self) -> Result<wgpu::SurfaceTexture, ContextError> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                warn!(error = %err, "surface invalidated; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                Ok(self.surface.get_current_texture()?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Whether a recordable configuration can back the encoder drawable.
fn supports_encoder_usages(allowed: wgpu::TextureUsages) -> bool {
    allowed.contains(ENCODER_USAGES)
}
