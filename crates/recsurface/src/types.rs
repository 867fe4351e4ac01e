use std::fmt;
use std::time::Duration;

use winit::dpi::PhysicalSize;

/// Default pause between render-loop ticks (roughly 60 ticks per second).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Clear colour applied when a drawable is first bound.
pub const CLEAR_COLOR: [f64; 4] = [0.1, 0.1, 0.1, 1.0];

/// Decides when the render loop asks the callbacks for a frame.
///
/// * `Continuous` renders on every tick that is not paused.
/// * `OnDemand` renders only after [`crate::RecordableView::request_render`];
///   any number of requests issued between two ticks collapse into one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Continuous,
    OnDemand,
}

impl RenderMode {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            RenderMode::Continuous => 0,
            RenderMode::OnDemand => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => RenderMode::OnDemand,
            _ => RenderMode::Continuous,
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Continuous => f.write_str("continuous"),
            RenderMode::OnDemand => f.write_str("on-demand"),
        }
    }
}

/// The two render targets bound to a graphics context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Drawable {
    /// Presented to the window.
    Onscreen,
    /// Presented into the encoder input consumed by the recording session.
    Encoder,
}

/// Requested pixel configuration for both drawables.
///
/// Mirrors the attributes a platform config chooser would match on: channel
/// depths, shader capability, and whether the encoder needs to read presented
/// frames back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelConfig {
    pub red_bits: u8,
    pub green_bits: u8,
    pub blue_bits: u8,
    pub alpha_bits: u8,
    /// Require a shader-capable (programmable pipeline) adapter.
    pub shader_capable: bool,
    /// Request readback support so presented frames can feed an encoder.
    pub recordable: bool,
}

impl Default for PixelConfig {
    fn default() -> Self {
        Self {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            shader_capable: true,
            recordable: true,
        }
    }
}

impl PixelConfig {
    /// Returns true when the surface format satisfies the requested channel depths.
    pub fn matches(&self, format: wgpu::TextureFormat) -> bool {
        let eight_bit = self.red_bits == 8
            && self.green_bits == 8
            && self.blue_bits == 8
            && self.alpha_bits == 8;
        eight_bit
            && matches!(
                format,
                wgpu::TextureFormat::Rgba8Unorm
                    | wgpu::TextureFormat::Rgba8UnormSrgb
                    | wgpu::TextureFormat::Bgra8Unorm
                    | wgpu::TextureFormat::Bgra8UnormSrgb
            )
    }
}

/// Fixed encoder defaults; the session does not expose tuning beyond these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderDefaults {
    pub video_bitrate: u32,
    pub video_frame_rate: u32,
    pub audio_sample_rate: u32,
    pub audio_bitrate: u32,
    pub audio_channels: u32,
}

pub const ENCODER_DEFAULTS: EncoderDefaults = EncoderDefaults {
    video_bitrate: 12_000_000,
    video_frame_rate: 30,
    audio_sample_rate: 44_100,
    audio_bitrate: 96_000,
    audio_channels: 2,
};

/// Clamps a requested size to at least one pixel on each axis.
pub(crate) fn clamp_size(size: PhysicalSize<u32>) -> PhysicalSize<u32> {
    PhysicalSize::new(size.width.max(1), size.height.max(1))
}
