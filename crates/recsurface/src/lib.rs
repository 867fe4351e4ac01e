//! Recordable render surface.
//!
//! A [`RecordableView`] owns a dedicated render thread that draws into a
//! window through wgpu and, while a recording is active, draws every frame a
//! second time into an offscreen encoder drawable whose pixels stream into an
//! `ffmpeg` process together with a microphone (or silent) audio track.
//!
//! The host acts as the surface provider: it forwards
//! [`RecordableView::surface_created`], [`RecordableView::surface_changed`]
//! and [`RecordableView::surface_destroyed`], and drives pause/resume and the
//! recorder from its own thread. Clients draw by implementing
//! [`RendererCallbacks`]; the view holds them weakly.

mod backend;
mod callbacks;
mod error;
mod gpu;
pub mod recorder;
mod render_loop;
mod state;
mod types;
mod view;

#[cfg(test)]
mod testing;

pub use backend::{BackendFactory, Frame, FrameTarget, RenderBackend};
pub use callbacks::{CallbackSlot, RendererCallbacks};
pub use error::{ContextError, RecorderError};
pub use gpu::{WgpuBackend, WgpuBackendFactory};
pub use recorder::{
    AudioSource, CodecChoice, EncoderInput, ErrorCallback, FfmpegSettings, InfoCallback,
    RecorderFailure, RecorderInfo, VideoCodec,
};
pub use render_loop::{LoopPhase, RenderThread};
pub use state::SharedState;
pub use types::{
    Drawable, EncoderDefaults, PixelConfig, RenderMode, CLEAR_COLOR, DEFAULT_FRAME_INTERVAL,
    ENCODER_DEFAULTS,
};
pub use view::{RecordableView, ViewOptions};

/// View wired to the wgpu backend and the ffmpeg recorder.
pub type WindowView = RecordableView<WgpuBackendFactory>;
