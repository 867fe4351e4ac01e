use std::io;
use std::path::PathBuf;

/// Failures raised while building or driving the graphics context.
///
/// A `Configuration` error is fatal for the render thread that hit it: the
/// thread stops and a later `resume` has to rebuild the whole pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no compatible pixel configuration: {0}")]
    Configuration(String),
    #[error("failed to acquire window handle: {0}")]
    Handle(#[from] raw_window_handle::HandleError),
    #[error("failed to create rendering surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("failed to find a suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("failed to acquire frame: {0}")]
    Frame(#[from] wgpu::SurfaceError),
    #[error("encoder readback failed: {0}")]
    Readback(String),
    #[error("no drawable is bound")]
    NotCurrent,
    #[error("render thread panicked")]
    Panicked,
}

impl ContextError {
    /// Configuration failures cannot be retried on the same thread instance.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ContextError::Frame(_) | ContextError::Readback(_))
    }
}

/// Failures reported by the recording session.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Preparation failed; `path` is the output target or the encoder binary.
    #[error("cannot prepare recording at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The running encoder failed to start or to finish.
    #[error("encoder failed: {0}")]
    Rejected(String),
    #[error("invalid recorder state: {0}")]
    InvalidState(&'static str),
}

impl RecorderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RecorderError::Io {
            path: path.into(),
            source,
        }
    }
}
