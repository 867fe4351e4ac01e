use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use winit::dpi::PhysicalSize;

/// Frames buffered between the render thread and the encoder writer.
const INPUT_QUEUE_DEPTH: usize = 8;

/// One presented encoder frame: tightly packed RGBA rows.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub presented_at: Instant,
}

/// Persistent encoder input surface.
///
/// Created before any recorder exists and handed to both sides: the render
/// thread presents the encoder drawable into it, the recording session drains
/// it. The consumer decides the frame size on prepare. Released when the
/// render thread shuts down; a new one is created with the next pipeline.
#[derive(Clone)]
pub struct EncoderInput {
    inner: Arc<InputInner>,
}

struct InputInner {
    tx: Sender<VideoFrame>,
    rx: Receiver<VideoFrame>,
    width: AtomicU32,
    height: AtomicU32,
    max_dimension: AtomicU32,
    released: AtomicBool,
}

impl EncoderInput {
    pub fn new() -> Self {
        let (tx, rx) = bounded(INPUT_QUEUE_DEPTH);
        Self {
            inner: Arc::new(InputInner {
                tx,
                rx,
                width: AtomicU32::new(0),
                height: AtomicU32::new(0),
                max_dimension: AtomicU32::new(0),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Sets the frame size the consumer expects; discards frames of the old size.
    pub fn configure(&self, width: u32, height: u32) {
        self.inner.width.store(width, Ordering::SeqCst);
        self.inner.height.store(height, Ordering::SeqCst);
        self.drain();
    }

    /// Size requested by the consumer, or `None` before any recorder was prepared.
    pub fn size(&self) -> Option<PhysicalSize<u32>> {
        let width = self.inner.width.load(Ordering::SeqCst);
        let height = self.inner.height.load(Ordering::SeqCst);
        if width == 0 || height == 0 {
            None
        } else {
            Some(PhysicalSize::new(width, height))
        }
    }

    /// Published by the render thread once its device exists.
    pub fn set_max_dimension(&self, max: u32) {
        self.inner.max_dimension.store(max, Ordering::SeqCst);
    }

    /// Largest texture side the device accepts, once known.
    pub fn max_dimension(&self) -> Option<u32> {
        match self.inner.max_dimension.load(Ordering::SeqCst) {
            0 => None,
            max => Some(max),
        }
    }

    /// Queues a presented frame. Drops it when the consumer is behind or the
    /// input has been released.
    pub fn submit(&self, frame: VideoFrame) -> bool {
        if self.is_released() {
            return false;
        }
        match self.inner.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("encoder input full; dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn frames(&self) -> Receiver<VideoFrame> {
        self.inner.rx.clone()
    }

    pub fn drain(&self) -> usize {
        self.inner.rx.try_iter().count()
    }

    pub fn release(&self) {
        if !self.inner.released.swap(true, Ordering::SeqCst) {
            let dropped = self.drain();
            tracing::debug!(dropped, "released encoder input");
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }
}

impl Default for EncoderInput {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EncoderInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderInput")
            .field("size", &self.size())
            .field("max_dimension", &self.max_dimension())
            .field("queued", &self.inner.rx.len())
            .field("released", &self.is_released())
            .finish()
    }
}
