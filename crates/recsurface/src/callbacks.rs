use std::sync::{Arc, RwLock, Weak};

use crate::backend::Frame;

/// Lifecycle hooks invoked on the render thread.
///
/// All methods have empty defaults so a client only overrides what it needs.
/// `on_draw_frame` runs once per rendered tick against the onscreen drawable
/// and a second time against the encoder drawable while recording; the
/// [`Frame`] says which one is bound.
pub trait RendererCallbacks: Send + Sync {
    /// The onscreen drawable exists and the context is bound against it; the
    /// encoder drawable has not been created yet.
    fn on_surface_created(&self) {}

    /// Width or height differs from the last delivered value.
    fn on_surface_changed(&self, _width: u32, _height: u32) {}

    /// Called just before the context is torn down.
    fn on_surface_destroyed(&self) {}

    /// Both drawables exist and the context is current.
    fn on_context_created(&self) {}

    /// Hook for advancing clocks or other pre-frame state.
    fn on_pre_draw_frame(&self) {}

    fn on_draw_frame(&self, _frame: &Frame<'_>) {}
}

/// Non-owning slot for the client callbacks.
///
/// The view stores a `Weak` so the client keeps ownership; once the client
/// drops its `Arc` every call site silently becomes a no-op.
#[derive(Clone, Default)]
pub struct CallbackSlot {
    inner: Arc<RwLock<Option<Weak<dyn RendererCallbacks>>>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, callbacks: &Arc<dyn RendererCallbacks>) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(Arc::downgrade(callbacks));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = None;
        }
    }

    /// Upgrades the stored reference, if the client is still alive.
    pub fn get(&self) -> Option<Arc<dyn RendererCallbacks>> {
        self.inner
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade))
    }

    /// Runs `f` against the callbacks when present; absence is a no-op.
    pub fn with<F>(&self, f: F)
    where
        F: FnOnce(&dyn RendererCallbacks),
    {
        if let Some(callbacks) = self.get() {
            f(callbacks.as_ref());
        }
    }
}

impl std::fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("attached", &self.get().is_some())
            .finish()
    }
}
