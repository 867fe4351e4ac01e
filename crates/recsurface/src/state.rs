//! Flags shared between the control thread and the render thread.
//!
//! Each field has one writer per side and is read across threads. The fields
//! are independent atomics, not a single snapshot: a resize and a render
//! request observed one tick apart is expected behaviour.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use winit::dpi::PhysicalSize;

use crate::types::RenderMode;

#[derive(Debug)]
pub struct SharedState {
    paused: AtomicBool,
    render_mode: AtomicU8,
    render_requested: AtomicBool,
    size_changed: AtomicBool,
    width: AtomicU32,
    height: AtomicU32,
    recording: AtomicBool,
    has_context: AtomicBool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            paused: AtomicBool::new(false),
            render_mode: AtomicU8::new(RenderMode::Continuous.as_u8()),
            render_requested: AtomicBool::new(false),
            size_changed: AtomicBool::new(false),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            recording: AtomicBool::new(false),
            has_context: AtomicBool::new(false),
        }
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_render_mode(&self, mode: RenderMode) {
        self.render_mode.store(mode.as_u8(), Ordering::SeqCst);
    }

    pub fn render_mode(&self) -> RenderMode {
        RenderMode::from_u8(self.render_mode.load(Ordering::SeqCst))
    }

    pub fn request_render(&self) {
        self.render_requested.store(true, Ordering::SeqCst);
    }

    /// Clears a pending render request, returning whether one was set.
    pub fn take_render_request(&self) -> bool {
        self.render_requested.swap(false, Ordering::SeqCst)
    }

    /// Records new surface dimensions.
    ///
    /// The pending-resize flag is only raised when either axis differs from
    /// the last recorded value, so repeated notifications with the same size
    /// never reach the callbacks.
    pub fn record_size(&self, width: u32, height: u32) -> bool {
        let mut changed = false;
        if self.width.swap(width, Ordering::SeqCst) != width {
            changed = true;
        }
        if self.height.swap(height, Ordering::SeqCst) != height {
            changed = true;
        }
        if changed {
            self.size_changed.store(true, Ordering::SeqCst);
        }
        changed
    }

    /// Consumes the pending-resize flag and returns the size to apply.
    pub fn take_resize(&self) -> Option<PhysicalSize<u32>> {
        if self.size_changed.swap(false, Ordering::SeqCst) {
            Some(self.size())
        } else {
            None
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(
            self.width.load(Ordering::SeqCst),
            self.height.load(Ordering::SeqCst),
        )
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub(crate) fn set_has_context(&self, alive: bool) {
        self.has_context.store(alive, Ordering::SeqCst);
    }

    pub fn has_context(&self) -> bool {
        self.has_context.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_requests_coalesce() {
        let state = SharedState::new();
        state.request_render();
        state.request_render();
        state.request_render();
        assert!(state.take_render_request());
        assert!(!state.take_render_request());
    }

    #[test]
    fn resize_flag_only_raised_on_change() {
        let state = SharedState::new();
        assert!(state.record_size(800, 600));
        assert_eq!(state.take_resize(), Some(PhysicalSize::new(800, 600)));
        assert!(!state.record_size(800, 600));
        assert_eq!(state.take_resize(), None);
        assert!(state.record_size(800, 480));
        assert_eq!(state.take_resize(), Some(PhysicalSize::new(800, 480)));
    }
}
