//! Demo client: clears each drawable with a slowly cycling colour.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use recsurface::{Frame, RendererCallbacks};
use tracing::{debug, info};

const CYCLE_SECONDS: f64 = 6.0;
const ENCODER_TINT: [f64; 3] = [0.85, 0.2, 0.2];
const TINT_WEIGHT: f64 = 0.2;

#[derive(Default)]
pub struct Scene {
    started: Mutex<Option<Instant>>,
    elapsed_micros: AtomicU64,
    frames: AtomicU64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn elapsed_seconds(&self) -> f64 {
        self.elapsed_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

/// Colour for time `t` seconds; the encoder copy is pulled towards red.
pub fn colour_at(t: f64, encoder: bool) -> wgpu::Color {
    let phase = (t / CYCLE_SECONDS) * TAU;
    let channel = |offset: f64| 0.35 + 0.3 * (phase + offset).sin();
    let mut rgb = [channel(0.0), channel(TAU / 3.0), channel(2.0 * TAU / 3.0)];
    if encoder {
        for (value, tint) in rgb.iter_mut().zip(ENCODER_TINT) {
            *value = *value * (1.0 - TINT_WEIGHT) + tint * TINT_WEIGHT;
        }
    }
    wgpu::Color {
        r: rgb[0],
        g: rgb[1],
        b: rgb[2],
        a: 1.0,
    }
}

impl RendererCallbacks for Scene {
    fn on_surface_created(&self) {
        debug!("scene: surface created");
    }

    fn on_context_created(&self) {
        if let Ok(mut started) = self.started.lock() {
            started.get_or_insert_with(Instant::now);
        }
        info!("scene: graphics context ready");
    }

    fn on_surface_changed(&self, width: u32, height: u32) {
        debug!(width, height, "scene: surface changed");
    }

    fn on_surface_destroyed(&self) {
        info!(frames = self.frames(), "scene: surface destroyed");
    }

    fn on_pre_draw_frame(&self) {
        let elapsed = self
            .started
            .lock()
            .ok()
            .and_then(|started| started.as_ref().map(Instant::elapsed))
            .unwrap_or_default();
        self.elapsed_micros
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn on_draw_frame(&self, frame: &Frame<'_>) {
        let Some(target) = frame.target() else {
            return;
        };
        let colour = colour_at(self.elapsed_seconds(), frame.is_encoder());
        let mut encoder = target
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(colour),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        target.queue.submit(std::iter::once(encoder.finish()));
        if !frame.is_encoder() {
            self.frames.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colours_stay_in_range_and_cycle() {
        for step in 0..60 {
            let c = colour_at(step as f64 * 0.1, step % 2 == 0);
            for value in [c.r, c.g, c.b] {
                assert!((0.0..=1.0).contains(&value), "{value} out of range");
            }
        }
        let start = colour_at(0.0, false);
        let wrapped = colour_at(CYCLE_SECONDS, false);
        assert!((start.r - wrapped.r).abs() < 1e-9);
    }

    #[test]
    fn encoder_copy_is_tinted() {
        let plain = colour_at(1.5, false);
        let tinted = colour_at(1.5, true);
        assert_ne!(plain, tinted);
        assert!(tinted.r - tinted.g > plain.r - plain.g);
    }
}
