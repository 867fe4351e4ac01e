//! Offscreen drawable whose presented frames feed the encoder input.

use std::time::Instant;

use tracing::{debug, trace, warn};
use winit::dpi::PhysicalSize;

use crate::error::ContextError;
use crate::recorder::{EncoderInput, VideoFrame};
use crate::types::clamp_size;

/// Matches the `rgba` rawvideo layout the encoder expects.
pub(crate) const ENCODER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Rendered into, then copied out for readback.
pub(crate) const ENCODER_USAGES: wgpu::TextureUsages =
    wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::COPY_SRC);

const BYTES_PER_PIXEL: u32 = 4;

pub(crate) struct EncoderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    size: PhysicalSize<u32>,
    padded_bytes_per_row: u32,
    max_dimension: u32,
    input: EncoderInput,
}

impl EncoderTarget {
    pub(crate) fn new(
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
        max_dimension: u32,
        input: EncoderInput,
    ) -> Self {
        let size = fit_to_limit(size, max_dimension);
        let (texture, view, readback, padded_bytes_per_row) = allocate(device, size);
        debug!(width = size.width, height = size.height, "created encoder drawable");
        Self {
            texture,
            view,
            readback,
            size,
            padded_bytes_per_row,
            max_dimension,
            input,
        }
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Follows the size requested by the recorder, falling back to `viewport`
    /// while no recorder has been prepared.
    ///
    /// Recorders are refused above the device limit once it is published; one
    /// prepared before that gets a clamped drawable and its frames are dropped
    /// by the writer as mismatched.
    pub(crate) fn sync_size(&mut self, device: &wgpu::Device, viewport: PhysicalSize<u32>) {
        let requested = self.input.size().unwrap_or(viewport);
        let wanted = fit_to_limit(requested, self.max_dimension);
        if wanted == self.size {
            return;
        }
        if wanted != clamp_size(requested) {
            warn!(
                width = requested.width,
                height = requested.height,
                max = self.max_dimension,
                "encoder size exceeds GPU texture limit; clamping"
            );
        }
        let (texture, view, readback, padded_bytes_per_row) = allocate(device, wanted);
        self.texture = texture;
        self.view = view;
        self.readback = readback;
        self.padded_bytes_per_row = padded_bytes_per_row;
        self.size = wanted;
        debug!(width = wanted.width, height = wanted.height, "resized encoder drawable");
    }

    /// Copies the rendered image out of the GPU and queues it on the encoder input.
    pub(crate) fn present(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<bool, ContextError> {
        if self.input.is_released() {
            return Ok(false);
        }

        let PhysicalSize { width, height } = self.size;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("encoder readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = self.readback.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| ContextError::Readback(err.to_string()))?;
        rx.recv()
            .map_err(|err| ContextError::Readback(err.to_string()))?
            .map_err(|err| ContextError::Readback(err.to_string()))?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, width, height, self.padded_bytes_per_row)
        };
        self.readback.unmap();

        let queued = self.input.submit(VideoFrame {
            width,
            height,
            pixels,
            presented_at: Instant::now(),
        });
        trace!(queued, "presented encoder frame");
        Ok(queued)
    }

    pub(crate) fn release(&self) {
        self.texture.destroy();
        self.readback.destroy();
    }
}

fn allocate(
    device: &wgpu::Device,
    size: PhysicalSize<u32>,
) -> (wgpu::Texture, wgpu::TextureView, wgpu::Buffer, u32) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("encoder drawable"),
        size: wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: ENCODER_FORMAT,
        usage: ENCODER_USAGES,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let padded_bytes_per_row = padded_row_bytes(size.width);
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("encoder readback buffer"),
        size: u64::from(padded_bytes_per_row) * u64::from(size.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    (texture, view, readback, padded_bytes_per_row)
}

fn fit_to_limit(size: PhysicalSize<u32>, max_dimension: u32) -> PhysicalSize<u32> {
    let size = clamp_size(size);
    PhysicalSize::new(size.width.min(max_dimension), size.height.min(max_dimension))
}

fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn unpad_rows(data: &[u8], width: u32, height: u32, padded_bytes_per_row: u32) -> Vec<u8> {
    let row_bytes = (width * BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(padded_bytes_per_row as usize).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
        assert_eq!(padded_row_bytes(1920), 7680);
    }

    #[test]
    fn drawable_size_stays_within_device_limit() {
        assert_eq!(
            fit_to_limit(PhysicalSize::new(16_384, 720), 8192),
            PhysicalSize::new(8192, 720)
        );
        assert_eq!(
            fit_to_limit(PhysicalSize::new(0, 0), 8192),
            PhysicalSize::new(1, 1)
        );
        assert_eq!(
            fit_to_limit(PhysicalSize::new(1280, 720), 8192),
            PhysicalSize::new(1280, 720)
        );
    }

    #[test]
    fn unpad_strips_row_padding() {
        let padded = padded_row_bytes(2) as usize;
        let mut data = vec![0xAA; padded * 2];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[padded..padded + 8].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);
        let pixels = unpad_rows(&data, 2, 2, padded as u32);
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
    }
}
