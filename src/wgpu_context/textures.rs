//! Texture storage and pixel read-back for [`WgpuContext`](super::WgpuContext).

use tracing::warn;

use crate::color::Color;
use crate::error::ContextError;
use crate::util::compute_padded_bytes_per_row;

use super::CANVAS_FORMAT;

/// A texture handle's storage. `None` until the first `specify_texture_image`.
#[derive(Default)]
pub(super) struct GpuTexture {
    pub storage: Option<TextureStorage>,
}

pub(super) struct TextureStorage {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

impl TextureStorage {
    /// Allocates a zero-initialized (transparent) texture usable as a render target, a
    /// sampled input and a copy source.
    pub fn new(device: &wgpu::Device, size: (u32, u32), label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CANVAS_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            size,
        }
    }

    /// Writes tightly packed RGBA8 rows into the whole texture.
    pub fn write(&self, queue: &wgpu::Queue, data: &[u8]) {
        let (width, height) = self.size;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

pub(super) fn create_nearest_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("program_input_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// Copies one texel of `storage` into a mappable buffer and reads it back, blocking until
/// the GPU is done.
pub(super) fn read_texel(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    storage: &TextureStorage,
    x: u32,
    y: u32,
) -> Result<Color, ContextError> {
    let (_, padded_bytes_per_row) = compute_padded_bytes_per_row(1, 4);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("pixel_readback_buffer"),
        size: padded_bytes_per_row as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("pixel_readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &storage.texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(1),
            },
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        if sender.send(result).is_err() {
            warn!("Failed to send map_async result from callback");
        }
    });

    let _ = device.poll(wgpu::MaintainBase::Wait);

    receiver
        .recv()
        .map_err(|error| ContextError::Readback(error.to_string()))?
        .map_err(|error| ContextError::Readback(error.to_string()))?;

    let mapped_range = buffer_slice.get_mapped_range();
    let mut rgba = [0; 4];
    rgba.copy_from_slice(&mapped_range[..4]);
    drop(mapped_range);
    buffer.unmap();

    Ok(Color(rgba))
}
