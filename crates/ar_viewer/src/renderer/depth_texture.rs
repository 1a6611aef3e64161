//! GPU copy of the current depth snapshot.
//!
//! Two 8-bit channels (low, high), linear filtering, clamp-to-edge. Written
//! every frame; the texture object is reallocated only when the snapshot
//! size changes.

use depth_ar::depth::BYTES_PER_TEXEL;
use std::borrow::Cow;

pub const DEPTH_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg8Unorm;

pub struct DepthTexture {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    size: (u32, u32),
    reallocs: u64,
}

fn create(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Real-World Depth Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Pads a short payload with zero texels (0 m, "no data").
pub fn padded_payload(data: &[u8], width: u32, height: u32) -> Cow<'_, [u8]> {
    let expected = width as usize * height as usize * BYTES_PER_TEXEL;
    if data.len() >= expected {
        Cow::Borrowed(&data[..expected])
    } else {
        let mut buf = data.to_vec();
        buf.resize(expected, 0);
        Cow::Owned(buf)
    }
}

impl DepthTexture {
    /// A 1x1 "no data" texture so bind groups are valid before the first
    /// snapshot.
    pub fn new(device: &wgpu::Device) -> Self {
        let (texture, view) = create(device, 1, 1);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Depth Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
            size: (1, 1),
            reallocs: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Texture reallocations caused by snapshot size changes.
    #[inline]
    pub fn reallocs(&self) -> u64 {
        self.reallocs
    }

    /// Writes one snapshot. Returns `true` when the texture was reallocated
    /// and bind groups referencing [`Self::view`] must be rebuilt.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> bool {
        if width == 0 || height == 0 {
            return false;
        }

        let realloc = self.size != (width, height);
        if realloc {
            log::debug!(
                "Depth texture {}x{} -> {}x{}",
                self.size.0,
                self.size.1,
                width,
                height
            );
            let (texture, view) = create(device, width, height);
            self.texture = texture;
            self.view = view;
            self.size = (width, height);
            self.reallocs += 1;
        }

        let payload = padded_payload(data, width, height);
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &payload,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * BYTES_PER_TEXEL as u32),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        realloc
    }
}
