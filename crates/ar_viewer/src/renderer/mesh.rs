//! Built-in models: a placement reticle and a textured cube.

use depth_ar::config::{INDICATOR_MODEL, PLACED_MODEL};
use depth_ar::ModelRef;
use std::collections::HashMap;
use std::f32::consts::TAU;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

const _: [(); 32] = [(); core::mem::size_of::<MeshVertex>()];

impl MeshVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as u64,
            step_mode:    wgpu::VertexStepMode::Vertex,
            attributes:   &Self::ATTRIBS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

/// RGBA8 sRGB texels, row-major.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Unit cube resting on y = 0, x/z in [-0.5, 0.5].
pub fn cube() -> MeshData {
    // (normal, u axis, v axis) per face.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut mesh = MeshData::default();
    for (n, u, v) in FACES {
        let base = mesh.vertices.len() as u16;
        for (cu, cv) in CORNERS {
            let p = [0, 1, 2].map(|i| 0.5 * (n[i] + cu * u[i] + cv * v[i]));
            mesh.vertices.push(MeshVertex {
                position: [p[0], p[1] + 0.5, p[2]],
                normal: n,
                uv: [(cu + 1.0) * 0.5, 1.0 - (cv + 1.0) * 0.5],
            });
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// Flat annulus in the XZ plane facing +Y.
pub fn ring(inner: f32, outer: f32, segments: u16) -> MeshData {
    let segments = segments.max(3);
    let mut mesh = MeshData::default();
    for i in 0..=segments {
        let t = i as f32 / segments as f32;
        let (s, c) = (t * TAU).sin_cos();
        for (r, v) in [(inner, 1.0), (outer, 0.0)] {
            mesh.vertices.push(MeshVertex {
                position: [c * r, 0.0, s * r],
                normal: [0.0, 1.0, 0.0],
                uv: [t, v],
            });
        }
    }
    for i in 0..segments {
        let a = i * 2;
        mesh.indices
            .extend_from_slice(&[a, a + 2, a + 1, a + 1, a + 2, a + 3]);
    }
    mesh
}

pub fn solid_texture(rgba: [u8; 4]) -> TextureData {
    TextureData {
        width: 1,
        height: 1,
        rgba: rgba.to_vec(),
    }
}

/// `size` × `size` checkerboard with `cells` squares per side.
pub fn checker_texture(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> TextureData {
    let cell = (size / cells.max(1)).max(1);
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let c = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
            rgba.extend_from_slice(&c);
        }
    }
    TextureData {
        width: size,
        height: size,
        rgba,
    }
}

/// CPU geometry + texture for a built-in model name.
pub fn builtin_model(name: &str) -> Option<(MeshData, TextureData)> {
    match name {
        INDICATOR_MODEL => Some((ring(0.08, 0.10, 48), solid_texture([240, 240, 240, 255]))),
        PLACED_MODEL => Some((
            cube(),
            checker_texture(64, 4, [230, 120, 40, 255], [250, 210, 150, 255]),
        )),
        _ => None,
    }
}

/// Uploaded model: geometry plus its object-texture bind group.
pub struct GpuModel {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub texture_bg: wgpu::BindGroup,
    _texture: wgpu::Texture,
}

impl GpuModel {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        name: &str,
        mesh: &MeshData,
        tex: &TextureData,
        texture_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label:    Some(&format!("{name} VB")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage:    wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label:    Some(&format!("{name} IB")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage:    wgpu::BufferUsages::INDEX,
        });

        let size = wgpu::Extent3d {
            width: tex.width,
            height: tex.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{name} Albedo")),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &tex.rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(tex.width * 4),
                rows_per_image: Some(tex.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let texture_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label:   Some(&format!("{name} Texture BG")),
            layout:  texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding:  0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding:  1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            texture_bg,
            _texture: texture,
        }
    }
}

/// Uploaded models keyed by model name.
#[derive(Default)]
pub struct ModelLibrary {
    models: HashMap<String, GpuModel>,
}

impl ModelLibrary {
    /// Uploads every built-in model.
    pub fn builtin(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> Self {
        let mut lib = Self::default();
        for name in [INDICATOR_MODEL, PLACED_MODEL] {
            if let Some((mesh, tex)) = builtin_model(name) {
                let model = GpuModel::upload(device, queue, name, &mesh, &tex, texture_layout, sampler);
                lib.models.insert(name.to_owned(), model);
            }
        }
        log::info!("Uploaded {} built-in model(s)", lib.models.len());
        lib
    }

    #[inline]
    pub fn get(&self, model: &ModelRef) -> Option<&GpuModel> {
        self.models.get(model.name())
    }

    #[inline]
    pub fn contains(&self, model: &ModelRef) -> bool {
        self.models.contains_key(model.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_rests_on_the_ground() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));

        let min_y = mesh.vertices.iter().map(|v| v.position[1]).fold(f32::MAX, f32::min);
        let max_y = mesh.vertices.iter().map(|v| v.position[1]).fold(f32::MIN, f32::max);
        assert_eq!((min_y, max_y), (0.0, 1.0));
        for v in &mesh.vertices {
            assert!(v.position[0].abs() <= 0.5 && v.position[2].abs() <= 0.5);
        }
    }

    #[test]
    fn cube_faces_wind_counter_clockwise_outwards() {
        let mesh = cube();
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| glam::Vec3::from(mesh.vertices[i as usize].position));
            let n = glam::Vec3::from(mesh.vertices[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(n) > 0.0);
        }
    }

    #[test]
    fn ring_is_flat_and_faces_up() {
        let mesh = ring(0.5, 1.0, 8);
        assert_eq!(mesh.vertices.len(), 18);
        assert_eq!(mesh.indices.len(), 48);
        for v in &mesh.vertices {
            assert_eq!(v.position[1], 0.0);
            assert_eq!(v.normal, [0.0, 1.0, 0.0]);
            let r = (v.position[0].powi(2) + v.position[2].powi(2)).sqrt();
            assert!((r - 0.5).abs() < 1e-5 || (r - 1.0).abs() < 1e-5);
        }
        // Winding faces +Y.
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| glam::Vec3::from(mesh.vertices[i as usize].position));
            assert!((b - a).cross(c - a).y > 0.0);
        }
    }

    #[test]
    fn checker_alternates_cells() {
        let a = [1, 1, 1, 255];
        let b = [2, 2, 2, 255];
        let tex = checker_texture(4, 2, a, b);
        assert_eq!(tex.rgba.len(), 64);
        let px = |x: usize, y: usize| &tex.rgba[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(px(0, 0), &a);
        assert_eq!(px(1, 1), &a);
        assert_eq!(px(2, 0), &b);
        assert_eq!(px(0, 2), &b);
        assert_eq!(px(3, 3), &a);
    }

    #[test]
    fn builtin_names_resolve() {
        assert!(builtin_model(INDICATOR_MODEL).is_some());
        assert!(builtin_model(PLACED_MODEL).is_some());
        assert!(builtin_model("teapot").is_none());
    }
}
