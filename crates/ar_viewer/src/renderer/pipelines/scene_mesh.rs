// Lit, textured meshes with per-fragment real-world occlusion.

use crate::renderer::depth_texture::DepthTexture;
use crate::renderer::mesh::{GpuModel, MeshVertex};
use depth_ar::render::shaders::scene_source;
use depth_ar::render::{
    CameraUniformsStd140, DepthUniformsStd140, LightUniformsStd140, ObjectUniformsStd140,
};

const OBJECT_UNIFORM_SIZE: u64 = std::mem::size_of::<ObjectUniformsStd140>() as u64;

fn uniform_entry(binding: u32, size: u64, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty:                 wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size:   wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type:    wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled:   false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty:         wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count:      None,
    }
}

/// Byte stride between per-object uniform blocks in the dynamic buffer.
pub fn object_stride(min_alignment: u32) -> u64 {
    wgpu::util::align_to(OBJECT_UNIFORM_SIZE, u64::from(min_alignment.max(1)))
}

/// Packs object uniform blocks at `stride`, zero-filling the gaps.
pub fn pack_objects(objects: &[ObjectUniformsStd140], stride: u64) -> Vec<u8> {
    let stride = stride as usize;
    let mut bytes = vec![0u8; objects.len() * stride];
    for (chunk, obj) in bytes.chunks_exact_mut(stride).zip(objects) {
        chunk[..OBJECT_UNIFORM_SIZE as usize].copy_from_slice(bytemuck::bytes_of(obj));
    }
    bytes
}

pub struct ScenePipeline {
    pipeline:        wgpu::RenderPipeline,
    frame_layout:    wgpu::BindGroupLayout,
    object_layout:   wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pub object_sampler: wgpu::Sampler,
    frame_bg:        wgpu::BindGroup,
    camera_ubo:      wgpu::Buffer,
    light_ubo:       wgpu::Buffer,
    object_buf:      wgpu::Buffer,
    object_bg:       wgpu::BindGroup,
    object_capacity: usize,
    object_stride:   u64,
}

impl ScenePipeline {
    pub fn new(
        device:    &wgpu::Device,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
        depth_ubo: &wgpu::Buffer,
        depth:     &DepthTexture,
    ) -> Self {
        let camera_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some("Camera UBO"),
            size:               std::mem::size_of::<CameraUniformsStd140>() as u64,
            usage:              wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let light_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some("Light UBO"),
            size:               std::mem::size_of::<LightUniformsStd140>() as u64,
            usage:              wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label:   Some("Scene Frame BGL"),
            entries: &[
                uniform_entry(0, std::mem::size_of::<CameraUniformsStd140>() as u64, false),
                uniform_entry(1, std::mem::size_of::<LightUniformsStd140>() as u64, false),
                uniform_entry(2, std::mem::size_of::<DepthUniformsStd140>() as u64, false),
                texture_entry(3),
                sampler_entry(4),
            ],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label:   Some("Scene Object BGL"),
            entries: &[uniform_entry(0, OBJECT_UNIFORM_SIZE, true)],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label:   Some("Scene Texture BGL"),
            entries: &[texture_entry(0), sampler_entry(1)],
        });

        let object_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label:          Some("Object Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter:     wgpu::FilterMode::Nearest,
            min_filter:     wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label:  Some("Scene WGSL"),
            source: wgpu::ShaderSource::Wgsl(scene_source().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label:                Some("Scene Pipeline Layout"),
            bind_group_layouts:   &[&frame_layout, &object_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label:  Some("Scene Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module:              &shader,
                entry_point:         "vs_main",
                buffers:             &[MeshVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module:      &shader,
                entry_point: "fs_main",
                targets:     &[Some(wgpu::ColorTargetState {
                    format:     color_fmt,
                    blend:      Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology:   wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode:  Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format:              depth_fmt,
                depth_write_enabled: true,
                depth_compare:       wgpu::CompareFunction::Less,
                stencil:             wgpu::StencilState::default(),
                bias:                wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview:   None,
        });

        let object_stride = object_stride(device.limits().min_uniform_buffer_offset_alignment);
        let object_capacity = 16;
        let (object_buf, object_bg) =
            Self::create_object_storage(device, &object_layout, object_stride, object_capacity);

        let frame_bg = Self::create_frame_bg(
            device,
            &frame_layout,
            &camera_ubo,
            &light_ubo,
            depth_ubo,
            depth,
        );

        Self {
            pipeline,
            frame_layout,
            object_layout,
            texture_layout,
            object_sampler,
            frame_bg,
            camera_ubo,
            light_ubo,
            object_buf,
            object_bg,
            object_capacity,
            object_stride,
        }
    }

    fn create_frame_bg(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        camera_ubo: &wgpu::Buffer,
        light_ubo: &wgpu::Buffer,
        depth_ubo: &wgpu::Buffer,
        depth: &DepthTexture,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label:   Some("Scene Frame BG"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: camera_ubo.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: light_ubo.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: depth_ubo.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding:  3,
                    resource: wgpu::BindingResource::TextureView(&depth.view),
                },
                wgpu::BindGroupEntry {
                    binding:  4,
                    resource: wgpu::BindingResource::Sampler(&depth.sampler),
                },
            ],
        })
    }

    fn create_object_storage(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some("Object Uniforms (dynamic)"),
            size:               stride * capacity as u64,
            usage:              wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label:   Some("Object Uniforms BG"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding:  0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size:   wgpu::BufferSize::new(OBJECT_UNIFORM_SIZE),
                }),
            }],
        });
        (buffer, bg)
    }

    /// Rebuilds the frame bind group after the depth texture was reallocated.
    pub fn rebind(&mut self, device: &wgpu::Device, depth_ubo: &wgpu::Buffer, depth: &DepthTexture) {
        self.frame_bg = Self::create_frame_bg(
            device,
            &self.frame_layout,
            &self.camera_ubo,
            &self.light_ubo,
            depth_ubo,
            depth,
        );
    }

    pub fn write_camera(&self, queue: &wgpu::Queue, u: &CameraUniformsStd140) {
        queue.write_buffer(&self.camera_ubo, 0, bytemuck::bytes_of(u));
    }

    pub fn write_light(&self, queue: &wgpu::Queue, u: &LightUniformsStd140) {
        queue.write_buffer(&self.light_ubo, 0, bytemuck::bytes_of(u));
    }

    /// Uploads this frame's object blocks, growing the buffer as needed.
    pub fn write_objects(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        objects: &[ObjectUniformsStd140],
    ) {
        if objects.is_empty() {
            return;
        }
        if objects.len() > self.object_capacity {
            let capacity = objects.len().next_power_of_two();
            log::debug!("Growing object uniform buffer {} -> {}", self.object_capacity, capacity);
            let (buf, bg) =
                Self::create_object_storage(device, &self.object_layout, self.object_stride, capacity);
            self.object_buf = buf;
            self.object_bg = bg;
            self.object_capacity = capacity;
        }
        queue.write_buffer(&self.object_buf, 0, &pack_objects(objects, self.object_stride));
    }

    /// Draws `model` with the object block at `slot`.
    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, model: &'a GpuModel, slot: usize) {
        let offset = (slot as u64 * self.object_stride) as u32;
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.frame_bg, &[]);
        rpass.set_bind_group(1, &self.object_bg, &[offset]);
        rpass.set_bind_group(2, &model.texture_bg, &[]);
        rpass.set_vertex_buffer(0, model.vertex_buffer.slice(..));
        rpass.set_index_buffer(model.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        rpass.draw_indexed(0..model.index_count, 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_respects_device_alignment() {
        assert_eq!(object_stride(256), 256);
        assert_eq!(object_stride(64), 128);
        assert_eq!(object_stride(0), 128);
    }

    #[test]
    fn packed_blocks_start_at_stride_offsets() {
        let mut a: ObjectUniformsStd140 = bytemuck::Zeroable::zeroed();
        a.model[0][0] = 1.0;
        let mut b: ObjectUniformsStd140 = bytemuck::Zeroable::zeroed();
        b.model[0][0] = 2.0;

        let bytes = pack_objects(&[a, b], 256);
        assert_eq!(bytes.len(), 512);
        let first: ObjectUniformsStd140 = bytemuck::pod_read_unaligned(&bytes[..128]);
        let second: ObjectUniformsStd140 = bytemuck::pod_read_unaligned(&bytes[256..384]);
        assert_eq!(first.model[0][0], 1.0);
        assert_eq!(second.model[0][0], 2.0);
        assert!(bytes[128..256].iter().all(|&x| x == 0));
    }
}
