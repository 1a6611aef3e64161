// Full-screen real-world depth pass: grayscale visualization or depth-buffer prepass.

use crate::renderer::depth_texture::DepthTexture;
use depth_ar::render::shaders::depth_pass_source;
use depth_ar::render::{DepthUniformsStd140, Program};

pub struct DepthPassPipeline {
    visualize:  wgpu::RenderPipeline,
    prepass:    wgpu::RenderPipeline,
    layout:     wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

fn bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    depth_ubo: &wgpu::Buffer,
    depth: &DepthTexture,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label:   Some("Depth Pass Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding:  0,
                resource: depth_ubo.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding:  1,
                resource: wgpu::BindingResource::TextureView(&depth.view),
            },
            wgpu::BindGroupEntry {
                binding:  2,
                resource: wgpu::BindingResource::Sampler(&depth.sampler),
            },
        ],
    })
}

impl DepthPassPipeline {
    pub fn new(
        device:    &wgpu::Device,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
        depth_ubo: &wgpu::Buffer,
        depth:     &DepthTexture,
    ) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label:   Some("Depth Pass BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding:    0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty:                 wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size:   wgpu::BufferSize::new(
                            std::mem::size_of::<DepthUniformsStd140>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding:    1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type:    wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled:   false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding:    2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty:         wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count:      None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label:  Some("Depth Pass WGSL"),
            source: wgpu::ShaderSource::Wgsl(depth_pass_source().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label:                Some("Depth Pass Pipeline Layout"),
            bind_group_layouts:   &[&layout],
            push_constant_ranges: &[],
        });

        // Both variants share the vertex stage; they differ in what they write.
        let build = |label: &str, fs: &str, write_mask: wgpu::ColorWrites, depth_write: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label:  Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module:              &shader,
                    entry_point:         "vs_main",
                    buffers:             &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module:      &shader,
                    entry_point: fs,
                    targets:     &[Some(wgpu::ColorTargetState {
                        format: color_fmt,
                        blend:  None,
                        write_mask,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive:     wgpu::PrimitiveState::default(),
                depth_stencil: Some(wgpu::DepthStencilState {
                    format:              depth_fmt,
                    depth_write_enabled: depth_write,
                    depth_compare:       wgpu::CompareFunction::Always,
                    stencil:             wgpu::StencilState::default(),
                    bias:                wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview:   None,
            })
        };

        let visualize = build(
            "Depth Visualize Pipeline",
            "fs_visualize",
            wgpu::ColorWrites::ALL,
            false,
        );
        let prepass = build(
            "Depth Prepass Pipeline",
            "fs_prepass",
            wgpu::ColorWrites::empty(),
            true,
        );

        let bind_group = bind_group(device, &layout, depth_ubo, depth);

        Self {
            visualize,
            prepass,
            layout,
            bind_group,
        }
    }

    /// Rebuilds the bind group after the depth texture was reallocated.
    pub fn rebind(&mut self, device: &wgpu::Device, depth_ubo: &wgpu::Buffer, depth: &DepthTexture) {
        self.bind_group = bind_group(device, &self.layout, depth_ubo, depth);
    }

    /// Draws the full-screen triangles with the variant for `program`.
    /// Non full-screen programs are ignored.
    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, program: Program, vertex_count: u32) {
        let pipeline = match program {
            Program::DepthVisualize => &self.visualize,
            Program::DepthPrepass => &self.prepass,
            Program::Scene => return,
        };
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.draw(0..vertex_count, 0..1);
    }
}
