//! GPU side of the viewer. Owns the context, the depth attachment, the
//! real-world depth texture and both pipelines, and replays the frame
//! command streams recorded by `depth_ar`.

pub mod context;
pub mod depth_texture;
pub mod mesh;
pub mod pipelines;
pub mod targets;

use self::{
    context::GfxContext,
    depth_texture::DepthTexture,
    mesh::ModelLibrary,
    pipelines::{depth_pass::DepthPassPipeline, scene_mesh::ScenePipeline},
    targets::{DepthTarget, DEPTH_FORMAT},
};
use anyhow::{anyhow, bail, Result};
use depth_ar::render::{DepthUniformsStd140, GpuCommand, ObjectUniformsStd140, Program};
use depth_ar::{FrameCommands, GpuBackend, ModelRef, RenderError, Viewport};
use std::sync::Arc;
use winit::window::Window;

/// One draw resolved from a command stream.
#[derive(Debug, Clone, PartialEq)]
enum DrawOp {
    Fullscreen { program: Program, vertex_count: u32 },
    Object { model: ModelRef, slot: usize },
}

/// Owns all rendering-related state.
pub struct Renderer {
    pub gfx: GfxContext,
    pub depth_target: DepthTarget,
    pub depth_texture: DepthTexture,
    depth_ubo: wgpu::Buffer,
    pub depth_pass: DepthPassPipeline,
    pub scene: ScenePipeline,
    pub models: ModelLibrary,
    pub egui_renderer: egui_wgpu::Renderer,
    frames_replayed: u64,
}

/// Maps a bottom-left-origin viewport into a top-left-origin target,
/// clipped to the target.
fn viewport_rect(vp: &Viewport, target_w: u32, target_h: u32) -> Option<[f32; 4]> {
    let x0 = vp.x.min(target_w);
    let x1 = vp.x.saturating_add(vp.width).min(target_w);
    let y0 = vp.y.min(target_h);
    let y1 = vp.y.saturating_add(vp.height).min(target_h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let top = target_h - y1;
    Some([x0 as f32, top as f32, (x1 - x0) as f32, (y1 - y0) as f32])
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let gfx = GfxContext::new(window).await?;
        let size = gfx.size;

        let depth_target = DepthTarget::new(&gfx.device, size);
        let depth_texture = DepthTexture::new(&gfx.device);
        let depth_ubo = gfx.device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some("Depth UBO"),
            size:               std::mem::size_of::<DepthUniformsStd140>() as u64,
            usage:              wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let depth_pass = DepthPassPipeline::new(
            &gfx.device,
            gfx.config.format,
            DEPTH_FORMAT,
            &depth_ubo,
            &depth_texture,
        );
        let scene = ScenePipeline::new(
            &gfx.device,
            gfx.config.format,
            DEPTH_FORMAT,
            &depth_ubo,
            &depth_texture,
        );
        let models = ModelLibrary::builtin(
            &gfx.device,
            &gfx.queue,
            &scene.texture_layout,
            &scene.object_sampler,
        );

        let egui_renderer =
            egui_wgpu::Renderer::new(&gfx.device, gfx.config.format, None, 1);

        Ok(Self {
            gfx,
            depth_target,
            depth_texture,
            depth_ubo,
            depth_pass,
            scene,
            models,
            egui_renderer,
            frames_replayed: 0,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.gfx.resize(new_size);
            self.depth_target.resize(&self.gfx.device, new_size);
        }
    }

    #[inline]
    pub fn frames_replayed(&self) -> u64 {
        self.frames_replayed
    }

    /// Replays one recorded frame into `target`.
    ///
    /// Uploads and uniform writes are applied while walking the stream;
    /// draws are collected and encoded into a single render pass afterwards.
    pub fn replay(&mut self, target: &wgpu::TextureView, frame: &FrameCommands) -> Result<()> {
        let mut viewport = None;
        let mut clear = None;
        let mut program = None;
        let mut pending_object: Option<ObjectUniformsStd140> = None;
        let mut objects = Vec::new();
        let mut ops = Vec::new();

        for cmd in &frame.commands {
            match cmd {
                GpuCommand::BindTarget(_) => {}
                GpuCommand::SetViewport(vp) => viewport = Some(*vp),
                GpuCommand::Clear { color, depth } => clear = Some((*color, *depth)),
                GpuCommand::UploadDepth { width, height, data } => {
                    let realloc = self.depth_texture.upload(
                        &self.gfx.device,
                        &self.gfx.queue,
                        *width,
                        *height,
                        data,
                    );
                    if realloc {
                        self.depth_pass
                            .rebind(&self.gfx.device, &self.depth_ubo, &self.depth_texture);
                        self.scene
                            .rebind(&self.gfx.device, &self.depth_ubo, &self.depth_texture);
                    }
                }
                GpuCommand::UseProgram(p) => program = *p,
                // Depth is bound with the frame group; object textures travel with the model.
                GpuCommand::BindTexture { .. } => {}
                GpuCommand::SetDepthUniforms(u) => {
                    self.gfx
                        .queue
                        .write_buffer(&self.depth_ubo, 0, bytemuck::bytes_of(u));
                }
                GpuCommand::SetCameraUniforms(u) => self.scene.write_camera(&self.gfx.queue, u),
                GpuCommand::SetLightUniforms(u) => self.scene.write_light(&self.gfx.queue, u),
                GpuCommand::SetObjectUniforms(u) => pending_object = Some(*u),
                GpuCommand::DrawFullscreen { vertex_count } => match program {
                    Some(p) if p.is_fullscreen() => ops.push(DrawOp::Fullscreen {
                        program: p,
                        vertex_count: *vertex_count,
                    }),
                    other => bail!("full-screen draw with program {other:?}"),
                },
                GpuCommand::DrawObject { model, object } => {
                    let u = pending_object
                        .take()
                        .ok_or_else(|| anyhow!("object {object:?} drawn without uniforms"))?;
                    if !self.models.contains(model) {
                        bail!("unknown model '{}'", model.name());
                    }
                    objects.push(u);
                    ops.push(DrawOp::Object {
                        model: model.clone(),
                        slot: objects.len() - 1,
                    });
                }
            }
        }

        self.scene
            .write_objects(&self.gfx.device, &self.gfx.queue, &objects);

        let (color_load, depth_clear) = match clear {
            Some(([r, g, b, a], depth)) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                depth,
            ),
            None => (wgpu::LoadOp::Load, 1.0),
        };

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("AR Frame Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("AR Composite Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_target.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(depth_clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(vp) = viewport {
                let size = self.depth_target.size;
                match viewport_rect(&vp, size.width, size.height) {
                    Some([x, y, w, h]) => pass.set_viewport(x, y, w, h, 0.0, 1.0),
                    None => ops.clear(),
                }
            }

            for op in &ops {
                match op {
                    DrawOp::Fullscreen {
                        program,
                        vertex_count,
                    } => self.depth_pass.draw(&mut pass, *program, *vertex_count),
                    DrawOp::Object { model, slot } => {
                        if let Some(gpu) = self.models.get(model) {
                            self.scene.draw(&mut pass, gpu, *slot);
                        }
                    }
                }
            }
        }

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        self.frames_replayed += 1;
        log::trace!(
            "Replayed frame {} ({} draw(s))",
            frame.frame_index,
            ops.len()
        );
        Ok(())
    }
}

/// [`GpuBackend`] over the renderer for one acquired surface texture.
pub struct WgpuBackend<'a> {
    renderer: &'a mut Renderer,
    target: &'a wgpu::TextureView,
    submitted: u32,
}

impl<'a> WgpuBackend<'a> {
    pub fn new(renderer: &'a mut Renderer, target: &'a wgpu::TextureView) -> Self {
        Self {
            renderer,
            target,
            submitted: 0,
        }
    }

    /// Frames submitted through this backend.
    #[inline]
    pub fn submitted(&self) -> u32 {
        self.submitted
    }
}

impl GpuBackend for WgpuBackend<'_> {
    fn submit(&mut self, frame: &FrameCommands) -> Result<(), RenderError> {
        self.renderer
            .replay(self.target, frame)
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        self.submitted += 1;
        Ok(())
    }
}
