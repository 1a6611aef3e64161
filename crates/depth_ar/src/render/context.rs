//! Render state and the per-frame command stream.
//!
//! [`RenderContext`] is the only holder of binding state (target, program,
//! texture units). A frame is recorded through a [`FrameEncoder`], which
//! borrows the context mutably for its whole lifetime, so there is exactly
//! one writer. Finishing (or dropping) the encoder resets every binding.

use super::uniforms::{
    CameraUniformsStd140, DepthUniformsStd140, LightUniformsStd140, ObjectUniformsStd140,
};
use super::RenderError;
use crate::depth::DepthFrame;
use crate::pose::Viewport;
use crate::scene::{ModelRef, ObjectId};
use std::sync::Arc;

/// Number of texture units tracked.
pub const TEXTURE_UNITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureUnit(pub u32);

impl TextureUnit {
    /// Per-object albedo texture.
    pub const OBJECT: Self = Self(0);
    /// Real-world depth snapshot; never shared with object textures.
    pub const DEPTH: Self = Self(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// The host-presented framebuffer.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// Full-screen grayscale depth display.
    DepthVisualize,
    /// Full-screen depth-buffer pre-population from real-world depth.
    DepthPrepass,
    /// Lit textured meshes.
    Scene,
}

impl Program {
    #[inline]
    pub fn is_fullscreen(self) -> bool {
        matches!(self, Program::DepthVisualize | Program::DepthPrepass)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    /// The depth texture uploaded earlier in the frame.
    Depth,
    Model(ModelRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    BindTarget(Option<RenderTarget>),
    SetViewport(Viewport),
    Clear { color: [f32; 4], depth: f32 },
    /// 2-channel 8-bit texture, exactly `width` × `height`.
    UploadDepth {
        width: u32,
        height: u32,
        data: Arc<[u8]>,
    },
    UseProgram(Option<Program>),
    BindTexture {
        unit: TextureUnit,
        source: Option<TextureSource>,
    },
    SetDepthUniforms(DepthUniformsStd140),
    SetCameraUniforms(CameraUniformsStd140),
    SetLightUniforms(LightUniformsStd140),
    SetObjectUniforms(ObjectUniformsStd140),
    /// Two triangles covering the viewport.
    DrawFullscreen { vertex_count: u32 },
    DrawObject { object: ObjectId, model: ModelRef },
}

/// The recorded commands of one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameCommands {
    pub frame_index: u64,
    pub commands: Vec<GpuCommand>,
}

impl FrameCommands {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear_count(&self) -> usize {
        self.count(|c| matches!(c, GpuCommand::Clear { .. }))
    }

    pub fn draw_count(&self) -> usize {
        self.count(|c| {
            matches!(
                c,
                GpuCommand::DrawFullscreen { .. } | GpuCommand::DrawObject { .. }
            )
        })
    }

    pub fn object_draws(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::DrawObject { object, .. } => Some(*object),
            _ => None,
        })
    }

    fn count(&self, f: impl Fn(&GpuCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| f(c)).count()
    }
}

/// Uniform blocks written since the current program was bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct WrittenUniforms {
    depth: bool,
    camera: bool,
    light: bool,
    object: bool,
}

#[derive(Debug, Default)]
pub struct RenderContext {
    target: Option<RenderTarget>,
    program: Option<Program>,
    units: [Option<TextureSource>; TEXTURE_UNITS],
    written: WrittenUniforms,
    depth_uploaded: bool,
    frames: u64,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording a frame.
    pub fn begin_frame(&mut self) -> FrameEncoder<'_> {
        self.reset();
        let frame_index = self.frames;
        self.frames += 1;
        FrameEncoder {
            ctx: self,
            commands: Vec::new(),
            frame_index,
            finished: false,
        }
    }

    /// Frames begun so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    #[inline]
    pub fn bound_target(&self) -> Option<RenderTarget> {
        self.target
    }

    #[inline]
    pub fn bound_program(&self) -> Option<Program> {
        self.program
    }

    #[inline]
    pub fn bound_texture(&self, unit: TextureUnit) -> Option<&TextureSource> {
        self.units.get(unit.0 as usize).and_then(Option::as_ref)
    }

    /// `true` when nothing is bound.
    pub fn is_reset(&self) -> bool {
        self.target.is_none()
            && self.program.is_none()
            && self.units.iter().all(Option::is_none)
    }

    fn reset(&mut self) {
        self.target = None;
        self.program = None;
        self.units = Default::default();
        self.written = WrittenUniforms::default();
        self.depth_uploaded = false;
    }
}

/// Records one frame. Validates ordering as it goes: every draw must find
/// its target, program, textures and uniforms already in place.
pub struct FrameEncoder<'a> {
    ctx: &'a mut RenderContext,
    commands: Vec<GpuCommand>,
    frame_index: u64,
    finished: bool,
}

impl FrameEncoder<'_> {
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn bind_target(&mut self, target: RenderTarget, viewport: Viewport) {
        self.ctx.target = Some(target);
        self.commands.push(GpuCommand::BindTarget(Some(target)));
        self.commands.push(GpuCommand::SetViewport(viewport));
    }

    /// Combined color + depth clear.
    pub fn clear(&mut self, color: [f32; 4], depth: f32) -> Result<(), RenderError> {
        if self.ctx.target.is_none() {
            return Err(RenderError::NoTarget);
        }
        self.commands.push(GpuCommand::Clear { color, depth });
        Ok(())
    }

    pub fn upload_depth(&mut self, frame: &DepthFrame) -> Result<(), RenderError> {
        if self.ctx.target.is_none() {
            return Err(RenderError::NoTarget);
        }
        self.ctx.depth_uploaded = true;
        self.commands.push(GpuCommand::UploadDepth {
            width: frame.width(),
            height: frame.height(),
            data: Arc::clone(frame.raw()),
        });
        Ok(())
    }

    pub fn use_program(&mut self, program: Program) {
        if self.ctx.program != Some(program) {
            self.ctx.written = WrittenUniforms::default();
        }
        self.ctx.program = Some(program);
        self.commands.push(GpuCommand::UseProgram(Some(program)));
    }

    pub fn bind_depth_texture(&mut self) -> Result<(), RenderError> {
        if !self.ctx.depth_uploaded {
            return Err(RenderError::DepthTextureMissing);
        }
        self.bind(TextureUnit::DEPTH, TextureSource::Depth)
    }

    pub fn bind_object_texture(&mut self, model: &ModelRef) -> Result<(), RenderError> {
        self.bind(TextureUnit::OBJECT, TextureSource::Model(model.clone()))
    }

    fn bind(&mut self, unit: TextureUnit, source: TextureSource) -> Result<(), RenderError> {
        let reserved = match source {
            TextureSource::Depth => TextureUnit::DEPTH,
            TextureSource::Model(_) => TextureUnit::OBJECT,
        };
        if unit != reserved {
            return Err(RenderError::TextureUnitCollision { unit: unit.0 });
        }
        let slot = self
            .ctx
            .units
            .get_mut(unit.0 as usize)
            .ok_or(RenderError::TextureUnitCollision { unit: unit.0 })?;
        *slot = Some(source.clone());
        self.commands.push(GpuCommand::BindTexture {
            unit,
            source: Some(source),
        });
        Ok(())
    }

    pub fn set_depth_uniforms(&mut self, u: DepthUniformsStd140) -> Result<(), RenderError> {
        self.require_program()?;
        self.ctx.written.depth = true;
        self.commands.push(GpuCommand::SetDepthUniforms(u));
        Ok(())
    }

    pub fn set_camera_uniforms(&mut self, u: CameraUniformsStd140) -> Result<(), RenderError> {
        self.require_exact(Program::Scene)?;
        self.ctx.written.camera = true;
        self.commands.push(GpuCommand::SetCameraUniforms(u));
        Ok(())
    }

    pub fn set_light_uniforms(&mut self, u: LightUniformsStd140) -> Result<(), RenderError> {
        self.require_exact(Program::Scene)?;
        self.ctx.written.light = true;
        self.commands.push(GpuCommand::SetLightUniforms(u));
        Ok(())
    }

    pub fn set_object_uniforms(&mut self, u: ObjectUniformsStd140) -> Result<(), RenderError> {
        self.require_exact(Program::Scene)?;
        self.ctx.written.object = true;
        self.commands.push(GpuCommand::SetObjectUniforms(u));
        Ok(())
    }

    pub fn draw_fullscreen(&mut self) -> Result<(), RenderError> {
        let program = self.require_program()?;
        if !program.is_fullscreen() {
            return Err(RenderError::WrongProgram {
                expected: Program::DepthVisualize,
                found: program,
            });
        }
        if !self.ctx.written.depth {
            return Err(RenderError::UniformNotSet("depth"));
        }
        if self.ctx.bound_texture(TextureUnit::DEPTH) != Some(&TextureSource::Depth) {
            return Err(RenderError::DepthTextureMissing);
        }
        self.commands.push(GpuCommand::DrawFullscreen { vertex_count: 6 });
        Ok(())
    }

    /// Draws one object. Object uniforms are consumed by the draw and must be
    /// written again before the next one.
    pub fn draw_object(
        &mut self,
        object: ObjectId,
        model: &ModelRef,
        occluded: bool,
    ) -> Result<(), RenderError> {
        self.require_exact(Program::Scene)?;
        let w = self.ctx.written;
        if !w.camera {
            return Err(RenderError::UniformNotSet("camera"));
        }
        if !w.light {
            return Err(RenderError::UniformNotSet("light"));
        }
        if !w.object {
            return Err(RenderError::UniformNotSet("object"));
        }
        if self.ctx.bound_texture(TextureUnit::OBJECT)
            != Some(&TextureSource::Model(model.clone()))
        {
            return Err(RenderError::ObjectTextureMissing(model.name().to_owned()));
        }
        if occluded {
            if !w.depth {
                return Err(RenderError::UniformNotSet("depth"));
            }
            if self.ctx.bound_texture(TextureUnit::DEPTH) != Some(&TextureSource::Depth) {
                return Err(RenderError::DepthTextureMissing);
            }
        }
        self.ctx.written.object = false;
        self.commands.push(GpuCommand::DrawObject {
            object,
            model: model.clone(),
        });
        Ok(())
    }

    /// Ends the frame: unbinds textures, program and target, and hands out
    /// the recorded stream.
    pub fn finish(mut self) -> FrameCommands {
        self.emit_resets();
        self.finished = true;
        FrameCommands {
            frame_index: self.frame_index,
            commands: std::mem::take(&mut self.commands),
        }
    }

    fn emit_resets(&mut self) {
        for (i, slot) in self.ctx.units.iter().enumerate() {
            if slot.is_some() {
                self.commands.push(GpuCommand::BindTexture {
                    unit: TextureUnit(i as u32),
                    source: None,
                });
            }
        }
        if self.ctx.program.is_some() {
            self.commands.push(GpuCommand::UseProgram(None));
        }
        if self.ctx.target.is_some() {
            self.commands.push(GpuCommand::BindTarget(None));
        }
        self.ctx.reset();
    }

    fn require_program(&self) -> Result<Program, RenderError> {
        self.ctx.program.ok_or(RenderError::NoProgram)
    }

    fn require_exact(&self, expected: Program) -> Result<(), RenderError> {
        match self.ctx.program {
            Some(p) if p == expected => Ok(()),
            Some(found) => Err(RenderError::WrongProgram { expected, found }),
            None => Err(RenderError::NoProgram),
        }
    }
}

impl Drop for FrameEncoder<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Abandoned mid-frame: nothing was submitted, just reset state.
            self.ctx.reset();
        }
    }
}
