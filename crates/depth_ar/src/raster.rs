//! CPU backend.
//!
//! Replays a frame's command stream into in-memory color and depth buffers.
//! The full-screen depth pass is evaluated per pixel with the same decode and
//! coordinate transform as the GPU prelude. Object draws are not rasterized;
//! each one records its draw order and the occlusion visibility of the
//! object's origin, evaluated the way the scene shader evaluates a fragment.

use crate::coords::{fragment_to_depth_uv, ndc_to_fragment, pixel_center};
use crate::depth::{depth_to_intensity, DepthFrame};
use crate::occlusion::{occlusion_visibility, prepass_ndc_depth};
use crate::render::{
    CameraUniformsStd140, DepthUniformsStd140, FrameCommands, GpuBackend, GpuCommand,
    ObjectUniformsStd140, Program, RenderError,
};
use crate::scene::ObjectId;
use glam::{Mat4, Vec2, Vec4};
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SoftwareBackend {
    width: u32,
    height: u32,
    color: Vec<[f32; 4]>,
    depth: Vec<f32>,
    depth_texture: Option<(u32, u32, Arc<[u8]>)>,
    depth_uniforms: Option<DepthUniformsStd140>,
    camera: Option<CameraUniformsStd140>,
    object: Option<ObjectUniformsStd140>,
    program: Option<Program>,
    target_bound: bool,
    frames: u64,
    clears: u64,
    object_draws: Vec<ObjectId>,
    visibility: Vec<(ObjectId, f32)>,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        let mut backend = Self::default();
        backend.resize(width, height);
        backend
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height && !self.color.is_empty() {
            return;
        }
        let n = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.color = vec![[0.0; 4]; n];
        self.depth = vec![1.0; n];
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color of pixel `(col, row)`, rows counted from the top.
    pub fn color_at(&self, col: u32, row: u32) -> Option<[f32; 4]> {
        self.index(col, row).map(|i| self.color[i])
    }

    pub fn depth_at(&self, col: u32, row: u32) -> Option<f32> {
        self.index(col, row).map(|i| self.depth[i])
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.color
    }

    /// Frames submitted so far.
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Clears executed so far.
    #[inline]
    pub fn clears(&self) -> u64 {
        self.clears
    }

    /// Objects drawn by the most recent frame.
    pub fn object_draws(&self) -> &[ObjectId] {
        &self.object_draws
    }

    /// Occlusion visibility of `id`'s origin in the most recent frame:
    /// 0 hidden behind real-world depth, 1 fully visible. `None` when the
    /// object was not drawn.
    pub fn object_visibility(&self, id: ObjectId) -> Option<f32> {
        self.visibility
            .iter()
            .find(|(drawn, _)| *drawn == id)
            .map(|(_, v)| *v)
    }

    fn index(&self, col: u32, row: u32) -> Option<usize> {
        (col < self.width && row < self.height)
            .then(|| row as usize * self.width as usize + col as usize)
    }

    fn draw_fullscreen(&mut self) -> Result<(), RenderError> {
        let (tw, th, data) = self
            .depth_texture
            .clone()
            .ok_or(RenderError::DepthTextureMissing)?;
        let u = self
            .depth_uniforms
            .ok_or(RenderError::UniformNotSet("depth"))?;
        let program = self.program.ok_or(RenderError::NoProgram)?;

        let frame = DepthFrame::new(tw, th, data, u.raw_value_to_meters, u.uv_transform());
        let uv_transform = u.uv_transform();
        let resolution = Vec2::from(u.resolution);
        let (width, height) = (self.width as usize, self.height);
        if width == 0 {
            return Ok(());
        }

        let sample = |col: usize, row: usize| -> f32 {
            let frag = pixel_center(col as u32, row as u32, height);
            frame.sample(fragment_to_depth_uv(frag, resolution, &uv_transform))
        };

        match program {
            Program::DepthVisualize => {
                self.color
                    .par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(row, line)| {
                        for (col, px) in line.iter_mut().enumerate() {
                            let g = depth_to_intensity(sample(col, row), u.max_depth_m);
                            *px = [g, g, g, u.opacity];
                        }
                    });
            }
            Program::DepthPrepass => {
                self.depth
                    .par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(row, line)| {
                        for (col, d) in line.iter_mut().enumerate() {
                            *d = prepass_ndc_depth(sample(col, row), u.blend_band_m, u.proj_depth);
                        }
                    });
            }
            Program::Scene => {
                return Err(RenderError::WrongProgram {
                    expected: Program::DepthVisualize,
                    found: Program::Scene,
                })
            }
        }
        Ok(())
    }

    /// Single-fragment version of the scene shader's occlusion test, taken
    /// at the projected object origin.
    fn origin_visibility(&self) -> Result<f32, RenderError> {
        let camera = self.camera.ok_or(RenderError::UniformNotSet("camera"))?;
        let object = self.object.ok_or(RenderError::UniformNotSet("object"))?;
        if camera.occlusion_enabled == 0 {
            return Ok(1.0);
        }
        let (tw, th, data) = self
            .depth_texture
            .clone()
            .ok_or(RenderError::DepthTextureMissing)?;
        let u = self
            .depth_uniforms
            .ok_or(RenderError::UniformNotSet("depth"))?;

        let view_pos = Mat4::from_cols_array_2d(&camera.view)
            * Mat4::from_cols_array_2d(&object.model)
            * Vec4::W;
        let clip = Mat4::from_cols_array_2d(&camera.projection) * view_pos;
        if clip.w <= f32::EPSILON {
            // Behind the eye; no fragment to test.
            return Ok(1.0);
        }

        let resolution = Vec2::from(u.resolution);
        let uv_transform = u.uv_transform();
        let frag = ndc_to_fragment(clip.truncate().truncate() / clip.w, resolution);
        let frame = DepthFrame::new(tw, th, data, u.raw_value_to_meters, uv_transform);
        let real_m = frame.sample(fragment_to_depth_uv(frag, resolution, &uv_transform));
        Ok(occlusion_visibility(-view_pos.z, real_m, u.blend_band_m))
    }
}

impl GpuBackend for SoftwareBackend {
    fn submit(&mut self, frame: &FrameCommands) -> Result<(), RenderError> {
        self.object_draws.clear();
        self.visibility.clear();

        for cmd in &frame.commands {
            match cmd {
                GpuCommand::BindTarget(target) => self.target_bound = target.is_some(),
                GpuCommand::SetViewport(vp) => self.resize(vp.width, vp.height),
                GpuCommand::Clear { color, depth } => {
                    if !self.target_bound {
                        return Err(RenderError::NoTarget);
                    }
                    self.color.fill(*color);
                    self.depth.fill(*depth);
                    self.clears += 1;
                }
                GpuCommand::UploadDepth {
                    width,
                    height,
                    data,
                } => {
                    self.depth_texture = Some((*width, *height, Arc::clone(data)));
                }
                GpuCommand::UseProgram(program) => {
                    self.program = *program;
                    if program.is_none() {
                        self.depth_uniforms = None;
                        self.camera = None;
                        self.object = None;
                    }
                }
                GpuCommand::SetDepthUniforms(u) => self.depth_uniforms = Some(*u),
                GpuCommand::DrawFullscreen { .. } => self.draw_fullscreen()?,
                GpuCommand::SetCameraUniforms(u) => self.camera = Some(*u),
                GpuCommand::SetObjectUniforms(u) => self.object = Some(*u),
                GpuCommand::DrawObject { object, .. } => {
                    let vis = self.origin_visibility()?;
                    self.object_draws.push(*object);
                    self.visibility.push((*object, vis));
                }
                GpuCommand::BindTexture { .. } | GpuCommand::SetLightUniforms(_) => {}
            }
        }

        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{ViewState, Viewport};
    use crate::render::{Compositor, CompositorConfig, OcclusionMode, RenderContext};
    use crate::pose::Pose;
    use crate::scene::{ModelRef, Scene};
    use glam::{Quat, Vec3};

    fn render(mode: OcclusionMode, depth: &DepthFrame, vp: Viewport, proj: Mat4) -> SoftwareBackend {
        let scene = Scene::new(ModelRef::new("reticle"), Vec3::ONE);
        render_scene(mode, depth, vp, proj, &scene)
    }

    fn render_scene(
        mode: OcclusionMode,
        depth: &DepthFrame,
        vp: Viewport,
        proj: Mat4,
        scene: &Scene,
    ) -> SoftwareBackend {
        let compositor = Compositor::new(CompositorConfig {
            mode,
            ..Default::default()
        });
        let view = ViewState {
            projection: proj,
            view: Mat4::IDENTITY,
            viewport: vp,
        };
        let mut ctx = RenderContext::new();
        let mut enc = ctx.begin_frame();
        compositor
            .render_view(&mut enc, &view, Some(depth), scene)
            .expect("compose");
        let frame = enc.finish();

        let mut backend = SoftwareBackend::new(1, 1);
        backend.submit(&frame).expect("submit");
        backend
    }

    #[test]
    fn visualizes_left_right_gradient() {
        // 2x1 snapshot: 0 m on the left, 8 m on the right.
        let mut raw = Vec::new();
        raw.extend_from_slice(&crate::depth::encode_packed(0.0, 0.001));
        raw.extend_from_slice(&crate::depth::encode_packed(8.0, 0.001));
        let depth = DepthFrame::new(2, 1, raw, 0.001, Mat4::IDENTITY);

        let b = render(
            OcclusionMode::Visualize,
            &depth,
            Viewport::new(0, 0, 4, 2),
            Mat4::IDENTITY,
        );
        let left = b.color_at(0, 0).map(|c| c[0]).unwrap_or(-1.0);
        let right = b.color_at(3, 1).map(|c| c[0]).unwrap_or(-1.0);
        assert!(left < 0.01, "left={left}");
        assert!(right > 0.99, "right={right}");
    }

    #[test]
    fn prepass_fills_depth_buffer() {
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 20.0);
        let depth = DepthFrame::uniform(2, 2, 3.0, 0.001, Mat4::IDENTITY);
        let b = render(OcclusionMode::Occlude, &depth, Viewport::new(0, 0, 3, 3), proj);

        let expected = prepass_ndc_depth(3.0, 0.0, [proj.z_axis.z, proj.w_axis.z, proj.z_axis.w, proj.w_axis.w]);
        for row in 0..3 {
            for col in 0..3 {
                let d = b.depth_at(col, row).unwrap_or(-1.0);
                assert!((d - expected).abs() < 1e-5);
                // Prepass leaves color at the transparent clear.
                assert_eq!(b.color_at(col, row), Some([0.0; 4]));
            }
        }
    }

    #[test]
    fn objects_behind_real_surfaces_are_hidden() {
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 20.0);
        let mut scene = Scene::new(ModelRef::new("reticle"), Vec3::ONE);
        let pose = Pose::new(Vec3::new(0.0, 0.0, -2.0), Quat::IDENTITY);
        let id = scene.spawn_placed(ModelRef::new("box"), &pose, Vec3::ONE);
        let vp = Viewport::new(0, 0, 4, 4);

        let near_wall = DepthFrame::uniform(2, 2, 1.0, 0.001, Mat4::IDENTITY);
        let far_wall = DepthFrame::uniform(2, 2, 3.0, 0.001, Mat4::IDENTITY);

        let b = render_scene(OcclusionMode::Occlude, &near_wall, vp, proj, &scene);
        assert_eq!(b.object_draws(), &[id]);
        assert_eq!(b.object_visibility(id), Some(0.0));

        let b = render_scene(OcclusionMode::Occlude, &far_wall, vp, proj, &scene);
        assert_eq!(b.object_visibility(id), Some(1.0));

        // Visualize draws on top regardless of real depth.
        let b = render_scene(OcclusionMode::Visualize, &near_wall, vp, proj, &scene);
        assert_eq!(b.object_visibility(id), Some(1.0));
    }

    #[test]
    fn visibility_reads_depth_under_the_object() {
        // Left half 1 m, right half 3 m; the object sits 2 m out on the right.
        let mut raw = Vec::new();
        raw.extend_from_slice(&crate::depth::encode_packed(1.0, 0.001));
        raw.extend_from_slice(&crate::depth::encode_packed(3.0, 0.001));
        let depth = DepthFrame::new(2, 1, raw, 0.001, Mat4::IDENTITY);

        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 20.0);
        let mut scene = Scene::new(ModelRef::new("reticle"), Vec3::ONE);
        let right = Pose::new(Vec3::new(0.6, 0.0, -2.0), Quat::IDENTITY);
        let left = Pose::new(Vec3::new(-0.6, 0.0, -2.0), Quat::IDENTITY);
        let r = scene.spawn_placed(ModelRef::new("box"), &right, Vec3::ONE);
        let l = scene.spawn_placed(ModelRef::new("box"), &left, Vec3::ONE);

        let b = render_scene(OcclusionMode::Occlude, &depth, Viewport::new(0, 0, 8, 8), proj, &scene);
        assert_eq!(b.object_visibility(r), Some(1.0));
        assert_eq!(b.object_visibility(l), Some(0.0));
    }

    #[test]
    fn clear_without_target_fails() {
        let mut b = SoftwareBackend::new(1, 1);
        let frame = FrameCommands {
            frame_index: 0,
            commands: vec![GpuCommand::Clear {
                color: [0.0; 4],
                depth: 1.0,
            }],
        };
        assert_eq!(b.submit(&frame), Err(RenderError::NoTarget));
    }
}
