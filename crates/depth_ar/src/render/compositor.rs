//! Per-frame composition of real-world depth and virtual objects.

use super::context::{FrameEncoder, Program, RenderTarget};
use super::uniforms::{
    CameraUniformsStd140, DepthUniformsStd140, LightParams, LightUniformsStd140,
    ObjectUniformsStd140,
};
use super::RenderError;
use crate::depth::{DepthFrame, MAX_DEPTH_METERS};
use crate::pose::ViewState;
use crate::scene::Scene;

/// What the full-screen depth pass does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OcclusionMode {
    /// Show real-world depth as grayscale; objects draw on top unoccluded.
    #[default]
    Visualize,
    /// Populate the depth buffer from real-world depth and hide virtual
    /// fragments behind real surfaces.
    Occlude,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorConfig {
    pub mode: OcclusionMode,
    /// Depth mapped to full white; also the clamp bound.
    pub max_depth_m: f32,
    /// Soft occlusion band in meters; 0 = hard edge.
    pub blend_band_m: f32,
    /// Alpha of the grayscale visualization.
    pub visualize_opacity: f32,
    pub clear_color: [f32; 4],
    pub light: LightParams,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            mode: OcclusionMode::Visualize,
            max_depth_m: MAX_DEPTH_METERS,
            blend_band_m: 0.0,
            visualize_opacity: 1.0,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            light: LightParams::default(),
        }
    }
}

/// Counts for one composed view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeStats {
    pub depth_uploaded: bool,
    pub fullscreen_draws: u32,
    pub object_draws: u32,
    pub occluded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Compositor {
    config: CompositorConfig,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn set_mode(&mut self, mode: OcclusionMode) {
        self.config.mode = mode;
    }

    /// Records one view: clear, depth upload + full-screen pass (when a
    /// snapshot exists), camera/light setup, then every visible object in
    /// insertion order.
    pub fn render_view(
        &self,
        enc: &mut FrameEncoder<'_>,
        view: &ViewState,
        depth: Option<&DepthFrame>,
        scene: &Scene,
    ) -> Result<ComposeStats, RenderError> {
        let cfg = &self.config;
        let mut stats = ComposeStats::default();
        // An empty snapshot has nothing to upload; sampling it would read the
        // previous frame's texture.
        let depth = depth.filter(|f| f.width() > 0 && f.height() > 0);

        enc.bind_target(RenderTarget::Default, view.viewport);
        enc.clear(cfg.clear_color, 1.0)?;

        let depth_uniforms = depth.map(|frame| {
            DepthUniformsStd140::new(
                frame,
                view,
                cfg.max_depth_m,
                cfg.blend_band_m,
                cfg.visualize_opacity,
            )
        });

        if let (Some(frame), Some(uniforms)) = (depth, depth_uniforms) {
            enc.upload_depth(frame)?;
            stats.depth_uploaded = true;

            let program = match cfg.mode {
                OcclusionMode::Visualize => Program::DepthVisualize,
                OcclusionMode::Occlude => Program::DepthPrepass,
            };
            enc.use_program(program);
            enc.bind_depth_texture()?;
            enc.set_depth_uniforms(uniforms)?;
            enc.draw_fullscreen()?;
            stats.fullscreen_draws += 1;
        }

        let occluded = cfg.mode == OcclusionMode::Occlude && depth_uniforms.is_some();
        stats.occluded = occluded;

        enc.use_program(Program::Scene);
        enc.set_camera_uniforms(CameraUniformsStd140::new(view, occluded))?;
        enc.set_light_uniforms(LightUniformsStd140::from(&cfg.light))?;
        if let (true, Some(uniforms)) = (occluded, depth_uniforms) {
            enc.bind_depth_texture()?;
            enc.set_depth_uniforms(uniforms)?;
        }

        for obj in scene.objects().filter(|o| o.visible()) {
            enc.set_object_uniforms(ObjectUniformsStd140::from_object(obj))?;
            enc.bind_object_texture(obj.model())?;
            enc.draw_object(obj.id(), obj.model(), occluded)?;
            stats.object_draws += 1;
        }

        log::trace!(
            "Composed frame {}: depth={} objects={} occluded={}",
            enc.frame_index(),
            stats.depth_uploaded,
            stats.object_draws,
            stats.occluded
        );

        Ok(stats)
    }
}
