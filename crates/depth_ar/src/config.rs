use crate::host::SessionRequest;
use crate::render::CompositorConfig;
use crate::scene::ModelRef;
use glam::Vec3;

/// Model name of the built-in placement reticle.
pub const INDICATOR_MODEL: &str = "reticle";
/// Model name spawned on select unless configured otherwise.
pub const PLACED_MODEL: &str = "cube";

/// Everything the session driver needs besides the host and a backend.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub session: SessionRequest,
    pub compositor: CompositorConfig,
    pub indicator_model: ModelRef,
    pub indicator_scale: Vec3,
    pub placed_model: ModelRef,
    pub placed_scale: Vec3,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session: SessionRequest::default(),
            compositor: CompositorConfig::default(),
            indicator_model: ModelRef::new(INDICATOR_MODEL),
            indicator_scale: Vec3::ONE,
            placed_model: ModelRef::new(PLACED_MODEL),
            placed_scale: Vec3::splat(0.2),
        }
    }
}
