use clap::{Parser, ValueEnum};
use depth_ar::{CompositorConfig, OcclusionMode, PipelineConfig, MAX_DEPTH_METERS};

use crate::sim_host::{Room, SimSettings};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Grayscale real-world depth under the virtual objects.
    Visualize,
    /// Hide virtual fragments behind real surfaces.
    Occlude,
}

impl From<ModeArg> for OcclusionMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Visualize => OcclusionMode::Visualize,
            ModeArg::Occlude => OcclusionMode::Occlude,
        }
    }
}

/// `ar_viewer` - desktop front end for the depth-aware AR pipeline.
///
/// Runs the frame pipeline against a simulated AR host: a synthetic room
/// supplies depth snapshots and floor hit-tests while the mouse and keyboard
/// move the viewer. Left click places an object at the reticle.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Initial window width in logical pixels.
    #[arg(long, env = "AR_VIEWER_WIDTH", default_value_t = 1280)]
    pub width: u32,

    /// Initial window height in logical pixels.
    #[arg(long, env = "AR_VIEWER_HEIGHT", default_value_t = 720)]
    pub height: u32,

    /// What the full-screen depth pass does.
    #[arg(long, env = "AR_VIEWER_MODE", value_enum, default_value_t = ModeArg::Visualize)]
    pub mode: ModeArg,

    /// Depth mapped to white in the visualization.
    #[arg(long, env = "AR_VIEWER_MAX_DEPTH_M", default_value_t = MAX_DEPTH_METERS)]
    pub max_depth_m: f32,

    /// Soft occlusion band in meters (0 = hard edge).
    #[arg(long, env = "AR_VIEWER_BLEND_BAND_M", default_value_t = 0.0)]
    pub blend_band_m: f32,

    /// Alpha of the depth visualization.
    #[arg(long, env = "AR_VIEWER_VISUALIZE_OPACITY", default_value_t = 1.0)]
    pub visualize_opacity: f32,

    /// Width of the simulated depth snapshot in texels.
    #[arg(long, env = "AR_VIEWER_DEPTH_WIDTH", default_value_t = 160)]
    pub depth_width: u32,

    /// Height of the simulated depth snapshot in texels.
    #[arg(long, env = "AR_VIEWER_DEPTH_HEIGHT", default_value_t = 120)]
    pub depth_height: u32,

    /// Meters per raw depth unit.
    #[arg(long, env = "AR_VIEWER_DEPTH_SCALE", default_value_t = 0.001)]
    pub depth_scale: f32,

    /// Sensor range; farther surfaces report no data.
    #[arg(long, env = "AR_VIEWER_DEPTH_RANGE_M", default_value_t = 10.0)]
    pub depth_range_m: f32,

    /// Deliver depth in portrait orientation (exercises the UV transform).
    #[arg(long, env = "AR_VIEWER_ROTATE_DEPTH")]
    pub rotate_depth: bool,

    /// Room extent along x in meters.
    #[arg(long, env = "AR_VIEWER_ROOM_WIDTH", default_value_t = 6.0)]
    pub room_width: f32,

    /// Room extent along z in meters.
    #[arg(long, env = "AR_VIEWER_ROOM_LENGTH", default_value_t = 8.0)]
    pub room_length: f32,

    /// Ceiling height in meters.
    #[arg(long, env = "AR_VIEWER_ROOM_HEIGHT", default_value_t = 2.8)]
    pub room_height: f32,

    /// Start with the HUD hidden.
    #[arg(long, env = "AR_VIEWER_NO_HUD")]
    pub no_hud: bool,
}

impl Config {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            compositor: CompositorConfig {
                mode: self.mode.into(),
                max_depth_m: self.max_depth_m,
                blend_band_m: self.blend_band_m.max(0.0),
                visualize_opacity: self.visualize_opacity.clamp(0.0, 1.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn sim_settings(&self) -> SimSettings {
        SimSettings {
            room: Room::new(self.room_width, self.room_length, self.room_height),
            depth_width: self.depth_width.max(1),
            depth_height: self.depth_height.max(1),
            raw_value_to_meters: self.depth_scale,
            max_range_m: self.depth_range_m,
            rotate_depth: self.rotate_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_visualize_with_eight_meter_range() {
        let cfg = Config::try_parse_from(["ar_viewer"]).expect("parse");
        let p = cfg.pipeline_config();
        assert_eq!(p.compositor.mode, OcclusionMode::Visualize);
        assert_eq!(p.compositor.max_depth_m, 8.0);
        assert_eq!(p.compositor.blend_band_m, 0.0);
        assert!(!cfg.sim_settings().rotate_depth);
    }

    #[test]
    fn occlude_mode_and_band_from_flags() {
        let cfg = Config::try_parse_from([
            "ar_viewer",
            "--mode",
            "occlude",
            "--blend-band-m",
            "0.05",
            "--rotate-depth",
        ])
        .expect("parse");
        let p = cfg.pipeline_config();
        assert_eq!(p.compositor.mode, OcclusionMode::Occlude);
        assert!((p.compositor.blend_band_m - 0.05).abs() < 1e-6);
        assert!(cfg.sim_settings().rotate_depth);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Config::try_parse_from(["ar_viewer", "--mode", "xray"]).is_err());
    }
}
