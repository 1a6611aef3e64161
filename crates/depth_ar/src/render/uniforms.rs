//! Uniform blocks shared by the depth and scene shaders.
//!
//! Layouts follow std140 and must match the WGSL structs in
//! [`super::shaders`].

use crate::depth::DepthFrame;
use crate::pose::ViewState;
use crate::scene::SceneObject;
use glam::{Mat4, Vec3};

/// Inputs of the depth decode + coordinate transform path.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DepthUniformsStd140 {
    /// normDepthBufferFromNormView.
    pub uv_transform: [[f32; 4]; 4], // 64
    /// Render-target size in pixels.
    pub resolution: [f32; 2],        // +8  -> 72
    pub raw_value_to_meters: f32,    // +4  -> 76
    pub max_depth_m: f32,            // +4  -> 80
    /// Projection terms that map view-space z to clip z/w:
    /// (P[2][2], P[3][2], P[2][3], P[3][3]) in column-major indexing.
    pub proj_depth: [f32; 4],        // +16 -> 96
    /// Soft occlusion band around the real surface; 0 = hard edge.
    pub blend_band_m: f32,           // +4  -> 100
    /// Alpha of the grayscale visualization.
    pub opacity: f32,                // +4  -> 104
    pub _pad: [f32; 2],              // +8  -> 112
}

const _: [(); 112] = [(); core::mem::size_of::<DepthUniformsStd140>()];

impl DepthUniformsStd140 {
    pub fn new(
        frame: &DepthFrame,
        view: &ViewState,
        max_depth_m: f32,
        blend_band_m: f32,
        opacity: f32,
    ) -> Self {
        let p = view.projection;
        Self {
            uv_transform: frame.norm_depth_buffer_from_norm_view().to_cols_array_2d(),
            resolution: [view.viewport.width as f32, view.viewport.height as f32],
            raw_value_to_meters: frame.raw_value_to_meters(),
            max_depth_m,
            proj_depth: [p.z_axis.z, p.w_axis.z, p.z_axis.w, p.w_axis.w],
            blend_band_m: blend_band_m.max(0.0),
            opacity,
            _pad: [0.0; 2],
        }
    }

    #[inline]
    pub fn uv_transform(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.uv_transform)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniformsStd140 {
    pub projection: [[f32; 4]; 4], // 64
    pub view: [[f32; 4]; 4],       // +64 -> 128
    /// Non-zero when scene fragments test against real-world depth.
    pub occlusion_enabled: u32,    // +4  -> 132
    pub _pad: [u32; 3],            // +12 -> 144
}

const _: [(); 144] = [(); core::mem::size_of::<CameraUniformsStd140>()];

impl CameraUniformsStd140 {
    pub fn new(view: &ViewState, occlusion_enabled: bool) -> Self {
        Self {
            projection: view.projection.to_cols_array_2d(),
            view: view.view.to_cols_array_2d(),
            occlusion_enabled: occlusion_enabled as u32,
            _pad: [0; 3],
        }
    }
}

/// One directional light plus ambient.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightParams {
    /// Direction the light travels (world space).
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub ambient: Vec3,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.3, -1.0, -0.4).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            ambient: Vec3::splat(0.35),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniformsStd140 {
    pub direction: [f32; 3], // 12
    pub intensity: f32,      // +4  -> 16
    pub color: [f32; 3],     // +12 -> 28
    pub _pad0: f32,          // +4  -> 32
    pub ambient: [f32; 3],   // +12 -> 44
    pub _pad1: f32,          // +4  -> 48
}

const _: [(); 48] = [(); core::mem::size_of::<LightUniformsStd140>()];

impl From<&LightParams> for LightUniformsStd140 {
    fn from(l: &LightParams) -> Self {
        Self {
            direction: l.direction.normalize_or_zero().to_array(),
            intensity: l.intensity,
            color: l.color.to_array(),
            _pad0: 0.0,
            ambient: l.ambient.to_array(),
            _pad1: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniformsStd140 {
    pub model: [[f32; 4]; 4],         // 64
    pub inverse_model: [[f32; 4]; 4], // +64 -> 128
}

const _: [(); 128] = [(); core::mem::size_of::<ObjectUniformsStd140>()];

impl ObjectUniformsStd140 {
    pub fn from_object(obj: &SceneObject) -> Self {
        Self {
            model: obj.model_matrix().to_cols_array_2d(),
            inverse_model: obj.transform().inverse_matrix().to_cols_array_2d(),
        }
    }
}
