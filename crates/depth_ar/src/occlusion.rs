//! Real-vs-virtual depth comparison.
//!
//! CPU mirror of `occlusion_visibility` and `prepass_ndc_depth` in the WGSL
//! prelude; both sides must stay identical.

/// Visibility of a virtual fragment `virtual_m` meters in front of the
/// viewer against a real surface at `real_m`.
///
/// Returns 1 when the virtual fragment is in front, 0 when it is behind.
/// With a positive `band_m` the transition is a linear ramp centered on the
/// real surface. A real depth of 0 means "no data" and never occludes.
#[inline]
pub fn occlusion_visibility(virtual_m: f32, real_m: f32, band_m: f32) -> f32 {
    if real_m <= 0.0 {
        return 1.0;
    }
    if band_m <= 0.0 {
        return if virtual_m <= real_m { 1.0 } else { 0.0 };
    }
    ((real_m - virtual_m) / band_m + 0.5).clamp(0.0, 1.0)
}

/// Depth-buffer value for a real surface `meters` in front of the viewer.
///
/// `proj_depth` holds the projection terms that produce clip z and w from
/// view-space z. Missing depth (`<= 0`) maps to the far plane.
#[inline]
pub fn prepass_ndc_depth(meters: f32, band_m: f32, proj_depth: [f32; 4]) -> f32 {
    if meters <= 0.0 {
        return 1.0;
    }
    let z = -(meters + 0.5 * band_m.max(0.0));
    let clip_z = proj_depth[0] * z + proj_depth[1];
    let clip_w = proj_depth[2] * z + proj_depth[3];
    if clip_w.abs() <= f32::EPSILON {
        return 1.0;
    }
    (clip_z / clip_w).clamp(0.0, 1.0)
}
