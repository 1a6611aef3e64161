//! WGSL sources.
//!
//! Both the full-screen depth pass and the scene pass are assembled from
//! [`DEPTH_PRELUDE_WGSL`], so the decode and the fragment → depth-UV path
//! exist exactly once on the GPU side. The CPU mirrors live in
//! `depth`, `coords` and `occlusion`.

/// Shared decode, coordinate transform and occlusion helpers.
///
/// Expects the including module to declare `D: DepthUniforms`.
pub const DEPTH_PRELUDE_WGSL: &str = r#"
struct DepthUniforms {
    uv_transform: mat4x4<f32>,
    resolution: vec2<f32>,
    raw_value_to_meters: f32,
    max_depth_m: f32,
    proj_depth: vec4<f32>,
    blend_band_m: f32,
    opacity: f32,
    _pad0: f32,
    _pad1: f32,
};

// (low, high) normalized channels -> meters.
fn depth_get_meters(t: texture_2d<f32>, s: sampler, depth_uv: vec2<f32>) -> f32 {
    let packed = textureSampleLevel(t, s, depth_uv, 0.0).rg;
    return dot(packed, vec2<f32>(255.0, 256.0 * 255.0)) * D.raw_value_to_meters;
}

// Viewport-relative, bottom-left origin. Derived from interpolated NDC so the
// viewport's position inside the framebuffer does not matter.
fn ndc_to_fragment(ndc: vec2<f32>) -> vec2<f32> {
    return (ndc * 0.5 + vec2<f32>(0.5, 0.5)) * max(D.resolution, vec2<f32>(1.0, 1.0));
}

fn fragment_to_depth_uv(frag: vec2<f32>) -> vec2<f32> {
    let res = max(D.resolution, vec2<f32>(1.0, 1.0));
    let view_uv = vec2<f32>(frag.x / res.x, 1.0 - frag.y / res.y);
    let p = D.uv_transform * vec4<f32>(view_uv, 0.0, 1.0);
    if (abs(p.w) > 1.1920929e-7) {
        return p.xy / p.w;
    }
    return p.xy;
}

fn occlusion_visibility(virtual_m: f32, real_m: f32, band_m: f32) -> f32 {
    if (real_m <= 0.0) {
        return 1.0;
    }
    if (band_m <= 0.0) {
        return select(0.0, 1.0, virtual_m <= real_m);
    }
    return clamp((real_m - virtual_m) / band_m + 0.5, 0.0, 1.0);
}

fn prepass_ndc_depth(meters: f32) -> f32 {
    if (meters <= 0.0) {
        return 1.0;
    }
    let z = -(meters + 0.5 * max(D.blend_band_m, 0.0));
    let clip_z = D.proj_depth.x * z + D.proj_depth.y;
    let clip_w = D.proj_depth.z * z + D.proj_depth.w;
    if (abs(clip_w) <= 1.1920929e-7) {
        return 1.0;
    }
    return clamp(clip_z / clip_w, 0.0, 1.0);
}
"#;

/// Full-screen pass: grayscale visualization (`fs_visualize`) or depth
/// buffer pre-population (`fs_prepass`). Two triangles from
/// `vertex_index`; no vertex buffer.
pub const DEPTH_PASS_BODY_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> D: DepthUniforms;
@group(0) @binding(1) var depth_tex: texture_2d<f32>;
@group(0) @binding(2) var depth_samp: sampler;

struct FullscreenOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) ndc: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> FullscreenOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 1.0, -1.0),
        vec2<f32>( 1.0,  1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 1.0,  1.0),
        vec2<f32>(-1.0,  1.0),
    );
    var out: FullscreenOut;
    out.pos = vec4<f32>(corners[vi], 0.0, 1.0);
    out.ndc = corners[vi];
    return out;
}

@fragment
fn fs_visualize(in: FullscreenOut) -> @location(0) vec4<f32> {
    let frag = ndc_to_fragment(in.ndc);
    let meters = depth_get_meters(depth_tex, depth_samp, fragment_to_depth_uv(frag));
    let g = clamp(meters / D.max_depth_m, 0.0, 1.0);
    return vec4<f32>(g, g, g, D.opacity);
}

struct PrepassOut {
    @location(0) color: vec4<f32>,
    @builtin(frag_depth) depth: f32,
}

@fragment
fn fs_prepass(in: FullscreenOut) -> PrepassOut {
    let frag = ndc_to_fragment(in.ndc);
    let meters = depth_get_meters(depth_tex, depth_samp, fragment_to_depth_uv(frag));
    var out: PrepassOut;
    out.color = vec4<f32>(0.0, 0.0, 0.0, 0.0);
    out.depth = prepass_ndc_depth(meters);
    return out;
}
"#;

/// Lit, textured meshes with optional per-fragment occlusion.
pub const SCENE_BODY_WGSL: &str = r#"
struct CameraUniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    occlusion_enabled: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};

struct LightUniforms {
    direction: vec3<f32>,
    intensity: f32,
    color: vec3<f32>,
    _pad0: f32,
    ambient: vec3<f32>,
    _pad1: f32,
};

struct ObjectUniforms {
    model: mat4x4<f32>,
    inverse_model: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> C: CameraUniforms;
@group(0) @binding(1) var<uniform> L: LightUniforms;
@group(0) @binding(2) var<uniform> D: DepthUniforms;
@group(0) @binding(3) var depth_tex: texture_2d<f32>;
@group(0) @binding(4) var depth_samp: sampler;

@group(1) @binding(0) var<uniform> O: ObjectUniforms;

@group(2) @binding(0) var obj_tex: texture_2d<f32>;
@group(2) @binding(1) var obj_samp: sampler;

struct VsIn {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal_w: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) view_depth_m: f32,
    @location(3) clip_pos: vec4<f32>,
}

@vertex
fn vs_main(in: VsIn) -> VsOut {
    let world = O.model * vec4<f32>(in.position, 1.0);
    let view = C.view * world;
    var out: VsOut;
    out.clip = C.projection * view;
    out.clip_pos = out.clip;
    out.normal_w = (transpose(O.inverse_model) * vec4<f32>(in.normal, 0.0)).xyz;
    out.uv = in.uv;
    out.view_depth_m = -view.z;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let base = textureSample(obj_tex, obj_samp, in.uv);
    let n = normalize(in.normal_w);
    let diffuse = max(dot(n, -L.direction), 0.0) * L.intensity;
    let rgb = base.rgb * (L.ambient + L.color * diffuse);

    var alpha = base.a;
    if (C.occlusion_enabled != 0u) {
        let frag = ndc_to_fragment(in.clip_pos.xy / in.clip_pos.w);
        let real_m = depth_get_meters(depth_tex, depth_samp, fragment_to_depth_uv(frag));
        let vis = occlusion_visibility(in.view_depth_m, real_m, D.blend_band_m);
        if (vis <= 0.0) {
            discard;
        }
        alpha = alpha * vis;
    }
    return vec4<f32>(rgb, alpha);
}
"#;

/// Complete source of the full-screen depth pass.
pub fn depth_pass_source() -> String {
    format!("{DEPTH_PRELUDE_WGSL}\n{DEPTH_PASS_BODY_WGSL}")
}

/// Complete source of the scene pass.
pub fn scene_source() -> String {
    format!("{DEPTH_PRELUDE_WGSL}\n{SCENE_BODY_WGSL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_passes_share_the_prelude() {
        for src in [depth_pass_source(), scene_source()] {
            assert!(src.starts_with(DEPTH_PRELUDE_WGSL));
            assert_eq!(src.matches("fn depth_get_meters").count(), 1);
            assert_eq!(src.matches("fn fragment_to_depth_uv").count(), 1);
            assert_eq!(src.matches("fn ndc_to_fragment").count(), 1);
        }
    }

    #[test]
    fn depth_lookups_ignore_framebuffer_position() {
        // Framebuffer-absolute coordinates would misplace lookups for
        // viewports that do not start at the origin.
        for src in [depth_pass_source(), scene_source()] {
            assert!(!src.contains("fragment_to_depth_uv(pos.xy)"));
            assert!(!src.contains("fragment_to_depth_uv(in.clip.xy)"));
        }
        assert_eq!(depth_pass_source().matches("ndc_to_fragment(in.ndc)").count(), 2);
        assert!(scene_source().contains("ndc_to_fragment(in.clip_pos.xy / in.clip_pos.w)"));
    }

    #[test]
    fn prelude_weights_match_cpu_decode() {
        let [lo, hi] = crate::depth::CHANNEL_WEIGHTS;
        assert_eq!(lo, 255.0);
        assert_eq!(hi, 256.0 * 255.0);
        assert!(DEPTH_PRELUDE_WGSL.contains("vec2<f32>(255.0, 256.0 * 255.0)"));
    }
}
