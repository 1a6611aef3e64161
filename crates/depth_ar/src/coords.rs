//! Screen space → depth-buffer space.
//!
//! Fragment coordinates come in with a bottom-left origin and y up. Depth
//! snapshots are addressed in a top-left, y-down normalized space that may be
//! rotated or rescaled relative to the render target; the host supplies the
//! matrix that bridges the two.

use glam::{Mat4, Vec2, Vec4};

/// Normalizes a bottom-left-origin pixel coordinate to top-left UV.
///
/// `(0, 0)` maps to `(0, 1)` and `(width, height)` to `(1, 0)`.
#[inline]
pub fn screen_to_view_uv(frag: Vec2, resolution: Vec2) -> Vec2 {
    let res = resolution.max(Vec2::ONE);
    Vec2::new(frag.x / res.x, 1.0 - frag.y / res.y)
}

/// Projects a view UV through `normDepthBufferFromNormView`.
#[inline]
pub fn view_uv_to_depth_uv(view_uv: Vec2, norm_depth_buffer_from_norm_view: &Mat4) -> Vec2 {
    let p = *norm_depth_buffer_from_norm_view * Vec4::new(view_uv.x, view_uv.y, 0.0, 1.0);
    if p.w.abs() > f32::EPSILON {
        Vec2::new(p.x / p.w, p.y / p.w)
    } else {
        Vec2::new(p.x, p.y)
    }
}

/// Full fragment → depth-texture coordinate path.
#[inline]
pub fn fragment_to_depth_uv(frag: Vec2, resolution: Vec2, uv_transform: &Mat4) -> Vec2 {
    view_uv_to_depth_uv(screen_to_view_uv(frag, resolution), uv_transform)
}

/// Viewport-relative, bottom-left-origin fragment coordinate of an NDC
/// position. Independent of where the viewport sits in the framebuffer.
#[inline]
pub fn ndc_to_fragment(ndc: Vec2, resolution: Vec2) -> Vec2 {
    (ndc * 0.5 + Vec2::splat(0.5)) * resolution.max(Vec2::ONE)
}

/// Bottom-left-origin fragment center of output pixel `(col, row)`, where
/// `row` counts from the top of the image.
#[inline]
pub fn pixel_center(col: u32, row: u32, height: u32) -> Vec2 {
    Vec2::new(col as f32 + 0.5, height as f32 - (row as f32 + 0.5))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RES: Vec2 = Vec2::new(640.0, 480.0);

    #[test]
    fn corners_map_exactly() {
        assert_eq!(screen_to_view_uv(Vec2::new(0.0, 0.0), RES), Vec2::new(0.0, 1.0));
        assert_eq!(screen_to_view_uv(Vec2::new(640.0, 0.0), RES), Vec2::new(1.0, 1.0));
        assert_eq!(screen_to_view_uv(Vec2::new(0.0, 480.0), RES), Vec2::new(0.0, 0.0));
        assert_eq!(screen_to_view_uv(Vec2::new(640.0, 480.0), RES), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn in_range_pixels_stay_in_unit_square() {
        for x in (0..=640).step_by(37) {
            for y in (0..=480).step_by(29) {
                let uv = screen_to_view_uv(Vec2::new(x as f32, y as f32), RES);
                assert!((0.0..=1.0).contains(&uv.x), "u={}", uv.x);
                assert!((0.0..=1.0).contains(&uv.y), "v={}", uv.y);
            }
        }
    }

    #[test]
    fn identity_transform_is_passthrough() {
        let uv = Vec2::new(0.3, 0.7);
        assert_eq!(view_uv_to_depth_uv(uv, &Mat4::IDENTITY), uv);
    }

    #[test]
    fn rotated_depth_buffer() {
        // Portrait depth buffer under a landscape view: (u, v) -> (1 - v, u).
        let m = Mat4::from_cols(
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            Vec4::new(-1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        );
        let d = view_uv_to_depth_uv(Vec2::new(0.25, 0.1), &m);
        assert!((d - Vec2::new(0.9, 0.25)).length() < 1e-6);
    }

    #[test]
    fn ndc_maps_onto_viewport_pixels() {
        assert_eq!(ndc_to_fragment(Vec2::new(-1.0, -1.0), RES), Vec2::ZERO);
        assert_eq!(ndc_to_fragment(Vec2::new(1.0, 1.0), RES), RES);
        assert_eq!(ndc_to_fragment(Vec2::ZERO, RES), Vec2::new(320.0, 240.0));

        // NDC of a pixel center comes back to that center.
        let c = pixel_center(5, 7, 480);
        let ndc = c / RES * 2.0 - Vec2::ONE;
        assert!((ndc_to_fragment(ndc, RES) - c).length() < 1e-3);
    }

    #[test]
    fn pixel_centers_flip_rows() {
        assert_eq!(pixel_center(0, 0, 4), Vec2::new(0.5, 3.5));
        assert_eq!(pixel_center(3, 3, 4), Vec2::new(3.5, 0.5));
    }
}
