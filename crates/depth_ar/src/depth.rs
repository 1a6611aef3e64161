//! Depth snapshot decoding.
//!
//! The host delivers one depth snapshot per view per frame as a 2-channel,
//! 8-bit-per-channel buffer ("luminance-alpha" packing). Channel 0 holds the
//! low byte and channel 1 the high byte of a 16-bit raw value; the raw value
//! times `raw_value_to_meters` is the metric distance.
//!
//! The GPU samples the same bytes through a filtering sampler, so decoding is
//! expressed both on raw bytes and on normalized `[0, 1]` channel values. The
//! two forms are bit-identical for texel centers.

use glam::{Mat4, Vec2};
use rayon::prelude::*;
use std::sync::Arc;

/// Upper bound used to normalize metric depth for display and comparison.
pub const MAX_DEPTH_METERS: f32 = 8.0;

/// Bytes per depth texel (low, high).
pub const BYTES_PER_TEXEL: usize = 2;

/// Weights applied to the normalized (low, high) channels. A normalized
/// channel is `byte / 255`, so these restore `low + high * 256`.
pub const CHANNEL_WEIGHTS: [f32; 2] = [255.0, 256.0 * 255.0];

/// Decodes one texel from normalized channel values.
///
/// Inputs are clamped to `[0, 1]`, matching what a texture sampler returns.
#[inline]
pub fn decode_normalized(low: f32, high: f32, raw_value_to_meters: f32) -> f32 {
    let low = low.clamp(0.0, 1.0);
    let high = high.clamp(0.0, 1.0);
    (low * CHANNEL_WEIGHTS[0] + high * CHANNEL_WEIGHTS[1]) * raw_value_to_meters
}

/// Decodes one texel from its raw bytes.
#[inline]
pub fn decode_packed(low: u8, high: u8, raw_value_to_meters: f32) -> f32 {
    u16::from_le_bytes([low, high]) as f32 * raw_value_to_meters
}

/// Maps metric depth to a grayscale intensity in `[0, 1]`.
///
/// Linear in `[0, max_depth_m]`; values outside clamp.
#[inline]
pub fn depth_to_intensity(meters: f32, max_depth_m: f32) -> f32 {
    if max_depth_m <= 0.0 {
        return 0.0;
    }
    (meters / max_depth_m).clamp(0.0, 1.0)
}

/// Inverse of [`depth_to_intensity`] within range.
#[inline]
pub fn intensity_to_depth(intensity: f32, max_depth_m: f32) -> f32 {
    intensity.clamp(0.0, 1.0) * max_depth_m
}

/// Encodes a metric depth back into packed bytes.
///
/// Used by simulated hosts to synthesize snapshots. Out-of-range depths
/// saturate at 0 and `u16::MAX`.
pub fn encode_packed(meters: f32, raw_value_to_meters: f32) -> [u8; 2] {
    if raw_value_to_meters <= 0.0 || !meters.is_finite() {
        return [0, 0];
    }
    let raw = (meters / raw_value_to_meters)
        .round()
        .clamp(0.0, u16::MAX as f32) as u16;
    raw.to_le_bytes()
}

/// One frame's depth snapshot for one view.
///
/// Immutable once built. The byte payload is shared (`Arc`) so it can be
/// handed to a GPU upload without copying.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    width: u32,
    height: u32,
    raw: Arc<[u8]>,
    raw_value_to_meters: f32,
    norm_depth_buffer_from_norm_view: Mat4,
}

impl DepthFrame {
    pub fn new(
        width: u32,
        height: u32,
        raw: impl Into<Arc<[u8]>>,
        raw_value_to_meters: f32,
        norm_depth_buffer_from_norm_view: Mat4,
    ) -> Self {
        let raw = raw.into();
        let expected = width as usize * height as usize * BYTES_PER_TEXEL;
        if raw.len() < expected {
            log::warn!(
                "Depth snapshot {}x{} carries {} bytes (expected {}); missing texels decode to 0 m",
                width,
                height,
                raw.len(),
                expected
            );
        }
        Self {
            width,
            height,
            raw,
            raw_value_to_meters,
            norm_depth_buffer_from_norm_view,
        }
    }

    /// Builds a snapshot where every texel holds the same raw value.
    pub fn uniform(
        width: u32,
        height: u32,
        meters: f32,
        raw_value_to_meters: f32,
        norm_depth_buffer_from_norm_view: Mat4,
    ) -> Self {
        let texel = encode_packed(meters, raw_value_to_meters);
        let raw: Vec<u8> = texel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * BYTES_PER_TEXEL)
            .collect();
        Self::new(width, height, raw, raw_value_to_meters, norm_depth_buffer_from_norm_view)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn raw(&self) -> &Arc<[u8]> {
        &self.raw
    }

    #[inline]
    pub fn raw_value_to_meters(&self) -> f32 {
        self.raw_value_to_meters
    }

    /// Transform from normalized view UV to normalized depth-buffer UV.
    #[inline]
    pub fn norm_depth_buffer_from_norm_view(&self) -> Mat4 {
        self.norm_depth_buffer_from_norm_view
    }

    /// Raw (low, high) bytes of texel `(x, y)`; `(0, 0)` when out of bounds
    /// or missing from the payload.
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> (u8, u8) {
        if x >= self.width || y >= self.height {
            return (0, 0);
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_TEXEL;
        match self.raw.get(idx..idx + BYTES_PER_TEXEL) {
            Some(&[lo, hi]) => (lo, hi),
            _ => (0, 0),
        }
    }

    /// Metric depth of texel `(x, y)`.
    #[inline]
    pub fn meters_at(&self, x: u32, y: u32) -> f32 {
        let (lo, hi) = self.texel(x, y);
        decode_packed(lo, hi, self.raw_value_to_meters)
    }

    /// Samples the snapshot at a depth-buffer UV the way the GPU does:
    /// bilinear filtering of the normalized channels with clamp-to-edge,
    /// then a single decode.
    pub fn sample(&self, uv: Vec2) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;

        // Texel centers sit at (i + 0.5) / size.
        let x = uv.x.clamp(0.0, 1.0) * self.width as f32 - 0.5;
        let y = uv.y.clamp(0.0, 1.0) * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let fetch = |ix: i64, iy: i64| -> Vec2 {
            let (lo, hi) = self.texel(ix.clamp(0, max_x) as u32, iy.clamp(0, max_y) as u32);
            Vec2::new(lo as f32 / 255.0, hi as f32 / 255.0)
        };

        let (x0, y0) = (x0 as i64, y0 as i64);
        let top = fetch(x0, y0).lerp(fetch(x0 + 1, y0), fx);
        let bottom = fetch(x0, y0 + 1).lerp(fetch(x0 + 1, y0 + 1), fx);
        let ch = top.lerp(bottom, fy);

        decode_normalized(ch.x, ch.y, self.raw_value_to_meters)
    }

    /// Decodes the whole snapshot into row-major meters.
    pub fn to_meters(&self) -> Vec<f32> {
        let width = self.width as usize;
        let mut out = vec![0.0f32; width * self.height as usize];
        if width == 0 {
            return out;
        }
        out.par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, m) in row.iter_mut().enumerate() {
                    *m = self.meters_at(x as u32, y as u32);
                }
            });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALE: f32 = 0.001;

    #[test]
    fn decode_reference_points() {
        assert_eq!(decode_normalized(0.0, 0.0, SCALE), 0.0);
        assert!((decode_normalized(1.0, 0.0, SCALE) - 255.0 * SCALE).abs() < 1e-6);
        assert!((decode_normalized(0.0, 1.0, SCALE) - 256.0 * 255.0 * SCALE).abs() < 1e-3);

        assert_eq!(decode_packed(0, 0, SCALE), 0.0);
        assert!((decode_packed(255, 0, SCALE) - 255.0 * SCALE).abs() < 1e-6);
        assert!((decode_packed(0, 1, SCALE) - 256.0 * SCALE).abs() < 1e-6);
    }

    #[test]
    fn normalized_and_packed_agree() {
        for (lo, hi) in [(0u8, 0u8), (1, 0), (17, 3), (255, 255), (128, 64)] {
            let a = decode_packed(lo, hi, SCALE);
            let b = decode_normalized(lo as f32 / 255.0, hi as f32 / 255.0, SCALE);
            assert!((a - b).abs() < 1e-3, "{lo},{hi}: {a} vs {b}");
        }
    }

    #[test]
    fn decode_is_monotonic_in_raw_value() {
        let mut last = -1.0;
        for raw in (0..=u16::MAX).step_by(97) {
            let [lo, hi] = raw.to_le_bytes();
            let m = decode_packed(lo, hi, SCALE);
            assert!(m > last);
            last = m;
        }
    }

    #[test]
    fn normalized_inputs_are_clamped() {
        assert_eq!(decode_normalized(-0.5, -2.0, SCALE), 0.0);
        assert_eq!(
            decode_normalized(4.0, 0.0, SCALE),
            decode_normalized(1.0, 0.0, SCALE)
        );
    }

    #[test]
    fn intensity_clamps_and_inverts() {
        assert_eq!(depth_to_intensity(12.0, MAX_DEPTH_METERS), 1.0);
        assert_eq!(depth_to_intensity(-1.0, MAX_DEPTH_METERS), 0.0);
        assert_eq!(depth_to_intensity(2.0, MAX_DEPTH_METERS), 0.25);
        for m in [0.0, 0.5, 3.25, 7.9] {
            let back = intensity_to_depth(depth_to_intensity(m, MAX_DEPTH_METERS), MAX_DEPTH_METERS);
            assert!((back - m).abs() < 1e-5);
        }
    }

    #[test]
    fn encode_round_trips_representable_depths() {
        let [lo, hi] = encode_packed(2.0, SCALE);
        assert_eq!(u16::from_le_bytes([lo, hi]), 2000);
        assert_eq!(encode_packed(1.0e6, SCALE), [255, 255]);
        assert_eq!(encode_packed(-3.0, SCALE), [0, 0]);
    }

    #[test]
    fn short_payload_decodes_missing_texels_to_zero() {
        let frame = DepthFrame::new(2, 2, vec![0xD0, 0x07], SCALE, Mat4::IDENTITY);
        assert!((frame.meters_at(0, 0) - 2.0).abs() < 1e-6);
        assert_eq!(frame.meters_at(1, 0), 0.0);
        assert_eq!(frame.meters_at(5, 5), 0.0);
    }

    #[test]
    fn sample_matches_texels_at_centers() {
        // 2x1: left 1 m, right 3 m.
        let mut raw = Vec::new();
        raw.extend_from_slice(&encode_packed(1.0, SCALE));
        raw.extend_from_slice(&encode_packed(3.0, SCALE));
        let frame = DepthFrame::new(2, 1, raw, SCALE, Mat4::IDENTITY);

        assert!((frame.sample(Vec2::new(0.25, 0.5)) - 1.0).abs() < 1e-3);
        assert!((frame.sample(Vec2::new(0.75, 0.5)) - 3.0).abs() < 1e-3);
        // Midway between centers.
        assert!((frame.sample(Vec2::new(0.5, 0.5)) - 2.0).abs() < 1e-3);
        // Clamp-to-edge.
        assert!((frame.sample(Vec2::new(0.0, 0.5)) - 1.0).abs() < 1e-3);
        assert!((frame.sample(Vec2::new(1.0, 0.5)) - 3.0).abs() < 1e-3);
    }

    #[test]
    fn to_meters_decodes_every_texel() {
        let frame = DepthFrame::uniform(4, 3, 2.0, SCALE, Mat4::IDENTITY);
        let meters = frame.to_meters();
        assert_eq!(meters.len(), 12);
        assert!(meters.iter().all(|m| (m - 2.0).abs() < 1e-6));
    }
}
