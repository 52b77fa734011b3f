//! Per-pixel math shared by every execution backend.
//!
//! Everything here is a pure function over bytes. Backends call these concurrently without
//! synchronization, and byte-identical output across backends depends on all of them going
//! through exactly this code.

/// Luma weights for `0.299 r + 0.587 g + 0.114 b`.
const LUMA_R: f64 = 0.299;
const LUMA_G: f64 = 0.587;
const LUMA_B: f64 = 0.114;

/// Grayscale value of one RGB pixel, rounded half-up.
///
/// The weights sum to 1, so the result always fits a byte.
#[inline]
pub fn grayscale(r: u8, g: u8, b: u8) -> u8 {
    let y = LUMA_R * f64::from(r) + LUMA_G * f64::from(g) + LUMA_B * f64::from(b);
    (y + 0.5) as u8
}

/// Crossfade one channel: `p = 1` yields `color`, `p = 0` yields `gray`.
///
/// Evaluated as `color * p + gray * (1 - p)` in `f32` and truncated toward zero, not rounded.
/// Exact at `p = 0` and `p = 1`. In between, blending a value with itself may land one below it.
#[inline]
pub fn blend(color: u8, gray: u8, p: f32) -> u8 {
    let c = f32::from(color);
    let g = f32::from(gray);
    (c * p + g * (1.0 - p)) as u8
}

/// Write the grayscale of interleaved RGB `src` into `dst`, replicating luma into all channels.
pub fn to_grayscale_rgb8(src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
        let y = grayscale(s[0], s[1], s[2]);
        d[0] = y;
        d[1] = y;
        d[2] = y;
    }
}

/// Blend two equal-length sample buffers channel by channel into `dst`.
pub fn crossfade_into(color: &[u8], gray: &[u8], p: f32, dst: &mut [u8]) {
    debug_assert_eq!(color.len(), gray.len());
    debug_assert_eq!(color.len(), dst.len());
    for ((d, &c), &g) in dst.iter_mut().zip(color).zip(gray) {
        *d = blend(c, g, p);
    }
}
