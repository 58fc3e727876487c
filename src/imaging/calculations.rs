//! Pure calculation functions for placement and dimension math.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::TrimParams;

/// Safety padding re-added on one side of a trimmed axis.
///
/// `max(min_padding, padding_fraction × trimmed_len)`, so small designs get a
/// fixed margin and large ones a proportional one.
pub fn trim_padding(trimmed_len: u32, params: &TrimParams) -> u32 {
    let proportional = (trimmed_len as f64 * params.padding_fraction).round();
    let proportional = if proportional.is_finite() && proportional > 0.0 {
        proportional as u32
    } else {
        0
    };
    proportional.max(params.min_padding)
}

/// Dimensions that fit `source` inside `canvas` using at most
/// `fill_fraction` of the constraining axis, preserving aspect ratio.
///
/// Both results are at least 1 and never exceed the canvas.
///
/// ```text
/// 1000x500 into 4500x5400 at 0.96 → width constrained: 4320x2160
/// ```
pub fn calculate_fit_dimensions(
    source: (u32, u32),
    canvas: (u32, u32),
    fill_fraction: f64,
) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let (cw, ch) = canvas;

    let scale = (cw as f64 * fill_fraction / src_w).min(ch as f64 * fill_fraction / src_h);
    let w = ((src_w * scale).round() as u32).clamp(1, cw.max(1));
    let h = ((src_h * scale).round() as u32).clamp(1, ch.max(1));
    (w, h)
}

/// Top-left offset that centers `inner` inside `outer` on one axis.
///
/// Negative when `inner` is larger than `outer`.
pub fn center_offset(inner: u32, outer: u32) -> i64 {
    (outer as i64 - inner as i64) / 2
}

/// Source dimensions multiplied by a uniform scale, rounded, at least 1px.
pub fn calculate_scaled_dimensions(source: (u32, u32), scale: f64) -> (u32, u32) {
    let w = (source.0 as f64 * scale).round().max(1.0);
    let h = (source.1 as f64 * scale).round().max(1.0);
    (w as u32, h as u32)
}

/// Top-left position of a scaled image on the export canvas.
///
/// The image is centered, then moved by `offset` (canvas pixels). The result
/// is clamped so at least one column and one row of the image stay on the
/// canvas: an offset can push the design toward an edge, never off it.
pub fn calculate_export_position(
    scaled: (u32, u32),
    canvas: (u32, u32),
    offset: (i32, i32),
) -> (i64, i64) {
    let clamp_axis = |inner: u32, outer: u32, delta: i32| {
        let centered = center_offset(inner, outer) + delta as i64;
        let min = 1 - inner as i64;
        let max = outer as i64 - 1;
        centered.clamp(min, max)
    };
    (
        clamp_axis(scaled.0, canvas.0, offset.0),
        clamp_axis(scaled.1, canvas.1, offset.1),
    )
}

/// Convert a DPI tag to the pixels-per-metre unit PNG stores in `pHYs`.
pub fn dpi_to_pixels_per_metre(dpi: u32) -> u32 {
    (dpi as f64 / 0.0254).round() as u32
}

/// Inverse of [`dpi_to_pixels_per_metre`], rounded to the nearest whole DPI.
pub fn pixels_per_metre_to_dpi(ppm: u32) -> u32 {
    (ppm as f64 * 0.0254).round() as u32
}
