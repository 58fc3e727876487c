//! Pure pixel operations over decoded RGBA rasters.
//!
//! Nothing here performs I/O or keeps state, so every function is safe to call
//! from any number of pipeline workers at once. Per-pixel passes are split by
//! row across the rayon pool.
//!
//! | Operation | Notes |
//! |---|---|
//! | [`sample_average_luminance`] | Rec. 601 luma over visible pixels, 128 when none |
//! | [`invert_lightness`] | HSL `L' = 1 - L`, hue/saturation/alpha kept |
//! | [`trim_transparent_border`] | Crop to alpha ≥ threshold, re-pad symmetrically |
//! | [`resize_and_center_on_canvas`] | Lanczos3 in premultiplied space + unsharp, centered |
//! | [`composite_onto`] | Source-over blend, clipped to the canvas |

use super::calculations::{calculate_fit_dimensions, center_offset, trim_padding};
use super::color::{hsl_to_rgb, luminance, rgb_to_hsl, unit_to_u8};
use super::params::{FitParams, TrimParams};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use rayon::prelude::*;
use thiserror::Error;

/// Alpha above which a pixel counts as part of the visible design.
pub const DEFAULT_VISIBILITY_ALPHA: u8 = 50;

/// Luminance reported for images with no visible pixels (mid-gray).
pub const NEUTRAL_LUMINANCE: f64 = 128.0;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Image has zero width or height")]
    EmptyImage,
    #[error("Image has no pixels above the alpha threshold")]
    FullyTransparent,
    #[error("Invalid canvas {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },
    #[error("Invalid fill fraction {0} (must be in (0, 1])")]
    InvalidFillFraction(f64),
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to encode PNG: {0}")]
    Encode(String),
}

/// Apply `f` to every pixel, rows in parallel.
pub(crate) fn map_pixels<F>(img: &RgbaImage, f: F) -> RgbaImage
where
    F: Fn([u8; 4]) -> [u8; 4] + Sync,
{
    let (w, h) = img.dimensions();
    let stride = w as usize * 4;
    let mut out = RgbaImage::new(w, h);
    if stride == 0 {
        return out;
    }
    let src = img.as_raw();
    out.par_chunks_mut(stride)
        .zip(src.par_chunks(stride))
        .for_each(|(row_out, row_in)| {
            for (po, pi) in row_out.chunks_exact_mut(4).zip(row_in.chunks_exact(4)) {
                po.copy_from_slice(&f([pi[0], pi[1], pi[2], pi[3]]));
            }
        });
    out
}

/// Average luminance of visible pixels using the default visibility cut-off.
pub fn sample_average_luminance(img: &RgbaImage) -> f64 {
    sample_average_luminance_with(img, DEFAULT_VISIBILITY_ALPHA)
}

/// Average `0.299R + 0.587G + 0.114B` over pixels with alpha above
/// `visibility_alpha`. Returns [`NEUTRAL_LUMINANCE`] when nothing is visible.
///
/// Row sums are combined in row order, so the result does not depend on
/// thread scheduling.
pub fn sample_average_luminance_with(img: &RgbaImage, visibility_alpha: u8) -> f64 {
    let stride = img.width() as usize * 4;
    if stride == 0 {
        return NEUTRAL_LUMINANCE;
    }
    let rows: Vec<(f64, u64)> = img
        .as_raw()
        .par_chunks(stride)
        .map(|row| {
            row.chunks_exact(4)
                .filter(|p| p[3] > visibility_alpha)
                .fold((0.0, 0u64), |(sum, n), p| {
                    (sum + luminance(p[0], p[1], p[2]), n + 1)
                })
        })
        .collect();

    let (sum, count) = rows
        .into_iter()
        .fold((0.0, 0u64), |(s, n), (rs, rn)| (s + rs, n + rn));
    if count == 0 {
        NEUTRAL_LUMINANCE
    } else {
        (sum / count as f64).clamp(0.0, 255.0)
    }
}

/// Flip how light or dark every pixel reads without touching its hue.
///
/// Per pixel: RGB → HSL, `L' = 1 - L`, HSL → RGB. Alpha is copied unchanged.
/// Applying it twice returns the original within 8-bit rounding.
pub fn invert_lightness(img: &RgbaImage) -> RgbaImage {
    map_pixels(img, |[r, g, b, a]| {
        let (h, s, l) = rgb_to_hsl(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
        let (nr, ng, nb) = hsl_to_rgb(h, s, 1.0 - l);
        [unit_to_u8(nr), unit_to_u8(ng), unit_to_u8(nb), a]
    })
}

/// Bounding box `(x, y, width, height)` of pixels with alpha ≥ `threshold`.
pub fn opaque_bounds(img: &RgbaImage, threshold: u8) -> Option<(u32, u32, u32, u32)> {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    let mut found = false;

    for (x, y, px) in img.enumerate_pixels() {
        if px[3] >= threshold {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Remove the transparent border on all four sides, then re-add symmetric
/// transparent padding of [`trim_padding`] per axis.
///
/// Fails with [`ImagingError::FullyTransparent`] when no pixel reaches the
/// threshold: there is nothing to keep.
pub fn trim_transparent_border(
    img: &RgbaImage,
    params: &TrimParams,
) -> Result<RgbaImage, ImagingError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(ImagingError::EmptyImage);
    }
    let (x, y, w, h) =
        opaque_bounds(img, params.alpha_threshold).ok_or(ImagingError::FullyTransparent)?;

    let content = imageops::crop_imm(img, x, y, w, h).to_image();
    let pad_x = trim_padding(w, params);
    let pad_y = trim_padding(h, params);

    let mut padded = RgbaImage::new(w + 2 * pad_x, h + 2 * pad_y);
    imageops::replace(&mut padded, &content, pad_x as i64, pad_y as i64);
    Ok(padded)
}

/// Scale `img` uniformly to fill at most `max_fill_fraction` of the canvas,
/// sharpen, and center it on a transparent canvas of exactly the requested size.
///
/// Resampling happens on premultiplied color so transparent pixels do not
/// bleed dark fringes into anti-aliased edges.
pub fn resize_and_center_on_canvas(
    img: &RgbaImage,
    params: &FitParams,
) -> Result<RgbaImage, ImagingError> {
    let (cw, ch) = (params.canvas_width, params.canvas_height);
    if cw == 0 || ch == 0 {
        return Err(ImagingError::InvalidCanvas {
            width: cw,
            height: ch,
        });
    }
    if !(params.max_fill_fraction > 0.0 && params.max_fill_fraction <= 1.0) {
        return Err(ImagingError::InvalidFillFraction(params.max_fill_fraction));
    }
    if img.width() == 0 || img.height() == 0 {
        return Err(ImagingError::EmptyImage);
    }

    let (w, h) = calculate_fit_dimensions(img.dimensions(), (cw, ch), params.max_fill_fraction);
    let resized = resize_rgba(img, w, h);

    let finished = match params.sharpening {
        Some(s) => {
            let mut sharpened = imageops::unsharpen(&resized, s.sigma, s.threshold);
            // Sharpen color only; a sharpened alpha channel rings around edges.
            for (dst, src) in sharpened.pixels_mut().zip(resized.pixels()) {
                dst[3] = src[3];
            }
            sharpened
        }
        None => resized,
    };

    let mut canvas = RgbaImage::new(cw, ch);
    imageops::replace(
        &mut canvas,
        &finished,
        center_offset(w, cw),
        center_offset(h, ch),
    );
    Ok(canvas)
}

/// High-quality (Lanczos3) resize in premultiplied-alpha space.
pub fn resize_rgba(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let premultiplied = map_pixels(img, |[r, g, b, a]| {
        let f = a as f32 / 255.0;
        [
            (r as f32 * f).round() as u8,
            (g as f32 * f).round() as u8,
            (b as f32 * f).round() as u8,
            a,
        ]
    });
    let resized = imageops::resize(&premultiplied, width, height, FilterType::Lanczos3);
    map_pixels(&resized, |[r, g, b, a]| {
        if a == 0 {
            return [0, 0, 0, 0];
        }
        let f = 255.0 / a as f32;
        [
            (r as f32 * f).round().min(255.0) as u8,
            (g as f32 * f).round().min(255.0) as u8,
            (b as f32 * f).round().min(255.0) as u8,
            a,
        ]
    })
}

/// Alpha-composite `overlay` onto `canvas` with its top-left at `(x, y)`.
///
/// Source-over in straight alpha. Parts of the overlay that fall outside the
/// canvas are clipped; negative positions are allowed.
pub fn composite_onto(canvas: &mut RgbaImage, overlay: &RgbaImage, x: i64, y: i64) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    let (ow, oh) = (overlay.width() as i64, overlay.height() as i64);

    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + ow).min(cw);
    let y1 = (y + oh).min(ch);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for cy in y0..y1 {
        for cx in x0..x1 {
            let src = overlay.get_pixel((cx - x) as u32, (cy - y) as u32);
            let sa = src[3] as f32 / 255.0;
            if sa <= 0.0 {
                continue;
            }
            let dst = canvas.get_pixel_mut(cx as u32, cy as u32);
            let da = dst[3] as f32 / 255.0;
            let out_a = sa + da * (1.0 - sa);
            for c in 0..3 {
                let blended =
                    (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
                dst[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}
