//! Parameter types for pixel operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between configuration (which knows the product family and the
//! policy knobs) and the [`pixels`](super::pixels) module (which does the
//! actual pixel work), so tests can drive the operations with small canvases
//! without building a whole config.
//!
//! ## Types
//!
//! - [`Sharpening`]: Unsharp-mask parameters applied after resampling.
//! - [`TrimParams`]: Alpha threshold and safety padding for border trimming.
//! - [`FitParams`]: Target canvas, fill fraction and sharpening for normalization.
//! - [`PrintCanvas`]: Pixel dimensions plus the DPI tag of a product family.

use serde::{Deserialize, Serialize};

/// Sharpening parameters for unsharp mask.
///
/// - `sigma`: Standard deviation of the Gaussian blur (higher = more sharpening)
/// - `threshold`: Minimum brightness difference to sharpen (0 = sharpen all pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sharpening {
    pub sigma: f32,
    pub threshold: i32,
}

impl Sharpening {
    /// Light sharpening that offsets Lanczos softness without visible halos.
    pub fn light() -> Self {
        Self {
            sigma: 0.5,
            threshold: 0,
        }
    }
}

/// Parameters for [`trim_transparent_border`](super::pixels::trim_transparent_border).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimParams {
    /// Pixels with alpha strictly below this count as transparent.
    pub alpha_threshold: u8,
    /// Minimum padding re-added on each side, in pixels.
    pub min_padding: u32,
    /// Padding as a fraction of the trimmed dimension, used when larger.
    pub padding_fraction: f64,
}

impl Default for TrimParams {
    fn default() -> Self {
        Self {
            alpha_threshold: 5,
            min_padding: 20,
            padding_fraction: 0.02,
        }
    }
}

/// Parameters for [`resize_and_center_on_canvas`](super::pixels::resize_and_center_on_canvas).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Share of the constraining canvas axis the content may occupy.
    pub max_fill_fraction: f64,
    pub sharpening: Option<Sharpening>,
}

impl FitParams {
    pub fn new(canvas_width: u32, canvas_height: u32, max_fill_fraction: f64) -> Self {
        Self {
            canvas_width,
            canvas_height,
            max_fill_fraction,
            sharpening: Some(Sharpening::light()),
        }
    }
}

/// A print area: exact raster size and the DPI tag written into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrintCanvas {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

impl PrintCanvas {
    /// Canvas for a physical print area in inches at the given DPI.
    pub fn from_inches(width_in: f64, height_in: f64, dpi: u32) -> Self {
        Self {
            width: (width_in * dpi as f64).round() as u32,
            height: (height_in * dpi as f64).round() as u32,
            dpi,
        }
    }
}
