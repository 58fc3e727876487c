//! Visual filter descriptors: parsing and application.
//!
//! Exports accept a compact, CSS-like adjustment string such as
//! `"brightness(1.2) contrast(0.8) sepia(0.3)"`. Parsing never fails: every
//! field starts at its identity value and is only replaced by a recognized,
//! well-formed token.
//!
//! ## Grammar
//!
//! ```text
//! filter   := "none" | "" | token*
//! token    := name "(" number "%"? ")"
//! name     := brightness | contrast | saturate | saturation | sepia   (any case)
//! ```
//!
//! - Whitespace (and commas) between tokens is ignored; order does not matter.
//! - A trailing `%` divides the value by 100 (`brightness(120%)` = 1.2).
//! - Unknown names, negative numbers and non-numbers are ignored.
//! - `sepia` is clamped to `[0, 1]`.
//! - When a name repeats, the last occurrence wins.

use crate::imaging::pixels::map_pixels;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed numeric form of a filter string.
///
/// Identity values: brightness 1, contrast 1, saturation 1, sepia 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub sepia: f64,
}

impl FilterDescriptor {
    pub const IDENTITY: FilterDescriptor = FilterDescriptor {
        brightness: 1.0,
        contrast: 1.0,
        saturation: 1.0,
        sepia: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for FilterDescriptor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Canonical text form; parses back to the same descriptor.
impl fmt::Display for FilterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            return f.write_str("none");
        }
        write!(
            f,
            "brightness({}) contrast({}) saturate({}) sepia({})",
            self.brightness, self.contrast, self.saturation, self.sepia
        )
    }
}

/// Parse a filter string. Never fails; see the [module docs](self).
pub fn parse(text: &str) -> FilterDescriptor {
    let mut desc = FilterDescriptor::IDENTITY;
    let lower = text.trim().to_ascii_lowercase();
    if lower.is_empty() || lower == "none" {
        return desc;
    }

    let mut rest = lower.as_str();
    while let Some(open) = rest.find('(') {
        let name = rest[..open]
            .trim()
            .rsplit(|c: char| c.is_whitespace() || c == ',')
            .next()
            .unwrap_or_default();
        let after = &rest[open + 1..];
        let Some(close) = after.find(')') else {
            break;
        };
        if let Some(value) = parse_value(&after[..close]) {
            match name {
                "brightness" => desc.brightness = value,
                "contrast" => desc.contrast = value,
                "saturate" | "saturation" => desc.saturation = value,
                "sepia" => desc.sepia = value.min(1.0),
                _ => {}
            }
        }
        rest = &after[close + 1..];
    }
    desc
}

/// A non-negative finite number, optionally a percentage.
fn parse_value(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let (number, divisor) = match raw.strip_suffix('%') {
        Some(n) => (n.trim_end(), 100.0),
        None => (raw, 1.0),
    };
    let value = number.parse::<f64>().ok()? / divisor;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Named presets offered by the export screen.
pub const PRESETS: &[(&str, &str)] = &[
    ("none", "none"),
    ("vivid", "saturate(1.4) contrast(1.1)"),
    ("muted", "saturate(0.6) brightness(1.05)"),
    ("noir", "saturate(0) contrast(1.3)"),
    ("vintage", "sepia(0.6) contrast(0.9) brightness(1.05)"),
    ("warm", "sepia(0.25) saturate(1.1)"),
    ("high-contrast", "contrast(1.5)"),
];

/// Look up a preset by name (case-insensitive).
pub fn preset(name: &str) -> Option<FilterDescriptor> {
    PRESETS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
        .map(|(_, text)| parse(text))
}

/// Apply a filter descriptor to every pixel. Alpha is untouched.
///
/// Order of operations, each clamped to `0..=255`:
/// 1. Modulation: RGB multiplied by `brightness`, then chroma scaled around
///    the pixel's luma by `saturation`.
/// 2. Contrast: `contrast · c + 128 · (1 - contrast)`.
/// 3. Sepia: the classic warm-tone matrix, blended in by the `sepia` fraction.
pub fn apply_filter(img: &RgbaImage, filter: &FilterDescriptor) -> RgbaImage {
    if filter.is_identity() {
        return img.clone();
    }
    let brightness = filter.brightness as f32;
    let saturation = filter.saturation as f32;
    let contrast = filter.contrast as f32;
    let sepia = filter.sepia.clamp(0.0, 1.0) as f32;

    map_pixels(img, move |[r, g, b, a]| {
        let clamp = |v: f32| v.clamp(0.0, 255.0);

        let (r, g, b) = (
            clamp(r as f32 * brightness),
            clamp(g as f32 * brightness),
            clamp(b as f32 * brightness),
        );

        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        let (r, g, b) = (
            clamp(luma + (r - luma) * saturation),
            clamp(luma + (g - luma) * saturation),
            clamp(luma + (b - luma) * saturation),
        );

        let offset = 128.0 * (1.0 - contrast);
        let (r, g, b) = (
            clamp(contrast * r + offset),
            clamp(contrast * g + offset),
            clamp(contrast * b + offset),
        );

        let sr = clamp(0.393 * r + 0.769 * g + 0.189 * b);
        let sg = clamp(0.349 * r + 0.686 * g + 0.168 * b);
        let sb = clamp(0.272 * r + 0.534 * g + 0.131 * b);
        let mix = |orig: f32, tinted: f32| (orig + (tinted - orig) * sepia).round() as u8;

        [mix(r, sr), mix(g, sg), mix(b, sb), a]
    })
}
