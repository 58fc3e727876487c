//! Background recommendation for a finished design.
//!
//! A design whose visible pixels read light needs a dark product behind it,
//! and vice versa. Only the isolated design's own pixels count: transparent
//! areas are skipped by the luminance sampler.

use crate::imaging::sample_average_luminance_with;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Luminance above which a design is considered light.
pub const DEFAULT_DARK_BACKDROP_ABOVE: f64 = 120.0;

/// Which product backdrop a design should sit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Light,
    Dark,
}

impl Polarity {
    pub fn opposite(self) -> Self {
        match self {
            Polarity::Light => Polarity::Dark,
            Polarity::Dark => Polarity::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Polarity::Light => "light",
            Polarity::Dark => "dark",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended backdrop plus the measurement it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundRecommendation {
    pub polarity: Polarity,
    pub average_luminance: f64,
}

/// Thresholds for [`classify_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifyParams {
    pub visibility_alpha: u8,
    pub dark_backdrop_above: f64,
}

impl Default for ClassifyParams {
    fn default() -> Self {
        Self {
            visibility_alpha: crate::imaging::pixels::DEFAULT_VISIBILITY_ALPHA,
            dark_backdrop_above: DEFAULT_DARK_BACKDROP_ABOVE,
        }
    }
}

/// Classify with the default thresholds.
pub fn classify(img: &RgbaImage) -> BackgroundRecommendation {
    classify_with(img, &ClassifyParams::default())
}

/// `Dark` when the visible pixels' average luminance exceeds the threshold,
/// `Light` otherwise. An image with nothing visible measures
/// [`NEUTRAL_LUMINANCE`](crate::imaging::NEUTRAL_LUMINANCE) and therefore gets `Dark` at the default threshold.
pub fn classify_with(img: &RgbaImage, params: &ClassifyParams) -> BackgroundRecommendation {
    let average_luminance = sample_average_luminance_with(img, params.visibility_alpha);
    let polarity = if average_luminance > params.dark_backdrop_above {
        Polarity::Dark
    } else {
        Polarity::Light
    };
    BackgroundRecommendation {
        polarity,
        average_luminance,
    }
}
