//! Shared types used across pipeline stages.
//!
//! The caller owns [`SourceImage`] and the [`VariationStrategy`] list; the
//! pipeline hands back [`Variant`]s (ownership transfers to the caller, which
//! decides what to persist) plus one [`StrategyFailure`] per strategy that
//! produced nothing.

use crate::classify::BackgroundRecommendation;
use crate::imaging::{ImagingError, decode_rgba, encode_png};
use crate::synthesize::Tier;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded upload plus where it came from. Read-only once built.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: RgbaImage,
    upload_id: String,
}

impl SourceImage {
    pub fn new(pixels: RgbaImage, upload_id: impl Into<String>) -> Self {
        Self {
            pixels,
            upload_id: upload_id.into(),
        }
    }

    /// Decode an uploaded file (PNG, JPEG or WebP).
    pub fn decode(bytes: &[u8], upload_id: impl Into<String>) -> Result<Self, ImagingError> {
        Ok(Self::new(decode_rgba(bytes)?, upload_id))
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// PNG bytes handed to generation backends as the visual reference.
    pub fn encode_reference(&self) -> Result<Vec<u8>, ImagingError> {
        encode_png(&self.pixels, None)
    }
}

/// One requested stylistic direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationStrategy {
    pub id: u32,
    pub label: String,
    pub instructions: String,
}

impl VariationStrategy {
    pub fn new(id: u32, label: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: instructions.into(),
        }
    }
}

/// A finished, print-ready design.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub strategy_id: u32,
    pub label: String,
    /// Tier whose output was accepted.
    pub tier: Tier,
    /// PNG bytes of the print canvas, tagged with `dpi`.
    #[serde(skip)]
    pub final_image: Vec<u8>,
    pub recommendation: BackgroundRecommendation,
    /// False when normalization degraded to pass-through; the image then
    /// keeps its trimmed size instead of the print canvas size.
    pub normalized: bool,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    /// Hex SHA-256 of `final_image`.
    pub checksum: String,
}

/// Where a strategy's processing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Every tier, including the guaranteed fallback, failed.
    Synthesis,
    BackgroundRemoval,
    /// The accepted image could not be decoded or the result encoded.
    Imaging,
    /// The strategy's task panicked.
    Panicked,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Synthesis => "synthesis",
            FailureStage::BackgroundRemoval => "background removal",
            FailureStage::Imaging => "imaging",
            FailureStage::Panicked => "panicked",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFailure {
    pub strategy_id: u32,
    pub label: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Result of one pipeline run. Both lists are ordered by strategy id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub variants: Vec<Variant>,
    pub failures: Vec<StrategyFailure>,
}

impl PipelineOutcome {
    pub fn variant(&self, strategy_id: u32) -> Option<&Variant> {
        self.variants.iter().find(|v| v.strategy_id == strategy_id)
    }

    pub fn failure(&self, strategy_id: u32) -> Option<&StrategyFailure> {
        self.failures.iter().find(|f| f.strategy_id == strategy_id)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
