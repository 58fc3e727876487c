//! Post-processing: accepted attempt → print-ready [`Variant`].
//!
//! Steps run strictly in order, each on the previous step's output:
//!
//! 1. **Background removal** via the [`BackgroundRemover`] collaborator.
//!    Skipped for [`Tier::GuaranteedFallback`] output, which is isolated
//!    already. Failure is fatal for the variant.
//! 2. **Trim** the transparent border and re-pad.
//! 3. **Normalize** onto the configured print canvas.
//! 4. **Classify** the normalized image for a backdrop recommendation.
//!
//! Trim and normalize failures degrade to passing the previous stage's image
//! through (reported as [`DegradedStep`]s) unless `degrade_on_step_failure`
//! is off, in which case they are fatal too.
//!
//! Steps 2 to 4 are also exposed as [`normalize_design`] for designs that are
//! already isolated (the CLI's `normalize` command).

use crate::backends::BackgroundRemover;
use crate::cancel::{CallError, CancelToken, bounded_call};
use crate::classify::{BackgroundRecommendation, ClassifyParams, classify_with};
use crate::events::{DegradedStep, EventSink, PipelineEvent};
use crate::imaging::{
    FitParams, ImagingError, PrintCanvas, Sharpening, TrimParams, decode_rgba, encode_png,
    resize_and_center_on_canvas, trim_transparent_border,
};
use crate::synthesize::{GenerationAttempt, Tier};
use crate::types::{FailureStage, Variant};
use image::RgbaImage;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostProcessError {
    #[error("Background removal failed: {0}")]
    BackgroundRemoval(CallError),
    #[error("Cancelled")]
    Cancelled,
    #[error("Could not decode candidate image: {0}")]
    Decode(#[source] ImagingError),
    #[error("Trim failed: {0}")]
    Trim(#[source] ImagingError),
    #[error("Normalize failed: {0}")]
    Normalize(#[source] ImagingError),
    #[error("Could not encode variant: {0}")]
    Encode(#[source] ImagingError),
}

impl PostProcessError {
    /// Stage reported in a [`StrategyFailure`](crate::types::StrategyFailure).
    pub fn stage(&self) -> FailureStage {
        match self {
            PostProcessError::BackgroundRemoval(_) | PostProcessError::Cancelled => {
                FailureStage::BackgroundRemoval
            }
            _ => FailureStage::Imaging,
        }
    }
}

/// Everything the chain needs besides the collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessSettings {
    pub canvas: PrintCanvas,
    pub trim: TrimParams,
    pub fill_fraction: f64,
    pub sharpening: Option<Sharpening>,
    pub classify: ClassifyParams,
    pub removal_timeout: Option<Duration>,
    pub degrade_on_step_failure: bool,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            canvas: PrintCanvas::from_inches(15.0, 18.0, 300),
            trim: TrimParams::default(),
            fill_fraction: 0.96,
            sharpening: Some(Sharpening::light()),
            classify: ClassifyParams::default(),
            removal_timeout: None,
            degrade_on_step_failure: true,
        }
    }
}

impl PostProcessSettings {
    fn fit(&self) -> FitParams {
        FitParams {
            canvas_width: self.canvas.width,
            canvas_height: self.canvas.height,
            max_fill_fraction: self.fill_fraction,
            sharpening: self.sharpening,
        }
    }
}

/// Output of [`normalize_design`].
#[derive(Debug, Clone)]
pub struct NormalizedDesign {
    pub image: RgbaImage,
    pub recommendation: BackgroundRecommendation,
    /// True when the image is exactly the print canvas size.
    pub normalized: bool,
    /// Steps that were skipped, with the error that caused it.
    pub degraded: Vec<(DegradedStep, String)>,
}

/// Trim, normalize and classify an already isolated design.
pub fn normalize_design(
    img: &RgbaImage,
    settings: &PostProcessSettings,
) -> Result<NormalizedDesign, PostProcessError> {
    let mut degraded = Vec::new();

    let trimmed = match trim_transparent_border(img, &settings.trim) {
        Ok(trimmed) => trimmed,
        Err(e) if settings.degrade_on_step_failure => {
            degraded.push((DegradedStep::Trim, e.to_string()));
            img.clone()
        }
        Err(e) => return Err(PostProcessError::Trim(e)),
    };

    let (image, normalized) = match resize_and_center_on_canvas(&trimmed, &settings.fit()) {
        Ok(canvas) => (canvas, true),
        Err(e) if settings.degrade_on_step_failure => {
            degraded.push((DegradedStep::Normalize, e.to_string()));
            (trimmed, false)
        }
        Err(e) => return Err(PostProcessError::Normalize(e)),
    };

    let recommendation = classify_with(&image, &settings.classify);
    Ok(NormalizedDesign {
        image,
        recommendation,
        normalized,
        degraded,
    })
}

/// Hex SHA-256 of a finished image.
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Runs the full chain for one strategy's accepted attempt.
pub struct PostProcessor {
    remover: Arc<dyn BackgroundRemover>,
    settings: PostProcessSettings,
}

impl PostProcessor {
    pub fn new(remover: Arc<dyn BackgroundRemover>, settings: PostProcessSettings) -> Self {
        Self { remover, settings }
    }

    pub fn settings(&self) -> &PostProcessSettings {
        &self.settings
    }

    pub fn process(
        &self,
        attempt: GenerationAttempt,
        label: &str,
        cancel: &CancelToken,
        events: &EventSink,
    ) -> Result<Variant, PostProcessError> {
        let GenerationAttempt {
            strategy_id,
            tier,
            raw_image,
            ..
        } = attempt;

        let isolated = if tier == Tier::GuaranteedFallback {
            raw_image
        } else {
            let remover = Arc::clone(&self.remover);
            let call_label = format!("s{strategy_id}-matte");
            bounded_call(&call_label, self.settings.removal_timeout, cancel, move |ctx| {
                remover.remove_background(&raw_image, ctx)
            })
            .map_err(|e| match e {
                CallError::Cancelled => PostProcessError::Cancelled,
                other => PostProcessError::BackgroundRemoval(other),
            })?
        };

        let decoded = decode_rgba(&isolated).map_err(PostProcessError::Decode)?;
        let design = normalize_design(&decoded, &self.settings)?;
        for (step, error) in design.degraded {
            events.emit(PipelineEvent::StepDegraded {
                strategy_id,
                step,
                error,
            });
        }

        let dpi = self.settings.canvas.dpi;
        let final_image =
            encode_png(&design.image, Some(dpi)).map_err(PostProcessError::Encode)?;

        Ok(Variant {
            strategy_id,
            label: label.to_string(),
            tier,
            checksum: checksum(&final_image),
            final_image,
            recommendation: design.recommendation,
            normalized: design.normalized,
            width: design.image.width(),
            height: design.image.height(),
            dpi,
        })
    }
}
