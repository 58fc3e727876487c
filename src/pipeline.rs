//! The variant pipeline's public entry points.
//!
//! [`VariantPipeline::synthesize_variants`] fans the strategies out, one task
//! each. A task synthesizes its strategy and immediately post-processes the
//! accepted attempt, so a slow strategy never holds up a finished one. Each
//! task ends in either a [`Variant`] or a [`StrategyFailure`]; a task that
//! panics becomes a failure too.
//!
//! [`VariantPipeline::export_variant`] and [`VariantPipeline::adapt_variant`]
//! are local pixel work with no collaborators involved.

use crate::backends::{BackgroundRemover, ImageSynthesizer, MockupClassifier};
use crate::cancel::CancelToken;
use crate::classify::{Polarity, classify_with};
use crate::config::{ConfigError, PipelineConfig};
use crate::events::{EventSink, PipelineEvent};
use crate::export::{self, ExportError, ExportRequest};
use crate::imaging::{ImagingError, decode_rgba, encode_png, invert_lightness};
use crate::postprocess::{PostProcessError, PostProcessor, checksum};
use crate::synthesize::{SynthesisError, TieredSynthesizer, fan_out};
use crate::types::{
    FailureStage, PipelineOutcome, SourceImage, StrategyFailure, Variant, VariationStrategy,
};
use crate::validate::OutputValidator;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not encode the source image as a reference: {0}")]
    Reference(#[source] ImagingError),
    #[error("Strategy id {0} appears more than once")]
    DuplicateStrategy(u32),
    #[error("Could not start strategy workers: {0}")]
    Pool(String),
    #[error("Pipeline run cancelled")]
    Cancelled,
    #[error("Could not adapt variant: {0}")]
    Adapt(#[source] ImagingError),
}

/// External services the pipeline calls.
#[derive(Clone)]
pub struct Collaborators {
    /// Generation backend for tiers 1 to 3.
    pub primary: Arc<dyn ImageSynthesizer>,
    /// Backend whose output is isolated by construction, for the last tier.
    pub isolated: Arc<dyn ImageSynthesizer>,
    pub classifier: Arc<dyn MockupClassifier>,
    pub remover: Arc<dyn BackgroundRemover>,
}

pub struct VariantPipeline {
    synthesizer: TieredSynthesizer,
    postprocessor: PostProcessor,
    max_concurrent: Option<usize>,
}

impl VariantPipeline {
    pub fn new(collaborators: Collaborators, config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let validator = OutputValidator::new(collaborators.classifier, config.validator_policy());
        Ok(Self {
            synthesizer: TieredSynthesizer::new(
                collaborators.primary,
                collaborators.isolated,
                validator,
                Some(config.tier_timeout()),
            ),
            postprocessor: PostProcessor::new(
                collaborators.remover,
                config.postprocess_settings()?,
            ),
            max_concurrent: config.synthesis.max_concurrent_strategies,
        })
    }

    /// Turn `source` into one variant per strategy.
    ///
    /// Partial success is normal: the outcome lists the variants that
    /// finished and a failure for every strategy that did not. If `cancel`
    /// fires during the run, everything is discarded and
    /// [`PipelineError::Cancelled`] is returned.
    pub fn synthesize_variants(
        &self,
        source: &SourceImage,
        strategies: &[VariationStrategy],
        cancel: &CancelToken,
        events: Option<Sender<PipelineEvent>>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut seen = HashSet::new();
        if let Some(dup) = strategies.iter().find(|s| !seen.insert(s.id)) {
            return Err(PipelineError::DuplicateStrategy(dup.id));
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let reference: Arc<[u8]> = source
            .encode_reference()
            .map_err(PipelineError::Reference)?
            .into();
        let events = EventSink::new(events);
        info!(
            upload_id = source.upload_id(),
            strategies = strategies.len(),
            "synthesizing variants"
        );

        let results = fan_out(strategies, self.max_concurrent, |strategy| {
            self.run_strategy(strategy, &reference, cancel, &events)
        })
        .map_err(PipelineError::Pool)?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut outcome = PipelineOutcome::default();
        for (strategy, result) in strategies.iter().zip(results) {
            match result {
                Ok(Ok(variant)) => outcome.variants.push(variant),
                Ok(Err(failure)) => outcome.failures.push(failure),
                Err(panic) => {
                    let failure = StrategyFailure {
                        strategy_id: strategy.id,
                        label: strategy.label.clone(),
                        stage: FailureStage::Panicked,
                        error: panic,
                    };
                    emit_failure(&events, &failure);
                    outcome.failures.push(failure);
                }
            }
        }
        outcome.variants.sort_by_key(|v| v.strategy_id);
        outcome.failures.sort_by_key(|f| f.strategy_id);
        info!(
            variants = outcome.variants.len(),
            failures = outcome.failures.len(),
            "pipeline run finished"
        );
        Ok(outcome)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(strategy_id = strategy.id))]
    fn run_strategy(
        &self,
        strategy: &VariationStrategy,
        reference: &Arc<[u8]>,
        cancel: &CancelToken,
        events: &EventSink,
    ) -> Result<Variant, StrategyFailure> {
        let failure = |stage: FailureStage, error: String| StrategyFailure {
            strategy_id: strategy.id,
            label: strategy.label.clone(),
            stage,
            error,
        };

        let attempt = match self.synthesizer.synthesize(strategy, reference, cancel, events) {
            Ok(attempt) => attempt,
            // Discarded by the caller; no event for a run being torn down.
            Err(e @ SynthesisError::Cancelled) => {
                return Err(failure(FailureStage::Synthesis, e.to_string()));
            }
            Err(e) => {
                let failure = failure(FailureStage::Synthesis, e.to_string());
                emit_failure(events, &failure);
                return Err(failure);
            }
        };

        match self
            .postprocessor
            .process(attempt, &strategy.label, cancel, events)
        {
            Ok(variant) => {
                events.emit(PipelineEvent::VariantReady {
                    strategy_id: variant.strategy_id,
                    label: variant.label.clone(),
                    tier: variant.tier,
                    backdrop: variant.recommendation.polarity,
                });
                Ok(variant)
            }
            Err(e @ PostProcessError::Cancelled) => Err(failure(e.stage(), e.to_string())),
            Err(e) => {
                let failure = failure(e.stage(), e.to_string());
                emit_failure(events, &failure);
                Err(failure)
            }
        }
    }

    /// Composite a chosen variant for download.
    pub fn export_variant(&self, request: &ExportRequest) -> Result<Vec<u8>, ExportError> {
        let out = export::export(request)?;
        info!(
            width = request.canvas_width,
            height = request.canvas_height,
            bytes = out.len(),
            "export ready"
        );
        Ok(out)
    }

    /// Retarget a variant onto a product of the given backdrop polarity.
    ///
    /// When `backdrop` is not what the variant recommends, its lightness is
    /// inverted and it is classified again. Otherwise it is returned as is.
    pub fn adapt_variant(&self, variant: &Variant, backdrop: Polarity) -> Result<Variant, PipelineError> {
        if variant.recommendation.polarity == backdrop {
            return Ok(variant.clone());
        }
        let decoded = decode_rgba(&variant.final_image).map_err(PipelineError::Adapt)?;
        let inverted = invert_lightness(&decoded);
        let recommendation = classify_with(&inverted, &self.postprocessor.settings().classify);
        let final_image = encode_png(&inverted, Some(variant.dpi)).map_err(PipelineError::Adapt)?;
        info!(
            strategy_id = variant.strategy_id,
            from = variant.recommendation.polarity.as_str(),
            to = recommendation.polarity.as_str(),
            "adapted variant to backdrop"
        );
        Ok(Variant {
            checksum: checksum(&final_image),
            final_image,
            recommendation,
            ..variant.clone()
        })
    }
}

fn emit_failure(events: &EventSink, failure: &StrategyFailure) {
    events.emit(PipelineEvent::StrategyFailed {
        strategy_id: failure.strategy_id,
        label: failure.label.clone(),
        error: format!("{}: {}", failure.stage, failure.error),
    });
}
