//! Structured pipeline events.
//!
//! Callers that want progress (the CLI, a web handler streaming status) pass
//! a `Sender<PipelineEvent>`; everyone else passes `None`. Every event is also
//! logged through `tracing`, so policy decisions such as a validator failing
//! open are never silent even without a receiver.

use crate::classify::Polarity;
use crate::synthesize::Tier;
use serde::Serialize;
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

/// Post-processing steps that can degrade to pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedStep {
    Trim,
    Normalize,
}

impl DegradedStep {
    pub fn as_str(self) -> &'static str {
        match self {
            DegradedStep::Trim => "trim",
            DegradedStep::Normalize => "normalize",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    TierStarted {
        strategy_id: u32,
        tier: Tier,
    },
    /// The tier produced an image but the validator judged it a mockup.
    TierRejected {
        strategy_id: u32,
        tier: Tier,
        reason: String,
    },
    /// Generation or validation errored, or the tier timed out.
    TierFailed {
        strategy_id: u32,
        tier: Tier,
        error: String,
    },
    ValidatorFailedOpen {
        strategy_id: u32,
        tier: Tier,
        error: String,
    },
    StepDegraded {
        strategy_id: u32,
        step: DegradedStep,
        error: String,
    },
    VariantReady {
        strategy_id: u32,
        label: String,
        tier: Tier,
        backdrop: Polarity,
    },
    StrategyFailed {
        strategy_id: u32,
        label: String,
        error: String,
    },
}

/// Optional channel plus tracing. Cheap to clone into worker tasks.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: Option<Sender<PipelineEvent>>) -> Self {
        Self { tx }
    }

    /// A sink that only logs.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: PipelineEvent) {
        log_event(&event);
        if let Some(tx) = &self.tx {
            // Receiver may have gone away (caller stopped listening).
            let _ = tx.send(event);
        }
    }
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::TierStarted { strategy_id, tier } => {
            debug!(strategy_id, tier = tier.as_str(), "tier started");
        }
        PipelineEvent::TierRejected {
            strategy_id,
            tier,
            reason,
        } => {
            info!(strategy_id, tier = tier.as_str(), %reason, "candidate rejected as mockup");
        }
        PipelineEvent::TierFailed {
            strategy_id,
            tier,
            error,
        } => {
            warn!(strategy_id, tier = tier.as_str(), %error, "tier failed");
        }
        PipelineEvent::ValidatorFailedOpen {
            strategy_id,
            tier,
            error,
        } => {
            warn!(strategy_id, tier = tier.as_str(), %error, "validator unavailable, accepting candidate");
        }
        PipelineEvent::StepDegraded {
            strategy_id,
            step,
            error,
        } => {
            warn!(strategy_id, step = step.as_str(), %error, "step skipped, passing image through");
        }
        PipelineEvent::VariantReady {
            strategy_id,
            tier,
            backdrop,
            ..
        } => {
            info!(strategy_id, tier = tier.as_str(), backdrop = backdrop.as_str(), "variant ready");
        }
        PipelineEvent::StrategyFailed {
            strategy_id, error, ..
        } => {
            warn!(strategy_id, %error, "strategy failed");
        }
    }
}
