//! Tiered variant synthesis.
//!
//! Each strategy walks an ordered list of tiers, richest context first, until
//! one produces an image the [`OutputValidator`] accepts:
//!
//! | # | Tier | Backend | Prompt | Reference image |
//! |---|---|---|---|---|
//! | 1 | `Primary` | primary | strategy instructions | yes |
//! | 2 | `Constrained` | primary | instructions + isolation constraints | yes |
//! | 3 | `NoContext` | primary | instructions + isolation constraints | no |
//! | 4 | `GuaranteedFallback` | isolated | instructions + isolation constraints | yes |
//!
//! A generation error, a timeout, a validator rejection and an empty response
//! all advance to the next tier. The last tier's backend is isolated by
//! construction, so its output is not sent to the validator; if it fails the
//! strategy fails with [`SynthesisError::Exhausted`].
//!
//! A timed-out call is aborted through its
//! [`CallContext`](crate::cancel::CallContext) and given
//! [`ABORT_GRACE`](crate::cancel::ABORT_GRACE) to return before the next tier
//! starts, so a cooperating backend never serves two tiers of one strategy at
//! once. Strategies are independent; `fan_out` runs one task per
//! strategy on a dedicated thread pool.

use crate::backends::ImageSynthesizer;
use crate::cancel::{CallError, CancelToken, bounded_call, panic_message};
use crate::events::{EventSink, PipelineEvent};
use crate::types::VariationStrategy;
use crate::validate::{Outcome, OutputValidator};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Appended to the strategy instructions from tier 2 on.
pub const ISOLATION_CONSTRAINTS: &str = "Render the artwork alone as a flat, isolated graphic on a plain background. \
Do not show it printed on, worn on or placed onto any product: no t-shirts, mugs, \
posters on walls, models, hangers or packaging.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Constrained,
    NoContext,
    GuaranteedFallback,
}

/// Tiers in the order they are tried.
pub const TIERS: [Tier; 4] = [
    Tier::Primary,
    Tier::Constrained,
    Tier::NoContext,
    Tier::GuaranteedFallback,
];

impl Tier {
    /// 1-based position in [`TIERS`].
    pub fn number(self) -> u8 {
        match self {
            Tier::Primary => 1,
            Tier::Constrained => 2,
            Tier::NoContext => 3,
            Tier::GuaranteedFallback => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::Constrained => "constrained",
            Tier::NoContext => "no_context",
            Tier::GuaranteedFallback => "guaranteed_fallback",
        }
    }

    pub fn uses_reference(self) -> bool {
        !matches!(self, Tier::NoContext)
    }

    /// Served by the isolated backend; nothing comes after it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Tier::GuaranteedFallback)
    }

    pub fn prompt(self, instructions: &str) -> String {
        match self {
            Tier::Primary => instructions.to_string(),
            _ => format!("{}\n\n{}", instructions.trim_end(), ISOLATION_CONSTRAINTS),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {} ({})", self.number(), self.as_str())
    }
}

/// An accepted generation result for one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationAttempt {
    pub strategy_id: u32,
    pub tier: Tier,
    pub raw_image: Vec<u8>,
    pub validated: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("All tiers exhausted; {tier} failed: {error}")]
    Exhausted { tier: Tier, error: String },
    #[error("Cancelled")]
    Cancelled,
}

/// Result of one tier.
enum TierResult {
    Accepted(GenerationAttempt),
    Rejected,
    Failed(String),
}

/// Walks [`TIERS`] for one strategy at a time.
pub struct TieredSynthesizer {
    primary: Arc<dyn ImageSynthesizer>,
    isolated: Arc<dyn ImageSynthesizer>,
    validator: OutputValidator,
    tier_timeout: Option<Duration>,
}

impl TieredSynthesizer {
    pub fn new(
        primary: Arc<dyn ImageSynthesizer>,
        isolated: Arc<dyn ImageSynthesizer>,
        validator: OutputValidator,
        tier_timeout: Option<Duration>,
    ) -> Self {
        Self {
            primary,
            isolated,
            validator,
            tier_timeout,
        }
    }

    /// Produce one accepted attempt for `strategy`.
    pub fn synthesize(
        &self,
        strategy: &VariationStrategy,
        reference: &Arc<[u8]>,
        cancel: &CancelToken,
        events: &EventSink,
    ) -> Result<GenerationAttempt, SynthesisError> {
        let mut last_failure = None;
        for tier in TIERS {
            if cancel.is_cancelled() {
                return Err(SynthesisError::Cancelled);
            }
            events.emit(PipelineEvent::TierStarted {
                strategy_id: strategy.id,
                tier,
            });
            match self.attempt(tier, strategy, reference, cancel, events)? {
                TierResult::Accepted(attempt) => return Ok(attempt),
                TierResult::Rejected => {}
                TierResult::Failed(error) => {
                    events.emit(PipelineEvent::TierFailed {
                        strategy_id: strategy.id,
                        tier,
                        error: error.clone(),
                    });
                    last_failure = Some((tier, error));
                }
            }
        }

        let (tier, error) = last_failure.unwrap_or((
            Tier::GuaranteedFallback,
            "no tier produced an image".to_string(),
        ));
        Err(SynthesisError::Exhausted { tier, error })
    }

    fn attempt(
        &self,
        tier: Tier,
        strategy: &VariationStrategy,
        reference: &Arc<[u8]>,
        cancel: &CancelToken,
        events: &EventSink,
    ) -> Result<TierResult, SynthesisError> {
        let backend = if tier.is_terminal() {
            Arc::clone(&self.isolated)
        } else {
            Arc::clone(&self.primary)
        };
        debug!(
            strategy_id = strategy.id,
            tier = tier.as_str(),
            backend = backend.name(),
            "generating"
        );

        let prompt = tier.prompt(&strategy.instructions);
        let reference = tier.uses_reference().then(|| Arc::clone(reference));
        let label = format!("s{}-t{}", strategy.id, tier.number());
        let generated = bounded_call(&label, self.tier_timeout, cancel, move |ctx| {
            backend.generate(&prompt, reference.as_deref(), ctx)
        });

        let raw = match generated {
            Ok(raw) if raw.is_empty() => {
                return Ok(TierResult::Failed("backend returned an empty image".into()));
            }
            Ok(raw) => raw,
            Err(CallError::Cancelled) => return Err(SynthesisError::Cancelled),
            Err(e) => return Ok(TierResult::Failed(e.to_string())),
        };

        if tier.is_terminal() {
            return Ok(TierResult::Accepted(GenerationAttempt {
                strategy_id: strategy.id,
                tier,
                raw_image: raw,
                validated: true,
            }));
        }

        let raw: Arc<[u8]> = raw.into();
        let validation = match self.validator.validate(Arc::clone(&raw), cancel) {
            Ok(v) => v,
            Err(CallError::Cancelled) => return Err(SynthesisError::Cancelled),
            Err(e) => return Ok(TierResult::Failed(e.to_string())),
        };

        if !validation.is_isolated {
            if validation.outcome == Outcome::FailedClosed {
                return Ok(TierResult::Failed(validation.reason));
            }
            events.emit(PipelineEvent::TierRejected {
                strategy_id: strategy.id,
                tier,
                reason: validation.reason,
            });
            return Ok(TierResult::Rejected);
        }

        if validation.outcome == Outcome::FailedOpen {
            events.emit(PipelineEvent::ValidatorFailedOpen {
                strategy_id: strategy.id,
                tier,
                error: validation.reason,
            });
        }
        Ok(TierResult::Accepted(GenerationAttempt {
            strategy_id: strategy.id,
            tier,
            raw_image: raw.to_vec(),
            validated: true,
        }))
    }
}

/// Run `task` once per item on a dedicated pool, one worker per item up to
/// `max_concurrent`. Results come back in item order; a panicking task yields
/// `Err(message)` without affecting its siblings.
pub(crate) fn fan_out<T, R, F>(
    items: &[T],
    max_concurrent: Option<usize>,
    task: F,
) -> Result<Vec<Result<R, String>>, String>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let workers = max_concurrent
        .map_or(items.len(), |cap| cap.min(items.len()))
        .max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("strategy-{i}"))
        .build()
        .map_err(|e| e.to_string())?;

    Ok(pool.install(|| {
        items
            .par_iter()
            .with_max_len(1)
            .map(|item| {
                panic::catch_unwind(AssertUnwindSafe(|| task(item)))
                    .map_err(|payload| panic_message(&*payload))
            })
            .collect()
    }))
}
