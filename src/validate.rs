//! Output validator: isolated graphic or product mockup?
//!
//! The judgement itself belongs to a [`MockupClassifier`] collaborator. This
//! module owns the policy for when that collaborator cannot answer. With
//! `fail_open` set (the default), an error or timeout accepts the candidate
//! and reports it as [`Outcome::FailedOpen`]; with it cleared the candidate
//! is rejected as [`Outcome::FailedClosed`] and the synthesizer moves on to
//! the next tier.

use crate::backends::MockupClassifier;
use crate::cancel::{CallError, CancelToken, bounded_call};
use std::sync::Arc;
use std::time::Duration;

/// How a validation result was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The classifier answered.
    Classified,
    /// The classifier errored and the policy accepted the image anyway.
    FailedOpen,
    /// The classifier errored and the policy rejected the image.
    FailedClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub is_isolated: bool,
    pub reason: String,
    pub outcome: Outcome,
}

/// What to do when the classifier is unavailable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorPolicy {
    pub fail_open: bool,
    pub timeout: Option<Duration>,
}

impl Default for ValidatorPolicy {
    fn default() -> Self {
        Self {
            fail_open: true,
            timeout: None,
        }
    }
}

pub struct OutputValidator {
    classifier: Arc<dyn MockupClassifier>,
    policy: ValidatorPolicy,
}

impl OutputValidator {
    pub fn new(classifier: Arc<dyn MockupClassifier>, policy: ValidatorPolicy) -> Self {
        Self { classifier, policy }
    }

    /// Classify `image`.
    ///
    /// Returns `Err(CallError::Cancelled)` only when the run was cancelled;
    /// every other collaborator failure is folded into the policy.
    pub fn validate(&self, image: Arc<[u8]>, cancel: &CancelToken) -> Result<Validation, CallError> {
        let classifier = Arc::clone(&self.classifier);
        let result = bounded_call("validate", self.policy.timeout, cancel, move |ctx| {
            classifier.classify_mockup(&image, ctx)
        });

        match result {
            Ok(verdict) => Ok(Validation {
                is_isolated: !verdict.is_mockup,
                reason: verdict.reason,
                outcome: Outcome::Classified,
            }),
            Err(CallError::Cancelled) => Err(CallError::Cancelled),
            Err(e) if self.policy.fail_open => Ok(Validation {
                is_isolated: true,
                reason: format!("validator unavailable ({e}), accepted unchecked"),
                outcome: Outcome::FailedOpen,
            }),
            Err(e) => Ok(Validation {
                is_isolated: false,
                reason: format!("validator unavailable ({e}), rejected unchecked"),
                outcome: Outcome::FailedClosed,
            }),
        }
    }
}
