//! External collaborator interfaces.
//!
//! The pipeline never talks to a generation service, vision model or matting
//! service directly. It holds trait objects for:
//!
//! | Trait | Used by | Contract |
//! |---|---|---|
//! | [`ImageSynthesizer`] | tiered synthesizer | prompt + optional reference → encoded image |
//! | [`MockupClassifier`] | output validator | encoded image → mockup verdict |
//! | [`BackgroundRemover`] | post-processing | encoded image → encoded image with transparent background |
//!
//! Calls are blocking from the caller's point of view. Implementations must be
//! `Send + Sync`: one instance is shared by every strategy worker, and each
//! call runs on its own thread (see
//! [`cancel::bounded_call`](crate::cancel::bounded_call)).
//!
//! Every method receives a [`CallContext`]. It is aborted when the run is
//! cancelled or the call's time limit passes; implementations should stop
//! their request at that point and return [`BackendError::Aborted`]. An HTTP
//! client can use [`CallContext::remaining`] as its request timeout.
//!
//! Two synthesizers are wired in: a primary one used by the first three tiers
//! and a structurally different one whose output is isolated by construction,
//! used only by the terminal tier.

use crate::cancel::CallContext;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Call aborted")]
    Aborted,
}

/// Image generation backend.
pub trait ImageSynthesizer: Send + Sync {
    /// Short name for logs and events.
    fn name(&self) -> &str;

    /// Generate an image for `prompt`, optionally anchored on `reference`.
    fn generate(
        &self,
        prompt: &str,
        reference: Option<&[u8]>,
        ctx: &CallContext,
    ) -> Result<Vec<u8>, BackendError>;
}

/// A vision classifier's judgement of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockupVerdict {
    pub is_mockup: bool,
    pub reason: String,
}

/// Decides whether an image is a product mockup rather than isolated artwork.
pub trait MockupClassifier: Send + Sync {
    fn classify_mockup(
        &self,
        image: &[u8],
        ctx: &CallContext,
    ) -> Result<MockupVerdict, BackendError>;
}

/// Background removal / matting service.
pub trait BackgroundRemover: Send + Sync {
    fn remove_background(&self, image: &[u8], ctx: &CallContext) -> Result<Vec<u8>, BackendError>;
}
