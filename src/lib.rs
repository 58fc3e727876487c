//! # Variant Press
//!
//! Turns one uploaded graphic into several print-ready, isolated design
//! variants, and composites a chosen variant into a final export.
//!
//! # Architecture: Synthesize → Post-Process → Export
//!
//! ```text
//! 1. Synthesize    source + strategies  →  accepted attempts   (tiered, one task per strategy)
//! 2. Post-process  attempt              →  Variant             (matte → trim → normalize → classify)
//! 3. Export        Variant + filter     →  final PNG           (filter → scale → position → composite)
//! ```
//!
//! Stages 1 and 2 run back to back inside each strategy's task, so a finished
//! strategy never waits for a slow sibling. Stage 3 runs later, on demand,
//! and involves no external services.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Entry points: `synthesize_variants`, `export_variant`, `adapt_variant` |
//! | [`synthesize`] | Tier state machine and concurrent fan-out over strategies |
//! | [`validate`] | Mockup check with a configurable fail-open policy |
//! | [`postprocess`] | Background removal, trim, normalize, classify |
//! | [`export`] | Filter, scale, position and composite onto an export canvas |
//! | [`filter`] | Filter descriptor parsing, presets and application |
//! | [`classify`] | Light/dark backdrop recommendation from luminance |
//! | [`imaging`] | Pure pixel operations and PNG codec with DPI tags |
//! | [`backends`] | Traits for the generation, vision and matting collaborators |
//! | [`cancel`] | Cancel token and time-limited collaborator calls |
//! | [`events`] | Structured progress events (channel + `tracing`) |
//! | [`config`] | TOML config: print canvases, thresholds, policies |
//! | [`types`] | Shared data types (`SourceImage`, `Variant`, ...) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Ordered Tier List
//!
//! The fallback chain is a `Tier` enum walked in the order of
//! [`synthesize::TIERS`]. Each tier knows its prompt, whether it sends the
//! reference image, and whether it is served by the isolated backend; adding
//! or dropping a tier is an edit to that list.
//!
//! ## Blocking Collaborators, Bounded Waits
//!
//! Collaborator traits are plain synchronous `Send + Sync` calls that receive
//! a [`cancel::CallContext`]. Every call runs on its own thread through
//! [`cancel::bounded_call`]. On timeout or cancellation the context is
//! aborted and the caller waits a short grace period for the collaborator to
//! return, so the tiers of one strategy never have two calls in flight. A
//! collaborator that ignores its context is detached after the grace period;
//! the pipeline keeps no shared mutable state for it to corrupt.
//!
//! ## Policies Are Configurable And Observable
//!
//! Accepting unchecked candidates when the validator is down, and passing
//! images through when trim or normalize fails, are both config switches.
//! Whenever either happens a [`events::PipelineEvent`] is emitted and a
//! `tracing` warning is logged.
//!
//! ## PNG With pHYs
//!
//! Variants and exports are PNG written with the `png` crate so the print
//! DPI lands in a `pHYs` chunk; alpha is kept throughout.

pub mod backends;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod events;
pub mod export;
pub mod filter;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod postprocess;
pub mod synthesize;
pub mod types;
pub mod validate;

pub use pipeline::{Collaborators, PipelineError, VariantPipeline};
pub use types::{PipelineOutcome, SourceImage, StrategyFailure, Variant, VariationStrategy};
