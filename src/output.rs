//! CLI output formatting.
//!
//! Each entity leads with what it is (a design, a strategy, a variant) and
//! puts measurements on indented context lines below it.
//!
//! # Output Format
//!
//! ## Classify
//!
//! ```text
//! design.png
//!     Backdrop: dark (luminance 201.3)
//! ```
//!
//! ## Normalize
//!
//! ```text
//! design.png → print.png
//!     Canvas: 4500x5400 @ 300 DPI
//!     Trim: skipped (Image has no pixels above the alpha threshold)
//!     Backdrop: dark (luminance 201.3)
//! ```
//!
//! ## Pipeline events
//!
//! ```text
//! [3] tier 1 (primary): started
//! [3] tier 1 (primary): rejected, design shown on a t-shirt
//! [3] Bold Lines ready from tier 3 (no_context), dark backdrop
//! [4] Retro failed: synthesis: All tiers exhausted; ...
//! ```
//!
//! ## Pipeline outcome
//!
//! ```text
//! Variants
//! 001 Bold Lines (strategy 3)
//!     Tier: tier 3 (no_context)
//!     Canvas: 4500x5400 @ 300 DPI
//!     Backdrop: dark (luminance 201.3)
//!
//! Failures
//! 001 Retro (strategy 4)
//!     synthesis: All tiers exhausted; ...
//! ```
//!
//! # Architecture
//!
//! Every `format_*` function returns `Vec<String>` and does no I/O, so it can
//! be tested directly; `print_*` wrappers write the lines to stdout.

use crate::classify::BackgroundRecommendation;
use crate::events::{DegradedStep, PipelineEvent};
use crate::filter::FilterDescriptor;
use crate::imaging::PrintCanvas;
use crate::postprocess::NormalizedDesign;
use crate::types::PipelineOutcome;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn backdrop_line(rec: &BackgroundRecommendation) -> String {
    format!(
        "{}Backdrop: {} (luminance {:.1})",
        indent(1),
        rec.polarity,
        rec.average_luminance
    )
}

fn canvas_line(width: u32, height: u32, dpi: u32) -> String {
    format!("{}Canvas: {}x{} @ {} DPI", indent(1), width, height, dpi)
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Local commands
// ============================================================================

/// Format the backdrop recommendation for one design.
pub fn format_classify_output(name: &str, rec: &BackgroundRecommendation) -> Vec<String> {
    vec![name.to_string(), backdrop_line(rec)]
}

pub fn print_classify_output(name: &str, rec: &BackgroundRecommendation) {
    print_lines(format_classify_output(name, rec));
}

/// Format the result of normalizing a local design onto a print canvas.
///
/// Skipped steps are listed with their cause; a design that could not be
/// normalized shows its actual size instead of the canvas.
pub fn format_normalize_output(
    input: &str,
    output: &str,
    canvas: &PrintCanvas,
    design: &NormalizedDesign,
) -> Vec<String> {
    let mut lines = vec![format!("{} \u{2192} {}", input, output)];
    if design.normalized {
        lines.push(canvas_line(canvas.width, canvas.height, canvas.dpi));
    } else {
        lines.push(format!(
            "{}Size: {}x{} (not normalized to {}x{})",
            indent(1),
            design.image.width(),
            design.image.height(),
            canvas.width,
            canvas.height
        ));
    }
    for (step, error) in &design.degraded {
        let title = match step {
            DegradedStep::Trim => "Trim",
            DegradedStep::Normalize => "Normalize",
        };
        lines.push(format!("{}{}: skipped ({})", indent(1), title, error));
    }
    lines.push(backdrop_line(&design.recommendation));
    lines
}

pub fn print_normalize_output(
    input: &str,
    output: &str,
    canvas: &PrintCanvas,
    design: &NormalizedDesign,
) {
    print_lines(format_normalize_output(input, output, canvas, design));
}

/// Format a parsed filter, one field per line.
pub fn format_filter(filter: &FilterDescriptor) -> Vec<String> {
    vec![
        filter.to_string(),
        format!("{}brightness: {}", indent(1), filter.brightness),
        format!("{}contrast: {}", indent(1), filter.contrast),
        format!("{}saturation: {}", indent(1), filter.saturation),
        format!("{}sepia: {}", indent(1), filter.sepia),
    ]
}

pub fn print_filter(filter: &FilterDescriptor) {
    print_lines(format_filter(filter));
}

/// Format the export summary.
pub fn format_export_output(
    input: &str,
    output: &str,
    width: u32,
    height: u32,
    dpi: Option<u32>,
    filter: &FilterDescriptor,
) -> Vec<String> {
    let canvas = match dpi {
        Some(dpi) => canvas_line(width, height, dpi),
        None => format!("{}Canvas: {}x{}", indent(1), width, height),
    };
    vec![
        format!("{} \u{2192} {}", input, output),
        canvas,
        format!("{}Filter: {}", indent(1), filter),
    ]
}

pub fn print_export_output(
    input: &str,
    output: &str,
    width: u32,
    height: u32,
    dpi: Option<u32>,
    filter: &FilterDescriptor,
) {
    print_lines(format_export_output(input, output, width, height, dpi, filter));
}

// ============================================================================
// Pipeline runs
// ============================================================================

/// Format a single pipeline event as display lines.
pub fn format_event(event: &PipelineEvent) -> Vec<String> {
    let line = match event {
        PipelineEvent::TierStarted { strategy_id, tier } => {
            format!("[{}] {}: started", strategy_id, tier)
        }
        PipelineEvent::TierRejected {
            strategy_id,
            tier,
            reason,
        } => format!("[{}] {}: rejected, {}", strategy_id, tier, reason),
        PipelineEvent::TierFailed {
            strategy_id,
            tier,
            error,
        } => format!("[{}] {}: failed, {}", strategy_id, tier, error),
        PipelineEvent::ValidatorFailedOpen {
            strategy_id,
            tier,
            error,
        } => format!("[{}] {}: {}", strategy_id, tier, error),
        PipelineEvent::StepDegraded {
            strategy_id,
            step,
            error,
        } => format!("[{}] {} skipped: {}", strategy_id, step.as_str(), error),
        PipelineEvent::VariantReady {
            strategy_id,
            label,
            tier,
            backdrop,
        } => format!(
            "[{}] {} ready from {}, {} backdrop",
            strategy_id, label, tier, backdrop
        ),
        PipelineEvent::StrategyFailed {
            strategy_id,
            label,
            error,
        } => format!("[{}] {} failed: {}", strategy_id, label, error),
    };
    vec![line]
}

/// Format the variants and failures of a finished run.
pub fn format_outcome(outcome: &PipelineOutcome) -> Vec<String> {
    let mut lines = Vec::new();

    if !outcome.variants.is_empty() {
        lines.push("Variants".to_string());
        for (i, v) in outcome.variants.iter().enumerate() {
            lines.push(format!(
                "{} {} (strategy {})",
                format_index(i + 1),
                v.label,
                v.strategy_id
            ));
            lines.push(format!("{}Tier: {}", indent(1), v.tier));
            if v.normalized {
                lines.push(canvas_line(v.width, v.height, v.dpi));
            } else {
                lines.push(format!(
                    "{}Size: {}x{} (not normalized)",
                    indent(1),
                    v.width,
                    v.height
                ));
            }
            lines.push(backdrop_line(&v.recommendation));
        }
    }

    if !outcome.failures.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Failures".to_string());
        for (i, f) in outcome.failures.iter().enumerate() {
            lines.push(format!(
                "{} {} (strategy {})",
                format_index(i + 1),
                f.label,
                f.strategy_id
            ));
            lines.push(format!("{}{}: {}", indent(1), f.stage, f.error));
        }
    }

    lines
}
