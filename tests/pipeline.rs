//! End-to-end run of the variant pipeline against in-process collaborators.
//!
//! Generation backends paint solid colors: red stands for a product mockup,
//! anything else for isolated artwork. The mockup classifier checks the
//! first pixel, the remover passes images through.

use image::{Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use variant_press::backends::{
    BackendError, BackgroundRemover, ImageSynthesizer, MockupClassifier, MockupVerdict,
};
use variant_press::cancel::{CallContext, CancelToken};
use variant_press::classify::Polarity;
use variant_press::config;
use variant_press::events::PipelineEvent;
use variant_press::export::{ExportRequest, Offset};
use variant_press::filter;
use variant_press::imaging::{decode_rgba, read_png_dpi};
use variant_press::output;
use variant_press::synthesize::Tier;
use variant_press::types::FailureStage;
use variant_press::{Collaborators, SourceImage, VariantPipeline, VariationStrategy};

const MOCKUP: [u8; 4] = [220, 30, 30, 255];
const NAVY: [u8; 4] = [30, 30, 70, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];

fn png(color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(10, 10, Rgba(color));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Primary backend: mockups for "shirt" strategies, errors for "broken",
/// isolated navy art otherwise.
struct PrimaryBackend {
    calls: AtomicUsize,
}

impl ImageSynthesizer for PrimaryBackend {
    fn name(&self) -> &str {
        "primary"
    }

    fn generate(
        &self,
        prompt: &str,
        _reference: Option<&[u8]>,
        _ctx: &CallContext,
    ) -> Result<Vec<u8>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("broken") {
            Err(BackendError::Unavailable("model offline".into()))
        } else if prompt.contains("shirt") {
            Ok(png(MOCKUP))
        } else {
            Ok(png(NAVY))
        }
    }
}

/// Isolated backend: green art, except for "broken" strategies.
struct IsolatedBackend;

impl ImageSynthesizer for IsolatedBackend {
    fn name(&self) -> &str {
        "isolated"
    }

    fn generate(
        &self,
        prompt: &str,
        _reference: Option<&[u8]>,
        _ctx: &CallContext,
    ) -> Result<Vec<u8>, BackendError> {
        if prompt.contains("broken") {
            Err(BackendError::RequestFailed("503".into()))
        } else {
            Ok(png(GREEN))
        }
    }
}

struct FirstPixelClassifier;

impl MockupClassifier for FirstPixelClassifier {
    fn classify_mockup(
        &self,
        image: &[u8],
        _ctx: &CallContext,
    ) -> Result<MockupVerdict, BackendError> {
        let img = decode_rgba(image).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let is_mockup = img.get_pixel(0, 0).0 == MOCKUP;
        Ok(MockupVerdict {
            is_mockup,
            reason: if is_mockup {
                "garment visible".into()
            } else {
                "flat artwork".into()
            },
        })
    }
}

struct Passthrough;

impl BackgroundRemover for Passthrough {
    fn remove_background(
        &self,
        image: &[u8],
        _ctx: &CallContext,
    ) -> Result<Vec<u8>, BackendError> {
        Ok(image.to_vec())
    }
}

fn pipeline_with_config_file() -> (VariantPipeline, Arc<PrimaryBackend>) {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("variant-press.toml");
    std::fs::write(
        &path,
        r#"
[print]
family = "swatch"

[print.families.swatch]
width = 60
height = 72
dpi = 150

[synthesis]
tier_timeout_secs = 5
"#,
    )
    .unwrap();
    let config = config::load_config(Some(path.as_path())).unwrap();

    let primary = Arc::new(PrimaryBackend {
        calls: AtomicUsize::new(0),
    });
    let collaborators = Collaborators {
        primary: primary.clone(),
        isolated: Arc::new(IsolatedBackend),
        classifier: Arc::new(FirstPixelClassifier),
        remover: Arc::new(Passthrough),
    };
    (VariantPipeline::new(collaborators, &config).unwrap(), primary)
}

fn source() -> SourceImage {
    SourceImage::new(RgbaImage::from_pixel(16, 16, Rgba([90, 90, 90, 255])), "upload-42")
}

fn strategies() -> Vec<VariationStrategy> {
    vec![
        VariationStrategy::new(1, "Clean", "clean vector redraw"),
        VariationStrategy::new(2, "Shirt", "shirt print"),
        VariationStrategy::new(3, "Broken", "broken idea"),
    ]
}

// =========================================================================
// Synthesis run
// =========================================================================

#[test]
fn run_yields_partial_success_with_tiers_and_events() {
    let (pipeline, primary) = pipeline_with_config_file();
    let (tx, rx) = mpsc::channel();

    let outcome = pipeline
        .synthesize_variants(&source(), &strategies(), &CancelToken::new(), Some(tx))
        .unwrap();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.variants.len(), 2);
    assert_eq!(outcome.failures.len(), 1);

    let clean = outcome.variant(1).unwrap();
    assert_eq!(clean.tier, Tier::Primary);
    assert_eq!((clean.width, clean.height, clean.dpi), (60, 72, 150));
    assert_eq!(read_png_dpi(&clean.final_image), Some(150));
    assert_eq!(clean.recommendation.polarity, Polarity::Light);
    assert!(clean.normalized);

    let shirt = outcome.variant(2).unwrap();
    assert_eq!(shirt.tier, Tier::GuaranteedFallback);
    assert_eq!(shirt.recommendation.polarity, Polarity::Dark);

    let broken = outcome.failure(3).unwrap();
    assert_eq!(broken.stage, FailureStage::Synthesis);
    assert_eq!(broken.label, "Broken");

    // 1 call for "Clean", 3 each for the strategies that exhaust the primary tiers
    assert_eq!(primary.calls.load(Ordering::SeqCst), 7);

    let events: Vec<PipelineEvent> = rx.try_iter().collect();
    let rejections = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::TierRejected { strategy_id: 2, .. }))
        .count();
    assert_eq!(rejections, 3);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, PipelineEvent::StrategyFailed { strategy_id: 3, .. }))
    );

    let lines: Vec<String> = events.iter().flat_map(output::format_event).collect();
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("[2] tier 1 (primary): rejected"))
    );

    let summary = output::format_outcome(&outcome);
    assert!(summary.iter().any(|l| l.contains("Clean")));
    assert!(summary.iter().any(|l| l.contains("Broken")));
}

#[test]
fn cancelled_run_returns_nothing() {
    let (pipeline, primary) = pipeline_with_config_file();
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = pipeline.synthesize_variants(&source(), &strategies(), &cancel, None);

    assert!(matches!(result, Err(variant_press::PipelineError::Cancelled)));
    assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
}

// =========================================================================
// Adapt and export
// =========================================================================

#[test]
fn adapted_variant_exports_with_filter() {
    let (pipeline, _) = pipeline_with_config_file();
    let outcome = pipeline
        .synthesize_variants(&source(), &strategies()[..1], &CancelToken::new(), None)
        .unwrap();
    let variant = outcome.variant(1).unwrap();

    let dark = pipeline.adapt_variant(variant, Polarity::Dark).unwrap();
    assert_ne!(dark.checksum, variant.checksum);
    assert_eq!(dark.recommendation.polarity, Polarity::Dark);

    let request = ExportRequest {
        source_variant: dark.final_image.clone(),
        filter: filter::preset("noir").unwrap(),
        canvas_width: 200,
        canvas_height: 100,
        scale: 1.0,
        offset: Offset { x: -20, y: 0 },
        dpi: Some(dark.dpi),
    };
    let bytes = pipeline.export_variant(&request).unwrap();
    let exported = decode_rgba(&bytes).unwrap();

    assert_eq!(exported.dimensions(), (200, 100));
    assert_eq!(read_png_dpi(&bytes), Some(150));
    // Centered at x 70..130, then shifted left to 50..110.
    assert_eq!(exported.get_pixel(5, 50)[3], 0);
    assert_eq!(exported.get_pixel(195, 50)[3], 0);
    let center = exported.get_pixel(80, 50);
    assert_eq!(center[3], 255);
    assert_eq!(center[0], center[1]);
    assert_eq!(center[1], center[2]);
}
