//! Pipeline configuration.
//!
//! Handles loading, validating and merging a TOML config file. Stock defaults
//! are the base layer; a user file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [print]
//! family = "apparel"            # Which family's canvas variants are normalized onto
//!
//! [print.families.apparel]      # 15x18 in @ 300 DPI
//! width = 4500
//! height = 5400
//! dpi = 300
//!
//! [trim]
//! alpha_threshold = 5           # Alpha below this counts as transparent
//! min_padding = 20              # Pixels re-added per side, at least
//! padding_fraction = 0.02       # ...or this share of the trimmed dimension
//!
//! [normalize]
//! fill_fraction = 0.96          # Share of the canvas the design may fill
//! sharpen_sigma = 0.5           # Unsharp mask after resampling (0 = off)
//! sharpen_threshold = 0
//!
//! [classify]
//! visibility_alpha = 50         # Alpha above this counts as visible
//! dark_backdrop_above = 120.0   # Luminance above this wants a dark product
//!
//! [synthesis]
//! tier_timeout_secs = 120       # Per collaborator call within a tier
//! removal_timeout_secs = 60
//! validator_fail_open = true    # Accept candidates when the validator is down
//! degrade_on_step_failure = true  # Pass through when trim/normalize fail
//! max_concurrent_strategies = 8 # Omit for one worker per strategy
//! ```
//!
//! Additional `[print.families.<name>]` tables add product families; the
//! stock `poster` and `sticker` families are always present.
//!
//! Unknown keys are rejected to catch typos early.

use crate::classify::ClassifyParams;
use crate::imaging::{PrintCanvas, Sharpening, TrimParams};
use crate::postprocess::PostProcessSettings;
use crate::validate::ValidatorPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from TOML.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Print canvas per product family.
    pub print: PrintConfig,
    /// Border trimming.
    pub trim: TrimConfig,
    /// Resize onto the print canvas.
    pub normalize: NormalizeConfig,
    /// Backdrop recommendation thresholds.
    pub classify: ClassifyConfig,
    /// Timeouts, failure policy and concurrency.
    pub synthesis: SynthesisConfig,
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.canvas()?;
        for (name, family) in &self.print.families {
            if family.width == 0 || family.height == 0 {
                return Err(ConfigError::Validation(format!(
                    "print.families.{name} width and height must be non-zero"
                )));
            }
            if family.dpi == 0 {
                return Err(ConfigError::Validation(format!(
                    "print.families.{name}.dpi must be non-zero"
                )));
            }
        }

        let fill = self.normalize.fill_fraction;
        if !(fill > 0.0 && fill <= 1.0) {
            return Err(ConfigError::Validation(
                "normalize.fill_fraction must be in (0, 1]".into(),
            ));
        }
        if self.trim.padding_fraction.is_nan() || self.trim.padding_fraction < 0.0 {
            return Err(ConfigError::Validation(
                "trim.padding_fraction must not be negative".into(),
            ));
        }
        if self.normalize.sharpen_sigma < 0.0 {
            return Err(ConfigError::Validation(
                "normalize.sharpen_sigma must not be negative".into(),
            ));
        }
        if self.synthesis.tier_timeout_secs == 0 || self.synthesis.removal_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "synthesis timeouts must be at least 1 second".into(),
            ));
        }
        if self.synthesis.max_concurrent_strategies == Some(0) {
            return Err(ConfigError::Validation(
                "synthesis.max_concurrent_strategies must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Canvas of the selected product family.
    pub fn canvas(&self) -> Result<PrintCanvas, ConfigError> {
        self.print
            .families
            .get(&self.print.family)
            .copied()
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "print.family \"{}\" is not defined under [print.families]",
                    self.print.family
                ))
            })
    }

    /// The same config with another product family selected.
    pub fn with_family(&self, family: &str) -> Result<Self, ConfigError> {
        let mut config = self.clone();
        config.print.family = family.to_string();
        config.validate()?;
        Ok(config)
    }

    pub fn postprocess_settings(&self) -> Result<PostProcessSettings, ConfigError> {
        Ok(PostProcessSettings {
            canvas: self.canvas()?,
            trim: self.trim.params(),
            fill_fraction: self.normalize.fill_fraction,
            sharpening: self.normalize.sharpening(),
            classify: self.classify.params(),
            removal_timeout: Some(Duration::from_secs(self.synthesis.removal_timeout_secs)),
            degrade_on_step_failure: self.synthesis.degrade_on_step_failure,
        })
    }

    pub fn validator_policy(&self) -> ValidatorPolicy {
        ValidatorPolicy {
            fail_open: self.synthesis.validator_fail_open,
            timeout: Some(self.tier_timeout()),
        }
    }

    pub fn tier_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis.tier_timeout_secs)
    }
}

/// Product families and the one in use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrintConfig {
    pub family: String,
    pub families: BTreeMap<String, PrintCanvas>,
}

impl Default for PrintConfig {
    fn default() -> Self {
        let families = [
            ("apparel", PrintCanvas::from_inches(15.0, 18.0, 300)),
            ("poster", PrintCanvas::from_inches(18.0, 24.0, 300)),
            ("sticker", PrintCanvas::from_inches(4.0, 4.0, 300)),
        ]
        .into_iter()
        .map(|(name, canvas)| (name.to_string(), canvas))
        .collect();
        Self {
            family: "apparel".to_string(),
            families,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrimConfig {
    pub alpha_threshold: u8,
    pub min_padding: u32,
    pub padding_fraction: f64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        let params = TrimParams::default();
        Self {
            alpha_threshold: params.alpha_threshold,
            min_padding: params.min_padding,
            padding_fraction: params.padding_fraction,
        }
    }
}

impl TrimConfig {
    pub fn params(&self) -> TrimParams {
        TrimParams {
            alpha_threshold: self.alpha_threshold,
            min_padding: self.min_padding,
            padding_fraction: self.padding_fraction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeConfig {
    pub fill_fraction: f64,
    /// Unsharp-mask sigma; `0` disables sharpening.
    pub sharpen_sigma: f32,
    pub sharpen_threshold: i32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        let sharpening = Sharpening::light();
        Self {
            fill_fraction: 0.96,
            sharpen_sigma: sharpening.sigma,
            sharpen_threshold: sharpening.threshold,
        }
    }
}

impl NormalizeConfig {
    pub fn sharpening(&self) -> Option<Sharpening> {
        (self.sharpen_sigma > 0.0).then_some(Sharpening {
            sigma: self.sharpen_sigma,
            threshold: self.sharpen_threshold,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifyConfig {
    pub visibility_alpha: u8,
    pub dark_backdrop_above: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        let params = ClassifyParams::default();
        Self {
            visibility_alpha: params.visibility_alpha,
            dark_backdrop_above: params.dark_backdrop_above,
        }
    }
}

impl ClassifyConfig {
    pub fn params(&self) -> ClassifyParams {
        ClassifyParams {
            visibility_alpha: self.visibility_alpha,
            dark_backdrop_above: self.dark_backdrop_above,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthesisConfig {
    /// Limit for each collaborator call made within one tier.
    pub tier_timeout_secs: u64,
    pub removal_timeout_secs: u64,
    pub validator_fail_open: bool,
    pub degrade_on_step_failure: bool,
    /// When absent, every strategy gets its own worker.
    pub max_concurrent_strategies: Option<usize>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            tier_timeout_secs: 120,
            removal_timeout_secs: 60,
            validator_fail_open: true,
            degrade_on_step_failure: true,
            max_concurrent_strategies: None,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PipelineConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config at `path` over the stock defaults, or the defaults alone
/// when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# variant-press configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Print canvas
# ---------------------------------------------------------------------------
[print]
# Product family whose canvas finished variants are normalized onto.
family = "apparel"

# Each family is an exact pixel size plus the DPI tag written into the PNG.
# Add your own with another [print.families.<name>] table.
[print.families.apparel]
# 15 x 18 in
width = 4500
height = 5400
dpi = 300

[print.families.poster]
# 18 x 24 in
width = 5400
height = 7200
dpi = 300

[print.families.sticker]
# 4 x 4 in
width = 1200
height = 1200
dpi = 300

# ---------------------------------------------------------------------------
# Trimming
# ---------------------------------------------------------------------------
[trim]
# Pixels with alpha below this (0-255) count as transparent border.
# Keep it low so anti-aliased edges survive.
alpha_threshold = 5

# Padding re-added on every side after trimming: the larger of
# min_padding pixels and padding_fraction of the trimmed dimension.
min_padding = 20
padding_fraction = 0.02

# ---------------------------------------------------------------------------
# Normalization onto the print canvas
# ---------------------------------------------------------------------------
[normalize]
# Share of the canvas (on the constraining axis) the design may occupy.
fill_fraction = 0.96

# Unsharp mask applied after resampling. Set sharpen_sigma = 0 to disable.
sharpen_sigma = 0.5
sharpen_threshold = 0

# ---------------------------------------------------------------------------
# Backdrop recommendation
# ---------------------------------------------------------------------------
[classify]
# Only pixels with alpha above this are measured.
visibility_alpha = 50

# Designs whose average luminance (0-255) is above this are light and
# get a dark product backdrop recommendation.
dark_backdrop_above = 120.0

# ---------------------------------------------------------------------------
# Synthesis
# ---------------------------------------------------------------------------
[synthesis]
# Seconds each generation or validation call may take before the tier is
# abandoned and the next one is tried.
tier_timeout_secs = 120

# Seconds the background-removal call may take.
removal_timeout_secs = 60

# When the mockup classifier errors: true accepts the candidate unchecked,
# false rejects it and moves to the next tier.
validator_fail_open = true

# When trimming or normalization fails: true passes the image through
# unchanged, false fails the variant.
degrade_on_step_failure = true

# Maximum strategies synthesized at once.
# Omit or comment out to run every strategy concurrently.
# max_concurrent_strategies = 8
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_targets_apparel() {
        let config = PipelineConfig::default();
        assert_eq!(config.print.family, "apparel");
        assert_eq!(
            config.canvas().unwrap(),
            PrintCanvas {
                width: 4500,
                height: 5400,
                dpi: 300
            }
        );
    }

    #[test]
    fn default_config_has_stock_families() {
        let config = PipelineConfig::default();
        let names: Vec<_> = config.print.families.keys().cloned().collect();
        assert_eq!(names, vec!["apparel", "poster", "sticker"]);
        assert_eq!(config.print.families["poster"].height, 7200);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[normalize]
fill_fraction = 0.9
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.normalize.fill_fraction, 0.9);
        assert_eq!(config.normalize.sharpen_sigma, 0.5);
        assert_eq!(config.trim.alpha_threshold, 5);
        assert!(config.synthesis.validator_fail_open);
    }

    #[test]
    fn zero_sigma_disables_sharpening() {
        let config = NormalizeConfig {
            sharpen_sigma: 0.0,
            ..Default::default()
        };
        assert_eq!(config.sharpening(), None);
        assert!(NormalizeConfig::default().sharpening().is_some());
    }

    #[test]
    fn settings_follow_config() {
        let mut config = PipelineConfig::default();
        config.print.family = "sticker".into();
        config.synthesis.degrade_on_step_failure = false;
        config.synthesis.removal_timeout_secs = 7;
        let settings = config.postprocess_settings().unwrap();
        assert_eq!(settings.canvas.width, 1200);
        assert!(!settings.degrade_on_step_failure);
        assert_eq!(settings.removal_timeout, Some(Duration::from_secs(7)));

        config.synthesis.validator_fail_open = false;
        let policy = config.validator_policy();
        assert!(!policy.fail_open);
        assert_eq!(policy.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn with_family_switches_canvas() {
        let config = PipelineConfig::default().with_family("poster").unwrap();
        assert_eq!(config.canvas().unwrap().width, 5400);
        assert!(PipelineConfig::default().with_family("mug").is_err());
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_without_path_is_default() {
        assert_eq!(load_config(None).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("press.toml");
        fs::write(
            &path,
            r#"
[print]
family = "tote"

[print.families.tote]
width = 3600
height = 4200
dpi = 300

[synthesis]
max_concurrent_strategies = 2
"#,
        )
        .unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.canvas().unwrap().width, 3600);
        // Stock families survive the merge.
        assert!(config.print.families.contains_key("apparel"));
        assert_eq!(config.synthesis.max_concurrent_strategies, Some(2));
    }

    #[test]
    fn load_config_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(Some(tmp.path().join("nope.toml").as_path()));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "this is not = [valid toml").unwrap();
        assert!(matches!(load_config(Some(path.as_path())), Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("fill_fraction = 0.96").unwrap();
        let overlay: toml::Value = toml::from_str("fill_fraction = 0.8").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("fill_fraction").unwrap().as_float(), Some(0.8));
    }

    #[test]
    fn merge_toml_deep_nested() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[print.families.apparel]
dpi = 150
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let apparel = &merged["print"]["families"]["apparel"];
        assert_eq!(apparel["dpi"].as_integer(), Some(150));
        assert_eq!(apparel["width"].as_integer(), Some(4500));
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<PipelineConfig, _> = toml::from_str("[trim]\nalpha = 3\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_family_key_rejected() {
        let toml_str = r#"
[print.families.apparel]
width = 4500
height = 5400
dpi = 300
bleed = 10
"#;
        let result: Result<PipelineConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_unknown_family() {
        let mut config = PipelineConfig::default();
        config.print.family = "mug".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_zero_dimensions_and_dpi() {
        let mut config = PipelineConfig::default();
        config.print.families.insert(
            "broken".into(),
            PrintCanvas {
                width: 0,
                height: 10,
                dpi: 300,
            },
        );
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.print.families.get_mut("apparel").unwrap().dpi = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_fill_fraction_bounds() {
        let mut config = PipelineConfig::default();
        config.normalize.fill_fraction = 1.0;
        assert!(config.validate().is_ok());
        config.normalize.fill_fraction = 0.0;
        assert!(config.validate().is_err());
        config.normalize.fill_fraction = 1.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_padding_and_timeouts() {
        let mut config = PipelineConfig::default();
        config.trim.padding_fraction = -0.1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.synthesis.tier_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.synthesis.max_concurrent_strategies = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_config_rejects_invalid_values() {
        let overlay: toml::Value = toml::from_str("[normalize]\nfill_fraction = 2.0\n").unwrap();
        let result = resolve_config(stock_defaults_value().unwrap(), Some(overlay));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: PipelineConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in [
            "[print]",
            "[print.families.apparel]",
            "[trim]",
            "[normalize]",
            "[classify]",
            "[synthesis]",
        ] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        for key in ["print", "trim", "normalize", "classify", "synthesis"] {
            assert!(val.get(key).is_some(), "missing {key}");
        }
    }
}
