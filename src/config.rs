//! Configuration for the page cleaner
//!
//! All tunable behavior lives here, grouped into four sections that mirror the
//! processing stages:
//!
//! - [`GeneralConfig`] - scaling, model replicas, output formats
//! - [`PreprocessorConfig`] - box filtering, OCR and box padding
//! - [`MaskerConfig`] - mask growth and selection policy
//! - [`DenoiserConfig`] - band denoising policy
//!
//! # Example
//!
//! ```rust,no_run
//! use panel_cleaner::CleanerConfig;
//! use std::path::Path;
//!
//! let config = CleanerConfig::load_from_path(Path::new("config.toml")).unwrap();
//! assert!(config.validate().is_ok());
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Directory name used below the platform config dir
const CONFIG_DIR_NAME: &str = "panel-cleaner";

/// Config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default OCR blacklist: punctuation, long vowel marks and digits in either width
pub const DEFAULT_OCR_BLACKLIST_PATTERN: &str = "[～．ー！？０-９~.!?0-9-]*";

/// Mask formats able to carry an alpha channel
const TRANSPARENT_MASK_TYPES: [&str; 3] = ["png", "webp", "tiff"];

// ============================================================
// Errors
// ============================================================

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// Sections
// ============================================================

/// Options that apply to the whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Downscale factor applied before detection and mask fitting (0, 1]
    pub input_size_scale: f32,

    /// Maximum number of concurrent model invocations
    pub model_replicas: usize,

    /// Output format for the cleaned image, `None` keeps the source format
    pub preferred_file_type: Option<String>,

    /// Output format for the mask image, must support transparency
    pub preferred_mask_file_type: String,

    /// Also write the original text pixels under accepted masks as a layer
    pub extract_text: bool,

    /// Write denoised pixels as their own layer instead of into the mask image
    pub separate_noise_mask: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            input_size_scale: 1.0,
            model_replicas: 1,
            preferred_file_type: None,
            preferred_mask_file_type: "png".to_string(),
            extract_text: false,
            separate_noise_mask: false,
        }
    }
}

/// Box filtering and padding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    /// Boxes with a smaller area are discarded
    pub box_min_size: u64,

    /// Boxes classified as unknown need at least this area
    pub suspicious_box_min_size: u64,

    /// Run OCR on small boxes to discard numbers and symbols
    pub ocr_enabled: bool,

    /// Boxes above this area skip OCR and are always kept
    pub ocr_max_size: u64,

    /// Full-width OCR text fully matching this pattern is discarded
    pub ocr_blacklist_pattern: String,

    pub box_padding_initial: u32,
    pub box_right_padding_initial: u32,
    pub box_padding_extended: u32,
    pub box_right_padding_extended: u32,

    /// Padding of the sampling frame; masks never grow past it
    pub box_reference_padding: u32,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            box_min_size: 20 * 20,
            suspicious_box_min_size: 200 * 200,
            ocr_enabled: true,
            ocr_max_size: 30 * 100,
            ocr_blacklist_pattern: DEFAULT_OCR_BLACKLIST_PATTERN.to_string(),
            box_padding_initial: 2,
            box_right_padding_initial: 3,
            box_padding_extended: 5,
            box_right_padding_extended: 5,
            box_reference_padding: 20,
        }
    }
}

/// Mask growth and selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskerConfig {
    /// Pixels added around the mask per growth step
    pub mask_growth_step_pixels: u32,

    /// Number of growth steps after the initial mask
    pub mask_growth_steps: u32,

    /// Boundary samples brighter than this are rounded to white
    pub off_white_max_threshold: u8,

    /// A larger mask must lower the deviation by more than this to be preferred
    pub mask_improvement_threshold: f64,

    /// Take the first mask under the deviation limit instead of searching all
    pub mask_selection_fast: bool,

    /// Boxes whose best boundary deviation exceeds this get no mask
    pub mask_max_standard_deviation: f64,

    /// RGBA tint for accepted masks in the debug overlay
    pub debug_mask_color: [u8; 4],
}

impl Default for MaskerConfig {
    fn default() -> Self {
        Self {
            mask_growth_step_pixels: 2,
            mask_growth_steps: 11,
            off_white_max_threshold: 240,
            mask_improvement_threshold: 0.1,
            mask_selection_fast: false,
            mask_max_standard_deviation: 15.0,
            debug_mask_color: [108, 30, 240, 127],
        }
    }
}

/// Band denoising around accepted masks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiserConfig {
    pub denoising_enabled: bool,

    /// Masks with a quieter boundary than this are left alone
    pub noise_min_standard_deviation: f64,

    /// Thickness of the band around the mask
    pub noise_outline_size: u32,

    /// Blur radius used to fade the band into untouched pixels
    pub noise_fade_radius: u32,

    /// Denoise chroma as well; otherwise the page is treated as monochrome
    pub colored_images: bool,

    /// Luminance filter strength
    pub filter_strength: u32,

    /// Chroma filter strength
    pub color_filter_strength: u32,

    /// Patch size compared between pixels (odd)
    pub template_window_size: u32,

    /// Area searched for similar patches (odd)
    pub search_window_size: u32,
}

impl Default for DenoiserConfig {
    fn default() -> Self {
        Self {
            denoising_enabled: true,
            noise_min_standard_deviation: 0.25,
            noise_outline_size: 5,
            noise_fade_radius: 1,
            colored_images: false,
            filter_strength: 10,
            color_filter_strength: 10,
            template_window_size: 7,
            search_window_size: 21,
        }
    }
}

// ============================================================
// Root config
// ============================================================

/// Complete cleaner configuration.
///
/// Passed by reference into every component, so several configurations can
/// coexist in one process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub general: GeneralConfig,
    pub preprocessor: PreprocessorConfig,
    pub masker: MaskerConfig,
    pub denoiser: DenoiserConfig,
}

/// Overrides collected from the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub input_size_scale: Option<f32>,
    pub model_replicas: Option<usize>,
    pub denoising_enabled: Option<bool>,
    pub mask_selection_fast: Option<bool>,
    pub preferred_file_type: Option<String>,
    pub extract_text: Option<bool>,
    pub separate_noise_mask: Option<bool>,
}

impl CleanerConfig {
    /// Default location of the user config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the user config, falling back to defaults when no file exists
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load and validate a config file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from TOML text without validating it
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize the config to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command line overrides (CLI takes precedence)
    #[must_use]
    pub fn merge_with_cli(mut self, cli: &CliOverrides) -> Self {
        if let Some(scale) = cli.input_size_scale {
            self.general.input_size_scale = scale;
        }
        if let Some(replicas) = cli.model_replicas {
            self.general.model_replicas = replicas;
        }
        if let Some(ref file_type) = cli.preferred_file_type {
            self.general.preferred_file_type = Some(file_type.clone());
        }
        if let Some(enabled) = cli.denoising_enabled {
            self.denoiser.denoising_enabled = enabled;
        }
        if let Some(fast) = cli.mask_selection_fast {
            self.masker.mask_selection_fast = fast;
        }
        if let Some(extract) = cli.extract_text {
            self.general.extract_text = extract;
        }
        if let Some(separate) = cli.separate_noise_mask {
            self.general.separate_noise_mask = separate;
        }
        self
    }

    /// Compile the OCR blacklist as a full-match pattern
    pub fn blacklist_regex(&self) -> Result<Regex> {
        let anchored = format!("^(?:{})$", self.preprocessor.ocr_blacklist_pattern);
        Regex::new(&anchored)
            .map_err(|e| ConfigError::invalid("preprocessor.ocr_blacklist_pattern", e.to_string()))
    }

    /// Reject values no processing could sensibly run with
    pub fn validate(&self) -> Result<()> {
        let g = &self.general;
        if !(g.input_size_scale > 0.0 && g.input_size_scale <= 1.0) {
            return Err(ConfigError::invalid(
                "general.input_size_scale",
                format!("{} is outside (0, 1]", g.input_size_scale),
            ));
        }
        if g.model_replicas == 0 {
            return Err(ConfigError::invalid("general.model_replicas", "must be at least 1"));
        }
        let mask_type = g.preferred_mask_file_type.trim_start_matches('.').to_lowercase();
        if !TRANSPARENT_MASK_TYPES.contains(&mask_type.as_str()) {
            return Err(ConfigError::invalid(
                "general.preferred_mask_file_type",
                format!("{mask_type} cannot store transparency"),
            ));
        }

        let p = &self.preprocessor;
        if p.box_reference_padding == 0 {
            return Err(ConfigError::invalid("preprocessor.box_reference_padding", "must be positive"));
        }
        if p.box_padding_extended < p.box_padding_initial
            || p.box_padding_extended + p.box_right_padding_extended
                < p.box_padding_initial + p.box_right_padding_initial
        {
            return Err(ConfigError::invalid(
                "preprocessor.box_padding_extended",
                "extended padding must contain the initial padding",
            ));
        }
        if p.box_reference_padding < p.box_padding_extended + p.box_right_padding_extended {
            return Err(ConfigError::invalid(
                "preprocessor.box_reference_padding",
                "reference padding must contain the extended padding",
            ));
        }
        self.blacklist_regex()?;

        let m = &self.masker;
        if m.mask_growth_step_pixels == 0 {
            return Err(ConfigError::invalid("masker.mask_growth_step_pixels", "must be positive"));
        }
        if m.mask_growth_steps == 0 {
            return Err(ConfigError::invalid("masker.mask_growth_steps", "must be positive"));
        }
        if !(m.mask_max_standard_deviation > 0.0) {
            return Err(ConfigError::invalid("masker.mask_max_standard_deviation", "must be positive"));
        }
        if !(m.mask_improvement_threshold >= 0.0) {
            return Err(ConfigError::invalid("masker.mask_improvement_threshold", "must not be negative"));
        }

        let d = &self.denoiser;
        if !(d.noise_min_standard_deviation >= 0.0) {
            return Err(ConfigError::invalid("denoiser.noise_min_standard_deviation", "must not be negative"));
        }
        if d.noise_outline_size == 0 {
            return Err(ConfigError::invalid("denoiser.noise_outline_size", "must be positive"));
        }
        if d.filter_strength == 0 {
            return Err(ConfigError::invalid("denoiser.filter_strength", "must be positive"));
        }
        if d.color_filter_strength == 0 {
            return Err(ConfigError::invalid("denoiser.color_filter_strength", "must be positive"));
        }
        check_odd_window("denoiser.template_window_size", d.template_window_size)?;
        check_odd_window("denoiser.search_window_size", d.search_window_size)?;
        if d.search_window_size < d.template_window_size {
            return Err(ConfigError::invalid(
                "denoiser.search_window_size",
                "must not be smaller than the template window",
            ));
        }

        Ok(())
    }
}

fn check_odd_window(field: &'static str, size: u32) -> Result<()> {
    if size == 0 || size % 2 == 0 {
        return Err(ConfigError::invalid(field, format!("{size} is not a positive odd number")));
    }
    Ok(())
}

// ============================================================
// Tests
// ============================================================
