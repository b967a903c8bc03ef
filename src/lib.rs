//! panel-cleaner - text removal for scanned comic and manga pages
//!
//! Given text boxes and an AI text mask from an external detector, the cleaner
//! fits the smallest mask per box whose outer boundary lies on uniform
//! background, paints it with the surrounding color and denoises a thin band
//! around it.
//!
//! # Modules
//!
//! - [`boxes`] - box geometry, filtering and padding
//! - [`masking`] - mask growth and selection
//! - [`denoise`] - band denoising with non-local means
//! - [`models`] - detector and OCR interfaces
//! - [`pipeline`] - page and batch orchestration
//! - [`config`] - configuration loading and validation
//! - [`visualize`] - debug overlays
//!
//! # Example
//!
//! ```rust,no_run
//! use panel_cleaner::{CleanerConfig, PageCleaner, PrecomputedDetector};
//! use std::path::Path;
//!
//! let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
//! let detector = PrecomputedDetector::load(Path::new("detections/page_001.json")).unwrap();
//! let page = image::open("page_001.png").unwrap().to_rgb8();
//! let output = cleaner.clean("page_001", &page, &detector, None).unwrap();
//! println!("masked {} boxes", output.report.summary.masked);
//! ```

pub mod boxes;
pub mod cli;
pub mod config;
pub mod denoise;
pub mod masking;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod visualize;

// CLI
pub use cli::{exit_codes, CleanArgs, Cli, Commands, ValidateConfigArgs};

// Config
pub use config::{
    CleanerConfig, CliOverrides, ConfigError, DenoiserConfig, GeneralConfig, MaskerConfig,
    PreprocessorConfig,
};

// Stages
pub use boxes::{BoxFilter, BoxLanguage, BoxPadder, BoxRect, PaddedBox, TextBox};
pub use denoise::{DenoiseOutcome, Denoiser};
pub use masking::{
    EdgeStatistic, GrowthMap, Mask, MaskFit, MaskGrower, MaskSelection, MaskSelector,
};

// Models
pub use models::{
    DetectionFile, ModelError, ModelPool, OcrText, PageDetections, PrecomputedDetector,
    TextDetector, TextRecognizer,
};

// Pipeline
pub use pipeline::{
    save_page_output, BatchCleaner, BatchSummary, BoxOutcome, BoxReport, CancelToken, CleanerError,
    PageCleaner, PageJob, PageOutput, PageReport, PageResult, PageSource, PageSummary,
};

// Progress tracking
pub use progress::{CleaningStage, NoProgress, OutputMode, ProgressCallback, ProgressTracker};

// Debug output
pub use visualize::{render_debug_overlay, render_mask_layers};
