//! Common types for the page pipeline

use chrono::{DateTime, Utc};
use image::{RgbImage, RgbaImage};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::boxes::{BoxLanguage, BoxRect, DiscardReason, PaddedBox};
use crate::config::ConfigError;
use crate::denoise::DenoiseOutcome;
use crate::masking::{GrowthMap, MaskFit};
use crate::models::ModelError;

/// Page-level error types
#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Image encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CleanerError>;

/// What happened to one detected box
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BoxOutcome {
    /// A mask was fitted and painted
    Masked {
        step: usize,
        deviation: f64,
        area: u64,
        denoise: DenoiseOutcome,
    },
    /// Every candidate boundary crossed non-uniform content
    NoAcceptableMask {
        best_step: Option<usize>,
        best_deviation: Option<f64>,
    },
    /// Filtered out before masking
    Discarded(DiscardReason),
    /// An external call failed for this box
    Failed { error: String },
    /// Skipped after cancellation
    Cancelled,
}

/// Per-box entry of a page report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxReport {
    pub index: usize,
    pub rect: BoxRect,
    pub language: BoxLanguage,
    #[serde(flatten)]
    pub outcome: BoxOutcome,
}

/// Counts per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub total_boxes: usize,
    pub masked: usize,
    pub unmaskable: usize,
    pub discarded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub denoised: usize,
}

impl PageSummary {
    pub fn from_reports(reports: &[BoxReport]) -> Self {
        let mut summary = PageSummary {
            total_boxes: reports.len(),
            ..Default::default()
        };
        for report in reports {
            match &report.outcome {
                BoxOutcome::Masked { denoise, .. } => {
                    summary.masked += 1;
                    if denoise.was_applied() {
                        summary.denoised += 1;
                    }
                }
                BoxOutcome::NoAcceptableMask { .. } => summary.unmaskable += 1,
                BoxOutcome::Discarded(_) => summary.discarded += 1,
                BoxOutcome::Failed { .. } => summary.failed += 1,
                BoxOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// Accumulate another page
    pub fn add(&mut self, other: &PageSummary) {
        self.total_boxes += other.total_boxes;
        self.masked += other.masked;
        self.unmaskable += other.unmaskable;
        self.discarded += other.discarded;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.denoised += other.denoised;
    }
}

/// Analytics written next to the outputs
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page: String,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub processed_at: DateTime<Utc>,
    /// Set when the detector failed; the page was then left unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_error: Option<String>,
    pub summary: PageSummary,
    pub boxes: Vec<BoxReport>,
}

impl PageReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Box frames of a page in full-resolution coordinates
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub padded: Vec<PaddedBox>,
    pub merged_extended: Vec<BoxRect>,
    /// Growth steps of each accepted box, in the order of [`PageOutput::fits`]
    pub growth: Vec<GrowthMap>,
}

/// Everything produced for one page
#[derive(Debug, Clone)]
pub struct PageOutput {
    /// Source with masks painted and bands denoised
    pub cleaned: RgbImage,
    /// Union of accepted masks on a transparent background
    pub mask: RgbaImage,
    /// Pixels changed by denoising, transparent elsewhere
    pub noise: RgbaImage,
    /// Original pixels under the accepted masks, when text extraction is on
    pub text: Option<RgbaImage>,
    pub report: PageReport,
    pub layout: PageLayout,
    /// Accepted masks in full-resolution coordinates
    pub fits: Vec<MaskFit>,
}
