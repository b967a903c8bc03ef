//! External model interfaces
//!
//! Text detection and OCR run outside this crate. They are reached through two
//! synchronous capability traits so the cleaning logic stays deterministic and
//! can be driven by mocks in tests.
//!
//! - [`TextDetector`] - boxes plus a page-level AI text mask
//! - [`TextRecognizer`] - text for a cropped box
//! - [`ModelPool`] - bounds how many model calls run at once
//! - [`PrecomputedDetector`] - reads detections written by an earlier model run

use image::{imageops, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::boxes::TextBox;

/// Model call error types
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model call failed: {0}")]
    Failed(String),

    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Output of the detection model for one page
#[derive(Debug, Clone)]
pub struct PageDetections {
    /// Boxes in the coordinates of the image handed to the detector
    pub boxes: Vec<TextBox>,
    /// AI text mask of the same size as that image (non-zero = text)
    pub mask: GrayImage,
}

/// Recognized text for one crop
#[derive(Debug, Clone, PartialEq)]
pub struct OcrText {
    pub text: String,
    pub confidence: f32,
}

/// Text detection capability
pub trait TextDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<PageDetections>;
}

/// OCR capability
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, crop: &RgbImage) -> Result<OcrText>;
}

/// Runs model calls on a fixed number of replica threads
#[derive(Debug)]
pub struct ModelPool {
    pool: rayon::ThreadPool,
    replicas: usize,
}

impl ModelPool {
    pub fn new(replicas: usize) -> Result<Self> {
        let replicas = replicas.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(replicas)
            .thread_name(|i| format!("model-replica-{i}"))
            .build()
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;
        Ok(Self { pool, replicas })
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Run a model call on one of the replica threads and wait for it
    pub fn run<R, F>(&self, call: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(call)
    }
}

// ============================================================
// File-backed detector
// ============================================================

/// Detection results as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFile {
    /// AI mask image, relative paths resolve against the JSON file
    pub mask_path: PathBuf,
    #[serde(default)]
    pub boxes: Vec<TextBox>,
}

/// Detector replaying a detection JSON and mask image
#[derive(Debug, Clone)]
pub struct PrecomputedDetector {
    detections: DetectionFile,
    base_dir: PathBuf,
}

impl PrecomputedDetector {
    /// Read a detection JSON file
    pub fn load(json_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(json_path)?;
        let detections: DetectionFile = serde_json::from_str(&content)
            .map_err(|e| ModelError::InvalidOutput(format!("{}: {e}", json_path.display())))?;
        let base_dir = json_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self {
            detections,
            base_dir,
        })
    }

    pub fn new(detections: DetectionFile, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            detections,
            base_dir: base_dir.into(),
        }
    }

    fn mask_path(&self) -> PathBuf {
        if self.detections.mask_path.is_absolute() {
            self.detections.mask_path.clone()
        } else {
            self.base_dir.join(&self.detections.mask_path)
        }
    }
}

impl TextDetector for PrecomputedDetector {
    fn detect(&self, image: &RgbImage) -> Result<PageDetections> {
        let path = self.mask_path();
        if !path.exists() {
            return Err(ModelError::Unavailable(format!("mask not found: {}", path.display())));
        }
        let mut mask = image::open(&path)
            .map_err(|e| ModelError::InvalidOutput(e.to_string()))?
            .to_luma8();

        let (width, height) = image.dimensions();
        if mask.dimensions() != (width, height) {
            mask = imageops::resize(&mask, width, height, imageops::FilterType::Nearest);
        }

        Ok(PageDetections {
            boxes: self.detections.boxes.clone(),
            mask,
        })
    }
}
