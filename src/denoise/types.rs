//! Common types for the denoise module

use image::GrayImage;
use serde::Serialize;

use crate::boxes::BoxRect;

/// What the denoiser did for one mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DenoiseOutcome {
    /// Denoising is switched off
    Disabled,
    /// Boundary already quiet enough
    BelowThreshold { deviation: f64 },
    /// Band was filtered and blended in
    Applied { band_pixels: u64 },
}

impl DenoiseOutcome {
    pub fn was_applied(&self) -> bool {
        matches!(self, DenoiseOutcome::Applied { .. })
    }
}

/// Thin band hugging a mask, with blend weights.
///
/// `alpha` is 255 inside the band and fades to 0 over the fade radius.
#[derive(Debug, Clone)]
pub struct DenoiseRegion {
    /// Page-coordinate bounds of `alpha`
    pub bounds: BoxRect,
    pub alpha: GrayImage,
    /// Pixels in the band before fading
    pub band_pixels: u64,
}

impl DenoiseRegion {
    /// Blend weight (0.0-1.0) at a page coordinate
    pub fn weight_at(&self, page_x: u32, page_y: u32) -> f32 {
        if !self.bounds.contains_point(page_x, page_y) {
            return 0.0;
        }
        self.alpha.get_pixel(page_x - self.bounds.x, page_y - self.bounds.y).0[0] as f32 / 255.0
    }

    pub fn is_empty(&self) -> bool {
        self.band_pixels == 0
    }
}
