//! Mask growth
//!
//! Produces the candidate sequence for selection: step 0 is the initial mask,
//! every further step dilates the previous one by a fixed number of pixels
//! (square structuring element). The raster is frame-sized, so growth stops at
//! the reference frame and a full frame stays full.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

use super::types::Mask;
use crate::config::MaskerConfig;

/// Grows an initial mask into an ordered candidate sequence
#[derive(Debug, Clone)]
pub struct MaskGrower {
    step_pixels: u32,
    steps: u32,
}

impl MaskGrower {
    pub fn new(config: &MaskerConfig) -> Self {
        Self {
            step_pixels: config.mask_growth_step_pixels,
            steps: config.mask_growth_steps,
        }
    }

    /// Number of candidates [`grow`](Self::grow) returns
    pub fn candidate_count(&self) -> usize {
        self.steps as usize + 1
    }

    /// Grow `initial` into `steps + 1` masks of non-decreasing area
    pub fn grow(&self, initial: &Mask) -> Vec<Mask> {
        let mut candidates = Vec::with_capacity(self.candidate_count());
        candidates.push(initial.clone().with_step(0));

        for step in 1..=self.steps as usize {
            let previous = &candidates[step - 1];
            let next = if previous.is_full() || previous.is_empty() {
                previous.clone().with_step(step)
            } else {
                let pixels = dilate_by(previous.pixels(), self.step_pixels);
                // Dilation keeps the raster size, so the frame always matches.
                match Mask::new(previous.frame(), pixels, step) {
                    Ok(mask) => mask,
                    Err(_) => previous.clone().with_step(step),
                }
            };
            candidates.push(next);
        }

        candidates
    }
}

/// Chebyshev dilation by an arbitrary radius
pub(crate) fn dilate_by(pixels: &GrayImage, radius: u32) -> GrayImage {
    let mut remaining = radius;
    let mut current = pixels.clone();
    while remaining > 0 {
        let k = remaining.min(u8::MAX as u32) as u8;
        current = dilate(&current, Norm::LInf, k);
        remaining -= k as u32;
    }
    current
}
