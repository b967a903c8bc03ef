//! Denoise band construction
//!
//! The band is the ring of `outline` pixels around the mask. Its edges are
//! softened with a Gaussian of the fade radius so the filtered pixels blend
//! into the untouched page without a seam.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

use super::types::DenoiseRegion;
use crate::masking::{grow::dilate_by, Mask, MASK_ON};

/// Gaussian tail length in sigmas kept inside the region
const FADE_EXTENT: u32 = 3;

impl DenoiseRegion {
    /// Build the band around `mask`; `None` when the mask is empty
    pub fn around(mask: &Mask, outline: u32, fade_radius: u32, image_bounds: (u32, u32)) -> Option<Self> {
        let tight = mask.bounding_box()?;
        let margin = outline + fade_radius * FADE_EXTENT + 1;
        let bounds = tight.expanded(margin, margin, margin, margin, image_bounds);
        if bounds.is_empty() {
            return None;
        }

        let mut local = GrayImage::new(bounds.width, bounds.height);
        for y in 0..bounds.height {
            for x in 0..bounds.width {
                if mask.covers(bounds.x + x, bounds.y + y) {
                    local.put_pixel(x, y, Luma([MASK_ON]));
                }
            }
        }

        let grown = dilate_by(&local, outline);
        let mut band_pixels = 0u64;
        let band = GrayImage::from_fn(bounds.width, bounds.height, |x, y| {
            let in_band = grown.get_pixel(x, y).0[0] > 0 && local.get_pixel(x, y).0[0] == 0;
            if in_band {
                band_pixels += 1;
                Luma([MASK_ON])
            } else {
                Luma([0])
            }
        });

        let alpha = if fade_radius > 0 {
            gaussian_blur_f32(&band, fade_radius as f32)
        } else {
            band
        };

        Some(DenoiseRegion {
            bounds,
            alpha,
            band_pixels,
        })
    }
}
