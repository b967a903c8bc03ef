//! Band denoising around fitted masks
//!
//! JPEG compression leaves ringing around lettering that stays visible once
//! the text is painted over. The denoiser filters a thin band around each
//! fitted mask and blends it back, leaving the rest of the page untouched.
//!
//! # Algorithm
//!
//! 1. Skip when disabled or when the mask boundary is already quiet
//! 2. Build the outline band and its fade weights ([`band`])
//! 3. Run non-local means over the band ([`nl_means`]): luminance only for
//!    monochrome pages, luminance and chroma for colored ones
//! 4. Blend: `out = a * filtered + (1 - a) * original`

pub mod band;
pub mod nl_means;
mod types;

use image::{Rgb, RgbImage};
use tracing::debug;

use crate::boxes::BoxRect;
use crate::config::DenoiserConfig;
use crate::masking::{luminance, MaskFit};
use nl_means::{filter_plane, NlMeansParams, Plane};

pub use types::{DenoiseOutcome, DenoiseRegion};

/// Applies band denoising to fitted masks
#[derive(Debug, Clone)]
pub struct Denoiser {
    enabled: bool,
    min_std_deviation: f64,
    outline_size: u32,
    fade_radius: u32,
    colored: bool,
    luma_params: NlMeansParams,
    chroma_params: NlMeansParams,
}

impl Denoiser {
    pub fn new(config: &DenoiserConfig) -> Self {
        let params = |strength: u32| NlMeansParams {
            strength: strength as f32,
            template_window: config.template_window_size,
            search_window: config.search_window_size,
        };
        Self {
            enabled: config.denoising_enabled,
            min_std_deviation: config.noise_min_standard_deviation,
            outline_size: config.noise_outline_size,
            fade_radius: config.noise_fade_radius,
            colored: config.colored_images,
            luma_params: params(config.filter_strength),
            chroma_params: params(config.color_filter_strength),
        }
    }

    /// Decide without touching pixels
    pub fn plan(&self, deviation: f64) -> Option<DenoiseOutcome> {
        if !self.enabled {
            return Some(DenoiseOutcome::Disabled);
        }
        if deviation < self.min_std_deviation {
            return Some(DenoiseOutcome::BelowThreshold { deviation });
        }
        None
    }

    /// Denoise the band around a fitted mask, in place
    pub fn denoise(&self, image: &mut RgbImage, fit: &MaskFit) -> DenoiseOutcome {
        if let Some(skipped) = self.plan(fit.statistic.std_deviation) {
            return skipped;
        }

        let Some(region) =
            DenoiseRegion::around(&fit.mask, self.outline_size, self.fade_radius, image.dimensions())
        else {
            return DenoiseOutcome::Applied { band_pixels: 0 };
        };

        self.apply_region(image, &region);
        debug!(
            step = fit.mask.step(),
            band_pixels = region.band_pixels,
            deviation = fit.statistic.std_deviation,
            "denoised mask band"
        );
        DenoiseOutcome::Applied {
            band_pixels: region.band_pixels,
        }
    }

    /// Filter and blend one band region
    pub fn apply_region(&self, image: &mut RgbImage, region: &DenoiseRegion) {
        if region.is_empty() {
            return;
        }
        let reach = self.luma_params.search_window / 2 + self.luma_params.template_window / 2;
        let crop = region
            .bounds
            .expanded(reach, reach, reach, reach, image.dimensions());
        let targets = |x: usize, y: usize| region.weight_at(crop.x + x as u32, crop.y + y as u32) > 0.0;

        let filtered = if self.colored {
            self.filter_color(image, crop, &targets)
        } else {
            self.filter_mono(image, crop, &targets)
        };

        for y in 0..crop.height {
            for x in 0..crop.width {
                let (px, py) = (crop.x + x, crop.y + y);
                let weight = region.weight_at(px, py);
                if weight <= 0.0 {
                    continue;
                }
                let original = *image.get_pixel(px, py);
                let denoised = filtered[(y * crop.width + x) as usize];
                image.put_pixel(px, py, blend(original, denoised, weight));
            }
        }
    }

    fn filter_mono<F>(&self, image: &RgbImage, crop: BoxRect, targets: &F) -> Vec<Rgb<u8>>
    where
        F: Fn(usize, usize) -> bool,
    {
        let luma = extract_plane(image, crop, |p| luminance(p) as f32);
        let out = filter_plane(&luma, &self.luma_params, targets);
        out.data
            .iter()
            .map(|&v| {
                let v = v.round().clamp(0.0, 255.0) as u8;
                Rgb([v, v, v])
            })
            .collect()
    }

    fn filter_color<F>(&self, image: &RgbImage, crop: BoxRect, targets: &F) -> Vec<Rgb<u8>>
    where
        F: Fn(usize, usize) -> bool,
    {
        let y = filter_plane(&extract_plane(image, crop, |p| to_ycbcr(p)[0]), &self.luma_params, targets);
        let cb = filter_plane(&extract_plane(image, crop, |p| to_ycbcr(p)[1]), &self.chroma_params, targets);
        let cr = filter_plane(&extract_plane(image, crop, |p| to_ycbcr(p)[2]), &self.chroma_params, targets);

        (0..y.data.len())
            .map(|i| from_ycbcr([y.data[i], cb.data[i], cr.data[i]]))
            .collect()
    }
}

fn extract_plane(image: &RgbImage, crop: BoxRect, channel: impl Fn(&Rgb<u8>) -> f32) -> Plane {
    let mut data = Vec::with_capacity(crop.area() as usize);
    for y in crop.y..crop.bottom() {
        for x in crop.x..crop.right() {
            data.push(channel(image.get_pixel(x, y)));
        }
    }
    Plane::new(crop.width as usize, crop.height as usize, data)
}

fn blend(original: Rgb<u8>, denoised: Rgb<u8>, weight: f32) -> Rgb<u8> {
    let mix = |o: u8, d: u8| (d as f32 * weight + o as f32 * (1.0 - weight)).round().clamp(0.0, 255.0) as u8;
    Rgb([
        mix(original.0[0], denoised.0[0]),
        mix(original.0[1], denoised.0[1]),
        mix(original.0[2], denoised.0[2]),
    ])
}

/// Full-range (JPEG) YCbCr
fn to_ycbcr(pixel: &Rgb<u8>) -> [f32; 3] {
    let [r, g, b] = pixel.0.map(|c| c as f32);
    [
        0.299 * r + 0.587 * g + 0.114 * b,
        128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b,
        128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b,
    ]
}

fn from_ycbcr([y, cb, cr]: [f32; 3]) -> Rgb<u8> {
    let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    Rgb([
        to_u8(y + 1.402 * (cr - 128.0)),
        to_u8(y - 0.344_136 * (cb - 128.0) - 0.714_136 * (cr - 128.0)),
        to_u8(y + 1.772 * (cb - 128.0)),
    ])
}
