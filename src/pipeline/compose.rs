//! Page composition
//!
//! Per-box fitting never writes page buffers. These functions are the single
//! writer that folds the results into page-sized images.

use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

use crate::boxes::BoxRect;
use crate::masking::{MaskFit, MASK_ON};

/// Keep only the AI mask pixels inside the merged extended boxes
pub fn suppress_false_positives(ai_mask: &GrayImage, merged_extended: &[BoxRect]) -> GrayImage {
    let dims = ai_mask.dimensions();
    let mut out = GrayImage::new(dims.0, dims.1);
    for rect in merged_extended {
        let rect = rect.clipped(dims);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                if ai_mask.get_pixel(x, y).0[0] > 0 {
                    out.put_pixel(x, y, Luma([MASK_ON]));
                }
            }
        }
    }
    out
}

/// Paint each fit with its fill color on a transparent page layer.
///
/// Fits are painted in order, a later box wins where masks overlap.
pub fn mask_layer(dimensions: (u32, u32), fits: &[MaskFit]) -> RgbaImage {
    let mut layer = RgbaImage::new(dimensions.0, dimensions.1);
    for fit in fits {
        let [r, g, b] = fit.statistic.fill_color.0;
        let frame = fit.mask.frame().clipped(dimensions);
        for y in frame.y..frame.bottom() {
            for x in frame.x..frame.right() {
                if fit.mask.covers(x, y) {
                    layer.put_pixel(x, y, Rgba([r, g, b, u8::MAX]));
                }
            }
        }
    }
    layer
}

/// Alpha-composite `layer` over `source`
pub fn composite(source: &RgbImage, layer: &RgbaImage) -> RgbImage {
    let mut out = source.clone();
    for (x, y, pixel) in layer.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        match a {
            0 => {}
            u8::MAX => out.put_pixel(x, y, Rgb([r, g, b])),
            _ => {
                let alpha = a as f32 / 255.0;
                let under = source.get_pixel(x, y).0;
                let mix = |top: u8, bottom: u8| (top as f32 * alpha + bottom as f32 * (1.0 - alpha)).round() as u8;
                out.put_pixel(x, y, Rgb([mix(r, under[0]), mix(g, under[1]), mix(b, under[2])]));
            }
        }
    }
    out
}

/// Pixels of `after` that differ from `before`, opaque on a transparent layer
pub fn difference_layer(before: &RgbImage, after: &RgbImage) -> RgbaImage {
    RgbaImage::from_fn(after.width(), after.height(), |x, y| {
        let new = after.get_pixel(x, y);
        if before.get_pixel(x, y) == new {
            Rgba([0, 0, 0, 0])
        } else {
            let [r, g, b] = new.0;
            Rgba([r, g, b, u8::MAX])
        }
    })
}

/// Source pixels wherever `layer` is painted
pub fn text_layer(source: &RgbImage, layer: &RgbaImage) -> RgbaImage {
    RgbaImage::from_fn(source.width(), source.height(), |x, y| {
        if layer.get_pixel(x, y).0[3] == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            let [r, g, b] = source.get_pixel(x, y).0;
            Rgba([r, g, b, u8::MAX])
        }
    })
}

/// Stack `top` over `bottom`; painted pixels of `top` replace those below
pub fn stack_layers(bottom: &RgbaImage, top: &RgbaImage) -> RgbaImage {
    let mut out = bottom.clone();
    for (x, y, pixel) in top.enumerate_pixels() {
        if pixel.0[3] > 0 {
            out.put_pixel(x, y, *pixel);
        }
    }
    out
}
