//! Debug overlay
//!
//! Draws the box frames of a page and tints the accepted masks so a run can be
//! inspected by eye. Colors:
//!
//! | frame            | color  |
//! |------------------|--------|
//! | initial          | green  |
//! | extended         | red    |
//! | merged extended  | purple |
//! | reference        | blue   |
//!
//! [`render_mask_layers`] shows how far each accepted mask grew: every
//! growth step up to the chosen one gets its own color, steps past it are
//! shaded gray.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::boxes::BoxRect;
use crate::pipeline::PageOutput;

pub const INITIAL_BOX_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
pub const EXTENDED_BOX_COLOR: Rgb<u8> = Rgb([230, 0, 0]);
pub const MERGED_BOX_COLOR: Rgb<u8> = Rgb([160, 0, 200]);
pub const REFERENCE_BOX_COLOR: Rgb<u8> = Rgb([0, 80, 255]);

/// Colors of growth steps 0, 1, 2, ... (cycled)
pub const STEP_COLORS: [[u8; 3]; 6] = [
    [255, 0, 0],
    [255, 140, 0],
    [230, 220, 0],
    [0, 190, 0],
    [0, 170, 255],
    [150, 0, 255],
];
/// Steps grown past the accepted mask
pub const REJECTED_STEP_COLOR: [u8; 3] = [128, 128, 128];

const LAYER_ALPHA: u8 = 160;

/// Render the overlay on top of the source page
pub fn render_debug_overlay(source: &RgbImage, output: &PageOutput, mask_color: [u8; 4]) -> RgbImage {
    let mut canvas = source.clone();

    for fit in &output.fits {
        let frame = fit.mask.frame().clipped(canvas.dimensions());
        for y in frame.y..frame.bottom() {
            for x in frame.x..frame.right() {
                if fit.mask.covers(x, y) {
                    let tinted = tint(*canvas.get_pixel(x, y), mask_color);
                    canvas.put_pixel(x, y, tinted);
                }
            }
        }
    }

    for padded in &output.layout.padded {
        draw_frame(&mut canvas, padded.reference, REFERENCE_BOX_COLOR);
    }
    for merged in &output.layout.merged_extended {
        draw_frame(&mut canvas, *merged, MERGED_BOX_COLOR);
    }
    for padded in &output.layout.padded {
        draw_frame(&mut canvas, padded.extended, EXTENDED_BOX_COLOR);
        draw_frame(&mut canvas, padded.initial, INITIAL_BOX_COLOR);
    }

    canvas
}

/// Render the growth steps of every accepted mask over the source page
pub fn render_mask_layers(source: &RgbImage, output: &PageOutput) -> RgbImage {
    let mut canvas = source.clone();

    for (fit, growth) in output.fits.iter().zip(&output.layout.growth) {
        let chosen = fit.mask.step();
        let frame = growth.frame().clipped(canvas.dimensions());
        for y in frame.y..frame.bottom() {
            for x in frame.x..frame.right() {
                let Some(step) = growth.step_at(x, y) else {
                    continue;
                };
                let [r, g, b] = if step <= chosen {
                    STEP_COLORS[step % STEP_COLORS.len()]
                } else {
                    REJECTED_STEP_COLOR
                };
                let tinted = tint(*canvas.get_pixel(x, y), [r, g, b, LAYER_ALPHA]);
                canvas.put_pixel(x, y, tinted);
            }
        }
    }

    canvas
}

fn draw_frame(canvas: &mut RgbImage, rect: BoxRect, color: Rgb<u8>) {
    if rect.is_empty() {
        return;
    }
    let frame = Rect::at(rect.x as i32, rect.y as i32).of_size(rect.width, rect.height);
    draw_hollow_rect_mut(canvas, frame, color);
}

/// Alpha-blend an RGBA color over a pixel
fn tint(pixel: Rgb<u8>, [r, g, b, a]: [u8; 4]) -> Rgb<u8> {
    let alpha = a as f32 / 255.0;
    let mix = |top: u8, bottom: u8| (top as f32 * alpha + bottom as f32 * (1.0 - alpha)).round() as u8;
    Rgb([mix(r, pixel.0[0]), mix(g, pixel.0[1]), mix(b, pixel.0[2])])
}
