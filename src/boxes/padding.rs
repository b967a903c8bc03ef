//! Box padding
//!
//! Each surviving box gets three frames:
//!
//! - **initial**: symmetric padding plus extra room on the right, used to cut
//!   the starting mask
//! - **extended**: wider padding with its own right bias, used to suppress
//!   false positives in the AI mask
//! - **reference**: symmetric padding only, the frame all statistics are
//!   sampled in and no mask may leave
//!
//! The right bias catches ruby annotations that sit to the right of vertical
//! text columns.

use super::types::{BoxRect, PaddedBox, TextBox};
use crate::config::PreprocessorConfig;

/// Derives padded frames from detection boxes
#[derive(Debug, Clone)]
pub struct BoxPadder {
    padding_initial: u32,
    right_padding_initial: u32,
    padding_extended: u32,
    right_padding_extended: u32,
    reference_padding: u32,
}

impl BoxPadder {
    pub fn new(config: &PreprocessorConfig) -> Self {
        Self {
            padding_initial: config.box_padding_initial,
            right_padding_initial: config.box_right_padding_initial,
            padding_extended: config.box_padding_extended,
            right_padding_extended: config.box_right_padding_extended,
            reference_padding: config.box_reference_padding,
        }
    }

    /// Pad a box inside an image of `bounds` (width, height)
    pub fn pad(&self, text_box: &TextBox, bounds: (u32, u32)) -> PaddedBox {
        let rect = text_box.rect;
        let pi = self.padding_initial;
        let pe = self.padding_extended;
        let pr = self.reference_padding;

        PaddedBox {
            source: *text_box,
            initial: rect.expanded(pi, pi, pi + self.right_padding_initial, pi, bounds),
            extended: rect.expanded(pe, pe, pe + self.right_padding_extended, pe, bounds),
            reference: rect.expanded(pr, pr, pr, pr, bounds),
        }
    }
}

/// Merge overlapping rectangles until no two results touch
pub fn merge_overlapping(rects: &[BoxRect]) -> Vec<BoxRect> {
    let mut merged: Vec<BoxRect> = Vec::with_capacity(rects.len());

    for rect in rects.iter().filter(|r| !r.is_empty()) {
        let mut current = *rect;
        // A grown box can reach boxes it did not touch before, so rescan.
        loop {
            let before = merged.len();
            merged.retain(|other| {
                if other.touches(&current) {
                    current = current.union(other);
                    false
                } else {
                    true
                }
            });
            if merged.len() == before {
                break;
            }
        }
        merged.push(current);
    }

    merged
}
