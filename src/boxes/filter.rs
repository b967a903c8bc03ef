//! Box filtering
//!
//! Drops detections that are too small to trust, unclassified detections
//! that are not large enough, and small boxes whose OCR text is nothing but
//! numbers or symbols.
//!
//! Boxes that miss the page entirely are dropped by
//! [`BoxFilter::check_bounds`] before any rule runs.
//!
//! # Rules (applied in order)
//!
//! 1. `size < box_min_size` → discard
//! 2. language unknown and `size < suspicious_box_min_size` → discard
//! 3. OCR enabled, `size <= ocr_max_size` and the full-width text fully
//!    matches the blacklist → discard

use regex::Regex;
use serde::Serialize;

use super::types::{BoxLanguage, TextBox};
use crate::config::{self, CleanerConfig};

/// Why a box was dropped
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscardReason {
    /// No pixel of the box lies on the page
    OutsideImage,
    TooSmall { size: u64, min_size: u64 },
    Suspicious { size: u64, min_size: u64 },
    Blacklisted { text: String },
}

/// Filtering decision for one box
#[derive(Debug, Clone, PartialEq)]
pub enum BoxVerdict {
    Keep,
    Discard(DiscardReason),
}

impl BoxVerdict {
    pub fn is_keep(&self) -> bool {
        matches!(self, BoxVerdict::Keep)
    }
}

/// Box filter built from the preprocessor settings
#[derive(Debug, Clone)]
pub struct BoxFilter {
    box_min_size: u64,
    suspicious_box_min_size: u64,
    ocr_enabled: bool,
    ocr_max_size: u64,
    blacklist: Regex,
}

impl BoxFilter {
    pub fn new(config: &CleanerConfig) -> config::Result<Self> {
        let p = &config.preprocessor;
        Ok(Self {
            box_min_size: p.box_min_size,
            suspicious_box_min_size: p.suspicious_box_min_size,
            ocr_enabled: p.ocr_enabled,
            ocr_max_size: p.ocr_max_size,
            blacklist: config.blacklist_regex()?,
        })
    }

    /// Reject boxes with no overlap with an image of `bounds`
    pub fn check_bounds(&self, text_box: &TextBox, bounds: (u32, u32)) -> BoxVerdict {
        if text_box.rect.clipped(bounds).is_empty() {
            BoxVerdict::Discard(DiscardReason::OutsideImage)
        } else {
            BoxVerdict::Keep
        }
    }

    /// Size rules only (1 and 2)
    pub fn check_size(&self, text_box: &TextBox) -> BoxVerdict {
        let size = text_box.size();
        if size < self.box_min_size {
            return BoxVerdict::Discard(DiscardReason::TooSmall {
                size,
                min_size: self.box_min_size,
            });
        }
        if text_box.language == BoxLanguage::Unknown && size < self.suspicious_box_min_size {
            return BoxVerdict::Discard(DiscardReason::Suspicious {
                size,
                min_size: self.suspicious_box_min_size,
            });
        }
        BoxVerdict::Keep
    }

    /// Whether OCR has to be consulted for this box
    pub fn needs_ocr(&self, text_box: &TextBox) -> bool {
        self.ocr_enabled && text_box.size() <= self.ocr_max_size
    }

    /// Full decision. `ocr_text` is the recognized text when OCR ran.
    pub fn filter(&self, text_box: &TextBox, ocr_text: Option<&str>) -> BoxVerdict {
        let verdict = self.check_size(text_box);
        if !verdict.is_keep() || !self.needs_ocr(text_box) {
            return verdict;
        }
        match ocr_text {
            Some(text) if self.is_blacklisted(text) => {
                BoxVerdict::Discard(DiscardReason::Blacklisted {
                    text: text.to_string(),
                })
            }
            _ => BoxVerdict::Keep,
        }
    }

    /// Full-width normalize and fully match against the blacklist
    pub fn is_blacklisted(&self, text: &str) -> bool {
        self.blacklist.is_match(&to_full_width(text.trim()))
    }
}

/// Convert printable ASCII to the full-width forms block
pub fn to_full_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ' ' => '\u{3000}',
            '!'..='~' => char::from_u32(c as u32 - 0x21 + 0xFF01).unwrap_or(c),
            _ => c,
        })
        .collect()
}
