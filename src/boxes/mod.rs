//! Detection box handling
//!
//! # Features
//!
//! - **Filtering** ([`filter`]) - discard tiny, suspicious and OCR-blacklisted boxes
//! - **Padding** ([`padding`]) - derive initial, extended and reference frames

pub mod filter;
pub mod padding;
mod types;

pub use filter::{to_full_width, BoxFilter, BoxVerdict, DiscardReason};
pub use padding::{merge_overlapping, BoxPadder};
pub use types::{BoxLanguage, BoxRect, PaddedBox, TextBox};
