//! Adaptive mask fitting
//!
//! Turns the AI mask cut out for one box into the smallest mask whose outer
//! boundary lies in a uniform region.
//!
//! # Features
//!
//! - **Growth** ([`grow`]) - fixed-step dilation into an ordered candidate sequence
//! - **Selection** ([`select`]) - boundary statistics and the fast/thorough policy
//!
//! Growth and selection are separate: candidates are plain values, so the
//! selection policy can be exercised on hand-built sequences.

pub mod grow;
pub mod select;
mod types;

pub use grow::MaskGrower;
pub use select::{boundary_ring, luminance, round_off_white, MaskSelector};
pub use types::{
    EdgeStatistic, GrowthMap, Mask, MaskError, MaskFit, MaskSelection, SelectionOutcome, MASK_ON,
    NOT_GROWN,
};
