//! Page cleaning pipeline
//!
//! # Stages
//!
//! 1. Detection on the (optionally downscaled) page. A failing detector
//!    leaves the page unchanged and is noted in the report.
//! 2. Box filtering by size and OCR text, then padding
//! 3. AI mask suppression outside the merged extended boxes
//! 4. Per-box growth and selection, in parallel
//! 5. Composition of accepted masks at full resolution (single writer)
//! 6. Band denoising around each accepted mask
//! 7. Saving: cleaned image, transparent mask image and JSON report, plus
//!    the optional text and noise layers
//!
//! [`BatchCleaner`] runs pages in parallel and records per-page failures
//! instead of aborting.

mod batch;
mod compose;
mod page;
mod save;
mod types;

pub use batch::{BatchCleaner, BatchSummary, CancelToken, PageJob, PageResult, PageSource};
pub use compose::{composite, difference_layer, mask_layer, stack_layers, suppress_false_positives, text_layer};
pub use page::PageCleaner;
pub use save::{cleaned_extension, save_page_output, SavedPage};
pub use types::{
    BoxOutcome, BoxReport, CleanerError, PageLayout, PageOutput, PageReport, PageSummary, Result,
};
