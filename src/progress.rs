//! Progress reporting for batch cleaning.
//!
//! The library reports through [`ProgressCallback`]; the CLI plugs in a
//! [`ProgressTracker`] that drives an `indicatif` bar.

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::Instant;

/// Stages of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleaningStage {
    /// Reading detection files
    #[default]
    Loading,
    /// Detection, masking and denoising of the pages
    Cleaning,
    /// Writing images and reports
    Saving,
    Completed,
}

impl CleaningStage {
    pub fn name(&self) -> &'static str {
        match self {
            CleaningStage::Loading => "Loading",
            CleaningStage::Cleaning => "Cleaning",
            CleaningStage::Saving => "Saving",
            CleaningStage::Completed => "Completed",
        }
    }

    /// Japanese label shown next to the stage name
    pub fn description_ja(&self) -> &'static str {
        match self {
            CleaningStage::Loading => "読込中",
            CleaningStage::Cleaning => "クリーニング中",
            CleaningStage::Saving => "保存中",
            CleaningStage::Completed => "完了",
        }
    }
}

impl fmt::Display for CleaningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.description_ja())
    }
}

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// No output
    Quiet,
    /// Progress bar and summary
    #[default]
    Normal,
    /// Per-page lines
    Verbose,
    /// Everything
    VeryVerbose,
}

impl OutputMode {
    pub fn from_verbosity(level: u8) -> Self {
        match level {
            0 => OutputMode::Normal,
            1 => OutputMode::Verbose,
            _ => OutputMode::VeryVerbose,
        }
    }

    /// Check if output should be shown at this mode
    pub fn should_show(&self, required: OutputMode) -> bool {
        use OutputMode::*;
        match (self, required) {
            (Quiet, _) => false,
            (Normal, Quiet | Normal) => true,
            (Verbose, Quiet | Normal | Verbose) => true,
            (VeryVerbose, _) => true,
            _ => false,
        }
    }
}

/// Page-level progress events; called from worker threads
pub trait ProgressCallback: Sync {
    fn on_page_start(&self, _page: &str) {}
    fn on_page_complete(&self, _page: &str, _ok: bool) {}
}

/// Ignores all events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

/// Terminal progress over a batch of pages
#[derive(Debug)]
pub struct ProgressTracker {
    bar: ProgressBar,
    output_mode: OutputMode,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_pages: usize, output_mode: OutputMode) -> Self {
        let bar = if output_mode.should_show(OutputMode::Normal) {
            let bar = ProgressBar::new(total_pages as u64);
            if let Ok(style) =
                ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            output_mode,
            start_time: Instant::now(),
        }
    }

    pub fn set_stage(&self, stage: CleaningStage) {
        self.bar.set_message(stage.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn finish(&self) {
        self.bar.finish_with_message(CleaningStage::Completed.to_string());
    }

    /// Print the batch totals
    pub fn print_summary(&self, pages_ok: usize, pages_failed: usize, boxes_masked: usize, boxes_total: usize) {
        if !self.output_mode.should_show(OutputMode::Normal) {
            return;
        }
        println!();
        println!("{}", "=".repeat(60));
        println!("Cleaning Summary");
        println!("{}", "=".repeat(60));
        println!("  Pages cleaned:  {}", pages_ok);
        println!("  Pages failed:   {}", pages_failed);
        println!("  Boxes masked:   {}/{}", boxes_masked, boxes_total);
        println!("  Elapsed:        {:.2}s", self.elapsed_secs());
        println!("{}", "=".repeat(60));
    }
}

impl ProgressCallback for ProgressTracker {
    fn on_page_start(&self, page: &str) {
        if self.output_mode.should_show(OutputMode::VeryVerbose) {
            self.bar.println(format!("  start  {page}"));
        }
    }

    fn on_page_complete(&self, page: &str, ok: bool) {
        if self.output_mode.should_show(OutputMode::Verbose) {
            let status = if ok { "done" } else { "FAILED" };
            self.bar.println(format!("  {status:<6} {page}"));
        }
        self.bar.inc(1);
    }
}
