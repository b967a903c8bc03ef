//! Batch driver
//!
//! Pages run in parallel on the global rayon pool. Model calls still go
//! through the cleaner's [`ModelPool`](crate::models::ModelPool), so the number
//! of concurrent inferences stays bounded by `model_replicas`.

use image::RgbImage;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::page::PageCleaner;
use super::types::{CleanerError, PageOutput, PageSummary, Result};
use crate::models::{TextDetector, TextRecognizer};
use crate::progress::{NoProgress, ProgressCallback};

/// Shared flag that stops further pages and boxes from being started
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a page's pixels come from
#[derive(Debug, Clone)]
pub enum PageSource {
    Image(RgbImage),
    /// Decoded by the worker that cleans the page
    Path(PathBuf),
}

impl PageSource {
    fn load(self) -> Result<RgbImage> {
        match self {
            PageSource::Image(image) => Ok(image),
            PageSource::Path(path) => {
                if !path.exists() {
                    return Err(CleanerError::ImageNotFound(path));
                }
                let image = image::open(&path)
                    .map_err(|e| CleanerError::InvalidImage(format!("{}: {e}", path.display())))?;
                Ok(image.to_rgb8())
            }
        }
    }
}

/// One page of a batch
pub struct PageJob {
    pub name: String,
    pub source: PageSource,
    pub detector: Arc<dyn TextDetector>,
}

impl PageJob {
    pub fn new(name: impl Into<String>, source: PageSource, detector: Arc<dyn TextDetector>) -> Self {
        Self {
            name: name.into(),
            source,
            detector,
        }
    }
}

/// Outcome of one page
#[derive(Debug)]
pub struct PageResult {
    pub name: String,
    pub result: Result<PageOutput>,
}

/// Totals over a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub pages_ok: usize,
    /// Pages written unchanged because detection failed (also in `pages_ok`)
    pub pages_undetected: usize,
    pub pages_failed: usize,
    pub pages_cancelled: usize,
    pub boxes: PageSummary,
}

impl BatchSummary {
    pub fn from_results(results: &[PageResult]) -> Self {
        let mut summary = BatchSummary::default();
        for page in results {
            match &page.result {
                Ok(output) => {
                    summary.pages_ok += 1;
                    if output.report.detection_error.is_some() {
                        summary.pages_undetected += 1;
                    }
                    summary.boxes.add(&output.report.summary);
                }
                Err(CleanerError::Cancelled) => summary.pages_cancelled += 1,
                Err(_) => summary.pages_failed += 1,
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.pages_failed == 0 && self.pages_cancelled == 0
    }
}

/// Cleans many pages; a failing page never aborts the others
pub struct BatchCleaner {
    cleaner: PageCleaner,
    recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl BatchCleaner {
    pub fn new(cleaner: PageCleaner) -> Self {
        Self {
            cleaner,
            recognizer: None,
        }
    }

    /// Enable OCR filtering with the given recognizer
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn cleaner(&self) -> &PageCleaner {
        &self.cleaner
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cleaner.cancel_token().clone()
    }

    pub fn run(&self, jobs: Vec<PageJob>) -> Vec<PageResult> {
        self.run_with_progress(jobs, &NoProgress)
    }

    /// Clean all pages, results in job order
    pub fn run_with_progress(&self, jobs: Vec<PageJob>, progress: &dyn ProgressCallback) -> Vec<PageResult> {
        let total = jobs.len();
        let results: Vec<PageResult> = jobs
            .into_par_iter()
            .map(|job| self.run_job(job, progress))
            .collect();

        let summary = BatchSummary::from_results(&results);
        info!(
            pages = total,
            ok = summary.pages_ok,
            undetected = summary.pages_undetected,
            failed = summary.pages_failed,
            cancelled = summary.pages_cancelled,
            masked = summary.boxes.masked,
            "batch finished"
        );
        results
    }

    fn run_job(&self, job: PageJob, progress: &dyn ProgressCallback) -> PageResult {
        let PageJob {
            name,
            source,
            detector,
        } = job;

        if self.cleaner.cancel_token().is_cancelled() {
            return PageResult {
                name,
                result: Err(CleanerError::Cancelled),
            };
        }

        progress.on_page_start(&name);
        let result = source
            .load()
            .and_then(|image| self.cleaner.clean(&name, &image, detector.as_ref(), self.recognizer.as_deref()));

        if let Err(e) = &result {
            warn!(page = %name, error = %e, "page failed");
        }
        progress.on_page_complete(&name, result.is_ok());

        PageResult { name, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanerConfig;
    use crate::boxes::{BoxLanguage, BoxRect, DiscardReason, TextBox};
    use crate::models::{ModelError, OcrText, PageDetections};
    use crate::pipeline::BoxOutcome;
    use image::{GrayImage, Luma, Rgb};

    struct EmptyDetector;

    impl TextDetector for EmptyDetector {
        fn detect(&self, image: &RgbImage) -> crate::models::Result<PageDetections> {
            Ok(PageDetections {
                boxes: Vec::new(),
                mask: GrayImage::new(image.width(), image.height()),
            })
        }
    }

    struct BrokenDetector;

    impl TextDetector for BrokenDetector {
        fn detect(&self, _image: &RgbImage) -> crate::models::Result<PageDetections> {
            Err(ModelError::Failed("inference crashed".to_string()))
        }
    }

    /// One small box over a black block on a white page
    struct SmallBoxDetector;

    impl TextDetector for SmallBoxDetector {
        fn detect(&self, image: &RgbImage) -> crate::models::Result<PageDetections> {
            let rect = BoxRect::new(10, 10, 20, 20);
            let mut mask = GrayImage::new(image.width(), image.height());
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
            Ok(PageDetections {
                boxes: vec![TextBox::new(rect, BoxLanguage::Japanese)],
                mask,
            })
        }
    }

    struct DigitsOnly;

    impl TextRecognizer for DigitsOnly {
        fn recognize(&self, _crop: &RgbImage) -> crate::models::Result<OcrText> {
            Ok(OcrText {
                text: "42".to_string(),
                confidence: 0.99,
            })
        }
    }

    fn batch() -> BatchCleaner {
        BatchCleaner::new(PageCleaner::new(CleanerConfig::default()).unwrap())
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_failing_page_does_not_abort_batch() {
        let jobs = vec![
            PageJob::new("a", PageSource::Image(RgbImage::new(8, 8)), Arc::new(EmptyDetector)),
            PageJob::new("b", PageSource::Image(RgbImage::new(8, 8)), Arc::new(BrokenDetector)),
            PageJob::new("c", PageSource::Path(PathBuf::from("/nonexistent/c.png")), Arc::new(EmptyDetector)),
        ];
        let results = batch().run(jobs);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].name, "a");
        assert!(results[0].result.is_ok());
        assert!(matches!(results[2].result, Err(CleanerError::ImageNotFound(_))));

        // Detection failure still yields the untouched page
        let undetected = results[1].result.as_ref().unwrap();
        assert_eq!(undetected.cleaned, RgbImage::new(8, 8));
        assert!(undetected.mask.pixels().all(|p| p.0[3] == 0));
        assert!(undetected.report.detection_error.is_some());

        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.pages_ok, 2);
        assert_eq!(summary.pages_undetected, 1);
        assert_eq!(summary.pages_failed, 1);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_batch_recognizer_filters_boxes() {
        let page = || {
            let mut image = RgbImage::from_pixel(60, 60, Rgb([255, 255, 255]));
            for y in 10..30 {
                for x in 10..30 {
                    image.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
            PageSource::Image(image)
        };
        let job = || PageJob::new("p", page(), Arc::new(SmallBoxDetector));

        let without_ocr = batch().run(vec![job()]);
        let output = without_ocr[0].result.as_ref().unwrap();
        assert!(matches!(output.report.boxes[0].outcome, BoxOutcome::Masked { .. }));

        let with_ocr = batch().with_recognizer(Arc::new(DigitsOnly)).run(vec![job()]);
        let output = with_ocr[0].result.as_ref().unwrap();
        assert!(matches!(
            output.report.boxes[0].outcome,
            BoxOutcome::Discarded(DiscardReason::Blacklisted { .. })
        ));
        assert_eq!(output.report.summary.masked, 0);
    }

    #[test]
    fn test_cancelled_batch_skips_pages() {
        let batch = batch();
        batch.cancel_token().cancel();
        let results = batch.run(vec![PageJob::new(
            "a",
            PageSource::Image(RgbImage::new(4, 4)),
            Arc::new(EmptyDetector),
        )]);
        assert!(matches!(results[0].result, Err(CleanerError::Cancelled)));
        assert_eq!(BatchSummary::from_results(&results).pages_cancelled, 1);
    }
}
