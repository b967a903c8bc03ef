//! Per-page orchestration

use image::{imageops, RgbImage, RgbaImage};
use rayon::prelude::*;
use std::borrow::Cow;
use tracing::{debug, info, warn};

use super::batch::CancelToken;
use super::compose::{composite, difference_layer, mask_layer, suppress_false_positives, text_layer};
use super::types::{
    BoxOutcome, BoxReport, CleanerError, PageLayout, PageOutput, PageReport, PageSummary, Result,
};
use crate::boxes::{merge_overlapping, BoxFilter, BoxPadder, BoxRect, BoxVerdict, PaddedBox, TextBox};
use crate::config::CleanerConfig;
use crate::denoise::Denoiser;
use crate::masking::{GrowthMap, Mask, MaskFit, MaskGrower, MaskSelection, MaskSelector};
use crate::models::{self, ModelError, ModelPool, PageDetections, TextDetector, TextRecognizer};

/// Result of screening one box
enum Screened {
    Accepted(PaddedBox),
    Done(BoxOutcome),
}

/// Cleans single pages: filter, pad, fit masks, compose, denoise
#[derive(Debug)]
pub struct PageCleaner {
    config: CleanerConfig,
    filter: BoxFilter,
    padder: BoxPadder,
    grower: MaskGrower,
    selector: MaskSelector,
    denoiser: Denoiser,
    models: ModelPool,
    cancel: CancelToken,
}

impl PageCleaner {
    /// Validate the configuration and build every stage from it
    pub fn new(config: CleanerConfig) -> Result<Self> {
        config.validate()?;
        let models = ModelPool::new(config.general.model_replicas)?;
        Ok(Self {
            filter: BoxFilter::new(&config)?,
            padder: BoxPadder::new(&config.preprocessor),
            grower: MaskGrower::new(&config.masker),
            selector: MaskSelector::new(&config.masker),
            denoiser: Denoiser::new(&config.denoiser),
            models,
            cancel: CancelToken::new(),
            config,
        })
    }

    /// Share a cancellation token with the caller
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn model_pool(&self) -> &ModelPool {
        &self.models
    }

    /// Clean one page.
    ///
    /// Only an empty image or cancellation fail the page. A failing detector
    /// leaves the page unchanged with the error in the report, and anything
    /// that goes wrong for a single box is recorded in that box's entry.
    pub fn clean(
        &self,
        name: &str,
        source: &RgbImage,
        detector: &dyn TextDetector,
        recognizer: Option<&dyn TextRecognizer>,
    ) -> Result<PageOutput> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(CleanerError::InvalidImage(format!("{name}: image has no pixels")));
        }
        if self.cancel.is_cancelled() {
            return Err(CleanerError::Cancelled);
        }

        let working = self.working_image(source);
        let bounds = working.dimensions();
        let factor = width as f64 / bounds.0 as f64;

        let detections = match self.detect(&working, detector) {
            Ok(detections) => detections,
            Err(e) => {
                warn!(page = name, error = %e, "detection failed, page left unchanged");
                return Ok(self.unchanged_page(name, source, e.to_string()));
            }
        };
        debug!(page = name, boxes = detections.boxes.len(), "detected text boxes");

        // Filtering (with OCR) and padding
        let screened: Vec<Screened> = detections
            .boxes
            .par_iter()
            .enumerate()
            .map(|(index, text_box)| self.screen(index, text_box, &working, recognizer))
            .collect();

        let mut outcomes: Vec<Option<BoxOutcome>> = Vec::with_capacity(screened.len());
        let mut accepted: Vec<(usize, PaddedBox)> = Vec::new();
        for (index, item) in screened.into_iter().enumerate() {
            match item {
                Screened::Accepted(padded) => {
                    accepted.push((index, padded));
                    outcomes.push(None);
                }
                Screened::Done(outcome) => outcomes.push(Some(outcome)),
            }
        }

        // False-positive suppression over merged extended boxes
        let extended: Vec<BoxRect> = accepted.iter().map(|(_, p)| p.extended).collect();
        let merged_extended = merge_overlapping(&extended);
        let suppressed = suppress_false_positives(&detections.mask, &merged_extended);

        // Grow and select per box
        let selections: Vec<(usize, Option<(MaskSelection, GrowthMap)>)> = accepted
            .par_iter()
            .map(|(index, padded)| {
                if self.cancel.is_cancelled() {
                    return (*index, None);
                }
                let initial = Mask::from_page_mask(&suppressed, padded.initial, padded.reference);
                let candidates = self.grower.grow(&initial);
                let growth = GrowthMap::from_candidates(padded.reference, &candidates);
                (*index, Some((self.selector.select(candidates, &working), growth)))
            })
            .collect();

        let mut fits: Vec<(usize, MaskFit)> = Vec::new();
        let mut growth_maps: Vec<GrowthMap> = Vec::new();
        for (index, selection) in selections {
            match selection {
                None => outcomes[index] = Some(BoxOutcome::Cancelled),
                Some((MaskSelection::Fitted(fit), growth)) => {
                    debug!(
                        page = name,
                        index,
                        step = fit.mask.step(),
                        deviation = fit.statistic.std_deviation,
                        "selected mask"
                    );
                    let fit = upscale_fit(fit, factor, (width, height));
                    growth_maps.push(growth.resampled(fit.mask.frame()));
                    fits.push((index, fit));
                }
                Some((
                    MaskSelection::NoAcceptableMask {
                        best_step,
                        best_deviation,
                    },
                    _,
                )) => {
                    warn!(page = name, index, ?best_step, ?best_deviation, "no acceptable mask");
                    outcomes[index] = Some(BoxOutcome::NoAcceptableMask {
                        best_step,
                        best_deviation,
                    });
                }
            }
        }

        // Single-writer composition at full resolution, then denoising
        let accepted_fits: Vec<MaskFit> = fits.iter().map(|(_, fit)| fit.clone()).collect();
        let mask = mask_layer((width, height), &accepted_fits);
        let composed = composite(source, &mask);
        let mut cleaned = composed.clone();

        for (index, fit) in &fits {
            let denoise = self.denoiser.denoise(&mut cleaned, fit);
            outcomes[*index] = Some(BoxOutcome::Masked {
                step: fit.mask.step(),
                deviation: fit.statistic.std_deviation,
                area: fit.mask.area(),
                denoise,
            });
        }

        let boxes: Vec<BoxReport> = detections
            .boxes
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (text_box, outcome))| BoxReport {
                index,
                rect: text_box.rect.scaled(factor).clipped((width, height)),
                language: text_box.language,
                outcome: outcome.unwrap_or(BoxOutcome::Cancelled),
            })
            .collect();
        let noise = difference_layer(&composed, &cleaned);
        let text = self.config.general.extract_text.then(|| text_layer(source, &mask));
        let report = self.report(name, (width, height), None, boxes);
        let summary = report.summary;

        info!(
            page = name,
            boxes = summary.total_boxes,
            masked = summary.masked,
            unmaskable = summary.unmaskable,
            discarded = summary.discarded,
            failed = summary.failed,
            denoised = summary.denoised,
            "cleaned page"
        );

        let layout = PageLayout {
            padded: accepted
                .iter()
                .map(|(_, p)| upscale_padded(p, factor, (width, height)))
                .collect(),
            merged_extended: merged_extended
                .iter()
                .map(|r| r.scaled(factor).clipped((width, height)))
                .collect(),
            growth: growth_maps,
        };

        Ok(PageOutput {
            cleaned,
            mask,
            noise,
            text,
            report,
            layout,
            fits: accepted_fits,
        })
    }

    /// Run the detector and check its mask matches the working image
    fn detect(&self, working: &RgbImage, detector: &dyn TextDetector) -> models::Result<PageDetections> {
        let detections = self.models.run(|| detector.detect(working))?;
        if detections.mask.dimensions() != working.dimensions() {
            return Err(ModelError::InvalidOutput(format!(
                "AI mask is {:?} but the image is {:?}",
                detections.mask.dimensions(),
                working.dimensions()
            )));
        }
        Ok(detections)
    }

    /// Zero-mask output for a page whose detection failed
    fn unchanged_page(&self, name: &str, source: &RgbImage, error: String) -> PageOutput {
        let (width, height) = source.dimensions();
        PageOutput {
            cleaned: source.clone(),
            mask: RgbaImage::new(width, height),
            noise: RgbaImage::new(width, height),
            text: self
                .config
                .general
                .extract_text
                .then(|| RgbaImage::new(width, height)),
            report: self.report(name, (width, height), Some(error), Vec::new()),
            layout: PageLayout::default(),
            fits: Vec::new(),
        }
    }

    fn report(
        &self,
        name: &str,
        (width, height): (u32, u32),
        detection_error: Option<String>,
        boxes: Vec<BoxReport>,
    ) -> PageReport {
        PageReport {
            page: name.to_string(),
            width,
            height,
            scale: self.config.general.input_size_scale,
            processed_at: chrono::Utc::now(),
            detection_error,
            summary: PageSummary::from_reports(&boxes),
            boxes,
        }
    }

    /// Apply the size and OCR rules to one box and pad the survivors
    fn screen(
        &self,
        index: usize,
        text_box: &TextBox,
        working: &RgbImage,
        recognizer: Option<&dyn TextRecognizer>,
    ) -> Screened {
        if self.cancel.is_cancelled() {
            return Screened::Done(BoxOutcome::Cancelled);
        }

        let mut verdict = self.filter.check_bounds(text_box, working.dimensions());
        if verdict.is_keep() {
            verdict = self.filter.check_size(text_box);
        }
        if verdict.is_keep() && self.filter.needs_ocr(text_box) {
            if let Some(recognizer) = recognizer {
                let crop_rect = text_box.rect.clipped(working.dimensions());
                if !crop_rect.is_empty() {
                    let crop = imageops::crop_imm(working, crop_rect.x, crop_rect.y, crop_rect.width, crop_rect.height)
                        .to_image();
                    match self.models.run(|| recognizer.recognize(&crop)) {
                        Ok(ocr) => {
                            debug!(index, text = %ocr.text, confidence = ocr.confidence, "recognized box text");
                            verdict = self.filter.filter(text_box, Some(&ocr.text));
                        }
                        Err(e) => {
                            warn!(index, error = %e, "OCR failed for box");
                            return Screened::Done(BoxOutcome::Failed { error: e.to_string() });
                        }
                    }
                }
            }
        }

        match verdict {
            BoxVerdict::Keep => Screened::Accepted(self.padder.pad(text_box, working.dimensions())),
            BoxVerdict::Discard(reason) => {
                debug!(index, ?reason, "discarded box");
                Screened::Done(BoxOutcome::Discarded(reason))
            }
        }
    }

    /// Downscaled copy for detection and fitting when a scale is configured
    fn working_image<'a>(&self, source: &'a RgbImage) -> Cow<'a, RgbImage> {
        let scale = self.config.general.input_size_scale;
        if scale >= 1.0 {
            return Cow::Borrowed(source);
        }
        let w = ((source.width() as f32 * scale).round() as u32).max(1);
        let h = ((source.height() as f32 * scale).round() as u32).max(1);
        Cow::Owned(imageops::resize(source, w, h, imageops::FilterType::Triangle))
    }
}

/// Bring a fit found on the working image back to full resolution
fn upscale_fit(fit: MaskFit, factor: f64, dims: (u32, u32)) -> MaskFit {
    if factor <= 1.0 {
        return fit;
    }
    let frame = fit.mask.frame().scaled(factor).clipped(dims);
    MaskFit {
        mask: fit.mask.resampled(frame),
        statistic: fit.statistic,
    }
}

fn upscale_padded(padded: &PaddedBox, factor: f64, dims: (u32, u32)) -> PaddedBox {
    if factor <= 1.0 {
        return *padded;
    }
    let scale = |r: BoxRect| r.scaled(factor).clipped(dims);
    PaddedBox {
        source: TextBox::new(scale(padded.source.rect), padded.source.language),
        initial: scale(padded.initial),
        extended: scale(padded.extended),
        reference: scale(padded.reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::{BoxLanguage, DiscardReason};
    use crate::models::{OcrText, PageDetections};
    use image::{GrayImage, Luma, Rgb};

    struct FixedDetector {
        boxes: Vec<TextBox>,
        mask: GrayImage,
    }

    impl TextDetector for FixedDetector {
        fn detect(&self, image: &RgbImage) -> crate::models::Result<PageDetections> {
            let mask = if self.mask.dimensions() == image.dimensions() {
                self.mask.clone()
            } else {
                imageops::resize(&self.mask, image.width(), image.height(), imageops::FilterType::Nearest)
            };
            let factor = image.width() as f64 / self.mask.width() as f64;
            Ok(PageDetections {
                boxes: self
                    .boxes
                    .iter()
                    .map(|b| TextBox::new(b.rect.scaled(factor), b.language))
                    .collect(),
                mask,
            })
        }
    }

    struct FailingDetector;

    impl TextDetector for FailingDetector {
        fn detect(&self, _image: &RgbImage) -> crate::models::Result<PageDetections> {
            Err(ModelError::Failed("inference crashed".to_string()))
        }
    }

    struct FixedText(&'static str);

    impl TextRecognizer for FixedText {
        fn recognize(&self, _crop: &RgbImage) -> crate::models::Result<OcrText> {
            Ok(OcrText {
                text: self.0.to_string(),
                confidence: 0.9,
            })
        }
    }

    /// White page with a black 20x20 glyph block at (40, 40)
    fn page_with_glyph() -> (RgbImage, FixedDetector) {
        let mut image = RgbImage::from_pixel(120, 120, Rgb([255, 255, 255]));
        let mut mask = GrayImage::new(120, 120);
        for y in 40..60 {
            for x in 40..60 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let detector = FixedDetector {
            boxes: vec![TextBox::new(BoxRect::new(40, 40, 20, 20), BoxLanguage::Japanese)],
            mask,
        };
        (image, detector)
    }

    #[test]
    fn test_clean_removes_glyph() {
        let (image, detector) = page_with_glyph();
        let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
        let output = cleaner.clean("page", &image, &detector, None).unwrap();

        assert_eq!(output.report.summary.masked, 1);
        assert_eq!(*output.cleaned.get_pixel(50, 50), Rgb([255, 255, 255]));
        assert_eq!(output.mask.get_pixel(50, 50).0[3], 255);
        assert_eq!(output.mask.get_pixel(5, 5).0[3], 0);
        assert_eq!(output.fits.len(), 1);
        assert_eq!(output.layout.merged_extended.len(), 1);
        assert_eq!(output.layout.growth.len(), 1);
        assert_eq!(output.layout.growth[0].frame(), output.fits[0].mask.frame());
        assert_eq!(output.layout.growth[0].step_at(50, 50), Some(0));
    }

    #[test]
    fn test_no_boxes_leaves_source_identical() {
        let (image, mut detector) = page_with_glyph();
        detector.boxes.clear();
        let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
        let output = cleaner.clean("page", &image, &detector, None).unwrap();

        assert_eq!(output.cleaned, image);
        assert!(output.mask.pixels().all(|p| p.0[3] == 0));
        assert_eq!(output.report.summary.total_boxes, 0);
    }

    #[test]
    fn test_blacklisted_box_discarded() {
        let (image, detector) = page_with_glyph();
        let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
        let output = cleaner
            .clean("page", &image, &detector, Some(&FixedText("12!")))
            .unwrap();

        assert!(matches!(
            output.report.boxes[0].outcome,
            BoxOutcome::Discarded(DiscardReason::Blacklisted { .. })
        ));
        assert_eq!(output.cleaned, image);
    }

    #[test]
    fn test_scaled_run_masks_at_full_resolution() {
        let (image, detector) = page_with_glyph();
        let mut config = CleanerConfig::default();
        config.general.input_size_scale = 0.5;
        config.preprocessor.box_min_size = 10;
        let cleaner = PageCleaner::new(config).unwrap();
        let output = cleaner.clean("page", &image, &detector, None).unwrap();

        assert_eq!(output.cleaned.dimensions(), (120, 120));
        assert_eq!(output.report.summary.masked, 1);
        assert_eq!(*output.cleaned.get_pixel(50, 50), Rgb([255, 255, 255]));
        assert!(output.report.boxes[0].rect.contains(&BoxRect::new(40, 40, 20, 20)));
    }

    #[test]
    fn test_failed_detection_leaves_page_unchanged() {
        let (image, _) = page_with_glyph();
        let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
        let output = cleaner.clean("page", &image, &FailingDetector, None).unwrap();

        assert_eq!(output.cleaned, image);
        assert!(output.mask.pixels().all(|p| p.0[3] == 0));
        assert!(output.noise.pixels().all(|p| p.0[3] == 0));
        assert!(output.report.boxes.is_empty());
        assert!(output
            .report
            .detection_error
            .as_deref()
            .is_some_and(|e| e.contains("inference crashed")));
    }

    #[test]
    fn test_mismatched_ai_mask_treated_as_failed_detection() {
        struct SmallMask;

        impl TextDetector for SmallMask {
            fn detect(&self, _image: &RgbImage) -> crate::models::Result<PageDetections> {
                Ok(PageDetections {
                    boxes: vec![TextBox::new(BoxRect::new(40, 40, 20, 20), BoxLanguage::Japanese)],
                    mask: GrayImage::new(10, 10),
                })
            }
        }

        let (image, _) = page_with_glyph();
        let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
        let output = cleaner.clean("page", &image, &SmallMask, None).unwrap();

        assert_eq!(output.cleaned, image);
        assert!(output.report.detection_error.is_some());
        assert_eq!(output.report.summary.total_boxes, 0);
    }

    #[test]
    fn test_box_off_page_is_discarded() {
        let (image, mut detector) = page_with_glyph();
        detector
            .boxes
            .push(TextBox::new(BoxRect::new(u32::MAX - 5, 0, 100, 100), BoxLanguage::Japanese));
        let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
        let output = cleaner.clean("page", &image, &detector, None).unwrap();

        assert!(matches!(output.report.boxes[0].outcome, BoxOutcome::Masked { .. }));
        assert_eq!(
            output.report.boxes[1].outcome,
            BoxOutcome::Discarded(DiscardReason::OutsideImage)
        );
    }

    #[test]
    fn test_text_layer_only_when_enabled() {
        let (image, detector) = page_with_glyph();
        let output = PageCleaner::new(CleanerConfig::default())
            .unwrap()
            .clean("page", &image, &detector, None)
            .unwrap();
        assert!(output.text.is_none());

        let mut config = CleanerConfig::default();
        config.general.extract_text = true;
        let output = PageCleaner::new(config)
            .unwrap()
            .clean("page", &image, &detector, None)
            .unwrap();
        let text = output.text.unwrap();
        assert_eq!(text.get_pixel(50, 50).0, [0, 0, 0, 255]);
        assert_eq!(text.get_pixel(5, 5).0[3], 0);
    }

    #[test]
    fn test_cancelled_page() {
        let (image, detector) = page_with_glyph();
        let token = CancelToken::new();
        token.cancel();
        let cleaner = PageCleaner::new(CleanerConfig::default())
            .unwrap()
            .with_cancel_token(token);
        assert!(matches!(
            cleaner.clean("page", &image, &detector, None),
            Err(CleanerError::Cancelled)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CleanerConfig::default();
        config.denoiser.template_window_size = 4;
        assert!(matches!(PageCleaner::new(config), Err(CleanerError::Config(_))));
    }

    #[test]
    fn test_empty_image_rejected() {
        let (_, detector) = page_with_glyph();
        let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
        assert!(matches!(
            cleaner.clean("empty", &RgbImage::new(0, 0), &detector, None),
            Err(CleanerError::InvalidImage(_))
        ));
    }
}
