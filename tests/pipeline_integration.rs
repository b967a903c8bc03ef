//! End-to-end page cleaning with mock models

use image::{GrayImage, Luma, Rgb, RgbImage};
use panel_cleaner::boxes::DiscardReason;
use panel_cleaner::{
    BatchCleaner, BoxLanguage, BoxOutcome, BoxRect, CancelToken, CleanerConfig, DenoiseOutcome,
    ModelError, OcrText, PageCleaner, PageDetections, PageJob, PageSource, TextBox, TextDetector,
    TextRecognizer,
};
use panel_cleaner::pipeline::composite;
use std::sync::Arc;

// ============ Mocks ============

struct MockDetector {
    boxes: Vec<TextBox>,
    mask: GrayImage,
}

impl TextDetector for MockDetector {
    fn detect(&self, _image: &RgbImage) -> panel_cleaner::models::Result<PageDetections> {
        Ok(PageDetections {
            boxes: self.boxes.clone(),
            mask: self.mask.clone(),
        })
    }
}

/// Fails for crops of one width, returns `text` otherwise
struct MockRecognizer {
    failing_width: u32,
    text: &'static str,
}

impl TextRecognizer for MockRecognizer {
    fn recognize(&self, crop: &RgbImage) -> panel_cleaner::models::Result<OcrText> {
        if crop.width() == self.failing_width {
            return Err(ModelError::Failed("recognizer timed out".to_string()));
        }
        Ok(OcrText {
            text: self.text.to_string(),
            confidence: 0.8,
        })
    }
}

struct BrokenDetector;

impl TextDetector for BrokenDetector {
    fn detect(&self, _image: &RgbImage) -> panel_cleaner::models::Result<PageDetections> {
        Err(ModelError::Unavailable("model file missing".to_string()))
    }
}

/// Stops the batch as soon as detection runs
struct CancellingDetector {
    inner: MockDetector,
    token: CancelToken,
}

impl TextDetector for CancellingDetector {
    fn detect(&self, image: &RgbImage) -> panel_cleaner::models::Result<PageDetections> {
        self.token.cancel();
        self.inner.detect(image)
    }
}

// ============ Fixtures ============

fn fill(image: &mut RgbImage, mask: &mut GrayImage, rect: BoxRect) {
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            image.put_pixel(x, y, Rgb([0, 0, 0]));
            mask.put_pixel(x, y, Luma([255]));
        }
    }
}

/// Five boxes, one per outcome, plus a stray AI mask blob
fn mixed_page() -> (RgbImage, MockDetector) {
    let mut image = RgbImage::from_fn(200, 120, |x, y| {
        if x < 70 && y >= 55 && (x + y) % 2 == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    });
    let mut mask = GrayImage::new(200, 120);

    let clean = BoxRect::new(20, 20, 20, 20);
    let tiny = BoxRect::new(80, 20, 10, 10);
    let textured = BoxRect::new(20, 70, 20, 20);
    let ocr_fails = BoxRect::new(120, 20, 24, 20);
    let suspicious = BoxRect::new(160, 70, 30, 30);
    for rect in [clean, tiny, textured, ocr_fails, suspicious] {
        fill(&mut image, &mut mask, rect);
    }
    // AI false positive outside every box
    fill(&mut image, &mut mask, BoxRect::new(100, 100, 5, 5));

    let detector = MockDetector {
        boxes: vec![
            TextBox::new(clean, BoxLanguage::Japanese),
            TextBox::new(tiny, BoxLanguage::Japanese),
            TextBox::new(textured, BoxLanguage::Japanese),
            TextBox::new(ocr_fails, BoxLanguage::English),
            TextBox::new(suspicious, BoxLanguage::Unknown),
        ],
        mask,
    };
    (image, detector)
}

fn recognizer() -> MockRecognizer {
    MockRecognizer {
        failing_width: 24,
        text: "こんにちは",
    }
}

// ============ Tests ============

#[test]
fn test_mixed_page_outcomes() {
    let (image, detector) = mixed_page();
    let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
    let output = cleaner
        .clean("mixed", &image, &detector, Some(&recognizer()))
        .unwrap();

    let outcomes: Vec<&BoxOutcome> = output.report.boxes.iter().map(|b| &b.outcome).collect();
    assert!(matches!(outcomes[0], BoxOutcome::Masked { step: 0, .. }));
    assert!(matches!(
        outcomes[1],
        BoxOutcome::Discarded(DiscardReason::TooSmall { size: 100, min_size: 400 })
    ));
    assert!(matches!(outcomes[2], BoxOutcome::NoAcceptableMask { .. }));
    assert!(matches!(outcomes[3], BoxOutcome::Failed { .. }));
    assert!(matches!(
        outcomes[4],
        BoxOutcome::Discarded(DiscardReason::Suspicious { size: 900, .. })
    ));

    let summary = output.report.summary;
    assert_eq!(summary.total_boxes, 5);
    assert_eq!(summary.masked, 1);
    assert_eq!(summary.discarded, 2);
    assert_eq!(summary.unmaskable, 1);
    assert_eq!(summary.failed, 1);

    // Only the accepted box is painted
    assert_eq!(*output.cleaned.get_pixel(30, 30), Rgb([255, 255, 255]));
    assert_eq!(*output.cleaned.get_pixel(130, 30), Rgb([0, 0, 0]));
    assert_eq!(*output.cleaned.get_pixel(85, 25), Rgb([0, 0, 0]));
    assert_eq!(output.mask.get_pixel(30, 30).0[3], 255);
    assert_eq!(output.mask.get_pixel(130, 30).0[3], 0);

    // The stray blob lies outside every extended box
    assert_eq!(*output.cleaned.get_pixel(102, 102), Rgb([0, 0, 0]));
    assert_eq!(output.mask.get_pixel(102, 102).0[3], 0);
}

#[test]
fn test_box_far_off_page_only_affects_itself() {
    let (image, mut detector) = mixed_page();
    detector.boxes.push(TextBox::new(
        BoxRect::new(4_294_967_290, 0, 100, 100),
        BoxLanguage::Japanese,
    ));
    detector.boxes.push(TextBox::new(
        BoxRect::new(0, u32::MAX, 50, 50),
        BoxLanguage::English,
    ));
    let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
    let output = cleaner
        .clean("mixed", &image, &detector, Some(&recognizer()))
        .unwrap();

    assert_eq!(output.report.summary.total_boxes, 7);
    assert!(matches!(output.report.boxes[0].outcome, BoxOutcome::Masked { .. }));
    for report in &output.report.boxes[5..] {
        assert_eq!(report.outcome, BoxOutcome::Discarded(DiscardReason::OutsideImage));
        assert!(report.rect.is_empty());
    }
    assert_eq!(*output.cleaned.get_pixel(30, 30), Rgb([255, 255, 255]));
}

#[test]
fn test_detection_failure_still_produces_page() {
    let (image, _) = mixed_page();
    let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
    let output = cleaner.clean("broken", &image, &BrokenDetector, None).unwrap();

    assert_eq!(output.cleaned, image);
    assert!(output.mask.pixels().all(|p| p.0[3] == 0));
    assert_eq!(output.report.summary.total_boxes, 0);

    let json: serde_json::Value = serde_json::from_str(&output.report.to_json().unwrap()).unwrap();
    assert!(json["detection_error"]
        .as_str()
        .is_some_and(|e| e.contains("model file missing")));
}

#[test]
fn test_quiet_boundary_not_denoised() {
    let (image, detector) = mixed_page();
    let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
    let output = cleaner.clean("mixed", &image, &detector, None).unwrap();

    match &output.report.boxes[0].outcome {
        BoxOutcome::Masked { denoise, deviation, .. } => {
            assert_eq!(*deviation, 0.0);
            assert!(matches!(denoise, DenoiseOutcome::BelowThreshold { .. }));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_blacklisted_ocr_text_discards_box() {
    let (image, detector) = mixed_page();
    let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
    let digits = MockRecognizer {
        failing_width: 0,
        text: "0",
    };
    let output = cleaner.clean("mixed", &image, &detector, Some(&digits)).unwrap();

    assert!(matches!(
        output.report.boxes[0].outcome,
        BoxOutcome::Discarded(DiscardReason::Blacklisted { .. })
    ));
    assert_eq!(output.report.summary.masked, 0);
    assert_eq!(output.cleaned, image);
}

#[test]
fn test_all_boxes_discarded_leaves_page_identical() {
    let (image, detector) = mixed_page();
    let mut config = CleanerConfig::default();
    config.preprocessor.box_min_size = 100_000;
    config.preprocessor.suspicious_box_min_size = 100_000;
    let cleaner = PageCleaner::new(config).unwrap();
    let output = cleaner.clean("mixed", &image, &detector, None).unwrap();

    assert_eq!(output.report.summary.discarded, 5);
    assert_eq!(output.cleaned, image);
    assert!(output.mask.pixels().all(|p| p.0[3] == 0));
}

#[test]
fn test_noisy_boundary_is_denoised() {
    let mut image = RgbImage::from_fn(80, 80, |x, y| {
        let v = if (x * 7 + y * 13) % 5 == 0 { 206 } else { 200 };
        Rgb([v, v, v])
    });
    let mut mask = GrayImage::new(80, 80);
    let glyph = BoxRect::new(30, 30, 20, 20);
    fill(&mut image, &mut mask, glyph);
    let detector = MockDetector {
        boxes: vec![TextBox::new(glyph, BoxLanguage::Japanese)],
        mask,
    };

    let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
    let output = cleaner.clean("noisy", &image, &detector, None).unwrap();

    match &output.report.boxes[0].outcome {
        BoxOutcome::Masked { denoise, .. } => {
            assert!(matches!(denoise, DenoiseOutcome::Applied { band_pixels } if *band_pixels > 0));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(output.report.summary.denoised, 1);
    // Far corner is outside every band
    assert_eq!(output.cleaned.get_pixel(0, 0), image.get_pixel(0, 0));
    assert_eq!(*output.cleaned.get_pixel(40, 40), Rgb([200, 200, 200]));
}

#[test]
fn test_noise_layer_reproduces_denoised_page() {
    let mut image = RgbImage::from_fn(80, 80, |x, y| {
        let v = if (x * 7 + y * 13) % 5 == 0 { 206 } else { 200 };
        Rgb([v, v, v])
    });
    let mut mask = GrayImage::new(80, 80);
    let glyph = BoxRect::new(30, 30, 20, 20);
    fill(&mut image, &mut mask, glyph);
    let detector = MockDetector {
        boxes: vec![TextBox::new(glyph, BoxLanguage::Japanese)],
        mask,
    };

    let output = PageCleaner::new(CleanerConfig::default())
        .unwrap()
        .clean("noisy", &image, &detector, None)
        .unwrap();

    assert!(output.noise.pixels().any(|p| p.0[3] > 0));
    let rebuilt = composite(&composite(&image, &output.mask), &output.noise);
    assert_eq!(rebuilt, output.cleaned);
}

#[test]
fn test_denoising_disabled_touches_only_mask() {
    let mut image = RgbImage::from_fn(80, 80, |x, y| {
        let v = if (x * 7 + y * 13) % 5 == 0 { 206 } else { 200 };
        Rgb([v, v, v])
    });
    let mut mask = GrayImage::new(80, 80);
    let glyph = BoxRect::new(30, 30, 20, 20);
    fill(&mut image, &mut mask, glyph);
    let detector = MockDetector {
        boxes: vec![TextBox::new(glyph, BoxLanguage::Japanese)],
        mask,
    };

    let mut config = CleanerConfig::default();
    config.denoiser.denoising_enabled = false;
    let output = PageCleaner::new(config)
        .unwrap()
        .clean("noisy", &image, &detector, None)
        .unwrap();

    for (x, y, pixel) in output.cleaned.enumerate_pixels() {
        if output.mask.get_pixel(x, y).0[3] == 0 {
            assert_eq!(pixel, image.get_pixel(x, y));
        }
    }
}

#[test]
fn test_batch_cancellation_marks_boxes() {
    let (image, detector) = mixed_page();
    let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
    let token = cleaner.cancel_token().clone();
    let batch = BatchCleaner::new(cleaner);

    let results = batch.run(vec![PageJob::new(
        "mixed",
        PageSource::Image(image),
        Arc::new(CancellingDetector {
            inner: detector,
            token,
        }),
    )]);

    let output = results[0].result.as_ref().unwrap();
    assert_eq!(output.report.summary.cancelled, 5);
    assert!(output
        .report
        .boxes
        .iter()
        .all(|b| b.outcome == BoxOutcome::Cancelled));
}

#[test]
fn test_report_serializes() {
    let (image, detector) = mixed_page();
    let cleaner = PageCleaner::new(CleanerConfig::default()).unwrap();
    let output = cleaner
        .clean("mixed", &image, &detector, Some(&recognizer()))
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&output.report.to_json().unwrap()).unwrap();
    assert_eq!(json["page"], "mixed");
    assert_eq!(json["summary"]["masked"], 1);
    assert_eq!(json["boxes"][0]["outcome"], "masked");
    assert_eq!(json["boxes"][0]["denoise"]["status"], "below_threshold");
    assert_eq!(json["boxes"][1]["reason"], "too_small");
    assert_eq!(json["boxes"][3]["outcome"], "failed");
}
