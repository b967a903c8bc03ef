//! Writing page outputs to disk
//!
//! Per page `<stem>.<ext>`, `<stem>_mask.<mask ext>` and `<stem>_report.json`
//! are always written. The mask image carries the denoised pixels too unless
//! `separate_noise_mask` moves them into `<stem>_noise.<mask ext>`.
//! `<stem>_text.<mask ext>` holds the removed text when it was extracted.

use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::compose::stack_layers;
use super::types::{CleanerError, PageOutput, Result};
use crate::config::GeneralConfig;

/// Paths written for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPage {
    pub cleaned: PathBuf,
    pub mask: PathBuf,
    pub report: PathBuf,
    pub noise: Option<PathBuf>,
    pub text: Option<PathBuf>,
}

/// Extension of the cleaned image: configured type, else the source's
pub fn cleaned_extension(general: &GeneralConfig, source: &Path) -> String {
    general
        .preferred_file_type
        .as_deref()
        .or_else(|| source.extension().and_then(|e| e.to_str()))
        .unwrap_or("png")
        .trim_start_matches('.')
        .to_lowercase()
}

fn format_for(extension: &str) -> Result<ImageFormat> {
    ImageFormat::from_extension(extension)
        .ok_or_else(|| CleanerError::InvalidImage(format!("unsupported output format: {extension}")))
}

/// Write all outputs of one page into `dir`
pub fn save_page_output(output: &PageOutput, dir: &Path, source: &Path, general: &GeneralConfig) -> Result<SavedPage> {
    std::fs::create_dir_all(dir)?;
    let stem = output.report.page.as_str();

    let cleaned_ext = cleaned_extension(general, source);
    let cleaned = dir.join(format!("{stem}.{cleaned_ext}"));
    output.cleaned.save_with_format(&cleaned, format_for(&cleaned_ext)?)?;

    let mask_ext = general.preferred_mask_file_type.trim_start_matches('.').to_lowercase();
    let mask_format = format_for(&mask_ext)?;
    let mask = dir.join(format!("{stem}_mask.{mask_ext}"));
    let noise = if general.separate_noise_mask {
        output.mask.save_with_format(&mask, mask_format)?;
        let noise = dir.join(format!("{stem}_noise.{mask_ext}"));
        output.noise.save_with_format(&noise, mask_format)?;
        Some(noise)
    } else {
        stack_layers(&output.mask, &output.noise).save_with_format(&mask, mask_format)?;
        None
    };

    let text = match &output.text {
        Some(layer) => {
            let text = dir.join(format!("{stem}_text.{mask_ext}"));
            layer.save_with_format(&text, mask_format)?;
            Some(text)
        }
        None => None,
    };

    let report = dir.join(format!("{stem}_report.json"));
    std::fs::write(&report, output.report.to_json()?)?;

    debug!(page = stem, cleaned = %cleaned.display(), "saved page outputs");
    Ok(SavedPage {
        cleaned,
        mask,
        report,
        noise,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PageLayout, PageReport, PageSummary};
    use image::{RgbImage, Rgba, RgbaImage};

    fn output() -> PageOutput {
        let mut mask = RgbaImage::new(8, 6);
        mask.put_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let mut noise = RgbaImage::new(8, 6);
        noise.put_pixel(4, 4, Rgba([120, 120, 120, 255]));
        PageOutput {
            cleaned: RgbImage::new(8, 6),
            mask,
            noise,
            text: None,
            report: PageReport {
                page: "page_001".to_string(),
                width: 8,
                height: 6,
                scale: 1.0,
                processed_at: chrono::Utc::now(),
                detection_error: None,
                summary: PageSummary::default(),
                boxes: Vec::new(),
            },
            layout: PageLayout::default(),
            fits: Vec::new(),
        }
    }

    #[test]
    fn test_cleaned_extension_follows_source() {
        let general = GeneralConfig::default();
        assert_eq!(cleaned_extension(&general, Path::new("a/b.JPG")), "jpg");
        assert_eq!(cleaned_extension(&general, Path::new("noext")), "png");

        let general = GeneralConfig {
            preferred_file_type: Some(".webp".to_string()),
            ..Default::default()
        };
        assert_eq!(cleaned_extension(&general, Path::new("a.jpg")), "webp");
    }

    #[test]
    fn test_save_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let saved = save_page_output(&output(), dir.path(), Path::new("page_001.png"), &GeneralConfig::default()).unwrap();

        assert!(saved.cleaned.ends_with("page_001.png"));
        assert!(saved.mask.ends_with("page_001_mask.png"));
        assert!(saved.report.exists());

        let mask = image::open(&saved.mask).unwrap();
        assert!(mask.color().has_alpha());
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved.report).unwrap()).unwrap();
        assert_eq!(report["page"], "page_001");
        assert_eq!(saved.noise, None);
        assert_eq!(saved.text, None);
    }

    #[test]
    fn test_noise_merged_into_mask_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let saved = save_page_output(&output(), dir.path(), Path::new("page_001.png"), &GeneralConfig::default()).unwrap();

        let mask = image::open(&saved.mask).unwrap().to_rgba8();
        assert_eq!(mask.get_pixel(2, 2).0, [255, 255, 255, 255]);
        assert_eq!(mask.get_pixel(4, 4).0, [120, 120, 120, 255]);
        assert_eq!(mask.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_separate_noise_and_text_layers() {
        let dir = tempfile::tempdir().unwrap();
        let general = GeneralConfig {
            separate_noise_mask: true,
            ..Default::default()
        };
        let mut page = output();
        let mut text = RgbaImage::new(8, 6);
        text.put_pixel(2, 2, Rgba([0, 0, 0, 255]));
        page.text = Some(text);

        let saved = save_page_output(&page, dir.path(), Path::new("page_001.png"), &general).unwrap();

        let mask = image::open(&saved.mask).unwrap().to_rgba8();
        assert_eq!(mask.get_pixel(4, 4).0[3], 0);

        let noise_path = saved.noise.unwrap();
        assert!(noise_path.ends_with("page_001_noise.png"));
        let noise = image::open(&noise_path).unwrap().to_rgba8();
        assert_eq!(noise.get_pixel(4, 4).0, [120, 120, 120, 255]);
        assert_eq!(noise.get_pixel(2, 2).0[3], 0);

        let text_path = saved.text.unwrap();
        assert!(text_path.ends_with("page_001_text.png"));
        let text = image::open(&text_path).unwrap().to_rgba8();
        assert_eq!(text.get_pixel(2, 2).0, [0, 0, 0, 255]);
    }
}
