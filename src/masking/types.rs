//! Mask candidate types

use image::{imageops, GrayImage, Luma, Rgb};
use serde::Serialize;
use thiserror::Error;

use crate::boxes::BoxRect;

/// Raster value of a set mask pixel
pub const MASK_ON: u8 = 255;

/// [`GrowthMap`] value of pixels no candidate reaches
pub const NOT_GROWN: u8 = u8::MAX;

/// Masking error types
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Mask raster is {raster:?} but frame is {frame:?}")]
    DimensionMismatch { raster: (u32, u32), frame: (u32, u32) },
}

pub type Result<T> = std::result::Result<T, MaskError>;

/// Binary mask aligned to a box's reference frame.
///
/// The raster covers exactly the frame, so a mask can never extend past it.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    frame: BoxRect,
    pixels: GrayImage,
    step: usize,
    area: u64,
}

impl Mask {
    /// Wrap a frame-sized raster; non-zero pixels are part of the mask
    pub fn new(frame: BoxRect, pixels: GrayImage, step: usize) -> Result<Self> {
        if pixels.dimensions() != (frame.width, frame.height) {
            return Err(MaskError::DimensionMismatch {
                raster: pixels.dimensions(),
                frame: (frame.width, frame.height),
            });
        }
        let area = pixels.pixels().filter(|p| p.0[0] > 0).count() as u64;
        Ok(Self {
            frame,
            pixels,
            step,
            area,
        })
    }

    /// Cut the part of a page-level mask inside `cut` onto the `frame` raster
    pub fn from_page_mask(page_mask: &GrayImage, cut: BoxRect, frame: BoxRect) -> Self {
        let mut pixels = GrayImage::new(frame.width, frame.height);
        let mut area = 0u64;

        if let Some(region) = cut.intersection(&frame) {
            let region = region.clipped(page_mask.dimensions());
            for y in region.y..region.bottom() {
                for x in region.x..region.right() {
                    if page_mask.get_pixel(x, y).0[0] > 0 {
                        pixels.put_pixel(x - frame.x, y - frame.y, Luma([MASK_ON]));
                        area += 1;
                    }
                }
            }
        }

        Self {
            frame,
            pixels,
            step: 0,
            area,
        }
    }

    /// Same raster tagged with another growth step
    pub(crate) fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    /// Reference frame in page coordinates
    pub fn frame(&self) -> BoxRect {
        self.frame
    }

    /// Frame-local raster
    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Growth step index (0 = initial mask)
    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of set pixels
    pub fn area(&self) -> u64 {
        self.area
    }

    pub fn is_empty(&self) -> bool {
        self.area == 0
    }

    /// Whether the mask fills its whole frame
    pub fn is_full(&self) -> bool {
        self.area == self.frame.area()
    }

    /// Frame-local membership test
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        x < self.frame.width && y < self.frame.height && self.pixels.get_pixel(x, y).0[0] > 0
    }

    /// Page-coordinate membership test
    pub fn covers(&self, page_x: u32, page_y: u32) -> bool {
        self.frame.contains_point(page_x, page_y) && self.is_set(page_x - self.frame.x, page_y - self.frame.y)
    }

    /// Whether every pixel of this mask is also set in `other`
    pub fn is_subset_of(&self, other: &Mask) -> bool {
        let f = self.frame;
        (0..f.height).all(|y| {
            (0..f.width).all(|x| !self.is_set(x, y) || other.covers(f.x + x, f.y + y))
        })
    }

    /// Tight page-coordinate bounds of the set pixels
    pub fn bounding_box(&self) -> Option<BoxRect> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in self.pixels.enumerate_pixels() {
            if p.0[0] == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
            });
        }
        bounds.map(|(x1, y1, x2, y2)| {
            BoxRect::from_corners(self.frame.x + x1, self.frame.y + y1, self.frame.x + x2 + 1, self.frame.y + y2 + 1)
        })
    }

    /// Resample onto another frame (nearest neighbour), keeping the step
    pub fn resampled(&self, frame: BoxRect) -> Mask {
        if frame.width == self.frame.width && frame.height == self.frame.height {
            return Mask {
                frame,
                ..self.clone()
            };
        }
        let pixels = imageops::resize(&self.pixels, frame.width, frame.height, imageops::FilterType::Nearest);
        let area = pixels.pixels().filter(|p| p.0[0] > 0).count() as u64;
        Mask {
            frame,
            pixels,
            step: self.step,
            area,
        }
    }
}

/// Color statistics sampled along a mask's outer boundary.
///
/// Computed after off-white rounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeStatistic {
    pub mean: f64,
    pub std_deviation: f64,
    pub median_luma: u8,
    /// Color the mask is painted with
    #[serde(skip)]
    pub fill_color: Rgb<u8>,
    pub sample_count: usize,
}

/// An accepted mask with its boundary statistic
#[derive(Debug, Clone)]
pub struct MaskFit {
    pub mask: Mask,
    pub statistic: EdgeStatistic,
}

/// First growth step reaching each pixel of a reference frame
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthMap {
    frame: BoxRect,
    steps: GrayImage,
}

impl GrowthMap {
    /// Collapse a candidate sequence grown on `frame`
    pub fn from_candidates(frame: BoxRect, candidates: &[Mask]) -> Self {
        let mut steps = GrayImage::from_pixel(frame.width, frame.height, Luma([NOT_GROWN]));
        for candidate in candidates.iter().rev() {
            if candidate.frame() != frame {
                continue;
            }
            let step = candidate.step().min(NOT_GROWN as usize - 1) as u8;
            for (x, y, p) in candidate.pixels().enumerate_pixels() {
                if p.0[0] > 0 {
                    steps.put_pixel(x, y, Luma([step]));
                }
            }
        }
        Self { frame, steps }
    }

    pub fn frame(&self) -> BoxRect {
        self.frame
    }

    /// Growth step covering a page coordinate, if any
    pub fn step_at(&self, page_x: u32, page_y: u32) -> Option<usize> {
        if !self.frame.contains_point(page_x, page_y) {
            return None;
        }
        match self.steps.get_pixel(page_x - self.frame.x, page_y - self.frame.y).0[0] {
            NOT_GROWN => None,
            step => Some(step as usize),
        }
    }

    /// Resample onto another frame (nearest neighbour)
    pub fn resampled(&self, frame: BoxRect) -> GrowthMap {
        if frame.width == self.frame.width && frame.height == self.frame.height {
            return GrowthMap {
                frame,
                steps: self.steps.clone(),
            };
        }
        GrowthMap {
            frame,
            steps: imageops::resize(&self.steps, frame.width, frame.height, imageops::FilterType::Nearest),
        }
    }
}

/// Decision of the selection policy over a candidate sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionOutcome {
    Selected { index: usize, deviation: f64 },
    /// No candidate met the deviation limit; `best` is the lowest seen
    Rejected { best: Option<(usize, f64)> },
}

/// Result of selecting among grown masks
#[derive(Debug, Clone)]
pub enum MaskSelection {
    Fitted(MaskFit),
    NoAcceptableMask {
        best_step: Option<usize>,
        best_deviation: Option<f64>,
    },
}
