//! Box geometry types

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoxRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates (x2/y2 exclusive)
    pub fn from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
        }
    }

    /// Exclusive right edge, saturating at `u32::MAX`
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `u32::MAX`
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Pixel area
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Whether `other` lies entirely inside this rectangle
    pub fn contains(&self, other: &BoxRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlap test treating touching edges as overlapping
    pub fn touches(&self, other: &BoxRect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &BoxRect) -> BoxRect {
        BoxRect::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Overlapping part of both rectangles
    pub fn intersection(&self, other: &BoxRect) -> Option<BoxRect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 > x1 && y2 > y1 {
            Some(BoxRect::from_corners(x1, y1, x2, y2))
        } else {
            None
        }
    }

    /// Expand each side, clipped to an image of the given size
    pub fn expanded(&self, left: u32, top: u32, right: u32, bottom: u32, bounds: (u32, u32)) -> BoxRect {
        let (img_w, img_h) = bounds;
        BoxRect::from_corners(
            self.x.saturating_sub(left),
            self.y.saturating_sub(top),
            self.right().saturating_add(right).min(img_w),
            self.bottom().saturating_add(bottom).min(img_h),
        )
    }

    /// Clip to an image of the given size
    pub fn clipped(&self, bounds: (u32, u32)) -> BoxRect {
        self.expanded(0, 0, 0, 0, bounds)
    }

    /// Scale coordinates by a factor, rounding outward
    pub fn scaled(&self, factor: f64) -> BoxRect {
        let x1 = (self.x as f64 * factor).floor() as u32;
        let y1 = (self.y as f64 * factor).floor() as u32;
        let x2 = (self.right() as f64 * factor).ceil() as u32;
        let y2 = (self.bottom() as f64 * factor).ceil() as u32;
        BoxRect::from_corners(x1, y1, x2, y2)
    }
}

/// Language tag assigned by the detection model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxLanguage {
    Japanese,
    English,
    /// Logos and other detections the model could not classify
    #[default]
    Unknown,
    /// Any other tag, e.g. a generic `"text"` class. Treated as classified text.
    #[serde(other)]
    Other,
}

/// A detected text region. Never mutated after detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    #[serde(flatten)]
    pub rect: BoxRect,
    #[serde(default)]
    pub language: BoxLanguage,
}

impl TextBox {
    pub fn new(rect: BoxRect, language: BoxLanguage) -> Self {
        Self { rect, language }
    }

    /// Pixel area of the detection
    pub fn size(&self) -> u64 {
        self.rect.area()
    }
}

/// The three padded rectangles derived from one box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddedBox {
    pub source: TextBox,
    /// Tight frame used to cut the initial mask
    pub initial: BoxRect,
    /// Wider frame used to suppress false positives
    pub extended: BoxRect,
    /// Sampling frame; masks never grow past it
    pub reference: BoxRect,
}
