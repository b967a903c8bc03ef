//! Mask selection
//!
//! Scores each grown mask by the color spread along its outer boundary ring.
//! A quiet boundary means the mask sits in a flat region and covers the whole
//! text; a noisy one means it still cuts through lettering or artwork.
//!
//! # Policy
//!
//! - **Fast**: first candidate whose deviation is within
//!   `mask_max_standard_deviation`; falls back to the thorough policy when
//!   none qualifies.
//! - **Thorough**: walk all candidates in growth order and move to a larger
//!   mask only when it lowers the best deviation by more than
//!   `mask_improvement_threshold`.
//!
//! Either way, a best deviation above the limit means the box gets no mask.

use image::{Rgb, RgbImage};
use tracing::trace;

use super::grow::dilate_by;
use super::types::{EdgeStatistic, Mask, MaskFit, MaskSelection, SelectionOutcome};
use crate::config::MaskerConfig;

/// Picks the best mask among growth candidates
#[derive(Debug, Clone)]
pub struct MaskSelector {
    off_white_max_threshold: u8,
    improvement_threshold: f64,
    fast: bool,
    max_std_deviation: f64,
}

impl MaskSelector {
    pub fn new(config: &MaskerConfig) -> Self {
        Self {
            off_white_max_threshold: config.off_white_max_threshold,
            improvement_threshold: config.mask_improvement_threshold,
            fast: config.mask_selection_fast,
            max_std_deviation: config.mask_max_standard_deviation,
        }
    }

    /// Boundary statistic of one mask, `None` when it has no boundary to sample
    pub fn edge_statistic(&self, mask: &Mask, source: &RgbImage) -> Option<EdgeStatistic> {
        let frame = mask.frame();
        let ring = boundary_ring(mask);

        let mut lumas = Vec::with_capacity(ring.len());
        let mut colors = Vec::with_capacity(ring.len());
        for (x, y) in ring {
            if let Some(pixel) = source.get_pixel_checked(frame.x + x, frame.y + y) {
                lumas.push(luminance(pixel));
                colors.push(*pixel);
            }
        }

        EdgeStatistic::from_samples(&lumas, &colors, self.off_white_max_threshold)
    }

    /// Apply the selection policy to per-candidate deviations
    pub fn choose(&self, deviations: &[Option<f64>]) -> SelectionOutcome {
        if self.fast {
            let first_perfect = deviations
                .iter()
                .enumerate()
                .find_map(|(i, d)| d.filter(|&d| d <= self.max_std_deviation).map(|d| (i, d)));
            if let Some((index, deviation)) = first_perfect {
                return SelectionOutcome::Selected { index, deviation };
            }
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, deviation) in deviations.iter().enumerate() {
            let Some(deviation) = *deviation else {
                continue;
            };
            let improves = match best {
                None => true,
                Some((_, best_deviation)) => deviation < best_deviation - self.improvement_threshold,
            };
            if improves {
                best = Some((index, deviation));
            }
        }

        match best {
            Some((index, deviation)) if deviation <= self.max_std_deviation => {
                SelectionOutcome::Selected { index, deviation }
            }
            _ => SelectionOutcome::Rejected { best },
        }
    }

    /// Score the candidates and pick one
    pub fn select(&self, candidates: Vec<Mask>, source: &RgbImage) -> MaskSelection {
        let mut statistics: Vec<Option<EdgeStatistic>> = Vec::with_capacity(candidates.len());
        for mask in &candidates {
            let statistic = self.edge_statistic(mask, source);
            let perfect = statistic.is_some_and(|s| s.std_deviation <= self.max_std_deviation);
            trace!(
                step = mask.step(),
                area = mask.area(),
                deviation = statistic.map(|s| s.std_deviation),
                "scored mask candidate"
            );
            statistics.push(statistic);
            if self.fast && perfect {
                break;
            }
        }

        let deviations: Vec<Option<f64>> = statistics
            .iter()
            .map(|s| s.map(|s| s.std_deviation))
            .collect();

        match self.choose(&deviations) {
            SelectionOutcome::Selected { index, .. } => {
                match (candidates.into_iter().nth(index), statistics[index]) {
                    (Some(mask), Some(statistic)) => MaskSelection::Fitted(MaskFit { mask, statistic }),
                    _ => MaskSelection::NoAcceptableMask {
                        best_step: None,
                        best_deviation: None,
                    },
                }
            }
            SelectionOutcome::Rejected { best } => MaskSelection::NoAcceptableMask {
                best_step: best.map(|(i, _)| i),
                best_deviation: best.map(|(_, d)| d),
            },
        }
    }
}

impl EdgeStatistic {
    /// Build from paired luminance and color samples
    pub fn from_samples(lumas: &[u8], colors: &[Rgb<u8>], off_white_max_threshold: u8) -> Option<Self> {
        if lumas.is_empty() {
            return None;
        }

        let mut rounded = lumas.to_vec();
        round_off_white(&mut rounded, off_white_max_threshold);

        let n = rounded.len() as f64;
        let mean = rounded.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = rounded
            .iter()
            .map(|&v| {
                let diff = v as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / n;
        let median_luma = median(&mut rounded);

        let fill_color = if median_luma == u8::MAX || colors.is_empty() {
            Rgb([median_luma; 3])
        } else {
            let channel = |c: usize| {
                let mut values: Vec<u8> = colors.iter().map(|p| p.0[c]).collect();
                median(&mut values)
            };
            Rgb([channel(0), channel(1), channel(2)])
        };

        Some(EdgeStatistic {
            mean,
            std_deviation: variance.sqrt(),
            median_luma,
            fill_color,
            sample_count: lumas.len(),
        })
    }
}

/// Frame-local pixels just outside the mask (8-connected ring)
pub fn boundary_ring(mask: &Mask) -> Vec<(u32, u32)> {
    if mask.is_empty() || mask.is_full() {
        return Vec::new();
    }
    let grown = dilate_by(mask.pixels(), 1);
    grown
        .enumerate_pixels()
        .filter(|(x, y, p)| p.0[0] > 0 && !mask.is_set(*x, *y))
        .map(|(x, y, _)| (x, y))
        .collect()
}

/// Round samples brighter than the threshold up to white
pub fn round_off_white(samples: &mut [u8], threshold: u8) {
    for sample in samples.iter_mut() {
        if *sample > threshold {
            *sample = u8::MAX;
        }
    }
}

/// Rec. 601 luminance
pub fn luminance(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8
}

fn median(values: &mut [u8]) -> u8 {
    values.sort_unstable();
    values[values.len() / 2]
}
