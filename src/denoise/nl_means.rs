//! Non-local means filtering
//!
//! Each target pixel becomes a weighted mean of the pixels in its search
//! window, weighted by how similar their surrounding template patches are:
//!
//! `w(p, q) = exp(-d²(p, q) / h²)`, with `d²` the mean squared difference
//! between the two patches. Borders replicate the nearest pixel.

/// One channel of a crop, row-major
#[derive(Debug, Clone)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    fn at(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }
}

/// Filter parameters; window sizes are odd
#[derive(Debug, Clone, Copy)]
pub struct NlMeansParams {
    pub strength: f32,
    pub template_window: u32,
    pub search_window: u32,
}

/// Filtered value of the pixel at (x, y)
pub fn filter_pixel(plane: &Plane, x: usize, y: usize, params: &NlMeansParams) -> f32 {
    let t = (params.template_window / 2) as isize;
    let s = (params.search_window / 2) as isize;
    let patch_len = ((2 * t + 1) * (2 * t + 1)) as f32;
    let h2 = (params.strength * params.strength).max(f32::EPSILON);
    let (px, py) = (x as isize, y as isize);

    let mut weighted = 0.0f32;
    let mut total = 0.0f32;

    for qy in (py - s)..=(py + s) {
        if qy < 0 || qy >= plane.height as isize {
            continue;
        }
        for qx in (px - s)..=(px + s) {
            if qx < 0 || qx >= plane.width as isize {
                continue;
            }
            let mut distance = 0.0f32;
            for dy in -t..=t {
                for dx in -t..=t {
                    let diff = plane.at(px + dx, py + dy) - plane.at(qx + dx, qy + dy);
                    distance += diff * diff;
                }
            }
            let weight = (-(distance / patch_len) / h2).exp();
            weighted += weight * plane.at(qx, qy);
            total += weight;
        }
    }

    if total > 0.0 {
        weighted / total
    } else {
        plane.at(px, py)
    }
}

/// Filter the pixels selected by `targets`, leaving the others unchanged
pub fn filter_plane<F>(plane: &Plane, params: &NlMeansParams, targets: F) -> Plane
where
    F: Fn(usize, usize) -> bool,
{
    let mut out = plane.data.clone();
    for y in 0..plane.height {
        for x in 0..plane.width {
            if targets(x, y) {
                out[y * plane.width + x] = filter_pixel(plane, x, y, params);
            }
        }
    }
    Plane::new(plane.width, plane.height, out)
}
