//! Local binary pattern histogram templates.
//!
//! A face crop is normalized to 200×200, coded with uniform 8-neighbour LBP
//! and summarized as an 8×8 grid of per-cell histograms.

use crate::frame::GrayFrame;
use ndarray::Array2;
use std::sync::OnceLock;
use thiserror::Error;

// --- Named constants ---
pub const TEMPLATE_SIZE: u32 = 200;
const GRID: usize = 8;
const CELLS: usize = GRID * GRID;
/// 58 uniform patterns plus one bin for everything else.
const LBP_BINS: usize = 59;
const NON_UNIFORM_BIN: u8 = 58;
/// Clockwise from top-left.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
}

/// Per-cell normalized LBP histograms (`cells × bins`). Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceTemplate {
    histograms: Array2<f32>,
}

impl FaceTemplate {
    /// Build a template from a face crop of any size.
    pub fn extract(crop: &GrayFrame) -> Self {
        let normalized = normalize(crop);
        Self {
            histograms: lbp_histograms(&normalized),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.histograms.dim()
    }

    /// Chi-square distance summed over every cell and bin.
    ///
    /// Zero for identical templates; at most `2 × cells`.
    pub fn distance(&self, other: &FaceTemplate) -> Result<f32, TemplateError> {
        if self.shape() != other.shape() {
            return Err(TemplateError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }

        let mut chi = 0.0f64;
        for (&a, &b) in self.histograms.iter().zip(other.histograms.iter()) {
            let sum = a as f64 + b as f64;
            if sum > 0.0 {
                let diff = a as f64 - b as f64;
                chi += diff * diff / sum;
            }
        }
        Ok(chi as f32)
    }

    #[cfg(test)]
    pub(crate) fn from_histograms(histograms: Array2<f32>) -> Self {
        Self { histograms }
    }
}

/// Resize a crop to the fixed template size.
pub fn normalize(crop: &GrayFrame) -> GrayFrame {
    if crop.width == TEMPLATE_SIZE && crop.height == TEMPLATE_SIZE {
        return crop.clone();
    }
    crop.resize(TEMPLATE_SIZE, TEMPLATE_SIZE)
}

/// Map each 8-bit LBP code to its uniform-pattern bin.
fn uniform_lookup() -> &'static [u8; 256] {
    static TABLE: OnceLock<[u8; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [NON_UNIFORM_BIN; 256];
        let mut next = 0u8;
        for code in 0..=255u8 {
            // circular 0/1 transitions
            if (code ^ code.rotate_right(1)).count_ones() <= 2 {
                table[code as usize] = next;
                next += 1;
            }
        }
        table
    })
}

fn lbp_histograms(frame: &GrayFrame) -> Array2<f32> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let cell_w = (w / GRID).max(1);
    let cell_h = (h / GRID).max(1);
    let table = uniform_lookup();
    let mut hist = Array2::<f32>::zeros((CELLS, LBP_BINS));

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let center = frame.data[y * w + x];
            let mut code = 0usize;
            for (bit, (dx, dy)) in NEIGHBOR_OFFSETS.iter().enumerate() {
                let nx = (x as i32 + dx) as usize;
                let ny = (y as i32 + dy) as usize;
                if frame.data[ny * w + nx] >= center {
                    code |= 1 << bit;
                }
            }
            let cell = (y / cell_h).min(GRID - 1) * GRID + (x / cell_w).min(GRID - 1);
            hist[[cell, table[code] as usize]] += 1.0;
        }
    }

    for mut row in hist.rows_mut() {
        let total: f32 = row.sum();
        if total > 0.0 {
            row.mapv_inplace(|v| v / total);
        }
    }
    hist
}
