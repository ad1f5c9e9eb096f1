//! Grayscale frame type and pixel operations: decode, crop, resize, CLAHE,
//! equalization and the statistics used by the quality gate.

use crate::types::BoundingBox;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image dimensions are zero")]
    ZeroDimensions,
    #[error("invalid pixel buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// An 8-bit grayscale image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GrayFrame {
    /// Wrap a raw luma buffer, checking that it matches the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions);
        }
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Decode an encoded image (PNG, JPEG, ...) and convert it to 8-bit luma.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let img = image::load_from_memory(bytes)?;
        let luma = img.to_luma8();
        let (width, height) = luma.dimensions();
        Self::new(luma.into_raw(), width, height)
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Copy the pixels under `bbox`. The box is clipped to the frame.
    pub fn crop(&self, bbox: &BoundingBox) -> GrayFrame {
        let x0 = bbox.x.min(self.width - 1);
        let y0 = bbox.y.min(self.height - 1);
        let x1 = (bbox.x + bbox.width).min(self.width).max(x0 + 1);
        let y1 = (bbox.y + bbox.height).min(self.height).max(y0 + 1);

        let w = self.width as usize;
        let mut data = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
        for y in y0 as usize..y1 as usize {
            data.extend_from_slice(&self.data[y * w + x0 as usize..y * w + x1 as usize]);
        }
        GrayFrame {
            data,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    /// Resize with bilinear interpolation (pixel-center aligned).
    pub fn resize(&self, new_w: u32, new_h: u32) -> GrayFrame {
        let (width, height) = (self.width as usize, self.height as usize);
        let (new_w, new_h) = (new_w.max(1) as usize, new_h.max(1) as usize);
        let scale_x = width as f32 / new_w as f32;
        let scale_y = height as f32 / new_h as f32;

        let mut resized = vec![0u8; new_w * new_h];
        for y in 0..new_h {
            let src_y = (y as f32 + 0.5) * scale_y - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
            let y1 = (y0 + 1).min(height - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..new_w {
                let src_x = (x as f32 + 0.5) * scale_x - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
                let x1 = (x0 + 1).min(width - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                let tl = self.data[y0 * width + x0] as f32;
                let tr = self.data[y0 * width + x1] as f32;
                let bl = self.data[y1 * width + x0] as f32;
                let br = self.data[y1 * width + x1] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
            }
        }

        GrayFrame {
            data: resized,
            width: new_w as u32,
            height: new_h as u32,
        }
    }

    /// Mean pixel intensity (0.0–255.0).
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        (self.data.iter().map(|&b| b as f64).sum::<f64>() / self.data.len() as f64) as f32
    }

    /// Population standard deviation of pixel intensities.
    pub fn stddev(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let n = self.data.len() as f64;
        let mean = self.data.iter().map(|&b| b as f64).sum::<f64>() / n;
        let variance = self
            .data
            .iter()
            .map(|&b| (b as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        variance.sqrt() as f32
    }

    /// Variance of the 4-neighbour Laplacian response. Higher = sharper.
    ///
    /// Kernel `[0,1,0; 1,-4,1; 0,1,0]` over interior pixels; frames smaller
    /// than 3×3 score 0.
    pub fn laplacian_variance(&self) -> f32 {
        let (w, h) = (self.width as usize, self.height as usize);
        if w < 3 || h < 3 {
            return 0.0;
        }

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut count = 0u64;

        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let center = self.data[y * w + x] as f64;
                let top = self.data[(y - 1) * w + x] as f64;
                let bottom = self.data[(y + 1) * w + x] as f64;
                let left = self.data[y * w + x - 1] as f64;
                let right = self.data[y * w + x + 1] as f64;

                let laplacian = top + bottom + left + right - 4.0 * center;
                sum += laplacian;
                sum_sq += laplacian * laplacian;
                count += 1;
            }
        }

        let mean = sum / count as f64;
        let variance = (sum_sq / count as f64) - (mean * mean);
        variance.max(0.0) as f32
    }
}

/// Apply Contrast-Limited Adaptive Histogram Equalization (CLAHE) in-place.
///
/// Divides the image into a grid of tiles, computes a clipped histogram
/// per tile, builds CDFs, and uses bilinear interpolation between tile
/// CDFs for smooth output.
pub fn clahe_enhance(gray: &mut [u8], width: u32, height: u32, tiles: u32, clip_limit: f32) {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || gray.len() < w * h {
        return;
    }

    let t = tiles as usize;
    let tile_w = w / t;
    let tile_h = h / t;
    if tile_w == 0 || tile_h == 0 {
        return;
    }
    let tile_pixels = tile_w * tile_h;

    let mut cdfs: Vec<[f32; 256]> = Vec::with_capacity(t * t);

    for row in 0..t {
        for col in 0..t {
            let mut hist = [0u32; 256];
            let y0 = row * tile_h;
            let x0 = col * tile_w;

            for y in y0..y0 + tile_h {
                for x in x0..x0 + tile_w {
                    hist[gray[y * w + x] as usize] += 1;
                }
            }

            // Clip, then spread the excess evenly
            let clip = (clip_limit * tile_pixels as f32) as u32;
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let redist = excess / 256;
            let leftover = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += redist;
                if i < leftover {
                    *bin += 1;
                }
            }

            let mut cdf = [0f32; 256];
            cdf[0] = hist[0] as f32;
            for i in 1..256 {
                cdf[i] = cdf[i - 1] + hist[i] as f32;
            }
            let cdf_min = cdf.iter().find(|&&v| v > 0.0).copied().unwrap_or(0.0);
            let denom = (tile_pixels as f32) - cdf_min;
            if denom > 0.0 {
                for v in cdf.iter_mut() {
                    *v = ((*v - cdf_min) / denom * 255.0).clamp(0.0, 255.0);
                }
            }
            cdfs.push(cdf);
        }
    }

    for y in 0..h {
        for x in 0..w {
            let pixel = gray[y * w + x] as usize;

            let fy = ((y as f32 / tile_h as f32) - 0.5).clamp(0.0, (t - 1) as f32);
            let fx = ((x as f32 / tile_w as f32) - 0.5).clamp(0.0, (t - 1) as f32);

            let r0 = fy as usize;
            let c0 = fx as usize;
            let r1 = (r0 + 1).min(t - 1);
            let c1 = (c0 + 1).min(t - 1);

            let dy = fy - r0 as f32;
            let dx = fx - c0 as f32;

            let tl = cdfs[r0 * t + c0][pixel];
            let tr = cdfs[r0 * t + c1][pixel];
            let bl = cdfs[r1 * t + c0][pixel];
            let br = cdfs[r1 * t + c1][pixel];

            let top = tl * (1.0 - dx) + tr * dx;
            let bot = bl * (1.0 - dx) + br * dx;
            let val = top * (1.0 - dy) + bot * dy;

            gray[y * w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Global histogram equalization in-place.
pub fn equalize_histogram(gray: &mut [u8]) {
    if gray.is_empty() {
        return;
    }
    let mut hist = [0usize; 256];
    for &p in gray.iter() {
        hist[p as usize] += 1;
    }
    let mut cdf = [0usize; 256];
    let mut acc = 0usize;
    for (i, &count) in hist.iter().enumerate() {
        acc += count;
        cdf[i] = acc;
    }
    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    let denom = gray.len() - cdf_min;
    if denom == 0 {
        // single-valued image
        return;
    }

    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let scaled = (cdf[i].saturating_sub(cdf_min)) as f32 / denom as f32 * 255.0;
        *slot = scaled.round().clamp(0.0, 255.0) as u8;
    }
    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// Linear brightness/contrast adjustment `p' = alpha * p + beta`, saturating.
pub fn adjust_brightness(gray: &mut [u8], alpha: f32, beta: f32) {
    for p in gray.iter_mut() {
        *p = (*p as f32 * alpha + beta).round().clamp(0.0, 255.0) as u8;
    }
}
