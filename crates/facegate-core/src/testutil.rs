//! Deterministic synthetic faces for tests.

use crate::frame::GrayFrame;
use std::io::Cursor;

/// Skin texture of a synthetic face; different textures are different people.
#[derive(Debug, Clone, Copy)]
pub enum Skin {
    /// Coarse repeating 3×5 block pattern.
    Patterned,
    /// Per-pixel hash noise.
    Noisy,
    /// Flat oval with no eyes or mouth.
    Blank,
}

/// Draw a face-like oval of height `size` centered at (cx, cy) on a dark,
/// lightly textured background: two dark eyes and a dark mouth.
pub fn synthetic_face(width: u32, height: u32, cx: u32, cy: u32, size: u32, skin: Skin) -> GrayFrame {
    let (w, h) = (width as usize, height as usize);
    let s = size as f64;
    let (rx, ry) = (s * 0.42, s * 0.5);
    let mut data = vec![0u8; w * h];

    for y in 0..h {
        for x in 0..w {
            let mut v = 40 + ((x * 7 + y * 13) % 11) as u32;
            let dx = (x as f64 - cx as f64) / rx;
            let dy = (y as f64 - cy as f64) / ry;
            if dx * dx + dy * dy <= 1.0 {
                v = match skin {
                    Skin::Patterned => 170 + ((x / 3 + y / 5) % 3) as u32 * 12,
                    Skin::Noisy => {
                        let hash = ((x as u64 * 73_856_093) ^ (y as u64 * 19_349_663)) & 0xffff_ffff;
                        175 + (hash % 61) as u32 - 30
                    }
                    Skin::Blank => 180,
                };
            }
            data[y * w + x] = v as u8;
        }
    }

    if !matches!(skin, Skin::Blank) {
        let mut fill = |x0: f64, y0: f64, x1: f64, y1: f64, value: u8| {
            let ys = (cy as f64 + y0 * s) as usize..(cy as f64 + y1 * s) as usize;
            for y in ys {
                for x in (cx as f64 + x0 * s) as usize..(cx as f64 + x1 * s) as usize {
                    if x < w && y < h {
                        data[y * w + x] = value;
                    }
                }
            }
        };
        fill(-0.25, -0.18, -0.08, -0.08, 35);
        fill(0.08, -0.18, 0.25, -0.08, 35);
        fill(-0.18, 0.20, 0.18, 0.27, 60);
    }

    GrayFrame {
        data,
        width,
        height,
    }
}

/// Encode a frame as PNG bytes, the form callers hand to the engine.
pub fn encode_png(frame: &GrayFrame) -> Vec<u8> {
    let img = image::GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
        .expect("frame buffer matches dimensions");
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("png encoding succeeds");
    out
}

/// Scale every pixel by `factor` (darken or brighten the whole frame).
pub fn scaled(frame: &GrayFrame, factor: f32) -> GrayFrame {
    GrayFrame {
        data: frame
            .data
            .iter()
            .map(|&p| (p as f32 * factor).clamp(0.0, 255.0) as u8)
            .collect(),
        ..frame.clone()
    }
}
