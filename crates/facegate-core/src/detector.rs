//! Cascade face locator.
//!
//! Scans a grayscale frame with Haar-like rectangle-contrast cascades at
//! multiple window sizes, groups overlapping hits and reports one box per
//! group. The largest box across all passes is the primary face.

use crate::frame::{self, GrayFrame};
use crate::types::{BoundingBox, FaceRegion};

// --- Scan parameters ---
const DETECT_MAX_SIDE: u32 = 640;
const MIN_WINDOW: u32 = 48;
const SCALE_FACTORS: [f64; 2] = [1.1, 1.05];
const WINDOW_STEP_FRACTION: f64 = 0.08;
const MIN_WINDOW_STEP: u32 = 2;
const MIN_NEIGHBORS: usize = 3;
const GROUP_IOU_THRESHOLD: f32 = 0.4;
const CLAHE_TILES: u32 = 8;
const CLAHE_CLIP_LIMIT: f32 = 0.02;
const FALLBACK_FRACTION: f32 = 0.6;

/// Rectangle in unit-window coordinates.
#[derive(Debug, Clone, Copy)]
struct Region {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

const fn region(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
    Region { x0, y0, x1, y1 }
}

/// One cascade stage: the `light` area must exceed the `dark` area by
/// `threshold` window standard deviations.
#[derive(Debug)]
struct Stage {
    light: &'static [Region],
    dark: &'static [Region],
    threshold: f64,
}

/// A named cascade of stages.
#[derive(Debug)]
pub struct DetectorProfile {
    pub name: &'static str,
    /// Windows flatter than this are rejected before any stage runs.
    min_stddev: f64,
    stages: &'static [Stage],
}

pub static FRONTAL_DEFAULT: DetectorProfile = DetectorProfile {
    name: "frontal_default",
    min_stddev: 12.0,
    stages: &[
        // cheeks brighter than the eye band
        Stage {
            light: &[region(0.15, 0.50, 0.85, 0.68)],
            dark: &[region(0.15, 0.28, 0.85, 0.44)],
            threshold: 0.45,
        },
        // nose bridge brighter than both eyes
        Stage {
            light: &[region(0.43, 0.28, 0.57, 0.44)],
            dark: &[region(0.20, 0.28, 0.40, 0.44), region(0.60, 0.28, 0.80, 0.44)],
            threshold: 0.6,
        },
        // forehead brighter than the eye band
        Stage {
            light: &[region(0.20, 0.06, 0.80, 0.22)],
            dark: &[region(0.15, 0.28, 0.85, 0.44)],
            threshold: 0.45,
        },
        // upper lip brighter than the mouth
        Stage {
            light: &[region(0.30, 0.52, 0.70, 0.66)],
            dark: &[region(0.30, 0.69, 0.70, 0.80)],
            threshold: 0.3,
        },
    ],
};

pub static FRONTAL_ALT: DetectorProfile = DetectorProfile {
    name: "frontal_alt",
    min_stddev: 10.0,
    stages: &[
        Stage {
            light: &[region(0.18, 0.46, 0.82, 0.64)],
            dark: &[region(0.18, 0.26, 0.82, 0.42)],
            threshold: 0.35,
        },
        Stage {
            light: &[region(0.44, 0.26, 0.56, 0.42)],
            dark: &[region(0.22, 0.26, 0.40, 0.42), region(0.60, 0.26, 0.78, 0.42)],
            threshold: 0.45,
        },
        Stage {
            light: &[region(0.34, 0.50, 0.66, 0.64)],
            dark: &[region(0.32, 0.68, 0.68, 0.82)],
            threshold: 0.25,
        },
        // forehead brighter than the eye band
        Stage {
            light: &[region(0.22, 0.08, 0.78, 0.22)],
            dark: &[region(0.18, 0.26, 0.82, 0.42)],
            threshold: 0.3,
        },
    ],
};

/// Pluggable face locator.
///
/// Implementations must be deterministic for a fixed frame and return boxes
/// that lie within the frame.
pub trait FaceLocator: Send + Sync {
    /// Detect candidate face boxes in a grayscale frame, in discovery order.
    fn detect(&self, frame: &GrayFrame) -> Vec<BoundingBox>;
}

/// Multi-profile, multi-scale cascade scanner.
pub struct CascadeDetector {
    profiles: Vec<&'static DetectorProfile>,
    scale_factors: Vec<f64>,
    min_window: u32,
    min_neighbors: usize,
    enhance_contrast: bool,
}

impl Default for CascadeDetector {
    fn default() -> Self {
        Self {
            profiles: vec![&FRONTAL_DEFAULT, &FRONTAL_ALT],
            scale_factors: SCALE_FACTORS.to_vec(),
            min_window: MIN_WINDOW,
            min_neighbors: MIN_NEIGHBORS,
            enhance_contrast: true,
        }
    }
}

impl CascadeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest window (source pixels at detection resolution) to scan.
    pub fn with_min_window(mut self, min_window: u32) -> Self {
        self.min_window = min_window.max(8);
        self
    }

    /// Minimum raw hits a group needs to count as a face.
    pub fn with_min_neighbors(mut self, min_neighbors: usize) -> Self {
        self.min_neighbors = min_neighbors.max(1);
        self
    }

    /// Skip the CLAHE pass before scanning.
    pub fn without_contrast_enhancement(mut self) -> Self {
        self.enhance_contrast = false;
        self
    }

    /// Run one (profile, scale factor) pass and return grouped boxes.
    fn scan_pass(
        &self,
        integral: &IntegralImage,
        profile: &DetectorProfile,
        scale_factor: f64,
    ) -> Vec<BoundingBox> {
        let limit = integral.width.min(integral.height);
        let mut raw = Vec::new();

        let mut size = self.min_window as f64;
        while (size as u32) <= limit {
            let s = size as u32;
            let step = ((s as f64 * WINDOW_STEP_FRACTION) as u32).max(MIN_WINDOW_STEP);

            let mut wy = 0;
            while wy + s <= integral.height {
                let mut wx = 0;
                while wx + s <= integral.width {
                    if evaluate_window(integral, profile, wx, wy, s) {
                        raw.push(BoundingBox::new(wx, wy, s, s));
                    }
                    wx += step;
                }
                wy += step;
            }
            size *= scale_factor;
        }

        let grouped = group_windows(&raw, GROUP_IOU_THRESHOLD, self.min_neighbors);
        tracing::trace!(
            profile = profile.name,
            scale_factor,
            raw = raw.len(),
            grouped = grouped.len(),
            "cascade pass"
        );
        grouped
    }
}

impl FaceLocator for CascadeDetector {
    fn detect(&self, frame: &GrayFrame) -> Vec<BoundingBox> {
        // Downscale large frames; boxes are mapped back afterwards.
        let longest = frame.width.max(frame.height);
        let (mut work, scale) = if longest > DETECT_MAX_SIDE {
            let scale = DETECT_MAX_SIDE as f32 / longest as f32;
            let w = ((frame.width as f32 * scale).round() as u32).max(1);
            let h = ((frame.height as f32 * scale).round() as u32).max(1);
            (frame.resize(w, h), scale)
        } else {
            (frame.clone(), 1.0)
        };

        if self.enhance_contrast {
            frame::clahe_enhance(
                &mut work.data,
                work.width,
                work.height,
                CLAHE_TILES,
                CLAHE_CLIP_LIMIT,
            );
        }

        let integral = IntegralImage::new(&work);
        let mut faces = Vec::new();
        for profile in &self.profiles {
            for &scale_factor in &self.scale_factors {
                faces.extend(self.scan_pass(&integral, profile, scale_factor));
            }
        }

        if scale < 1.0 {
            faces
                .iter()
                .map(|b| map_to_source(b, scale, frame.width, frame.height))
                .collect()
        } else {
            faces
        }
    }
}

/// Summed-area tables over pixel values and squared pixel values.
struct IntegralImage {
    width: u32,
    height: u32,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    fn new(frame: &GrayFrame) -> Self {
        let w = frame.width as usize;
        let h = frame.height as usize;
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = frame.data[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq_sum[(y + 1) * stride + x + 1] = sq_sum[y * stride + x + 1] + row_sq;
            }
        }

        Self {
            width: frame.width,
            height: frame.height,
            sum,
            sq_sum,
        }
    }

    #[inline]
    fn rect(table: &[u64], stride: usize, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
        let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    /// Sum of pixels in `[x0, x1) × [y0, y1)`.
    fn rect_sum(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
        Self::rect(&self.sum, self.width as usize + 1, x0, y0, x1, y1)
    }

    fn stddev(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> f64 {
        let n = ((x1 - x0) * (y1 - y0)) as f64;
        if n == 0.0 {
            return 0.0;
        }
        let stride = self.width as usize + 1;
        let mean = Self::rect(&self.sum, stride, x0, y0, x1, y1) as f64 / n;
        let mean_sq = Self::rect(&self.sq_sum, stride, x0, y0, x1, y1) as f64 / n;
        (mean_sq - mean * mean).max(0.0).sqrt()
    }

    /// Mean over the union of unit-window regions placed at (wx, wy) with side `size`.
    fn regions_mean(&self, regions: &[Region], wx: u32, wy: u32, size: u32) -> f64 {
        let s = size as f64;
        let mut total = 0u64;
        let mut count = 0u64;
        for r in regions {
            let x0 = wx + (r.x0 * s) as u32;
            let y0 = wy + (r.y0 * s) as u32;
            let x1 = wx + (r.x1 * s) as u32;
            let y1 = wy + (r.y1 * s) as u32;
            total += self.rect_sum(x0, y0, x1, y1);
            count += ((x1 - x0) * (y1 - y0)) as u64;
        }
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }
}

/// Run every stage of `profile` on one window, stopping at the first reject.
fn evaluate_window(
    integral: &IntegralImage,
    profile: &DetectorProfile,
    wx: u32,
    wy: u32,
    size: u32,
) -> bool {
    let sd = integral.stddev(wx, wy, wx + size, wy + size);
    if sd < profile.min_stddev {
        return false;
    }
    profile.stages.iter().all(|stage| {
        let light = integral.regions_mean(stage.light, wx, wy, size);
        let dark = integral.regions_mean(stage.dark, wx, wy, size);
        (light - dark) / sd >= stage.threshold
    })
}

/// Cluster raw window hits whose IoU exceeds `iou_threshold` (transitively)
/// and return the mean box of every cluster with at least `min_neighbors` hits.
///
/// Output order follows each cluster's first hit.
fn group_windows(raw: &[BoundingBox], iou_threshold: f32, min_neighbors: usize) -> Vec<BoundingBox> {
    let n = raw.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if raw[i].iou(&raw[j]) > iou_threshold {
                let a = find(&mut parent, i);
                let b = find(&mut parent, j);
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    // (root, count, sums) in order of first appearance
    let mut clusters: Vec<(usize, u64, [u64; 4])> = Vec::new();
    for (i, b) in raw.iter().enumerate() {
        let root = find(&mut parent, i);
        let slot = match clusters.iter().position(|c| c.0 == root) {
            Some(pos) => pos,
            None => {
                clusters.push((root, 0, [0; 4]));
                clusters.len() - 1
            }
        };
        let entry = &mut clusters[slot];
        entry.1 += 1;
        entry.2[0] += b.x as u64;
        entry.2[1] += b.y as u64;
        entry.2[2] += b.width as u64;
        entry.2[3] += b.height as u64;
    }

    clusters
        .into_iter()
        .filter(|(_, count, _)| *count as usize >= min_neighbors)
        .map(|(_, count, s)| {
            BoundingBox::new(
                (s[0] / count) as u32,
                (s[1] / count) as u32,
                (s[2] / count) as u32,
                (s[3] / count) as u32,
            )
        })
        .collect()
}

/// Map a box found on a downscaled frame back to source coordinates.
fn map_to_source(b: &BoundingBox, scale: f32, width: u32, height: u32) -> BoundingBox {
    let inv = 1.0 / scale;
    let x = ((b.x as f32 * inv).round() as u32).min(width - 1);
    let y = ((b.y as f32 * inv).round() as u32).min(height - 1);
    let w = ((b.width as f32 * inv).round() as u32).clamp(1, width - x);
    let h = ((b.height as f32 * inv).round() as u32).clamp(1, height - y);
    BoundingBox::new(x, y, w, h)
}

/// Centered square covering 60% of the shorter side, at least one pixel.
///
/// `None` only for an empty frame.
pub fn fallback_region(width: u32, height: u32) -> Option<BoundingBox> {
    if width == 0 || height == 0 {
        return None;
    }
    let side = ((width.min(height) as f32 * FALLBACK_FRACTION) as u32).max(1);
    let x = (width / 2).saturating_sub(side / 2);
    let y = (height / 2).saturating_sub(side / 2);
    Some(BoundingBox::new(x, y, side, side))
}

/// Detect faces, falling back to a synthesized centered region when allowed.
///
/// Returns an empty list only when nothing was detected and fallback is off.
pub fn locate(locator: &dyn FaceLocator, frame: &GrayFrame, allow_fallback: bool) -> Vec<FaceRegion> {
    let detected: Vec<FaceRegion> = locator
        .detect(frame)
        .into_iter()
        .filter(|b| b.fits_within(frame.width, frame.height))
        .map(|bbox| FaceRegion {
            bbox,
            fallback: false,
        })
        .collect();

    if !detected.is_empty() || !allow_fallback {
        return detected;
    }

    match fallback_region(frame.width, frame.height) {
        Some(bbox) => {
            tracing::warn!(
                width = frame.width,
                height = frame.height,
                ?bbox,
                "no face detected; using centered fallback region"
            );
            vec![FaceRegion {
                bbox,
                fallback: true,
            }]
        }
        None => Vec::new(),
    }
}

/// Largest region by area; ties go to the earliest.
pub fn primary_face(regions: &[FaceRegion]) -> Option<FaceRegion> {
    let mut best: Option<FaceRegion> = None;
    for region in regions {
        let is_better = match &best {
            None => true,
            Some(prev) => region.bbox.area() > prev.bbox.area(),
        };
        if is_better {
            best = Some(*region);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{synthetic_face, Skin};

    struct FixedLocator(Vec<BoundingBox>);

    impl FaceLocator for FixedLocator {
        fn detect(&self, _frame: &GrayFrame) -> Vec<BoundingBox> {
            self.0.clone()
        }
    }

    fn region_of(bbox: BoundingBox) -> FaceRegion {
        FaceRegion {
            bbox,
            fallback: false,
        }
    }

    #[test]
    fn test_detects_synthetic_face() {
        let frame = synthetic_face(160, 160, 80, 84, 110, Skin::Patterned);
        let regions = locate(&CascadeDetector::new(), &frame, false);
        let face = primary_face(&regions).expect("face should be detected");

        assert!(!face.fallback);
        let b = face.bbox;
        let (cx, cy) = (b.x + b.width / 2, b.y + b.height / 2);
        assert!((70..=90).contains(&cx), "center x {cx}");
        assert!((74..=94).contains(&cy), "center y {cy}");
        assert!((70..=120).contains(&b.width), "width {}", b.width);
        assert!(b.fits_within(160, 160));
    }

    #[test]
    fn test_detects_off_center_face() {
        let frame = synthetic_face(200, 150, 120, 75, 100, Skin::Noisy);
        let regions = locate(&CascadeDetector::new(), &frame, false);
        let b = primary_face(&regions).expect("face should be detected").bbox;
        let cx = b.x + b.width / 2;
        assert!((105..=135).contains(&cx), "center x {cx}");
    }

    #[test]
    fn test_detects_face_in_large_frame() {
        let frame = synthetic_face(1280, 1280, 640, 640, 500, Skin::Patterned);
        let regions = locate(&CascadeDetector::new(), &frame, false);
        let b = primary_face(&regions).expect("face should be detected").bbox;
        let (cx, cy) = (b.x + b.width / 2, b.y + b.height / 2);
        assert!((610..=670).contains(&cx), "center x {cx}");
        assert!((610..=670).contains(&cy), "center y {cy}");
        // face oval is 420 px wide; the box must not swallow the frame
        assert!((340..=510).contains(&b.width), "width {}", b.width);
        assert!(b.fits_within(1280, 1280));

        let frame = synthetic_face(1000, 800, 560, 400, 300, Skin::Noisy);
        let regions = locate(&CascadeDetector::new(), &frame, false);
        let b = primary_face(&regions).expect("face should be detected").bbox;
        let (cx, cy) = (b.x + b.width / 2, b.y + b.height / 2);
        assert!((530..=590).contains(&cx), "center x {cx}");
        assert!((370..=430).contains(&cy), "center y {cy}");
        assert!((200..=310).contains(&b.width), "width {}", b.width);
    }

    #[test]
    fn test_builder_options() {
        let frame = synthetic_face(160, 160, 80, 84, 110, Skin::Patterned);

        let plain = CascadeDetector::new()
            .with_min_window(60)
            .with_min_neighbors(2)
            .without_contrast_enhancement();
        assert_eq!(plain.min_window, 60);
        assert_eq!(plain.min_neighbors, 2);
        assert!(!plain.enhance_contrast);
        assert_eq!(plain.detect(&frame), plain.detect(&frame));
        for b in plain.detect(&frame) {
            assert!(b.width >= 60);
        }

        // window larger than the frame
        assert!(CascadeDetector::new().with_min_window(200).detect(&frame).is_empty());
        assert!(CascadeDetector::new().with_min_neighbors(10_000).detect(&frame).is_empty());

        let clamped = CascadeDetector::new().with_min_window(0).with_min_neighbors(0);
        assert_eq!(clamped.min_window, 8);
        assert_eq!(clamped.min_neighbors, 1);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let frame = synthetic_face(160, 160, 80, 84, 110, Skin::Patterned);
        let detector = CascadeDetector::new();
        assert_eq!(detector.detect(&frame), detector.detect(&frame));
    }

    #[test]
    fn test_uniform_frame_has_no_face() {
        let frame = GrayFrame::new(vec![128; 160 * 160], 160, 160).unwrap();
        assert!(CascadeDetector::new().detect(&frame).is_empty());
    }

    #[test]
    fn test_featureless_oval_has_no_face() {
        let frame = synthetic_face(160, 160, 80, 84, 110, Skin::Blank);
        assert!(locate(&CascadeDetector::new(), &frame, false).is_empty());
    }

    #[test]
    fn test_frame_smaller_than_window() {
        let frame = GrayFrame::new(vec![90; 20 * 20], 20, 20).unwrap();
        assert!(CascadeDetector::new().detect(&frame).is_empty());
    }

    #[test]
    fn test_fallback_region_geometry() {
        let b = fallback_region(160, 120).unwrap();
        assert_eq!(b, BoundingBox::new(44, 24, 72, 72));
        assert!(b.fits_within(160, 120));
        assert_eq!(fallback_region(1, 1), Some(BoundingBox::new(0, 0, 1, 1)));
        assert_eq!(fallback_region(1, 40), Some(BoundingBox::new(0, 20, 1, 1)));
        assert_eq!(fallback_region(0, 40), None);
    }

    #[test]
    fn test_thin_frame_still_gets_fallback() {
        let frame = GrayFrame::new(vec![128; 40], 1, 40).unwrap();
        let regions = locate(&CascadeDetector::new(), &frame, true);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].fallback);
        assert!(regions[0].bbox.fits_within(1, 40));
    }

    #[test]
    fn test_locate_uses_fallback_only_when_allowed() {
        let frame = synthetic_face(160, 160, 80, 84, 110, Skin::Blank);
        let detector = CascadeDetector::new();

        assert!(locate(&detector, &frame, false).is_empty());

        let regions = locate(&detector, &frame, true);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].fallback);
        assert_eq!(regions[0].bbox, BoundingBox::new(32, 32, 96, 96));
    }

    #[test]
    fn test_locate_drops_out_of_bounds_boxes() {
        let frame = GrayFrame::new(vec![0; 50 * 50], 50, 50).unwrap();
        let locator = FixedLocator(vec![BoundingBox::new(40, 40, 20, 20), BoundingBox::new(0, 0, 10, 10)]);
        let regions = locate(&locator, &frame, false);
        assert_eq!(regions, vec![region_of(BoundingBox::new(0, 0, 10, 10))]);
    }

    #[test]
    fn test_primary_face_picks_largest() {
        let regions = [
            region_of(BoundingBox::new(0, 0, 10, 10)),
            region_of(BoundingBox::new(5, 5, 30, 30)),
            region_of(BoundingBox::new(50, 50, 20, 20)),
        ];
        assert_eq!(primary_face(&regions).unwrap().bbox, BoundingBox::new(5, 5, 30, 30));
    }

    #[test]
    fn test_primary_face_tie_keeps_first() {
        let regions = [
            region_of(BoundingBox::new(0, 0, 20, 10)),
            region_of(BoundingBox::new(40, 40, 10, 20)),
        ];
        assert_eq!(primary_face(&regions).unwrap().bbox, BoundingBox::new(0, 0, 20, 10));
        assert_eq!(primary_face(&[]), None);
    }

    #[test]
    fn test_group_windows_requires_neighbors() {
        let raw = vec![
            BoundingBox::new(10, 10, 50, 50),
            BoundingBox::new(12, 10, 50, 50),
            BoundingBox::new(14, 12, 50, 50),
            // isolated hit
            BoundingBox::new(200, 200, 50, 50),
        ];
        let grouped = group_windows(&raw, 0.4, 3);
        assert_eq!(grouped, vec![BoundingBox::new(12, 10, 50, 50)]);

        let grouped = group_windows(&raw, 0.4, 1);
        assert_eq!(grouped.len(), 2);
        assert!(group_windows(&[], 0.4, 1).is_empty());
    }

    #[test]
    fn test_integral_image_sums() {
        let frame = GrayFrame::new((1..=12).collect(), 4, 3).unwrap();
        let integral = IntegralImage::new(&frame);
        assert_eq!(integral.rect_sum(0, 0, 4, 3), 78);
        // rows 1..3, cols 1..3 → 6 + 7 + 10 + 11
        assert_eq!(integral.rect_sum(1, 1, 3, 3), 34);
        assert_eq!(integral.stddev(0, 0, 1, 1), 0.0);
    }

    #[test]
    fn test_map_to_source_scales_and_clamps() {
        let b = map_to_source(&BoundingBox::new(10, 20, 100, 100), 0.5, 1280, 960);
        assert_eq!(b, BoundingBox::new(20, 40, 200, 200));

        let edge = map_to_source(&BoundingBox::new(600, 400, 40, 80), 0.5, 1280, 960);
        assert!(edge.fits_within(1280, 960));
    }
}
