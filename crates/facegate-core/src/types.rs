use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form identity profile. Passed through to callers, never inspected.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Axis-aligned face box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True when the box is non-empty and lies inside a `width` × `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }

    /// Intersection-over-Union between two boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_area = x2.saturating_sub(x1) as u64 * y2.saturating_sub(y1) as u64;
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0 {
            inter_area as f32 / union_area as f32
        } else {
            0.0
        }
    }
}

/// A region handed to the quality gate and matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// Synthesized centered crop rather than a detection.
    pub fallback: bool,
}

/// Why a located face was not accepted as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    DistanceAboveThreshold,
    ConfidenceBelowThreshold,
    UnknownIdentity,
}

impl std::fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::DistanceAboveThreshold => "distance above threshold",
            Self::ConfidenceBelowThreshold => "confidence below threshold",
            Self::UnknownIdentity => "unknown identity",
        })
    }
}

/// Outcome of a single recognition call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecognitionResult {
    Matched {
        label: String,
        confidence: f32,
        distance: f32,
        region: FaceRegion,
        metadata: Option<Metadata>,
    },
    Unmatched {
        confidence: f32,
        distance: f32,
        reason: UnmatchedReason,
        region: FaceRegion,
    },
    NoFaceDetected,
    LowQuality {
        reason: String,
        region: FaceRegion,
    },
    ModelNotTrained,
}

impl RecognitionResult {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Matched { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// Summary of a (re)training pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingOutcome {
    pub trained: bool,
    pub enrolled_labels: Vec<String>,
    pub rejected_labels: Vec<String>,
}

/// Result of adding a single identity image to a trained engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollOutcome {
    pub label: String,
    /// Templates added by this call; zero when no face was located.
    pub templates_added: usize,
    pub trained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub trained: bool,
    pub known_labels: Vec<String>,
    pub template_count: usize,
}

/// Label → metadata lookup owned by an external identity store.
pub trait IdentityDirectory: Send + Sync {
    fn lookup(&self, label: &str) -> Option<Metadata>;
}

impl IdentityDirectory for HashMap<String, Metadata> {
    fn lookup(&self, label: &str) -> Option<Metadata> {
        self.get(label).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical() {
        let a = BoundingBox::new(0, 0, 100, 100);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(20, 20, 10, 10);
        assert!(a.iou(&b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 0, 10, 10);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_fits_within() {
        assert!(BoundingBox::new(0, 0, 10, 10).fits_within(10, 10));
        assert!(!BoundingBox::new(1, 0, 10, 10).fits_within(10, 10));
        assert!(!BoundingBox::new(0, 0, 0, 10).fits_within(10, 10));
    }

    #[test]
    fn test_result_serializes_with_outcome_tag() {
        let result = RecognitionResult::Unmatched {
            confidence: 0.25,
            distance: 75.0,
            reason: UnmatchedReason::DistanceAboveThreshold,
            region: FaceRegion {
                bbox: BoundingBox::new(1, 2, 3, 4),
                fallback: false,
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "unmatched");
        assert_eq!(json["reason"], "distance_above_threshold");
        assert_eq!(json["region"]["box"]["width"], 3);

        let json = serde_json::to_value(RecognitionResult::ModelNotTrained).unwrap();
        assert_eq!(json["outcome"], "model_not_trained");
    }

    #[test]
    fn test_directory_lookup_passes_metadata_through() {
        let mut profile = Metadata::new();
        profile.insert("employee_id".into(), "EMP001".into());
        let mut dir: HashMap<String, Metadata> = HashMap::new();
        dir.insert("alice".into(), profile.clone());

        assert_eq!(dir.lookup("alice"), Some(profile));
        assert_eq!(dir.lookup("bob"), None);
    }
}
