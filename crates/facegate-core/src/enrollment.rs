//! Enrollment sets and training.
//!
//! An [`EnrollmentSet`] is built once and never mutated after it is published;
//! enrolling or removing an identity produces a new set.

use crate::config::{QualityPolicy, ThresholdConfig};
use crate::detector::{self, FaceLocator};
use crate::frame::{self, GrayFrame};
use crate::quality::{self, QualityVerdict};
use crate::template::FaceTemplate;

// --- Augmentation parameters (alpha, beta) ---
const DARKER_VARIANT: (f32, f32) = (0.85, -10.0);
const BRIGHTER_VARIANT: (f32, f32) = (1.15, 10.0);

/// One labelled image of the enrollment corpus, as raw encoded bytes.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub label: String,
    pub image: Vec<u8>,
}

impl CorpusEntry {
    pub fn new(label: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            image,
        }
    }
}

/// Ordered label → templates mapping. Insertion order decides match ties.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentSet {
    templates: Vec<(String, FaceTemplate)>,
    labels: Vec<String>,
}

impl EnrollmentSet {
    pub fn push(&mut self, label: &str, template: FaceTemplate) {
        if !self.contains(label) {
            self.labels.push(label.to_string());
        }
        self.templates.push((label.to_string(), template));
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Labels in first-enrolled order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn templates_for(&self, label: &str) -> usize {
        self.templates.iter().filter(|(l, _)| l == label).count()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FaceTemplate)> {
        self.templates.iter().map(|(l, t)| (l.as_str(), t))
    }

    /// A copy with every template of `label` dropped.
    pub fn without(&self, label: &str) -> EnrollmentSet {
        EnrollmentSet {
            templates: self
                .templates
                .iter()
                .filter(|(l, _)| l != label)
                .cloned()
                .collect(),
            labels: self.labels.iter().filter(|l| *l != label).cloned().collect(),
        }
    }
}

/// Result of [`build_enrollment`].
#[derive(Debug)]
pub struct BuiltEnrollment {
    pub set: EnrollmentSet,
    /// Corpus labels that ended up with no template at all.
    pub rejected_labels: Vec<String>,
}

/// Build a fresh enrollment set from a corpus.
///
/// Entries are processed in order. A label is rejected when none of its
/// entries yielded a template.
pub fn build_enrollment(
    corpus: &[CorpusEntry],
    config: &ThresholdConfig,
    locator: &dyn FaceLocator,
) -> BuiltEnrollment {
    let mut set = EnrollmentSet::default();
    let mut seen: Vec<&str> = Vec::new();

    for entry in corpus {
        if !seen.contains(&entry.label.as_str()) {
            seen.push(&entry.label);
        }
        for template in face_templates(&entry.label, &entry.image, config, locator) {
            set.push(&entry.label, template);
        }
    }

    let rejected_labels = seen
        .into_iter()
        .filter(|label| !set.contains(label))
        .map(str::to_string)
        .collect();

    BuiltEnrollment {
        set,
        rejected_labels,
    }
}

/// Decode, locate and template one enrollment image.
///
/// Returns no templates when the image cannot be decoded, no face is found,
/// or training quality is enforced and the crop is rejected.
pub fn face_templates(
    label: &str,
    image: &[u8],
    config: &ThresholdConfig,
    locator: &dyn FaceLocator,
) -> Vec<FaceTemplate> {
    let frame = match GrayFrame::decode(image) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(label, error = %e, "skipping undecodable enrollment image");
            return Vec::new();
        }
    };

    let regions = detector::locate(locator, &frame, config.allow_fallback_region);
    let Some(region) = detector::primary_face(&regions) else {
        tracing::warn!(label, "no face located in enrollment image");
        return Vec::new();
    };

    let crop = frame.crop(&region.bbox);
    let (verdict, metrics) = quality::assess_quality(&crop, config);
    if let QualityVerdict::Rejected(reason) = verdict {
        match config.training_quality {
            QualityPolicy::Enforce => {
                tracing::warn!(label, %reason, ?metrics, "enrollment image rejected by quality gate");
                return Vec::new();
            }
            QualityPolicy::Advisory => {
                tracing::warn!(label, %reason, ?metrics, "enrolling despite quality warning");
            }
        }
    }

    let templates = if config.augment_templates {
        augmented(&crop).iter().map(FaceTemplate::extract).collect()
    } else {
        vec![FaceTemplate::extract(&crop)]
    };
    tracing::debug!(
        label,
        bbox = ?region.bbox,
        fallback = region.fallback,
        templates = templates.len(),
        "enrollment image templated"
    );
    templates
}

/// The crop itself followed by darker, brighter and equalized variants.
fn augmented(crop: &GrayFrame) -> Vec<GrayFrame> {
    let mut variants = vec![crop.clone()];
    for (alpha, beta) in [DARKER_VARIANT, BRIGHTER_VARIANT] {
        let mut v = crop.clone();
        frame::adjust_brightness(&mut v.data, alpha, beta);
        variants.push(v);
    }
    let mut equalized = crop.clone();
    frame::equalize_histogram(&mut equalized.data);
    variants.push(equalized);
    variants
}
