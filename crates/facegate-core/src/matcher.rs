//! Nearest-neighbour matching over an enrollment set.

use crate::enrollment::EnrollmentSet;
use crate::template::{FaceTemplate, TemplateError};

/// Best candidate found for a probe template.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub label: String,
    pub distance: f32,
    pub confidence: f32,
}

/// Trait for probe-vs-enrollment comparison strategies.
pub trait Matcher: Send + Sync {
    /// Return the globally closest template's owner, or `None` for an empty set.
    fn best_match(
        &self,
        probe: &FaceTemplate,
        enrollment: &EnrollmentSet,
        ceiling: f32,
    ) -> Result<Option<MatchCandidate>, TemplateError>;
}

/// Exhaustive nearest-neighbour search using template chi-square distance.
pub struct NearestNeighborMatcher;

impl Matcher for NearestNeighborMatcher {
    fn best_match(
        &self,
        probe: &FaceTemplate,
        enrollment: &EnrollmentSet,
        ceiling: f32,
    ) -> Result<Option<MatchCandidate>, TemplateError> {
        let mut best_distance = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        // Always visit every template; strict `<` keeps the first minimum.
        for (label, template) in enrollment.iter() {
            let distance = probe.distance(template)?;
            if distance < best_distance {
                best_distance = distance;
                best_label = Some(label);
            }
        }

        Ok(best_label.map(|label| MatchCandidate {
            label: label.to_string(),
            distance: best_distance,
            confidence: confidence_from_distance(best_distance, ceiling),
        }))
    }
}

/// `clamp((ceiling - distance) / ceiling, 0, 1)`.
pub fn confidence_from_distance(distance: f32, ceiling: f32) -> f32 {
    if ceiling <= 0.0 || !distance.is_finite() {
        return 0.0;
    }
    ((ceiling - distance) / ceiling).clamp(0.0, 1.0)
}
