//! Final accept/reject decision for a located, templated face.

use crate::config::ThresholdConfig;
use crate::enrollment::EnrollmentSet;
use crate::matcher::MatchCandidate;
use crate::types::{FaceRegion, IdentityDirectory, RecognitionResult, UnmatchedReason};

/// The first failing acceptance check, or `None` when all pass.
///
/// Checks run in order: distance, confidence, enrolled label. Each check
/// must hold positively, so a NaN on either side rejects.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn rejection_reason(
    candidate: &MatchCandidate,
    enrollment: &EnrollmentSet,
    config: &ThresholdConfig,
) -> Option<UnmatchedReason> {
    if !(candidate.distance <= config.max_match_distance) {
        return Some(UnmatchedReason::DistanceAboveThreshold);
    }
    if !(candidate.confidence >= config.min_confidence) {
        return Some(UnmatchedReason::ConfidenceBelowThreshold);
    }
    if !enrollment.contains(&candidate.label) {
        return Some(UnmatchedReason::UnknownIdentity);
    }
    None
}

/// Turn a match candidate into a terminal outcome.
///
/// Accepted matches carry the label's metadata from `directory`, untouched.
pub fn decide(
    candidate: MatchCandidate,
    region: FaceRegion,
    enrollment: &EnrollmentSet,
    config: &ThresholdConfig,
    directory: &dyn IdentityDirectory,
) -> RecognitionResult {
    match rejection_reason(&candidate, enrollment, config) {
        None => {
            let metadata = directory.lookup(&candidate.label);
            RecognitionResult::Matched {
                label: candidate.label,
                confidence: candidate.confidence,
                distance: candidate.distance,
                region,
                metadata,
            }
        }
        Some(reason) => {
            tracing::debug!(
                label = %candidate.label,
                distance = candidate.distance,
                confidence = candidate.confidence,
                %reason,
                "match rejected"
            );
            RecognitionResult::Unmatched {
                confidence: candidate.confidence,
                distance: candidate.distance,
                reason,
                region,
            }
        }
    }
}
