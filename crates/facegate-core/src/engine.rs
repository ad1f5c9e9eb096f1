//! Recognition engine: owns the published enrollment set and threshold config.
//!
//! Both are held as `Arc` snapshots behind a lock that is only taken long
//! enough to clone or replace the pointer. A recognition call works on the
//! snapshots it took at the start, so a concurrent retrain or threshold
//! update is seen either fully or not at all.

use crate::config::{ConfigError, QualityPolicy, ThresholdConfig, ThresholdUpdate};
use crate::detector::{self, CascadeDetector, FaceLocator};
use crate::enrollment::{self, CorpusEntry, EnrollmentSet};
use crate::frame::{FrameError, GrayFrame};
use crate::matcher::{Matcher, NearestNeighborMatcher};
use crate::policy;
use crate::quality::{self, QualityVerdict};
use crate::template::{FaceTemplate, TemplateError};
use crate::types::{
    EngineStatus, EnrollOutcome, IdentityDirectory, Metadata, RecognitionResult, TrainingOutcome,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] FrameError),
    #[error("invalid threshold config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("internal fault: {0}")]
    InternalFault(String),
}

impl From<TemplateError> for EngineError {
    fn from(e: TemplateError) -> Self {
        EngineError::InternalFault(e.to_string())
    }
}

pub struct Engine {
    locator: Box<dyn FaceLocator>,
    matcher: Box<dyn Matcher>,
    directory: Arc<dyn IdentityDirectory>,
    enrollment: RwLock<Option<Arc<EnrollmentSet>>>,
    thresholds: RwLock<Arc<ThresholdConfig>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

impl Engine {
    /// Untrained engine with the cascade locator and no identity metadata.
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self::with_components(
            thresholds,
            Box::new(CascadeDetector::new()),
            Arc::new(HashMap::<String, Metadata>::new()),
        )
    }

    pub fn with_components(
        thresholds: ThresholdConfig,
        locator: Box<dyn FaceLocator>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            locator,
            matcher: Box::new(NearestNeighborMatcher),
            directory,
            enrollment: RwLock::new(None),
            thresholds: RwLock::new(Arc::new(thresholds)),
        }
    }

    /// Replace the identity metadata source.
    pub fn with_directory(mut self, directory: Arc<dyn IdentityDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Current threshold snapshot.
    pub fn thresholds(&self) -> Arc<ThresholdConfig> {
        Arc::clone(&self.thresholds.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn enrollment_snapshot(&self) -> Option<Arc<EnrollmentSet>> {
        self.enrollment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, set: Option<EnrollmentSet>) {
        let next = set.filter(|s| !s.is_empty()).map(Arc::new);
        *self
            .enrollment
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Rebuild the enrollment set from scratch and publish it.
    ///
    /// An empty result leaves the engine untrained.
    pub fn train(&self, corpus: &[CorpusEntry]) -> TrainingOutcome {
        let config = self.thresholds();
        let built = enrollment::build_enrollment(corpus, &config, self.locator.as_ref());

        let enrolled_labels = built.set.labels().to_vec();
        let template_count = built.set.template_count();
        let trained = !built.set.is_empty();
        self.publish(Some(built.set));

        if trained {
            tracing::info!(
                entries = corpus.len(),
                identities = enrolled_labels.len(),
                templates = template_count,
                rejected = built.rejected_labels.len(),
                "training complete"
            );
        } else {
            tracing::warn!(
                entries = corpus.len(),
                rejected = built.rejected_labels.len(),
                "training produced no templates; engine is untrained"
            );
        }

        TrainingOutcome {
            trained,
            enrolled_labels,
            rejected_labels: built.rejected_labels,
        }
    }

    /// Add one image for `label` on top of the current set.
    pub fn enroll(&self, label: &str, image: &[u8]) -> EnrollOutcome {
        let config = self.thresholds();
        let templates = enrollment::face_templates(label, image, &config, self.locator.as_ref());
        let templates_added = templates.len();

        // Writers serialize on the lock so a concurrent enroll is not lost.
        let mut guard = self
            .enrollment
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if templates_added > 0 {
            let mut next = guard.as_deref().cloned().unwrap_or_default();
            for template in templates {
                next.push(label, template);
            }
            tracing::info!(label, templates_added, total = next.template_count(), "identity enrolled");
            *guard = Some(Arc::new(next));
        }

        EnrollOutcome {
            label: label.to_string(),
            templates_added,
            trained: guard.is_some(),
        }
    }

    /// Drop every template of `label`. Returns false when it was not enrolled.
    pub fn remove_identity(&self, label: &str) -> bool {
        let mut guard = self
            .enrollment
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(current) = guard.as_ref().filter(|set| set.contains(label)) else {
            return false;
        };
        let next = current.without(label);
        tracing::info!(label, remaining = next.labels().len(), "identity removed");
        *guard = if next.is_empty() {
            None
        } else {
            Some(Arc::new(next))
        };
        true
    }

    /// Merge, validate and publish a threshold update.
    ///
    /// On validation failure the previous config stays live.
    pub fn update_thresholds(&self, update: &ThresholdUpdate) -> Result<ThresholdConfig, ConfigError> {
        let mut guard = self
            .thresholds
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let merged = guard.merged(update);
        if let Err(e) = merged.validate() {
            tracing::warn!(error = %e, ?update, "threshold update rejected");
            return Err(e);
        }
        tracing::info!(?update, "thresholds updated");
        *guard = Arc::new(merged.clone());
        Ok(merged)
    }

    pub fn status(&self) -> EngineStatus {
        match self.enrollment_snapshot() {
            Some(set) => EngineStatus {
                trained: true,
                known_labels: set.labels().to_vec(),
                template_count: set.template_count(),
            },
            None => EngineStatus {
                trained: false,
                known_labels: Vec::new(),
                template_count: 0,
            },
        }
    }

    /// Recognize against the live threshold config.
    pub fn recognize_current(&self, image: &[u8]) -> Result<RecognitionResult, EngineError> {
        let config = self.thresholds();
        self.recognize(image, &config)
    }

    /// Run the full pipeline for one probe image against `config`.
    ///
    /// Negative outcomes are `Ok` variants; only an invalid `config`,
    /// undecodable input and corrupt template state are errors.
    pub fn recognize(
        &self,
        image: &[u8],
        config: &ThresholdConfig,
    ) -> Result<RecognitionResult, EngineError> {
        config.validate()?;
        let Some(enrollment) = self.enrollment_snapshot() else {
            return Ok(RecognitionResult::ModelNotTrained);
        };

        let frame = GrayFrame::decode(image)?;
        let regions = detector::locate(self.locator.as_ref(), &frame, config.allow_fallback_region);
        let Some(region) = detector::primary_face(&regions) else {
            tracing::debug!(width = frame.width, height = frame.height, "no face detected");
            return Ok(RecognitionResult::NoFaceDetected);
        };

        let crop = frame.crop(&region.bbox);
        let (verdict, metrics) = quality::assess_quality(&crop, config);
        if let QualityVerdict::Rejected(reason) = verdict {
            match config.recognition_quality {
                QualityPolicy::Enforce => {
                    tracing::debug!(%reason, ?metrics, "probe rejected by quality gate");
                    return Ok(RecognitionResult::LowQuality { reason, region });
                }
                QualityPolicy::Advisory => {
                    tracing::warn!(%reason, ?metrics, "matching despite quality warning");
                }
            }
        }

        let probe = FaceTemplate::extract(&crop);
        let candidate = self
            .matcher
            .best_match(&probe, &enrollment, config.distance_ceiling)
            .map_err(|e| {
                tracing::error!(error = %e, "template comparison failed");
                EngineError::from(e)
            })?
            .ok_or_else(|| EngineError::InternalFault("published enrollment set is empty".into()))?;

        Ok(policy::decide(
            candidate,
            region,
            &enrollment,
            config,
            self.directory.as_ref(),
        ))
    }
}
