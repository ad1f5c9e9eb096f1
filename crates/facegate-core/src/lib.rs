//! facegate-core: face verification decision engine.
//!
//! Locates a face with a Haar-like cascade, summarizes it as a grid of
//! uniform LBP histograms, finds the nearest enrolled template and applies
//! a threshold policy to decide whether the probe is a known identity.

pub mod config;
pub mod detector;
pub mod engine;
pub mod enrollment;
pub mod frame;
pub mod matcher;
pub mod policy;
pub mod quality;
pub mod template;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{ConfigError, QualityPolicy, ThresholdConfig, ThresholdUpdate};
pub use detector::{CascadeDetector, FaceLocator};
pub use engine::{Engine, EngineError};
pub use enrollment::{CorpusEntry, EnrollmentSet};
pub use frame::{FrameError, GrayFrame};
pub use quality::{QualityMetrics, QualityVerdict};
pub use types::{
    BoundingBox, EngineStatus, EnrollOutcome, FaceRegion, IdentityDirectory, Metadata,
    RecognitionResult, TrainingOutcome, UnmatchedReason,
};
