//! Decision thresholds and pipeline switches.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid threshold config: {0}")]
    Invalid(String),
    #[error("failed to parse threshold config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read threshold config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Whether a quality-gate rejection stops the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPolicy {
    /// Rejection is terminal.
    Enforce,
    /// Rejection is logged and processing continues.
    Advisory,
}

/// Process-wide recognition thresholds. Readers always see a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Largest template distance that can still be accepted.
    pub max_match_distance: f32,
    /// Distance mapped to confidence 0.
    pub distance_ceiling: f32,
    pub min_confidence: f32,
    /// Minimum face box side, in source pixels.
    pub min_face_size: u32,
    pub low_brightness: f32,
    pub high_brightness: f32,
    /// Minimum Laplacian variance of the face crop.
    pub min_sharpness: f32,
    /// Minimum intensity standard deviation of the face crop.
    pub min_contrast: f32,
    pub recognition_quality: QualityPolicy,
    pub training_quality: QualityPolicy,
    /// Synthesize a centered region when no face is detected.
    pub allow_fallback_region: bool,
    /// Add brightness-perturbed and equalized templates at enrollment.
    pub augment_templates: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_match_distance: 45.0,
            distance_ceiling: 100.0,
            min_confidence: 0.55,
            min_face_size: 60,
            low_brightness: 40.0,
            high_brightness: 220.0,
            min_sharpness: 15.0,
            min_contrast: 12.0,
            recognition_quality: QualityPolicy::Enforce,
            training_quality: QualityPolicy::Advisory,
            allow_fallback_region: false,
            augment_templates: true,
        }
    }
}

impl ThresholdConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML threshold file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            self.max_match_distance,
            self.distance_ceiling,
            self.min_confidence,
            self.low_brightness,
            self.high_brightness,
            self.min_sharpness,
            self.min_contrast,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::Invalid("thresholds must be finite".into()));
        }
        if self.distance_ceiling <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "distance_ceiling must be > 0, got {}",
                self.distance_ceiling
            )));
        }
        if self.max_match_distance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_match_distance must be >= 0, got {}",
                self.max_match_distance
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.low_brightness > self.high_brightness {
            return Err(ConfigError::Invalid(format!(
                "low_brightness ({}) exceeds high_brightness ({})",
                self.low_brightness, self.high_brightness
            )));
        }
        if self.min_sharpness < 0.0 || self.min_contrast < 0.0 {
            return Err(ConfigError::Invalid(
                "min_sharpness and min_contrast must be >= 0".into(),
            ));
        }
        Ok(())
    }

    /// Merge `update` over `self`. Unset fields keep their current value.
    pub fn merged(&self, update: &ThresholdUpdate) -> Self {
        Self {
            max_match_distance: update.max_match_distance.unwrap_or(self.max_match_distance),
            distance_ceiling: update.distance_ceiling.unwrap_or(self.distance_ceiling),
            min_confidence: update.min_confidence.unwrap_or(self.min_confidence),
            min_face_size: update.min_face_size.unwrap_or(self.min_face_size),
            low_brightness: update.low_brightness.unwrap_or(self.low_brightness),
            high_brightness: update.high_brightness.unwrap_or(self.high_brightness),
            min_sharpness: update.min_sharpness.unwrap_or(self.min_sharpness),
            min_contrast: update.min_contrast.unwrap_or(self.min_contrast),
            recognition_quality: update.recognition_quality.unwrap_or(self.recognition_quality),
            training_quality: update.training_quality.unwrap_or(self.training_quality),
            allow_fallback_region: update
                .allow_fallback_region
                .unwrap_or(self.allow_fallback_region),
            augment_templates: update.augment_templates.unwrap_or(self.augment_templates),
        }
    }
}

/// Partial threshold change; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdUpdate {
    pub max_match_distance: Option<f32>,
    pub distance_ceiling: Option<f32>,
    pub min_confidence: Option<f32>,
    pub min_face_size: Option<u32>,
    pub low_brightness: Option<f32>,
    pub high_brightness: Option<f32>,
    pub min_sharpness: Option<f32>,
    pub min_contrast: Option<f32>,
    pub recognition_quality: Option<QualityPolicy>,
    pub training_quality: Option<QualityPolicy>,
    pub allow_fallback_region: Option<bool>,
    pub augment_templates: Option<bool>,
}

impl ThresholdUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ThresholdConfig::default().validate().is_ok());
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let base = ThresholdConfig::default();
        let update = ThresholdUpdate {
            min_confidence: Some(0.99),
            allow_fallback_region: Some(true),
            ..Default::default()
        };
        let merged = base.merged(&update);
        assert_eq!(merged.min_confidence, 0.99);
        assert!(merged.allow_fallback_region);
        assert_eq!(merged.max_match_distance, base.max_match_distance);
        assert_eq!(merged.min_face_size, base.min_face_size);
        assert_eq!(merged.recognition_quality, QualityPolicy::Enforce);
    }

    #[test]
    fn test_empty_update_is_identity() {
        let base = ThresholdConfig::default();
        assert!(ThresholdUpdate::default().is_empty());
        assert_eq!(base.merged(&ThresholdUpdate::default()), base);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            ThresholdUpdate { distance_ceiling: Some(0.0), ..Default::default() },
            ThresholdUpdate { min_confidence: Some(1.5), ..Default::default() },
            ThresholdUpdate { max_match_distance: Some(-1.0), ..Default::default() },
            ThresholdUpdate { low_brightness: Some(230.0), ..Default::default() },
            ThresholdUpdate { min_sharpness: Some(f32::NAN), ..Default::default() },
        ];
        for update in bad {
            let merged = ThresholdConfig::default().merged(&update);
            assert!(merged.validate().is_err(), "{update:?} should be rejected");
        }
    }

    #[test]
    fn test_toml_partial_document_uses_defaults() {
        let config = ThresholdConfig::from_toml_str(
            r#"
            max_match_distance = 30.0
            recognition_quality = "advisory"
            allow_fallback_region = true
            "#,
        )
        .unwrap();
        assert_eq!(config.max_match_distance, 30.0);
        assert_eq!(config.recognition_quality, QualityPolicy::Advisory);
        assert!(config.allow_fallback_region);
        assert_eq!(config.distance_ceiling, 100.0);
    }

    #[test]
    fn test_toml_invalid_values_rejected() {
        let result = ThresholdConfig::from_toml_str("min_confidence = 2.0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        let result = ThresholdConfig::from_toml_str("min_confidence = \"high\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_update_from_json() {
        let update: ThresholdUpdate =
            serde_json::from_str(r#"{"min_confidence": 0.9, "training_quality": "enforce"}"#)
                .unwrap();
        assert_eq!(update.min_confidence, Some(0.9));
        assert_eq!(update.training_quality, Some(QualityPolicy::Enforce));
        assert_eq!(update.max_match_distance, None);

        let unknown = serde_json::from_str::<ThresholdUpdate>(r#"{"min_confidense": 0.9}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = ThresholdConfig::load("/nonexistent/facegate/thresholds.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
