//! Face-crop quality gate: size, lighting, sharpness, contrast.

use crate::config::ThresholdConfig;
use crate::frame::GrayFrame;
use serde::Serialize;

/// Objective measurements of a face crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Shorter side of the crop, in pixels.
    pub face_size: u32,
    /// Mean intensity (0–255).
    pub brightness: f32,
    /// Laplacian variance.
    pub sharpness: f32,
    /// Intensity standard deviation.
    pub contrast: f32,
}

impl QualityMetrics {
    pub fn measure(crop: &GrayFrame) -> Self {
        Self {
            face_size: crop.width.min(crop.height),
            brightness: crop.mean(),
            sharpness: crop.laplacian_variance(),
            contrast: crop.stddev(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityVerdict {
    Accepted,
    Rejected(String),
}

impl QualityVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Check metrics in order (size, brightness, sharpness, contrast); the first
/// failing check decides the reason.
pub fn assess_metrics(metrics: &QualityMetrics, config: &ThresholdConfig) -> QualityVerdict {
    if metrics.face_size < config.min_face_size {
        return QualityVerdict::Rejected("face too small".into());
    }
    if metrics.brightness < config.low_brightness || metrics.brightness > config.high_brightness {
        return QualityVerdict::Rejected("poor lighting".into());
    }
    if metrics.sharpness < config.min_sharpness {
        return QualityVerdict::Rejected("too blurry".into());
    }
    if metrics.contrast < config.min_contrast {
        return QualityVerdict::Rejected("low contrast".into());
    }
    QualityVerdict::Accepted
}

/// Measure and assess a face crop.
pub fn assess_quality(crop: &GrayFrame, config: &ThresholdConfig) -> (QualityVerdict, QualityMetrics) {
    let metrics = QualityMetrics::measure(crop);
    let verdict = assess_metrics(&metrics, config);
    tracing::debug!(?metrics, ?verdict, "quality assessed");
    (verdict, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good() -> QualityMetrics {
        QualityMetrics {
            face_size: 120,
            brightness: 130.0,
            sharpness: 300.0,
            contrast: 40.0,
        }
    }

    fn reason(metrics: QualityMetrics) -> Option<String> {
        match assess_metrics(&metrics, &ThresholdConfig::default()) {
            QualityVerdict::Accepted => None,
            QualityVerdict::Rejected(r) => Some(r),
        }
    }

    #[test]
    fn test_good_metrics_accepted() {
        assert_eq!(reason(good()), None);
    }

    #[test]
    fn test_each_check_reports_its_reason() {
        assert_eq!(reason(QualityMetrics { face_size: 40, ..good() }).as_deref(), Some("face too small"));
        assert_eq!(reason(QualityMetrics { brightness: 20.0, ..good() }).as_deref(), Some("poor lighting"));
        assert_eq!(reason(QualityMetrics { brightness: 240.0, ..good() }).as_deref(), Some("poor lighting"));
        assert_eq!(reason(QualityMetrics { sharpness: 2.0, ..good() }).as_deref(), Some("too blurry"));
        assert_eq!(reason(QualityMetrics { contrast: 3.0, ..good() }).as_deref(), Some("low contrast"));
    }

    #[test]
    fn test_checks_fail_fast_in_order() {
        // Everything is wrong; size is checked first.
        let all_bad = QualityMetrics {
            face_size: 10,
            brightness: 5.0,
            sharpness: 0.0,
            contrast: 0.0,
        };
        assert_eq!(reason(all_bad).as_deref(), Some("face too small"));

        let dark_and_flat = QualityMetrics {
            brightness: 5.0,
            sharpness: 0.0,
            ..good()
        };
        assert_eq!(reason(dark_and_flat).as_deref(), Some("poor lighting"));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let config = ThresholdConfig::default();
        let edge = QualityMetrics {
            face_size: config.min_face_size,
            brightness: config.low_brightness,
            sharpness: config.min_sharpness,
            contrast: config.min_contrast,
        };
        assert!(assess_metrics(&edge, &config).is_accepted());
    }

    #[test]
    fn test_measure_flat_crop() {
        let crop = GrayFrame::new(vec![128; 80 * 80], 80, 80).unwrap();
        let (verdict, metrics) = assess_quality(&crop, &ThresholdConfig::default());
        assert_eq!(metrics.face_size, 80);
        assert!((metrics.brightness - 128.0).abs() < 1e-4);
        assert_eq!(metrics.sharpness, 0.0);
        assert_eq!(verdict, QualityVerdict::Rejected("too blurry".into()));
    }

    #[test]
    fn test_measure_uses_shorter_side() {
        let crop = GrayFrame::new(vec![0; 90 * 50], 90, 50).unwrap();
        assert_eq!(QualityMetrics::measure(&crop).face_size, 50);
    }
}
