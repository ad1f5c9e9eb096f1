use facegate_core::{ConfigError, ThresholdConfig, ThresholdUpdate};
use std::path::PathBuf;

pub const METADATA_FILE_NAME: &str = "team_data.json";

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of enrollment images, one identity per file stem.
    pub corpus_dir: PathBuf,
    /// Optional TOML threshold file.
    pub thresholds_file: Option<PathBuf>,
    /// Identity metadata JSON. Defaults to `<corpus_dir>/team_data.json`.
    pub metadata_file: Option<PathBuf>,
    /// Timeout in seconds for a single recognition.
    pub recognize_timeout_secs: u64,
    pub max_match_distance: Option<f32>,
    pub min_confidence: Option<f32>,
    pub allow_fallback: Option<bool>,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            corpus_dir: var("FACEGATE_CORPUS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./faces")),
            thresholds_file: var("FACEGATE_THRESHOLDS_FILE").map(PathBuf::from),
            metadata_file: var("FACEGATE_METADATA_FILE").map(PathBuf::from),
            recognize_timeout_secs: parse_or(var("FACEGATE_RECOGNIZE_TIMEOUT_SECS"), 10),
            max_match_distance: var("FACEGATE_MAX_MATCH_DISTANCE").and_then(|v| v.parse().ok()),
            min_confidence: var("FACEGATE_MIN_CONFIDENCE").and_then(|v| v.parse().ok()),
            allow_fallback: var("FACEGATE_ALLOW_FALLBACK").map(|v| v != "0" && v != "false"),
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_file
            .clone()
            .unwrap_or_else(|| self.corpus_dir.join(METADATA_FILE_NAME))
    }

    /// Threshold file (or defaults) with environment overrides applied.
    pub fn thresholds(&self) -> Result<ThresholdConfig, ConfigError> {
        let base = match &self.thresholds_file {
            Some(path) => ThresholdConfig::load(path)?,
            None => ThresholdConfig::default(),
        };
        let overrides = ThresholdUpdate {
            max_match_distance: self.max_match_distance,
            min_confidence: self.min_confidence,
            allow_fallback_region: self.allow_fallback,
            ..Default::default()
        };
        let merged = base.merged(&overrides);
        merged.validate()?;
        Ok(merged)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
