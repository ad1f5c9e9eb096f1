use facegate_core::{
    CorpusEntry, Engine, EngineError, RecognitionResult, ThresholdConfig, TrainingOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("recognition timed out after {0:?}")]
    TimedOut(Duration),
    #[error("engine task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Clone-safe handle to a shared engine.
///
/// CPU-bound work runs on tokio's blocking pool so callers can run many
/// recognitions in parallel without stalling the runtime.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<Engine>,
    timeout: Duration,
}

impl EngineHandle {
    pub fn new(engine: Engine, timeout: Duration) -> Self {
        Self {
            engine: Arc::new(engine),
            timeout,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Rebuild the enrollment set from `corpus`.
    pub async fn train(&self, corpus: Vec<CorpusEntry>) -> Result<TrainingOutcome, ServiceError> {
        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || engine.train(&corpus)).await?;
        Ok(outcome)
    }

    /// Recognize one probe against the threshold snapshot taken now.
    ///
    /// On timeout the result is discarded; the blocking task runs to
    /// completion in the background.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<RecognitionResult, ServiceError> {
        let config: Arc<ThresholdConfig> = self.engine.thresholds();
        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || engine.recognize(&image, &config));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => Ok(joined??),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "recognition timed out; result discarded");
                Err(ServiceError::TimedOut(self.timeout))
            }
        }
    }
}
