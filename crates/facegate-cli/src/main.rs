mod config;
mod corpus;
mod service;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use facegate_core::{
    detector, quality, CascadeDetector, Engine, GrayFrame, QualityVerdict, ThresholdConfig,
    ThresholdUpdate, TrainingOutcome,
};
use serde_json::json;
use service::EngineHandle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facegate", about = "Face verification against an enrolled image corpus")]
struct Cli {
    /// Enrollment image directory (overrides FACEGATE_CORPUS_DIR)
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,
    /// TOML threshold file (overrides FACEGATE_THRESHOLDS_FILE)
    #[arg(long, global = true)]
    thresholds: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on the corpus and report enrolled identities
    Train,
    /// Recognize one or more probe images
    Recognize {
        /// Partial threshold update as JSON, e.g. '{"min_confidence": 0.9}'
        #[arg(long)]
        update: Option<String>,
        /// Probe image files
        #[arg(required = true)]
        probes: Vec<PathBuf>,
    },
    /// Print the effective threshold configuration
    Thresholds {
        /// Partial threshold update as JSON
        #[arg(long)]
        update: Option<String>,
    },
    /// Decode an image and report located faces and quality metrics
    Inspect {
        image: PathBuf,
    },
}

fn parse_update(raw: &str) -> Result<ThresholdUpdate> {
    serde_json::from_str(raw).context("invalid threshold update")
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn trained_handle(
    config: &Config,
    thresholds: ThresholdConfig,
) -> Result<(EngineHandle, TrainingOutcome)> {
    let directory = corpus::load_metadata(&config.metadata_path())?;
    let entries = corpus::scan_corpus(&config.corpus_dir)?;

    let engine = Engine::new(thresholds).with_directory(Arc::new(directory));
    let handle = EngineHandle::new(engine, Duration::from_secs(config.recognize_timeout_secs));
    let outcome = handle.train(entries).await?;
    if !outcome.trained {
        tracing::warn!(dir = %config.corpus_dir.display(), "no identities enrolled");
    }
    Ok((handle, outcome))
}

fn inspect(path: &Path, thresholds: &ThresholdConfig) -> Result<serde_json::Value> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let frame = GrayFrame::decode(&bytes)?;
    let regions = detector::locate(
        &CascadeDetector::new(),
        &frame,
        thresholds.allow_fallback_region,
    );
    let primary = detector::primary_face(&regions);
    let quality = primary.map(|region| {
        let (verdict, metrics) = quality::assess_quality(&frame.crop(&region.bbox), thresholds);
        let reason = match verdict {
            QualityVerdict::Rejected(reason) => Some(reason),
            QualityVerdict::Accepted => None,
        };
        json!({
            "metrics": metrics,
            "accepted": reason.is_none(),
            "reason": reason,
        })
    });
    Ok(json!({
        "image": path.display().to_string(),
        "width": frame.width,
        "height": frame.height,
        "faces": regions,
        "primary": primary,
        "quality": quality,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(corpus) = cli.corpus {
        config.corpus_dir = corpus;
    }
    if let Some(thresholds) = cli.thresholds {
        config.thresholds_file = Some(thresholds);
    }
    let thresholds = config.thresholds()?;

    match cli.command {
        Commands::Train => {
            let (handle, outcome) = trained_handle(&config, thresholds).await?;
            print_json(&json!({ "training": outcome, "status": handle.engine().status() }))?;
        }
        Commands::Recognize { update, probes } => {
            let (handle, _) = trained_handle(&config, thresholds).await?;
            if let Some(raw) = update {
                handle.engine().update_thresholds(&parse_update(&raw)?)?;
            }

            let mut tasks = tokio::task::JoinSet::new();
            for (index, path) in probes.into_iter().enumerate() {
                let handle = handle.clone();
                tasks.spawn(async move {
                    let outcome = match tokio::fs::read(&path).await {
                        Ok(bytes) => handle.recognize(bytes).await.map_err(anyhow::Error::from),
                        Err(e) => Err(anyhow::Error::from(e)),
                    };
                    (index, path, outcome)
                });
            }

            let mut reports = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                let (index, path, outcome) = joined?;
                let report = match outcome {
                    Ok(result) => json!({ "probe": path.display().to_string(), "result": result }),
                    Err(e) => {
                        tracing::warn!(probe = %path.display(), error = %e, "recognition failed");
                        json!({ "probe": path.display().to_string(), "error": format!("{e:#}") })
                    }
                };
                reports.push((index, report));
            }
            reports.sort_by_key(|(index, _)| *index);
            for (_, report) in reports {
                print_json(&report)?;
            }
        }
        Commands::Thresholds { update } => {
            let engine = Engine::new(thresholds);
            if let Some(raw) = update {
                engine.update_thresholds(&parse_update(&raw)?)?;
            }
            print_json(&*engine.thresholds())?;
        }
        Commands::Inspect { image } => {
            print_json(&inspect(&image, &thresholds)?)?;
        }
    }

    Ok(())
}
