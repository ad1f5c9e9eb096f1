//! On-disk enrollment corpus and identity metadata.

use facegate_core::{CorpusEntry, Metadata};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid metadata file {path}: {source}")]
    Metadata {
        path: PathBuf,
        source: serde_json::Error,
    },
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Every image file in `dir`, labelled by file stem, in path order.
///
/// Files that cannot be read are skipped with a warning.
pub fn scan_corpus(dir: &Path) -> Result<Vec<CorpusEntry>, CorpusError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| CorpusError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    paths.sort();

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(label) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping file with non-UTF-8 name");
            continue;
        };
        match std::fs::read(&path) {
            Ok(bytes) => entries.push(CorpusEntry::new(label, bytes)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image"),
        }
    }

    tracing::info!(dir = %dir.display(), entries = entries.len(), "corpus scanned");
    Ok(entries)
}

/// Load the label → metadata map. A missing file yields an empty map.
pub fn load_metadata(path: &Path) -> Result<HashMap<String, Metadata>, CorpusError> {
    let src = match std::fs::read_to_string(path) {
        Ok(src) => src,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "metadata file not found; identities have no metadata");
            return Ok(HashMap::new());
        }
        Err(source) => {
            return Err(CorpusError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&src).map_err(|source| CorpusError::Metadata {
        path: path.to_path_buf(),
        source,
    })
}
