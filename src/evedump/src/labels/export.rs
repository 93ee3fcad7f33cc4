//! Writing resolved labels as JSON

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::resolve::{LabelSet, ObjectKind};

/// All three maps under `systems`, `constellations` and `regions`
pub const COMBINED_FILE: &str = "stellar_labels.json";

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("Failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Per-kind output file name
pub fn label_file(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::SolarSystem => "system_labels.json",
        ObjectKind::Constellation => "constellation_labels.json",
        ObjectKind::Region => "region_labels.json",
    }
}

fn write_json<T: Serialize>(path: PathBuf, value: &T) -> Result<PathBuf, ExportError> {
    let json = match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(source) => return Err(ExportError::Serialize { path, source }),
    };
    match fs::write(&path, json) {
        Ok(()) => Ok(path),
        Err(source) => Err(ExportError::Write { path, source }),
    }
}

/// Write the three per-kind files and the combined file into `dir`
///
/// Existing files are overwritten. Returns the written paths, combined last.
pub fn write_labels(dir: &Path, labels: &LabelSet) -> Result<Vec<PathBuf>, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::with_capacity(ObjectKind::ALL.len() + 1);
    for kind in ObjectKind::ALL {
        let path = write_json(dir.join(label_file(kind)), labels.get(kind))?;
        tracing::info!(
            "Wrote {} {} labels to {}",
            labels.get(kind).len(),
            kind.plural(),
            path.display()
        );
        written.push(path);
    }

    let combined = write_json(dir.join(COMBINED_FILE), labels)?;
    tracing::info!("Wrote combined labels to {}", combined.display());
    written.push(combined);

    Ok(written)
}
