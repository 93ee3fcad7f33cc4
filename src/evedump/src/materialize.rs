//! Per-entry materialization: copy into category directories, sniff, decode

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::layout::OutputLayout;
use crate::manifest::{AssetCategory, ManifestEntry};
use crate::sniff;

/// Substring identifying the galaxy map cache among serialized blobs
pub const GALAXY_MAP_MARKER: &str = "starmapcache";

/// Errors from materializing a single entry
#[derive(thiserror::Error, Debug)]
pub enum MaterializeError {
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: evedump_pickle::Error,
    },

    #[error("Failed to serialize decoded {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Secondary step taken after the primary copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    /// `.static` file carried the SQLite header and was copied to `sqlite/`
    SqliteCopied,
    SqliteNotMatched,
    SqliteFailed,
    /// Serialized blob decoded to `json/`
    Decoded,
    DecodeFailed,
}

/// Outcome of a successful primary copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub category: AssetCategory,
    pub written: Vec<PathBuf>,
    pub follow_up: FollowUp,
}

/// Performs the file operations for classified manifest entries
#[derive(Debug, Clone)]
pub struct Materializer {
    layout: OutputLayout,
    source_root: PathBuf,
}

impl Materializer {
    pub fn new(layout: OutputLayout, source_root: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            source_root: source_root.into(),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Location of an entry's bytes under the source asset root
    pub fn source_path(&self, entry: &ManifestEntry) -> PathBuf {
        self.source_root.join(&entry.source_relative_path)
    }

    /// Destination of the primary copy for an entry
    pub fn destination(&self, entry: &ManifestEntry) -> PathBuf {
        let category = entry.category();
        let dir = match &category {
            AssetCategory::Static => self.layout.static_files(),
            AssetCategory::Schema => self.layout.schema(),
            AssetCategory::BinaryFormat => self.layout.fsdbinary(),
            AssetCategory::SerializedBlob => self.layout.pickle(),
            AssetCategory::Other(_) => self.layout.raw().join(entry.raw_subdir()),
        };
        dir.join(format!("{}.{}", entry.filename, category.tag()))
    }

    /// Run the materialization routine for the entry's category
    pub fn materialize(&self, entry: &ManifestEntry) -> Result<Materialized, MaterializeError> {
        let category = entry.category();
        let source = self.source_path(entry);
        let dest = self.destination(entry);

        if let AssetCategory::Other(_) = category {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|source| MaterializeError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        copy_file(&source, &dest)?;
        let mut written = vec![dest.clone()];

        let follow_up = match category {
            AssetCategory::Static => {
                let (follow_up, sqlite) = self.copy_if_sqlite(entry, &source);
                written.extend(sqlite);
                follow_up
            }
            AssetCategory::SerializedBlob => {
                if entry.filename.contains(GALAXY_MAP_MARKER) {
                    tracing::info!("Found galaxy map cache: {}", entry.filename);
                }
                let json_path = self.layout.json().join(format!("{}.json", entry.filename));
                match decode_to_json(&dest, &json_path, true) {
                    Ok(()) => {
                        tracing::debug!("Decoded {} -> {}", dest.display(), json_path.display());
                        written.push(json_path);
                        FollowUp::Decoded
                    }
                    Err(e) => {
                        tracing::error!("Decode failed for {}: {}", entry.filename, e);
                        FollowUp::DecodeFailed
                    }
                }
            }
            _ => FollowUp::None,
        };

        Ok(Materialized {
            category,
            written,
            follow_up,
        })
    }

    /// Second copy of a `.static` resource into `sqlite/` when it is a database
    fn copy_if_sqlite(&self, entry: &ManifestEntry, source: &Path) -> (FollowUp, Option<PathBuf>) {
        if !sniff::sniff_file(source) {
            tracing::debug!("{} is not a SQLite database", entry.filename);
            return (FollowUp::SqliteNotMatched, None);
        }

        let sqlite = self.layout.sqlite().join(format!("{}.sqlite", entry.filename));
        match copy_file(source, &sqlite) {
            Ok(()) => (FollowUp::SqliteCopied, Some(sqlite)),
            Err(e) => {
                tracing::warn!("SQLite copy failed for {}: {}", entry.filename, e);
                (FollowUp::SqliteFailed, None)
            }
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), MaterializeError> {
    fs::copy(from, to).map_err(|source| MaterializeError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    tracing::debug!("Copied {} -> {}", from.display(), to.display());
    Ok(())
}

/// Decode a serialized blob on disk and write it as JSON
pub fn decode_to_json(input: &Path, output: &Path, pretty: bool) -> Result<(), MaterializeError> {
    let data = fs::read(input).map_err(|source| MaterializeError::Read {
        path: input.to_path_buf(),
        source,
    })?;

    let value = evedump_pickle::decode(&data).map_err(|source| MaterializeError::Decode {
        path: input.to_path_buf(),
        source,
    })?;

    let json = if pretty {
        serde_json::to_vec_pretty(&value)
    } else {
        serde_json::to_vec(&value)
    }
    .map_err(|source| MaterializeError::Serialize {
        path: input.to_path_buf(),
        source,
    })?;

    fs::write(output, json).map_err(|source| MaterializeError::Write {
        path: output.to_path_buf(),
        source,
    })
}
