//! Output directory layout under the data directory

use std::io;
use std::path::{Path, PathBuf};

pub const RAW_DIR: &str = "raw";
pub const SQLITE_DIR: &str = "sqlite";
pub const SCHEMA_DIR: &str = "schema";
pub const FSDBINARY_DIR: &str = "fsdbinary";
pub const STATIC_DIR: &str = "static";
pub const PICKLE_DIR: &str = "pickle";
pub const JSON_DIR: &str = "json";

/// Category directories rooted at one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw(&self) -> PathBuf {
        self.root.join(RAW_DIR)
    }

    pub fn sqlite(&self) -> PathBuf {
        self.root.join(SQLITE_DIR)
    }

    pub fn schema(&self) -> PathBuf {
        self.root.join(SCHEMA_DIR)
    }

    pub fn fsdbinary(&self) -> PathBuf {
        self.root.join(FSDBINARY_DIR)
    }

    pub fn static_files(&self) -> PathBuf {
        self.root.join(STATIC_DIR)
    }

    pub fn pickle(&self) -> PathBuf {
        self.root.join(PICKLE_DIR)
    }

    /// Decoded blobs; also where the label catalogs are read from
    pub fn json(&self) -> PathBuf {
        self.root.join(JSON_DIR)
    }

    pub fn directories(&self) -> [PathBuf; 7] {
        [
            self.raw(),
            self.sqlite(),
            self.schema(),
            self.fsdbinary(),
            self.static_files(),
            self.pickle(),
            self.json(),
        ]
    }

    /// Create every category directory, succeeding if they already exist
    ///
    /// On failure the offending directory is returned alongside the error.
    pub fn create_all(&self) -> Result<(), (PathBuf, io::Error)> {
        for dir in self.directories() {
            std::fs::create_dir_all(&dir).map_err(|e| (dir.clone(), e))?;
        }
        Ok(())
    }
}
