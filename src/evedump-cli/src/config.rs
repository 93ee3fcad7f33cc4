//! Configuration file for the evedump CLI

use anyhow::{Context, Result};
use evedump::labels::{CatalogFiles, PathTags};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Data directory used when neither a flag nor the config file sets one
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub workers: Option<usize>,
    pub data_dir: Option<PathBuf>,
    pub catalogs: CatalogConfig,
    pub path_tags: PathTagConfig,
}

/// Catalog file name overrides
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    pub star_map: Option<String>,
    pub index: Option<String>,
    pub strings: Option<String>,
}

/// `FullPath` tag overrides
#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathTagConfig {
    pub systems: Option<String>,
    pub constellations: Option<String>,
    pub regions: Option<String>,
}

impl Config {
    /// Get the path to the default config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("evedump");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from an explicit path, or from the default location if present
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let Ok(path) = Self::config_path() else {
            return Ok(Config::default());
        };
        if !path.exists() {
            return Ok(Config::default());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Flag value, then config file, then the default
    pub fn data_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn workers(&self, flag: Option<usize>) -> Option<usize> {
        flag.or(self.workers)
    }

    pub fn catalog_files(&self) -> CatalogFiles {
        let defaults = CatalogFiles::default();
        let catalogs = &self.catalogs;
        CatalogFiles {
            star_map: catalogs.star_map.clone().unwrap_or(defaults.star_map),
            index: catalogs.index.clone().unwrap_or(defaults.index),
            strings: catalogs.strings.clone().unwrap_or(defaults.strings),
        }
    }

    pub fn path_tags(&self) -> PathTags {
        let defaults = PathTags::default();
        let tags = &self.path_tags;
        PathTags {
            systems: tags.systems.clone().unwrap_or(defaults.systems),
            constellations: tags.constellations.clone().unwrap_or(defaults.constellations),
            regions: tags.regions.clone().unwrap_or(defaults.regions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
workers = 6
data_dir = "/srv/eve/data"

[catalogs]
strings = "localization_fsd_de.json"

[path_tags]
regions = "Universe/Regions"
"#,
        )
        .unwrap();

        assert_eq!(config.workers(None), Some(6));
        assert_eq!(config.workers(Some(2)), Some(2));
        assert_eq!(config.data_dir(None), PathBuf::from("/srv/eve/data"));

        let files = config.catalog_files();
        assert_eq!(files.strings, "localization_fsd_de.json");
        assert_eq!(files.star_map, CatalogFiles::default().star_map);

        let tags = config.path_tags();
        assert_eq!(tags.regions, "Universe/Regions");
        assert_eq!(tags.systems, "Map/SolarSystems");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir(None), PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.data_dir(Some(Path::new("out"))), PathBuf::from("out"));
        assert_eq!(config.workers(None), None);
        assert_eq!(config.catalog_files(), CatalogFiles::default());
        assert_eq!(config.path_tags(), PathTags::default());
    }

    #[test]
    fn test_flag_beats_file() {
        let config: Config = toml::from_str(r#"data_dir = "from-file""#).unwrap();
        assert_eq!(config.data_dir(Some(Path::new("from-flag"))), PathBuf::from("from-flag"));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "workers = 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.workers, Some(3));
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&temp_dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "wrokers = 3\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
