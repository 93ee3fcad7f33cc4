//! Loading the three label catalogs from the JSON data directory

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::IgnoredAny;
use serde::Deserialize;

pub const STAR_MAP_FILE: &str = "starmapcache.json";
pub const LOCALIZATION_INDEX_FILE: &str = "localization_fsd_main.json";
pub const LOCALIZED_STRINGS_FILE: &str = "localization_fsd_en-us.json";

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse catalog {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Region entry of the galaxy map cache
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionEntry {
    #[serde(rename = "constellationIDs", default)]
    pub constellation_ids: Vec<u32>,
    #[serde(rename = "solarSystemIDs", default)]
    pub solar_system_ids: Vec<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstellationEntry {
    #[serde(rename = "solarSystemIDs", default)]
    pub solar_system_ids: Vec<u32>,
}

/// A collection of IDs stored either as a list or as the keys of a map
///
/// Untagged content is buffered, so map keys stay strings here and are
/// parsed on access; non-numeric keys are skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdListing {
    List(Vec<u32>),
    Map(BTreeMap<String, IgnoredAny>),
}

impl IdListing {
    pub fn ids(&self) -> Vec<u32> {
        match self {
            IdListing::List(ids) => ids.clone(),
            IdListing::Map(map) => map.keys().filter_map(|key| key.parse().ok()).collect(),
        }
    }
}

/// Decoded galaxy map cache; fields other than the ID sets are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StarMapCatalog {
    #[serde(default)]
    pub regions: BTreeMap<u32, RegionEntry>,
    #[serde(default)]
    pub constellations: BTreeMap<u32, ConstellationEntry>,
    #[serde(rename = "solarSystems", default)]
    pub solar_systems: Option<IdListing>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalizationEntry {
    #[serde(rename = "FullPath", default)]
    pub full_path: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Message ID to path tag and label
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct LocalizationIndex {
    pub entries: BTreeMap<u64, LocalizationEntry>,
}

/// Message ID to display name, `None` when the shipped text is null
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedStrings {
    names: BTreeMap<u64, Option<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringsFile {
    Bare(BTreeMap<String, serde_json::Value>),
    Pair(IgnoredAny, BTreeMap<String, serde_json::Value>),
}

/// First element of a string record, or the record itself if it is text
fn display_name(record: &serde_json::Value) -> Option<String> {
    let first = match record {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    first.as_str().map(str::to_string)
}

impl LocalizedStrings {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u64, Option<String>)>,
    {
        Self {
            names: entries.into_iter().collect(),
        }
    }

    fn from_records(records: &BTreeMap<String, serde_json::Value>) -> Self {
        Self::from_entries(records.iter().filter_map(|(key, record)| {
            let id = key.parse().ok()?;
            Some((id, display_name(record)))
        }))
    }

    /// Outer `None` when the message is absent, inner `None` for null text
    pub fn get(&self, message_id: u64) -> Option<Option<&str>> {
        self.names.get(&message_id).map(Option::as_deref)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<'de> Deserialize<'de> for LocalizedStrings {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = match StringsFile::deserialize(deserializer)? {
            StringsFile::Bare(records) | StringsFile::Pair(_, records) => records,
        };
        Ok(Self::from_records(&records))
    }
}

/// Catalog file names, relative to the JSON directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFiles {
    pub star_map: String,
    pub index: String,
    pub strings: String,
}

impl Default for CatalogFiles {
    fn default() -> Self {
        Self {
            star_map: STAR_MAP_FILE.to_string(),
            index: LOCALIZATION_INDEX_FILE.to_string(),
            strings: LOCALIZED_STRINGS_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub star_map: StarMapCatalog,
    pub index: LocalizationIndex,
    pub strings: LocalizedStrings,
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CatalogError> {
    let data = fs::read(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load all three catalogs; any missing or malformed file aborts the load
pub fn load_catalogs(dir: &Path, files: &CatalogFiles) -> Result<Catalogs, CatalogError> {
    let star_map: StarMapCatalog = load_json(&dir.join(&files.star_map))?;
    tracing::info!(
        "Loaded star map: {} regions, {} constellations",
        star_map.regions.len(),
        star_map.constellations.len()
    );

    let index: LocalizationIndex = load_json(&dir.join(&files.index))?;
    tracing::info!("Loaded {} localization index entries", index.entries.len());

    let strings: LocalizedStrings = load_json(&dir.join(&files.strings))?;
    tracing::info!("Loaded {} localized strings", strings.len());

    Ok(Catalogs {
        star_map,
        index,
        strings,
    })
}
