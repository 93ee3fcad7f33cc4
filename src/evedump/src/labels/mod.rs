//! Stellar label resolution
//!
//! Rebuilds display names for solar systems, constellations and regions from
//! three decoded catalogs: the galaxy map cache (which objects exist), the
//! localization index (which message names each object) and the localized
//! string table (the text of each message).

pub mod catalog;
pub mod export;
pub mod resolve;

use std::path::{Path, PathBuf};

pub use catalog::{load_catalogs, CatalogError, CatalogFiles, Catalogs};
pub use export::{write_labels, ExportError, COMBINED_FILE};
pub use resolve::{
    resolve_labels, LabelMap, LabelSet, ObjectKind, PathTags, PerKind, Resolution,
    ResolutionReport,
};

#[derive(thiserror::Error, Debug)]
pub enum LabelError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Load catalogs from `dir`, resolve, and write the label files back into it
pub fn generate(
    dir: &Path,
    files: &CatalogFiles,
    tags: &PathTags,
) -> Result<(Resolution, Vec<PathBuf>), LabelError> {
    let catalogs = load_catalogs(dir, files)?;
    let resolution = resolve_labels(&catalogs, tags);
    let written = write_labels(dir, &resolution.labels)?;
    Ok((resolution, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_catalogs(dir: &Path, strings: &str) {
        fs::write(
            dir.join(catalog::STAR_MAP_FILE),
            r#"{"regions": {"10000001": {"constellationIDs": [20000001], "solarSystemIDs": [30000001]}},
                "constellations": {"20000001": {"solarSystemIDs": [30000001]}}}"#,
        )
        .unwrap();
        fs::write(
            dir.join(catalog::LOCALIZATION_INDEX_FILE),
            r#"{"500": {"FullPath": "Map/SolarSystems", "label": "solar_system_30000001"},
                "600": {"FullPath": "Map/Constellations", "label": "constellation_20000001"},
                "700": {"FullPath": "Map/Regions", "label": "region_10000001"},
                "800": {"FullPath": "UI/Generic", "label": "ok"}}"#,
        )
        .unwrap();
        fs::write(dir.join(catalog::LOCALIZED_STRINGS_FILE), strings).unwrap();
    }

    #[test]
    fn test_generate_end_to_end() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_catalogs(
            temp_dir.path(),
            r#"["en-us", {"500": ["Tanoo", 0, 0], "600": ["San Matar", 0, 0], "700": ["Derelik", 0, 0]}]"#,
        );

        let (resolution, written) =
            generate(temp_dir.path(), &CatalogFiles::default(), &PathTags::default()).unwrap();

        assert_eq!(written.len(), 4);
        assert_eq!(resolution.labels.systems[&30000001], "Tanoo");
        assert_eq!(resolution.labels.constellations[&20000001], "San Matar");
        assert_eq!(resolution.labels.regions[&10000001], "Derelik");
        assert_eq!(resolution.report.unrecognized_tags["UI/Generic"], 1);

        let combined: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(temp_dir.path().join(COMBINED_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(combined["regions"]["10000001"], "Derelik");
    }

    #[test]
    fn test_generate_null_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_catalogs(temp_dir.path(), r#"{"500": [null], "600": ["San Matar"]}"#);

        let (resolution, _) =
            generate(temp_dir.path(), &CatalogFiles::default(), &PathTags::default()).unwrap();

        assert!(resolution.labels.systems.is_empty());
        assert_eq!(resolution.report.null_names, 1);
        assert_eq!(resolution.report.missing_strings, 1);
    }

    #[test]
    fn test_generate_missing_catalog_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();

        let err = generate(temp_dir.path(), &CatalogFiles::default(), &PathTags::default())
            .unwrap_err();

        assert!(matches!(err, LabelError::Catalog(CatalogError::Read { .. })));
        assert!(!temp_dir.path().join(COMBINED_FILE).exists());
    }
}
