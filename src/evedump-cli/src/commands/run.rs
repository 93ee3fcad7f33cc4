//! Extraction followed by label resolution

use anyhow::Result;
use std::path::Path;

use super::{extract, labels};
use crate::cli::ExtractArgs;
use crate::config::Config;

/// Extract the index, then resolve labels from the catalogs it produced
pub fn handle(args: &ExtractArgs, json_dir: Option<&Path>, config: &Config) -> Result<()> {
    let data_dir = extract::handle(args, config)?;
    let dir = labels::json_dir(json_dir, &data_dir);
    labels::handle(&dir, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Galaxy map with constellation 20000001 holding system 30000001
    const STAR_MAP: &[u8] = b"\x80\x02}U\x0econstellations}J\x01\x2d\x31\x01}U\x0esolarSystemIDs]J\x81\xc3\xc9\x01asss.";

    /// Message 500 tagged as the label of system 30000001
    const LOCALIZATION_INDEX: &[u8] =
        b"\x80\x02}M\xf4\x01}(U\x08FullPathU\x10Map/SolarSystemsU\x05labelU\x15solar_system_30000001us.";

    /// Message 500 reads "Jita"
    const LOCALIZED_STRINGS: &[u8] = b"\x80\x02}M\xf4\x01](U\x04JitaNNes.";

    fn write_client(root: &Path) -> ExtractArgs {
        let res_dir = root.join("ResFiles");
        fs::create_dir_all(res_dir.join("aa")).unwrap();
        fs::write(res_dir.join("aa/star"), STAR_MAP).unwrap();
        fs::write(res_dir.join("aa/main"), LOCALIZATION_INDEX).unwrap();
        fs::write(res_dir.join("aa/en"), LOCALIZED_STRINGS).unwrap();

        let index = root.join("resfileindex.txt");
        fs::write(
            &index,
            "res:/staticdata/starmapcache.pickle,aa/star\n\
             res:/localization/localization_fsd_main.pickle,aa/main\n\
             res:/localization/localization_fsd_en-us.pickle,aa/en\n",
        )
        .unwrap();

        ExtractArgs {
            index,
            res_dir,
            data_dir: Some(root.join("data")),
            workers: Some(2),
            progress: false,
        }
    }

    #[test]
    fn test_run_extracts_and_resolves_labels() {
        let temp_dir = tempfile::tempdir().unwrap();
        let args = write_client(temp_dir.path());

        handle(&args, None, &Config::default()).unwrap();

        let json_dir = temp_dir.path().join("data/json");
        let systems = fs::read_to_string(json_dir.join("system_labels.json")).unwrap();
        assert!(systems.contains("\"30000001\": \"Jita\""));
        assert!(json_dir.join("stellar_labels.json").is_file());
    }

    #[test]
    fn test_run_with_missing_catalog_dir_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let args = write_client(temp_dir.path());
        let elsewhere = temp_dir.path().join("no-catalogs");

        let err = handle(&args, Some(&elsewhere), &Config::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("starmapcache.json"));
        assert!(temp_dir.path().join("data/json/starmapcache.json").is_file());
    }
}
