//! Resource index extraction

use anyhow::{bail, Context, Result};
use evedump::{Materializer, OutputLayout, Router, RunSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::ExtractArgs;
use crate::config::Config;

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} entries {msg}")
            .context("Invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

/// Run extraction and print the summary; returns the data directory used
pub fn handle(args: &ExtractArgs, config: &Config) -> Result<PathBuf> {
    if !args.res_dir.is_dir() {
        bail!(
            "Resource directory {} does not exist or is not a directory",
            args.res_dir.display()
        );
    }

    let data_dir = config.data_dir(args.data_dir.as_deref());
    let materializer = Materializer::new(OutputLayout::new(&data_dir), &args.res_dir);

    let mut router = Router::new(materializer);
    if let Some(workers) = config.workers(args.workers) {
        router = router.with_workers(workers);
    }
    if args.progress {
        router = router.with_progress(spinner()?);
    }

    let summary = router
        .run_file(&args.index)
        .with_context(|| format!("Extraction from {} failed", args.index.display()))?;

    print_summary(&summary);
    Ok(data_dir)
}

fn print_summary(summary: &RunSummary) {
    println!("Lines read:      {}", summary.lines_read);
    println!("Entries:         {}", summary.processed);
    for (category, count) in &summary.by_category {
        println!("  {:<14} {}", category, count);
    }
    println!("Failed:          {}", summary.failed);
    println!(
        "Pickles:         {} found, {} decoded, {} failed",
        summary.pickles_found, summary.decoded, summary.decode_failed
    );
    println!(
        "SQLite:          {} found, {} copy failures",
        summary.sqlite_found, summary.sqlite_failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_extract_into_configured_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let res_dir = temp_dir.path().join("ResFiles");
        fs::create_dir_all(res_dir.join("ab")).unwrap();
        fs::write(res_dir.join("ab/abcd"), b"schema").unwrap();
        let index = temp_dir.path().join("resfileindex.txt");
        fs::write(&index, "res:/staticdata/types.schema,ab/abcd,x,1,1\n").unwrap();

        let args = ExtractArgs {
            index,
            res_dir,
            data_dir: Some(temp_dir.path().join("out")),
            workers: Some(1),
            progress: false,
        };

        let data_dir = handle(&args, &Config::default()).unwrap();
        assert_eq!(data_dir, temp_dir.path().join("out"));
        assert!(data_dir.join("schema/types.schema").is_file());
    }

    #[test]
    fn test_missing_index_is_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let args = ExtractArgs {
            index: temp_dir.path().join("missing.txt"),
            res_dir: temp_dir.path().to_path_buf(),
            data_dir: Some(temp_dir.path().join("out")),
            workers: None,
            progress: false,
        };

        let err = handle(&args, &Config::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open manifest"));
    }

    #[test]
    fn test_missing_res_dir_is_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let args = ExtractArgs {
            index: temp_dir.path().join("resfileindex.txt"),
            res_dir: temp_dir.path().join("nope"),
            data_dir: None,
            workers: None,
            progress: false,
        };

        assert!(handle(&args, &Config::default()).is_err());
    }
}
