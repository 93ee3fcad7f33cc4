//! Stellar label resolution

use anyhow::{Context, Result};
use evedump::labels::{self, ObjectKind, ResolutionReport};
use evedump::OutputLayout;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Unrecognized path tags listed in the summary
const TOP_TAGS: usize = 10;

/// Explicit catalog directory, else `json/` under the data directory
pub fn json_dir(json_dir: Option<&Path>, data_dir: &Path) -> PathBuf {
    json_dir.map_or_else(|| OutputLayout::new(data_dir).json(), Path::to_path_buf)
}

pub fn handle(dir: &Path, config: &Config) -> Result<()> {
    let (resolution, written) = labels::generate(dir, &config.catalog_files(), &config.path_tags())
        .with_context(|| format!("Label resolution in {} failed", dir.display()))?;

    print_report(&resolution.report);
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn print_report(report: &ResolutionReport) {
    for kind in ObjectKind::ALL {
        println!(
            "{:<15} {} discovered, {} indexed, {} named",
            kind.plural(),
            report.discovered.get(kind),
            report.indexed.get(kind),
            report.resolved.get(kind)
        );
    }
    println!("Bad labels:     {}", report.bad_suffix);
    println!("Unknown IDs:    {}", report.undiscovered);
    println!("Missing text:   {}", report.missing_strings);
    println!("Null names:     {}", report.null_names);

    if report.unrecognized_tags.is_empty() {
        return;
    }

    let mut tags: Vec<_> = report.unrecognized_tags.iter().collect();
    tags.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    println!("Unrecognized path tags: {}", tags.len());
    for (tag, count) in tags.into_iter().take(TOP_TAGS) {
        println!("  {:<30} {}", tag, count);
    }
}
