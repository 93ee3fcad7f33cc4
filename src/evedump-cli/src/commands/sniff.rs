//! SQLite header check for arbitrary files

use anyhow::Result;
use std::path::PathBuf;

/// Print a verdict per file; returns how many were SQLite databases
pub fn handle(files: &[PathBuf]) -> Result<usize> {
    let mut matched = 0;
    for path in files {
        let is_sqlite = evedump::sniff_file(path);
        if is_sqlite {
            matched += 1;
        }
        println!(
            "{}: {}",
            path.display(),
            if is_sqlite { "sqlite" } else { "not sqlite" }
        );
    }

    println!("{}/{} files are SQLite databases", matched, files.len());
    Ok(matched)
}
