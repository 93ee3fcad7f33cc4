//! Single-file pickle decoding

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn handle(input: &Path, output: Option<&Path>, compact: bool) -> Result<()> {
    if let Some(output) = output {
        evedump::decode_to_json(input, output, !compact)?;
        println!("Decoded {} -> {}", input.display(), output.display());
        return Ok(());
    }

    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let value = evedump_pickle::decode(&data)
        .with_context(|| format!("Failed to decode {}", input.display()))?;

    let json = if compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_to_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("list.pickle");
        let output = temp_dir.path().join("list.json");
        fs::write(&input, b"\x80\x02]q\x00(K\x01K\x02e.").unwrap();

        handle(&input, Some(&output), true).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "[1,2]");
    }

    #[test]
    fn test_decode_failure_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("bad.pickle");
        fs::write(&input, b"\x80\x02").unwrap();

        let err = handle(&input, None, false).unwrap_err();
        assert!(err.to_string().contains("Failed to decode"));
    }
}
