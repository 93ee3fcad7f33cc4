//! Resource index (manifest) parsing
//!
//! Each line of the resource index maps a packaged resource path to the file
//! that holds its bytes under the shared resource cache:
//!
//! ```text
//! res:/dx9/model/ship.gr2,4a/4a1b2c_d3e4,5f0c...,1024,512
//! ```
//!
//! Only the leading fields matter here: the virtual directory, the file stem,
//! the declared type (the last extension), and the `{dir}/{file}` location
//! under the cache root. Anything after that is ignored.

use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<respath>.*?)(?P<filename>[^/|,]+)\.(?P<filetype>[A-Za-z0-9_]+),(?P<source>[^/,|]+/[^/,|]+)(?P<trailing>[,|].*)?$",
    )
    .expect("manifest line pattern is valid")
});

/// Scheme prefix carried by virtual resource paths
pub const RES_SCHEME: &str = "res:";

/// One parsed manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Virtual directory prefix, scheme included (e.g. `res:/dx9/model/`)
    pub respath: String,
    /// File stem without the declared type
    pub filename: String,
    /// Declared type tag (the final extension)
    pub filetype: String,
    /// Location under the source asset root
    pub source_relative_path: String,
}

/// Materialization category selected by a manifest entry's declared type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetCategory {
    Static,
    Schema,
    BinaryFormat,
    SerializedBlob,
    Other(String),
}

impl AssetCategory {
    /// Classify by exact match on the declared type
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "static" => AssetCategory::Static,
            "schema" => AssetCategory::Schema,
            "fsdbinary" => AssetCategory::BinaryFormat,
            "pickle" => AssetCategory::SerializedBlob,
            other => AssetCategory::Other(other.to_string()),
        }
    }

    /// The manifest tag this category was selected by
    pub fn tag(&self) -> &str {
        match self {
            AssetCategory::Static => "static",
            AssetCategory::Schema => "schema",
            AssetCategory::BinaryFormat => "fsdbinary",
            AssetCategory::SerializedBlob => "pickle",
            AssetCategory::Other(raw) => raw,
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl ManifestEntry {
    pub fn category(&self) -> AssetCategory {
        AssetCategory::from_tag(&self.filetype)
    }

    /// Relative directory for raw copies: the respath without its scheme
    ///
    /// Empty, `.` and `..` components are dropped so the result can never
    /// climb out of the directory it is joined onto.
    pub fn raw_subdir(&self) -> PathBuf {
        let path = self
            .respath
            .strip_prefix(RES_SCHEME)
            .unwrap_or(&self.respath);

        path.split(['/', '|', '\\'])
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .collect()
    }
}

/// Parse one manifest line; lines that do not match yield `None`
pub fn parse_line(line: &str) -> Option<ManifestEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let caps = LINE_PATTERN.captures(line)?;

    Some(ManifestEntry {
        respath: caps["respath"].to_string(),
        filename: caps["filename"].to_string(),
        filetype: caps["filetype"].to_string(),
        source_relative_path: caps["source"].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_index_line() {
        let entry =
            parse_line("res:/dx9/model/ship.gr2,4a/4a1b2c_d3e4,5f0cabc,1024,512").unwrap();
        assert_eq!(entry.respath, "res:/dx9/model/");
        assert_eq!(entry.filename, "ship");
        assert_eq!(entry.filetype, "gr2");
        assert_eq!(entry.source_relative_path, "4a/4a1b2c_d3e4");
    }

    #[test]
    fn test_parse_pipe_delimited_line() {
        let entry = parse_line("res:|Foo.static,ccp_resources/Foo|").unwrap();
        assert_eq!(entry.respath, "res:|");
        assert_eq!(entry.filename, "Foo");
        assert_eq!(entry.filetype, "static");
        assert_eq!(entry.source_relative_path, "ccp_resources/Foo");
    }

    #[test]
    fn test_parse_without_trailing_segment() {
        let entry = parse_line("res:/staticdata/types.fsdbinary,ab/abcdef\r").unwrap();
        assert_eq!(entry.filename, "types");
        assert_eq!(entry.category(), AssetCategory::BinaryFormat);
    }

    #[test]
    fn test_last_dot_splits_type() {
        let entry = parse_line("res:/ui/icon.64.png,aa/bb").unwrap();
        assert_eq!(entry.filename, "icon.64");
        assert_eq!(entry.filetype, "png");
    }

    #[test]
    fn test_non_matching_lines() {
        assert!(parse_line("").is_none());
        assert!(parse_line("# comment").is_none());
        assert!(parse_line("res:/no/extension,aa/bb").is_none());
        assert!(parse_line("res:/file.txt,nosubdir").is_none());
        assert!(parse_line("res:/file.txt;aa/bb").is_none());
    }

    #[test]
    fn test_category_from_tag() {
        assert_eq!(AssetCategory::from_tag("static"), AssetCategory::Static);
        assert_eq!(AssetCategory::from_tag("schema"), AssetCategory::Schema);
        assert_eq!(AssetCategory::from_tag("fsdbinary"), AssetCategory::BinaryFormat);
        assert_eq!(AssetCategory::from_tag("pickle"), AssetCategory::SerializedBlob);
        assert_eq!(
            AssetCategory::from_tag("Static"),
            AssetCategory::Other("Static".to_string())
        );
        assert_eq!(AssetCategory::from_tag("png").tag(), "png");
    }

    #[test]
    fn test_raw_subdir() {
        let entry = parse_line("res:/ui/texture/icons/1_64_1.png,e2/e2c1_f0f7,0,1,1").unwrap();
        assert_eq!(entry.raw_subdir(), Path::new("ui/texture/icons"));

        let entry = parse_line("res:/../../etc/./passwd.txt,aa/bb").unwrap();
        assert_eq!(entry.raw_subdir(), Path::new("etc"));

        let entry = parse_line("Foo.static,aa/bb").unwrap();
        assert_eq!(entry.raw_subdir(), PathBuf::new());
    }
}
