//! Manifest-driven dispatch over a bounded worker pool

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::ProgressBar;
use rayon::iter::{ParallelBridge, ParallelIterator};

use crate::manifest::{self, AssetCategory};
use crate::materialize::{FollowUp, Materializer};

/// Matched entries between progress log lines
pub const PROGRESS_INTERVAL: u64 = 1000;

#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("Failed to create output directory {}: {source}", path.display())]
    CreateLayout { path: PathBuf, source: io::Error },

    #[error("Failed to open manifest {}: {source}", path.display())]
    OpenManifest { path: PathBuf, source: io::Error },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Counters for one extraction run
///
/// Workers fold their own summaries and the results are merged, so there is
/// no shared mutable state beyond the progress counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lines_read: u64,
    /// Lines that matched the manifest pattern
    pub processed: u64,
    /// Entries whose primary copy failed
    pub failed: u64,
    /// Matched entries per category directory
    pub by_category: BTreeMap<String, u64>,
    pub pickles_found: u64,
    pub decoded: u64,
    pub decode_failed: u64,
    /// `.static` resources carrying the SQLite header
    pub sqlite_found: u64,
    pub sqlite_failed: u64,
}

/// What happened to a single manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Skipped,
    Materialized {
        category: AssetCategory,
        follow_up: FollowUp,
    },
    Failed(AssetCategory),
}

/// Summary key for a category; every `Other` type shares the raw bucket
pub fn category_key(category: &AssetCategory) -> &'static str {
    match category {
        AssetCategory::Static => "static",
        AssetCategory::Schema => "schema",
        AssetCategory::BinaryFormat => "fsdbinary",
        AssetCategory::SerializedBlob => "pickle",
        AssetCategory::Other(_) => "raw",
    }
}

impl RunSummary {
    pub fn absorb(&mut self, outcome: LineOutcome) {
        self.lines_read += 1;
        match outcome {
            LineOutcome::Skipped => {}
            LineOutcome::Materialized {
                category,
                follow_up,
            } => {
                self.count(&category);
                match follow_up {
                    FollowUp::None | FollowUp::SqliteNotMatched => {}
                    FollowUp::SqliteCopied => self.sqlite_found += 1,
                    FollowUp::SqliteFailed => {
                        self.sqlite_found += 1;
                        self.sqlite_failed += 1;
                    }
                    FollowUp::Decoded => self.decoded += 1,
                    FollowUp::DecodeFailed => self.decode_failed += 1,
                }
            }
            LineOutcome::Failed(category) => {
                self.count(&category);
                self.failed += 1;
            }
        }
    }

    fn count(&mut self, category: &AssetCategory) {
        self.processed += 1;
        if *category == AssetCategory::SerializedBlob {
            self.pickles_found += 1;
        }
        *self
            .by_category
            .entry(category_key(category).to_string())
            .or_default() += 1;
    }

    #[must_use]
    pub fn merge(mut self, other: RunSummary) -> RunSummary {
        self.lines_read += other.lines_read;
        self.processed += other.processed;
        self.failed += other.failed;
        self.pickles_found += other.pickles_found;
        self.decoded += other.decoded;
        self.decode_failed += other.decode_failed;
        self.sqlite_found += other.sqlite_found;
        self.sqlite_failed += other.sqlite_failed;
        for (key, count) in other.by_category {
            *self.by_category.entry(key).or_default() += count;
        }
        self
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Streams manifest lines through the materializer
pub struct Router {
    materializer: Materializer,
    workers: usize,
    progress: ProgressBar,
}

impl Router {
    pub fn new(materializer: Materializer) -> Self {
        Self {
            materializer,
            workers: default_workers(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Fix the pool size; zero is treated as one
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Attach a progress bar ticked once per matched entry
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Open a manifest file and run it
    pub fn run_file(&self, path: &Path) -> Result<RunSummary, RouterError> {
        let file = File::open(path).map_err(|source| RouterError::OpenManifest {
            path: path.to_path_buf(),
            source,
        })?;
        self.run(BufReader::new(file))
    }

    /// Process every line of the manifest and return the merged summary
    ///
    /// Returns once the stream is drained and every worker is idle. A read
    /// error ends the stream early; the lines handled before it still count.
    pub fn run<R: BufRead + Send>(&self, reader: R) -> Result<RunSummary, RouterError> {
        self.materializer
            .layout()
            .create_all()
            .map_err(|(path, source)| RouterError::CreateLayout { path, source })?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("evedump-worker-{}", i))
            .build()?;

        tracing::info!(
            "Extracting into {} with {} workers",
            self.materializer.layout().root().display(),
            self.workers
        );

        let matched = AtomicU64::new(0);
        let summary = pool.install(|| {
            reader
                .split(b'\n')
                .map_while(|line| match line {
                    Ok(line) => Some(line),
                    Err(e) => {
                        tracing::error!("Manifest read failed, stopping: {}", e);
                        None
                    }
                })
                .par_bridge()
                .map(|line| self.handle_line(&line, &matched))
                .fold(RunSummary::default, |mut summary, outcome| {
                    summary.absorb(outcome);
                    summary
                })
                .reduce(RunSummary::default, RunSummary::merge)
        });

        self.progress.finish_and_clear();
        tracing::info!(
            "Processed {} entries ({} failed), {} pickles found, {} decoded",
            summary.processed,
            summary.failed,
            summary.pickles_found,
            summary.decoded
        );

        Ok(summary)
    }

    fn handle_line(&self, line: &[u8], matched: &AtomicU64) -> LineOutcome {
        let line = String::from_utf8_lossy(line);
        let Some(entry) = manifest::parse_line(&line) else {
            return LineOutcome::Skipped;
        };

        let n = matched.fetch_add(1, Ordering::Relaxed) + 1;
        if n % PROGRESS_INTERVAL == 0 {
            tracing::info!("Processed {} entries", n);
        }
        self.progress.inc(1);

        match self.materializer.materialize(&entry) {
            Ok(done) => LineOutcome::Materialized {
                category: done.category,
                follow_up: done.follow_up,
            },
            Err(e) => {
                tracing::error!("Failed to materialize {}: {}", entry.filename, e);
                LineOutcome::Failed(entry.category())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::OutputLayout;
    use crate::sniff::SQLITE_MAGIC;
    use std::fs;
    use std::io::{Cursor, Read};

    struct Fixture {
        temp: tempfile::TempDir,
        router: Router,
    }

    impl Fixture {
        fn source(&self, relative: &str, content: &[u8]) {
            let path = self.temp.path().join("res").join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn data(&self) -> PathBuf {
            self.temp.path().join("data")
        }
    }

    fn fixture(workers: usize) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(temp.path().join("data"));
        let materializer = Materializer::new(layout, temp.path().join("res"));
        Fixture {
            router: Router::new(materializer).with_workers(workers),
            temp,
        }
    }

    fn sample_manifest(fx: &Fixture) -> String {
        let mut db = SQLITE_MAGIC.to_vec();
        db.extend_from_slice(b"pages");
        fx.source("ccp_resources/Foo", &db);
        fx.source("aa/plain", b"plain static");
        fx.source("bb/schema", b"schema");
        fx.source("cc/fsd", b"fsd");
        fx.source("dd/pickle", b"\x80\x02]q\x00(K\x01K\x02e.");
        fx.source("ee/icon", b"png");

        [
            "res:|Foo.static,ccp_resources/Foo|",
            "res:/staticdata/plain.static,aa/plain,x,1,1",
            "# not an entry",
            "res:/staticdata/types.schema,bb/schema",
            "res:/staticdata/types.fsdbinary,cc/fsd",
            "",
            "res:/staticdata/starmapcache.pickle,dd/pickle,x,1,1",
            "res:/ui/icons/icon.png,ee/icon\r",
        ]
        .join("\n")
    }

    #[test]
    fn test_run_counts_and_outputs() {
        let fx = fixture(2);
        let manifest = sample_manifest(&fx);

        let summary = fx.router.run(Cursor::new(manifest)).unwrap();

        assert_eq!(summary.lines_read, 8);
        assert_eq!(summary.processed, 6);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.by_category["static"], 2);
        assert_eq!(summary.by_category["raw"], 1);
        assert_eq!(summary.pickles_found, 1);
        assert_eq!(summary.decoded, 1);
        assert_eq!(summary.sqlite_found, 1);

        let data = fx.data();
        assert!(data.join("static/Foo.static").is_file());
        assert!(data.join("sqlite/Foo.sqlite").is_file());
        assert!(!data.join("sqlite/plain.sqlite").exists());
        assert!(data.join("schema/types.schema").is_file());
        assert!(data.join("fsdbinary/types.fsdbinary").is_file());
        assert!(data.join("pickle/starmapcache.pickle").is_file());
        assert!(data.join("raw/ui/icons/icon.png").is_file());

        let json = fs::read_to_string(data.join("json/starmapcache.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let fx = fixture(3);
        let manifest = sample_manifest(&fx);

        let first = fx.router.run(Cursor::new(manifest.clone())).unwrap();
        let files_after_first = list_files(&fx.data());
        let second = fx.router.run(Cursor::new(manifest)).unwrap();

        assert_eq!(first, second);
        assert_eq!(files_after_first, list_files(&fx.data()));
    }

    #[test]
    fn test_non_matching_lines_do_nothing() {
        let fx = fixture(1);
        let manifest: &[u8] = b"garbage\nres:/noext,aa/bb\n\xff\xfe\n";

        let summary = fx.router.run(Cursor::new(manifest)).unwrap();

        assert_eq!(summary.lines_read, 3);
        assert_eq!(summary.processed, 0);
        assert!(summary.by_category.is_empty());
        assert!(list_files(&fx.data()).is_empty());
    }

    #[test]
    fn test_missing_source_is_counted() {
        let fx = fixture(2);
        fx.source("aa/ok", b"ok");
        let manifest = "res:/a/ok.schema,aa/ok\nres:/a/gone.schema,aa/gone\n";

        let summary = fx.router.run(Cursor::new(manifest)).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        assert!(fx.data().join("schema/ok.schema").is_file());
    }

    #[test]
    fn test_read_error_keeps_partial_summary() {
        struct Failing(Cursor<&'static [u8]>);

        impl Read for Failing {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                match self.0.read(buf)? {
                    0 => Err(io::Error::other("disk went away")),
                    n => Ok(n),
                }
            }
        }

        let fx = fixture(1);
        fx.source("aa/ok", b"ok");
        let reader = BufReader::new(Failing(Cursor::new(&b"res:/a/ok.schema,aa/ok\n"[..])));

        let summary = fx.router.run(reader).unwrap();
        assert_eq!(summary.processed, 1);
    }

    #[test]
    fn test_run_file_missing_manifest() {
        let fx = fixture(1);
        let err = fx
            .router
            .run_file(&fx.temp.path().join("resfileindex.txt"))
            .unwrap_err();
        assert!(matches!(err, RouterError::OpenManifest { .. }));
    }

    #[test]
    fn test_blocked_layout_is_fatal() {
        let fx = fixture(1);
        fs::write(fx.data(), b"file where the data dir should be").unwrap();
        let err = fx.router.run(Cursor::new("")).unwrap_err();
        assert!(matches!(err, RouterError::CreateLayout { .. }));
    }

    #[test]
    fn test_summary_merge() {
        let mut a = RunSummary::default();
        a.absorb(LineOutcome::Skipped);
        a.absorb(LineOutcome::Materialized {
            category: AssetCategory::Static,
            follow_up: FollowUp::SqliteFailed,
        });

        let mut b = RunSummary::default();
        b.absorb(LineOutcome::Failed(AssetCategory::SerializedBlob));
        b.absorb(LineOutcome::Materialized {
            category: AssetCategory::Static,
            follow_up: FollowUp::SqliteNotMatched,
        });

        let merged = a.merge(b);
        assert_eq!(merged.lines_read, 4);
        assert_eq!(merged.processed, 3);
        assert_eq!(merged.failed, 1);
        assert_eq!(merged.pickles_found, 1);
        assert_eq!(merged.sqlite_found, 1);
        assert_eq!(merged.sqlite_failed, 1);
        assert_eq!(merged.by_category["static"], 2);
        assert_eq!(merged.by_category["pickle"], 1);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let fx = fixture(0);
        assert_eq!(fx.router.workers(), 1);
    }

    fn list_files(root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }
}
