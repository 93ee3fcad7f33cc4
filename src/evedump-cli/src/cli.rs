//! CLI argument definitions for evedump

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "evedump")]
#[command(about = "EVE client resource extraction and stellar labels", long_about = None)]
pub struct Cli {
    /// Config file (defaults to <config dir>/evedump/config.toml)
    #[arg(long, global = true, env = "EVEDUMP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy and decode every resource listed in the index
    #[command(visible_alias = "x")]
    Extract(ExtractArgs),

    /// Resolve solar system, constellation and region names
    #[command(visible_alias = "l")]
    Labels(LabelsArgs),

    /// Extract, then resolve labels from the freshly decoded catalogs
    Run {
        #[command(flatten)]
        extract: ExtractArgs,

        /// Catalog directory (defaults to <data-dir>/json)
        #[arg(long)]
        json_dir: Option<PathBuf>,
    },

    /// Decode a single pickle file to JSON
    #[command(visible_alias = "d")]
    Decode {
        /// Path to the .pickle file
        input: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },

    /// Report which files carry the SQLite header
    Sniff {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Resource index file
    #[arg(long, env = "RES_INDEX_FILE")]
    pub index: PathBuf,

    /// Root directory holding the indexed resource files
    #[arg(long, env = "RES_FILES_BASE_DIR")]
    pub res_dir: PathBuf,

    /// Output data directory (defaults to ./data)
    #[arg(long, env = "EVEDUMP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Worker threads (defaults to available parallelism)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Show a progress spinner
    #[arg(long)]
    pub progress: bool,
}

#[derive(Args)]
pub struct LabelsArgs {
    /// Data directory whose json/ holds the catalogs
    #[arg(long, env = "EVEDUMP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Catalog directory, also receives the label files (overrides --data-dir)
    #[arg(long)]
    pub json_dir: Option<PathBuf>,
}
