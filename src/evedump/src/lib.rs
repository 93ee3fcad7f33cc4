//! Resource index extraction and stellar label resolution
//!
//! Two passes over a game client's packaged data:
//!
//! - **Extraction**: [`Router`] streams the resource index, parses each line
//!   into a [`ManifestEntry`], and hands it to the [`Materializer`], which
//!   copies the file into a per-category directory under the data directory.
//!   `.static` databases get a second copy under `sqlite/`, and pickled blobs
//!   are decoded to JSON under `json/`.
//! - **Labels**: [`labels::generate`] joins the decoded galaxy map and
//!   localization tables into ID-to-name maps for solar systems,
//!   constellations and regions.
//!
//! ```no_run
//! use evedump::{Materializer, OutputLayout, Router};
//! use std::path::Path;
//!
//! let materializer = Materializer::new(OutputLayout::new("data"), "/eve/ResFiles");
//! let summary = Router::new(materializer)
//!     .with_workers(8)
//!     .run_file(Path::new("/eve/resfileindex.txt"))?;
//! println!("{} entries", summary.processed);
//! # Ok::<(), evedump::RouterError>(())
//! ```

pub mod labels;
pub mod layout;
pub mod manifest;
pub mod materialize;
pub mod router;
pub mod sniff;

pub use layout::OutputLayout;
pub use manifest::{parse_line, AssetCategory, ManifestEntry};
pub use materialize::{decode_to_json, FollowUp, MaterializeError, Materialized, Materializer};
pub use router::{Router, RouterError, RunSummary};
pub use sniff::{is_sqlite, sniff_file};
