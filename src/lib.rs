//! # scanroute
//!
//! Sort scanned documents into folders by the name printed on them, then
//! upload each folder through a local web form.
//!
//! ## Why this crate?
//!
//! Batches of scans arrive with the holder's name printed in a fixed band near
//! the bottom of every page. Sorting them by hand is slow and error-prone.
//! This crate reads that band with OCR, moves every scan into a folder named
//! after the holder, and then feeds the folders to the upload page letter by
//! letter.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source folder
//!  │
//!  ├─ 1. Snapshot   list regular files once, before anything moves
//!  ├─ 2. Crop       label band derived from each image's height
//!  ├─ 3. Normalize  grey + threshold to a binary mask (spawn_blocking)
//!  ├─ 4. Recognize  tesseract, restricted to letters, digits and space
//!  ├─ 5. Label      first line of two or three words → "First Last"
//!  ├─ 6. Route      move into <source>/<Label>/
//!  │       ── barrier: every image attempted ──
//!  ├─ 7. Group      label folders bucketed by upper-cased first letter
//!  └─ 8. Upload     one web form per letter, driven over WebDriver
//! ```
//!
//! A scan that cannot be labelled stays where it is and is listed in the
//! report; the rest of the batch carries on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanroute::{run, RouteConfig, TesseractRecognizer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RouteConfig::builder().skip_upload(true).build()?;
//!     let recognizer = Arc::new(TesseractRecognizer::locate_async(&config).await?);
//!     let report = run("img", recognizer, &config).await?;
//!     eprintln!(
//!         "routed {}/{} scans into {} prefix groups",
//!         report.batch.stats.routed_images,
//!         report.batch.stats.total_images,
//!         report.groups.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scanroute` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! scanroute = { version = "0.1", default-features = false }
//! ```
//!
//! ## External programs
//!
//! | Program | Needed for | Located via |
//! |---------|-----------|-------------|
//! | `tesseract` | recognition | `TESSERACT_PATH`, `PATH`, usual install dirs |
//! | chromedriver | uploads | [`RouteConfig::webdriver_url`] |
//! | upload server | uploads | [`RouteConfig::server_url`], optionally started by [`RouteConfig::server_command`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod browser;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run;
pub mod server;
pub mod stream;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use browser::WebDriverSession;
pub use config::{IntensityBand, Rotation, RouteConfig, RouteConfigBuilder};
pub use error::{ImageError, ScanRouteError, UploadError};
pub use output::{
    BatchReport, BatchStats, GroupOutcome, ImageOutcome, LabelPreview, RunReport, UploadReport,
    UploadStats,
};
pub use pipeline::geometry::{CropBands, CropRegion};
pub use pipeline::group::{group_by_prefix, group_folder, FolderGroup};
pub use pipeline::label::{extract_label, Label};
pub use pipeline::recognize::{
    RecognitionOptions, RecognizeError, TesseractRecognizer, TextRecognizer,
};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use run::{inspect, route_folder, run, run_sync, run_with_locator};
pub use stream::{route_stream, OutcomeStream};
pub use upload::{upload_groups, DriverError, FormHandle, FormLocator};
