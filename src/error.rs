//! Error types for the scanroute library.
//!
//! Three error types reflect three failure scopes:
//!
//! * [`ScanRouteError`] — **Fatal**: the run cannot proceed at all (missing
//!   source folder, no images, server unreachable). Returned as
//!   `Err(ScanRouteError)` from the top-level entry points.
//!
//! * [`ImageError`] — **Per image**: one scan could not be decoded,
//!   recognised, labelled or moved. Stored in
//!   [`crate::output::ImageOutcome`]; the batch carries on with the next image.
//!
//! * [`UploadError`] — **Per prefix group**: the form for one letter was
//!   missing or rejected a file. Stored in [`crate::output::GroupOutcome`];
//!   the remaining files of that group are abandoned and the next group runs.

use crate::output::RunReport;
use crate::pipeline::geometry::CropRegion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scanroute library.
///
/// Image-level and group-level failures use [`ImageError`] and
/// [`UploadError`] and are stored in the run reports instead.
#[derive(Debug, Error)]
pub enum ScanRouteError {
    // ── Source folder errors ──────────────────────────────────────────────
    /// The source folder does not exist.
    #[error("Source folder not found: '{path}'\nCheck the path exists.")]
    SourceNotFound { path: PathBuf },

    /// The source path exists but is a file.
    #[error("Source '{path}' is not a folder")]
    NotADirectory { path: PathBuf },

    /// Process does not have read permission on the folder.
    #[error("Permission denied reading '{path}'\nTry: chmod +rx {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Listing the folder failed part-way.
    #[error("Failed to list '{path}': {source}")]
    ListingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Batch outcome errors ──────────────────────────────────────────────
    /// The source folder held no regular files to classify.
    #[error("No images found in '{path}'")]
    NoImagesFound { path: PathBuf },

    /// Every image failed; nothing was routed.
    #[error("None of the {total} images could be routed.\nFirst error: {first_error}")]
    NoImagesRouted { total: usize, first_error: String },

    // ── Capability errors ─────────────────────────────────────────────────
    /// The text recognizer could not be set up.
    #[error("Text recognizer unavailable: {0}\nInstall tesseract or pass --tesseract <PATH>.")]
    RecognizerUnavailable(String),

    /// The local upload server never answered.
    #[error("Upload server at '{url}' is unreachable: {reason}\nStart it first or pass --server-cmd.")]
    ServerUnreachable { url: String, reason: String },

    /// The browser automation session could not be opened.
    #[error("WebDriver session at '{url}' could not be started: {reason}\nIs chromedriver running?")]
    WebDriverSession { url: String, reason: String },

    /// Routing and grouping finished, but the upload side could not be set
    /// up. `report` holds what the run did before that, with no upload part.
    #[error("{source}\nScans were routed and grouped; nothing was uploaded.")]
    UploadUnavailable {
        #[source]
        source: Box<ScanRouteError>,
        report: Box<RunReport>,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// The batch continues with the next image whatever the variant.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ImageError {
    /// The file is not a decodable image.
    #[error("{path:?}: not a readable image: {detail}")]
    Decode { path: PathBuf, detail: String },

    /// The crop region falls outside the image.
    #[error("{path:?}: crop region {region} lies outside the {width}x{height} image")]
    Geometry {
        path: PathBuf,
        region: CropRegion,
        width: u32,
        height: u32,
    },

    /// The recognizer failed or produced no text at all.
    #[error("{path:?}: text recognition failed: {detail}")]
    Recognition { path: PathBuf, detail: String },

    /// No recognized element had two or three words.
    #[error("{path:?}: no two- or three-word label among {candidates} recognized lines")]
    LabelNotFound { path: PathBuf, candidates: usize },

    /// The label cannot be used as a folder name.
    #[error("{path:?}: label {label:?} is not a safe folder name")]
    UnsafeLabel { path: PathBuf, label: String },

    /// Folder creation or the move itself failed.
    #[error("{path:?}: could not move into {target:?}: {detail}")]
    Route {
        path: PathBuf,
        target: PathBuf,
        detail: String,
    },
}

impl ImageError {
    /// Path of the image the error is about.
    pub fn path(&self) -> &PathBuf {
        match self {
            ImageError::Decode { path, .. }
            | ImageError::Geometry { path, .. }
            | ImageError::Recognition { path, .. }
            | ImageError::LabelNotFound { path, .. }
            | ImageError::UnsafeLabel { path, .. }
            | ImageError::Route { path, .. } => path,
        }
    }
}

/// A non-fatal error for one prefix group during upload.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum UploadError {
    /// No form matches the prefix.
    #[error("Group {prefix}: no upload form found: {detail}")]
    TargetMissing { prefix: char, detail: String },

    /// Setting the file input or pressing submit failed.
    #[error("Group {prefix}: upload of {file:?} failed: {detail}")]
    Action {
        prefix: char,
        file: PathBuf,
        detail: String,
    },
}
