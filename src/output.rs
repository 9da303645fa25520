//! Result types produced by a run.
//!
//! Every report is `Serialize` so the CLI can print it with `--json` and
//! library callers can persist it. Per-image and per-group failures live
//! inside these reports; only fatal errors escape as `Err`.

use crate::error::{ImageError, UploadError};
use crate::pipeline::group::FolderGroup;
use crate::pipeline::label::Label;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageOutcome {
    /// 1-based position in the source snapshot.
    pub index: usize,

    /// Path the image had when the snapshot was taken.
    pub source: PathBuf,

    /// Extracted label, when extraction got that far.
    pub label: Option<Label>,

    /// Where the image now lives. None if it was not moved.
    pub destination: Option<PathBuf>,

    /// Wall-clock time spent on this image.
    pub duration_ms: u64,

    /// Why the image was left in place.
    pub error: Option<ImageError>,
}

impl ImageOutcome {
    pub fn is_routed(&self) -> bool {
        self.error.is_none() && self.destination.is_some()
    }
}

/// Counters for the routing phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Regular files in the snapshot.
    pub total_images: usize,
    pub routed_images: usize,
    pub failed_images: usize,
    /// Folders that existed in the source before routing started.
    pub skipped_dirs: usize,
    /// Distinct label folders written to during this run.
    pub label_folders: usize,
    pub duration_ms: u64,
}

/// Outcome of routing one source folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub source: PathBuf,
    /// One entry per snapshot image, in snapshot order.
    pub images: Vec<ImageOutcome>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &ImageOutcome> {
        self.images.iter().filter(|o| o.error.is_some())
    }
}

/// What happened to one prefix group during upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub prefix: char,
    /// Files in the group.
    pub attempted: usize,
    /// Files submitted before the group finished or was abandoned.
    pub uploaded: Vec<PathBuf>,
    pub error: Option<UploadError>,
}

impl GroupOutcome {
    /// Files never submitted because the group was abandoned.
    pub fn skipped(&self) -> usize {
        self.attempted - self.uploaded.len()
    }
}

/// Counters for the upload phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStats {
    pub total_groups: usize,
    pub failed_groups: usize,
    pub total_files: usize,
    pub uploaded_files: usize,
    pub duration_ms: u64,
}

/// Outcome of uploading every prefix group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadReport {
    /// One entry per group, in prefix order.
    pub groups: Vec<GroupOutcome>,
    pub stats: UploadStats,
}

impl UploadReport {
    pub fn failures(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.groups.iter().filter(|g| g.error.is_some())
    }
}

/// Everything a full run did, phase by phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub batch: BatchReport,
    pub groups: FolderGroup,
    /// None when uploads were skipped.
    pub upload: Option<UploadReport>,
}

/// Dry-run result for one image: what it would be routed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelPreview {
    pub source: PathBuf,
    /// Recognized lines, in recognizer order.
    pub lines: Vec<String>,
    pub label: Option<Label>,
    pub error: Option<ImageError>,
}
