//! Source scanning: snapshot the images to route before anything moves.
//!
//! The router creates label folders inside the very folder being processed.
//! Listing it once up front, and keeping only regular files, means the loop
//! never sees those new folders and never re-reads a directory it is mutating.

use crate::error::ScanRouteError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The regular files found directly under a source folder.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    root: PathBuf,
    images: Vec<PathBuf>,
    skipped_dirs: usize,
}

impl SourceSnapshot {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    /// Folders present at snapshot time (earlier routing targets or pre-existing).
    pub fn skipped_dirs(&self) -> usize {
        self.skipped_dirs
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Validate `path` as a readable folder.
pub fn resolve_source(path: &Path) -> Result<PathBuf, ScanRouteError> {
    if !path.exists() {
        return Err(ScanRouteError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(ScanRouteError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

/// List the immediate children of `path` and keep the regular files.
///
/// Entries are sorted by file name so reports are stable between runs.
pub fn snapshot_source(path: &Path) -> Result<SourceSnapshot, ScanRouteError> {
    let root = resolve_source(path)?;

    let entries = std::fs::read_dir(&root).map_err(|e| listing_error(&root, e))?;

    let mut images = Vec::new();
    let mut skipped_dirs = 0;
    for entry in entries {
        let entry = entry.map_err(|e| listing_error(&root, e))?;
        let entry_path = entry.path();
        if entry_path.is_file() {
            images.push(entry_path);
        } else if entry_path.is_dir() {
            skipped_dirs += 1;
        }
    }
    images.sort();

    debug!(
        "Snapshot of {}: {} files, {} folders skipped",
        root.display(),
        images.len(),
        skipped_dirs
    );

    Ok(SourceSnapshot {
        root,
        images,
        skipped_dirs,
    })
}

fn listing_error(path: &Path, e: std::io::Error) -> ScanRouteError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ScanRouteError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        ScanRouteError::ListingFailed {
            path: path.to_path_buf(),
            source: e,
        }
    }
}
