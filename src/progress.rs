//! Progress-callback trait for per-image and per-group run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::RouteConfigBuilder::progress_callback`] to receive events
//! as the run routes each image and uploads each prefix group.
//!
//! Callers can forward events to a terminal progress bar, a channel or a log
//! without the library knowing how the host application reports progress.
//!
//! # Example
//!
//! ```rust
//! use scanroute::{RouteConfig, RunProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     routed: AtomicUsize,
//! }
//!
//! impl RunProgressCallback for CountingCallback {
//!     fn on_image_routed(&self, index: usize, total: usize, image: &Path, label: &str) {
//!         self.routed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {} → {}", index, total, image.display(), label);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { routed: AtomicUsize::new(0) });
//!
//! let config = RouteConfig::builder()
//!     .progress_callback(counter as Arc<dyn RunProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the run as it routes images and uploads groups.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in order from one task at a time, but
/// that task may hop threads between events, hence `Send + Sync`.
///
/// Image indices are 1-based positions in the source snapshot.
pub trait RunProgressCallback: Send + Sync {
    /// Called once the source folder has been snapshotted.
    ///
    /// # Arguments
    /// * `total_images` — regular files that will be classified
    fn on_batch_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called before an image is decoded.
    fn on_image_start(&self, index: usize, total: usize, image: &Path) {
        let _ = (index, total, image);
    }

    /// Called after an image has been moved into its label folder.
    fn on_image_routed(&self, index: usize, total: usize, image: &Path, label: &str) {
        let _ = (index, total, image, label);
    }

    /// Called when an image could not be routed; the batch continues.
    fn on_image_error(&self, index: usize, total: usize, image: &Path, error: &str) {
        let _ = (index, total, image, error);
    }

    /// Called once every image of the snapshot has been attempted.
    ///
    /// # Arguments
    /// * `total_images` — images attempted
    /// * `routed`       — images that reached a label folder
    fn on_batch_complete(&self, total_images: usize, routed: usize) {
        let _ = (total_images, routed);
    }

    /// Called before the first group is uploaded.
    ///
    /// # Arguments
    /// * `total_groups` — number of prefix groups
    /// * `total_files`  — files across all groups
    fn on_upload_start(&self, total_groups: usize, total_files: usize) {
        let _ = (total_groups, total_files);
    }

    /// Called before the form for `prefix` is located.
    fn on_group_start(&self, prefix: char, files: usize) {
        let _ = (prefix, files);
    }

    /// Called after a file has been submitted through its group's form.
    fn on_file_uploaded(&self, prefix: char, file: &Path) {
        let _ = (prefix, file);
    }

    /// Called when a group is abandoned; the next group still runs.
    fn on_group_error(&self, prefix: char, error: &str) {
        let _ = (prefix, error);
    }

    /// Called once every group has been attempted.
    ///
    /// # Arguments
    /// * `total_groups`    — groups attempted
    /// * `uploaded_files`  — files submitted without error
    fn on_upload_complete(&self, total_groups: usize, uploaded_files: usize) {
        let _ = (total_groups, uploaded_files);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RouteConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;
