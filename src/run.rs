//! Run entry points: route a folder, then group and upload the result.
//!
//! A run has three phases with a hard barrier between routing and grouping:
//!
//! ```text
//! Phase 1  route_folder   snapshot → per image: normalize → recognize → label → move
//!    │                    (returns only after every image has been attempted)
//! Phase 2  group_folder   list label folders → prefix groups
//! Phase 3  upload_groups  one form per prefix, files in order
//! ```
//!
//! Phase 1 works image by image. Decoding and recognition block, so each
//! image runs on the blocking pool, but images are awaited strictly one at a
//! time: the next image starts only after the previous move has finished.
//! Use [`crate::stream::route_stream`] to observe outcomes as they happen.

use crate::browser::WebDriverSession;
use crate::config::RouteConfig;
use crate::error::{ImageError, ScanRouteError};
use crate::output::{BatchReport, BatchStats, ImageOutcome, LabelPreview, RunReport, UploadReport};
use crate::pipeline::group::{group_folder, FolderGroup};
use crate::pipeline::label::{extract_label, Label};
use crate::pipeline::normalize::normalize_file;
use crate::pipeline::recognize::{RecognitionOptions, TextRecognizer};
use crate::pipeline::route::route_image;
use crate::pipeline::scan::{snapshot_source, SourceSnapshot};
use crate::server;
use crate::upload::{upload_groups, FormLocator};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Route every image directly inside `source` into its label folder.
///
/// # Returns
/// `Ok(BatchReport)` when at least one image was routed, even if others
/// failed (check `report.stats.failed_images`).
///
/// # Errors
/// Returns `Err(ScanRouteError)` only for fatal errors:
/// - Source folder missing, not a folder, or unreadable
/// - No regular files in the folder
/// - Every image failed
pub async fn route_folder(
    source: impl AsRef<Path>,
    recognizer: Arc<dyn TextRecognizer>,
    config: &RouteConfig,
) -> Result<BatchReport, ScanRouteError> {
    let start = Instant::now();
    let source = source.as_ref();
    info!("Routing images in {}", source.display());

    // ── Step 1: Snapshot before anything moves ───────────────────────────
    let snapshot = snapshot_non_empty(source)?;
    let total = snapshot.images().len();
    info!("Found {} images", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    // ── Step 2: One image at a time ──────────────────────────────────────
    let job = BatchJob::new(&snapshot, recognizer, config);
    let mut images = Vec::with_capacity(total);
    for (i, image) in snapshot.images().iter().enumerate() {
        images.push(job.process(i + 1, image.clone()).await?);
    }

    // ── Step 3: Stats ────────────────────────────────────────────────────
    let routed = images.iter().filter(|o| o.is_routed()).count();
    if routed == 0 {
        let first_error = images
            .iter()
            .find_map(|o| o.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(ScanRouteError::NoImagesRouted { total, first_error });
    }

    let label_folders = images
        .iter()
        .filter_map(|o| o.label.as_ref().filter(|_| o.is_routed()))
        .collect::<HashSet<&Label>>()
        .len();
    let stats = BatchStats {
        total_images: total,
        routed_images: routed,
        failed_images: total - routed,
        skipped_dirs: snapshot.skipped_dirs(),
        label_folders,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Routing complete: {}/{} images into {} folders, {}ms",
        routed, total, label_folders, stats.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, routed);
    }

    Ok(BatchReport {
        source: snapshot.root().to_path_buf(),
        images,
        stats,
    })
}

/// Route, group and upload: the whole run.
///
/// Starts the upload server when [`RouteConfig::server_command`] is set,
/// waits for [`RouteConfig::server_url`] and drives a WebDriver session for
/// the uploads. With [`RouteConfig::skip_upload`] the run ends after grouping.
///
/// # Errors
/// Everything [`route_folder`] returns, plus
/// [`ScanRouteError::UploadUnavailable`] when the server or the WebDriver
/// session cannot be reached. Routing has already happened by then; the
/// error carries the [`RunReport`] built so far and the underlying
/// [`ScanRouteError::ServerUnreachable`] or [`ScanRouteError::WebDriverSession`].
pub async fn run(
    source: impl AsRef<Path>,
    recognizer: Arc<dyn TextRecognizer>,
    config: &RouteConfig,
) -> Result<RunReport, ScanRouteError> {
    let (batch, groups) = route_and_group(source.as_ref(), recognizer, config).await?;

    if config.skip_upload {
        info!("Upload skipped");
        return Ok(RunReport {
            batch,
            groups,
            upload: None,
        });
    }
    if groups.is_empty() {
        info!("No non-empty label folders; nothing to upload");
        return Ok(RunReport {
            batch,
            groups,
            upload: Some(UploadReport::default()),
        });
    }

    match upload_via_browser(&groups, config).await {
        Ok(upload) => Ok(RunReport {
            batch,
            groups,
            upload: Some(upload),
        }),
        Err(e) => {
            warn!(
                "Upload unavailable after routing {}/{} images: {}",
                batch.stats.routed_images, batch.stats.total_images, e
            );
            Err(ScanRouteError::UploadUnavailable {
                source: Box::new(e),
                report: Box::new(RunReport {
                    batch,
                    groups,
                    upload: None,
                }),
            })
        }
    }
}

/// Start or wait for the server, open a WebDriver session and upload.
async fn upload_via_browser(
    groups: &FolderGroup,
    config: &RouteConfig,
) -> Result<UploadReport, ScanRouteError> {
    // Held until uploads finish; dropping it stops a server we started.
    let _server = server::ensure_server(config).await?;
    let session = WebDriverSession::connect(config).await?;
    let upload = upload_groups(groups, &session, config).await;
    session.close().await;
    Ok(upload)
}

/// Like [`run`], but uploads through a caller-supplied [`FormLocator`].
///
/// No server is started or polled; the locator owns whatever page it uses.
pub async fn run_with_locator(
    source: impl AsRef<Path>,
    recognizer: Arc<dyn TextRecognizer>,
    locator: &dyn FormLocator,
    config: &RouteConfig,
) -> Result<RunReport, ScanRouteError> {
    let (batch, groups) = route_and_group(source.as_ref(), recognizer, config).await?;
    let upload = if config.skip_upload {
        None
    } else {
        Some(upload_groups(&groups, locator, config).await)
    };
    Ok(RunReport {
        batch,
        groups,
        upload,
    })
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(
    source: impl AsRef<Path>,
    recognizer: Arc<dyn TextRecognizer>,
    config: &RouteConfig,
) -> Result<RunReport, ScanRouteError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanRouteError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(source, recognizer, config))
}

/// Show which label each image would get, without moving anything.
pub async fn inspect(
    source: impl AsRef<Path>,
    recognizer: Arc<dyn TextRecognizer>,
    config: &RouteConfig,
) -> Result<Vec<LabelPreview>, ScanRouteError> {
    let snapshot = snapshot_non_empty(source.as_ref())?;
    let config = Arc::new(config.clone());
    let options = Arc::new(RecognitionOptions::from_config(&config));

    let mut previews = Vec::with_capacity(snapshot.images().len());
    for image in snapshot.images() {
        let image = image.clone();
        let recognizer = Arc::clone(&recognizer);
        let config = Arc::clone(&config);
        let options = Arc::clone(&options);
        let preview = tokio::task::spawn_blocking(move || {
            preview_image(&image, recognizer.as_ref(), &options, &config)
        })
        .await
        .map_err(|e| ScanRouteError::Internal(format!("Inspect task panicked: {}", e)))?;
        previews.push(preview);
    }
    Ok(previews)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Phases 1 and 2. Grouping starts only once routing has returned.
async fn route_and_group(
    source: &Path,
    recognizer: Arc<dyn TextRecognizer>,
    config: &RouteConfig,
) -> Result<(BatchReport, FolderGroup), ScanRouteError> {
    let batch = route_folder(source, recognizer, config).await?;
    let groups = group_folder(&batch.source)?;
    info!(
        "Grouped {} files into {} prefixes",
        groups.file_count(),
        groups.len()
    );
    Ok((batch, groups))
}

pub(crate) fn snapshot_non_empty(source: &Path) -> Result<SourceSnapshot, ScanRouteError> {
    let snapshot = snapshot_source(source)?;
    if snapshot.is_empty() {
        return Err(ScanRouteError::NoImagesFound {
            path: snapshot.root().to_path_buf(),
        });
    }
    Ok(snapshot)
}

/// Everything one image needs, shared across the whole batch.
#[derive(Clone)]
pub(crate) struct BatchJob {
    root: PathBuf,
    total: usize,
    recognizer: Arc<dyn TextRecognizer>,
    options: Arc<RecognitionOptions>,
    config: Arc<RouteConfig>,
}

impl BatchJob {
    pub(crate) fn new(
        snapshot: &SourceSnapshot,
        recognizer: Arc<dyn TextRecognizer>,
        config: &RouteConfig,
    ) -> Self {
        Self {
            root: snapshot.root().to_path_buf(),
            total: snapshot.images().len(),
            recognizer,
            options: Arc::new(RecognitionOptions::from_config(config)),
            config: Arc::new(config.clone()),
        }
    }

    /// Route one image on the blocking pool, firing progress events.
    ///
    /// Per-image failures are inside the outcome; `Err` means the blocking
    /// task itself panicked.
    pub(crate) async fn process(
        &self,
        index: usize,
        image: PathBuf,
    ) -> Result<ImageOutcome, ScanRouteError> {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_image_start(index, self.total, &image);
        }

        let job = self.clone();
        let outcome = tokio::task::spawn_blocking(move || job.process_blocking(index, image))
            .await
            .map_err(|e| ScanRouteError::Internal(format!("Image task panicked: {}", e)))?;

        match (&outcome.error, &outcome.label) {
            (None, Some(label)) => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_image_routed(index, self.total, &outcome.source, label.as_str());
                }
            }
            (Some(e), _) => {
                warn!("{}", e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_image_error(index, self.total, &outcome.source, &e.to_string());
                }
            }
            (None, None) => {}
        }
        Ok(outcome)
    }

    fn process_blocking(&self, index: usize, image: PathBuf) -> ImageOutcome {
        let start = Instant::now();
        let mut label = None;
        let (destination, error) = match self.route_one(&image, &mut label) {
            Ok(dest) => (Some(dest), None),
            Err(e) => (None, Some(e)),
        };
        ImageOutcome {
            index,
            source: image,
            label,
            destination,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        }
    }

    /// Normalize → recognize → extract → move. `label` is set once extracted.
    fn route_one(
        &self,
        image: &Path,
        label: &mut Option<Label>,
    ) -> Result<PathBuf, ImageError> {
        let lines = recognize_image(
            image,
            self.recognizer.as_ref(),
            &self.options,
            &self.config,
        )?;
        let found = label.insert(extract_label(image, &lines)?);
        route_image(&self.root, found, image)
    }
}

/// Normalize and recognize one image. An empty result is a recognition error.
fn recognize_image(
    image: &Path,
    recognizer: &dyn TextRecognizer,
    options: &RecognitionOptions,
    config: &RouteConfig,
) -> Result<Vec<String>, ImageError> {
    let mask = normalize_file(image, config)?;
    let lines = recognizer
        .recognize(&mask, options)
        .map_err(|e| ImageError::Recognition {
            path: image.to_path_buf(),
            detail: e.to_string(),
        })?;
    if lines.is_empty() {
        return Err(ImageError::Recognition {
            path: image.to_path_buf(),
            detail: "recognizer returned no text".to_string(),
        });
    }
    debug!("{}: recognized {:?}", image.display(), lines);
    Ok(lines)
}

fn preview_image(
    image: &Path,
    recognizer: &dyn TextRecognizer,
    options: &RecognitionOptions,
    config: &RouteConfig,
) -> LabelPreview {
    let mut preview = LabelPreview {
        source: image.to_path_buf(),
        lines: Vec::new(),
        label: None,
        error: None,
    };
    match recognize_image(image, recognizer, options, config) {
        Ok(lines) => {
            match extract_label(image, &lines) {
                Ok(label) => preview.label = Some(label),
                Err(e) => preview.error = Some(e),
            }
            preview.lines = lines;
        }
        Err(e) => preview.error = Some(e),
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::recognize::RecognizeError;
    use image::{GrayImage, Rgb, RgbImage};
    use std::fs;

    /// Returns the same lines for every image.
    struct Fixed(Vec<&'static str>);

    impl TextRecognizer for Fixed {
        fn recognize(
            &self,
            _image: &GrayImage,
            _options: &RecognitionOptions,
        ) -> Result<Vec<String>, RecognizeError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    fn recognizer(lines: Vec<&'static str>) -> Arc<dyn TextRecognizer> {
        Arc::new(Fixed(lines))
    }

    /// A blank scan tall enough for the default crop bands.
    fn scan(path: &Path) {
        RgbImage::from_pixel(600, 1400, Rgb([250, 250, 250]))
            .save(path)
            .unwrap();
    }

    #[tokio::test]
    async fn routes_scan_into_label_folder() {
        let dir = tempfile::tempdir().unwrap();
        scan(&dir.path().join("scan1.png"));

        let report = route_folder(
            dir.path(),
            recognizer(vec!["INVOICE", "Jane Doe", "2024"]),
            &RouteConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.stats.routed_images, 1);
        assert_eq!(report.stats.label_folders, 1);
        assert!(dir.path().join("Jane Doe").join("scan1.png").is_file());
        assert!(!dir.path().join("scan1.png").exists());
    }

    #[tokio::test]
    async fn empty_folder_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = route_folder(dir.path(), recognizer(vec![]), &RouteConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanRouteError::NoImagesFound { .. }));
    }

    #[tokio::test]
    async fn all_failures_is_fatal_and_moves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        scan(&dir.path().join("a.png"));

        let err = route_folder(
            dir.path(),
            recognizer(vec!["TOTAL", "AMOUNT", "DUE"]),
            &RouteConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ScanRouteError::NoImagesRouted { total: 1, .. }));
        assert!(dir.path().join("a.png").exists());
    }

    #[tokio::test]
    async fn empty_recognition_is_recognition_error() {
        let dir = tempfile::tempdir().unwrap();
        scan(&dir.path().join("a.png"));

        let previews = inspect(dir.path(), recognizer(vec![]), &RouteConfig::default())
            .await
            .unwrap();
        assert!(matches!(
            previews[0].error,
            Some(ImageError::Recognition { .. })
        ));
    }

    #[tokio::test]
    async fn short_scan_is_geometry_error() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(600, 1000, Rgb([255, 255, 255]))
            .save(dir.path().join("short.png"))
            .unwrap();

        let previews = inspect(
            dir.path(),
            recognizer(vec!["Jane Doe"]),
            &RouteConfig::default(),
        )
        .await
        .unwrap();
        assert!(matches!(previews[0].error, Some(ImageError::Geometry { .. })));
    }

    #[tokio::test]
    async fn inspect_moves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        scan(&dir.path().join("scan.png"));

        let previews = inspect(
            dir.path(),
            recognizer(vec!["INVOICE", "Jane Doe"]),
            &RouteConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(previews[0].label.as_ref().unwrap().as_str(), "Jane Doe");
        assert_eq!(previews[0].lines, vec!["INVOICE", "Jane Doe"]);
        assert!(dir.path().join("scan.png").exists());
        assert!(!dir.path().join("Jane Doe").exists());
    }

    #[tokio::test]
    async fn skip_upload_stops_after_grouping() {
        let dir = tempfile::tempdir().unwrap();
        scan(&dir.path().join("scan.png"));
        fs::create_dir(dir.path().join("Empty Folder")).unwrap();
        let config = RouteConfig::builder().skip_upload(true).build().unwrap();

        let report = run(dir.path(), recognizer(vec!["Jane Doe"]), &config)
            .await
            .unwrap();

        assert!(report.upload.is_none());
        assert_eq!(report.groups.get('J').map(<[PathBuf]>::len), Some(1));
        assert!(report.groups.get('E').is_none());
        assert_eq!(report.batch.stats.skipped_dirs, 1);
    }

    #[tokio::test]
    async fn unreachable_server_keeps_the_routing_report() {
        let dir = tempfile::tempdir().unwrap();
        scan(&dir.path().join("scan.png"));
        let config = RouteConfig::builder()
            .server_url("http://127.0.0.1:9/")
            .server_wait_secs(0)
            .build()
            .unwrap();

        let err = run(dir.path(), recognizer(vec!["Jane Doe"]), &config)
            .await
            .unwrap_err();

        match err {
            ScanRouteError::UploadUnavailable { source, report } => {
                assert!(matches!(*source, ScanRouteError::ServerUnreachable { .. }));
                assert_eq!(report.batch.stats.routed_images, 1);
                assert_eq!(report.groups.file_count(), 1);
                assert!(report.upload.is_none());
            }
            other => panic!("expected UploadUnavailable, got {other:?}"),
        }
        assert!(dir.path().join("Jane Doe").join("scan.png").is_file());
    }
}
