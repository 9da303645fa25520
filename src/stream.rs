//! Streaming routing API: emit each image outcome as soon as it is routed.
//!
//! Unlike the eager [`crate::run::route_folder`], which returns only after
//! every image has been attempted, [`route_stream`] yields one
//! [`ImageOutcome`] per snapshot image as it completes. Images are still
//! processed one at a time, in snapshot order; the stream only makes the
//! intermediate results visible.
//!
//! The stream does not group or upload. Grouping must wait until the stream
//! has been drained; only then is every move finished.

use crate::config::RouteConfig;
use crate::error::ScanRouteError;
use crate::output::ImageOutcome;
use crate::pipeline::recognize::TextRecognizer;
use crate::run::{snapshot_non_empty, BatchJob};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of image outcomes.
///
/// An `Err` item means the blocking task for that image panicked; the
/// stream carries on with the next image.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = Result<ImageOutcome, ScanRouteError>> + Send>>;

/// Route the images in `source`, streaming outcomes in snapshot order.
///
/// # Returns
/// - `Ok(OutcomeStream)` — one item per image in the snapshot
/// - `Err(ScanRouteError)` — fatal error (folder missing, no images, etc.)
///
/// # Example
/// ```rust,no_run
/// use scanroute::{route_stream, RouteConfig, TesseractRecognizer};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RouteConfig::default();
/// let recognizer = Arc::new(TesseractRecognizer::locate_async(&config).await?);
/// let mut outcomes = route_stream("img", recognizer, &config).await?;
/// while let Some(outcome) = outcomes.next().await {
///     let outcome = outcome?;
///     match outcome.destination {
///         Some(dest) => println!("{} → {}", outcome.source.display(), dest.display()),
///         None => eprintln!("{}: {:?}", outcome.source.display(), outcome.error),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn route_stream(
    source: impl AsRef<Path>,
    recognizer: Arc<dyn TextRecognizer>,
    config: &RouteConfig,
) -> Result<OutcomeStream, ScanRouteError> {
    let source = source.as_ref();
    info!("Starting streaming routing: {}", source.display());

    // ── Snapshot ─────────────────────────────────────────────────────────
    let snapshot = snapshot_non_empty(source)?;
    let total = snapshot.images().len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    // ── Build the stream ─────────────────────────────────────────────────
    let job = BatchJob::new(&snapshot, recognizer, config);
    let images = snapshot.images().to_vec();

    let s = stream::iter(images.into_iter().enumerate()).then(move |(i, image)| {
        let job = job.clone();
        async move { job.process(i + 1, image).await }
    });

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::recognize::{RecognitionOptions, RecognizeError};
    use image::{GrayImage, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a different name for each call.
    struct Counting(AtomicUsize);

    impl TextRecognizer for Counting {
        fn recognize(
            &self,
            _image: &GrayImage,
            _options: &RecognitionOptions,
        ) -> Result<Vec<String>, RecognizeError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            let lines = match n {
                0 => vec!["HEADER".to_string(), "Jane Doe".to_string()],
                1 => vec!["TOTAL".to_string()],
                _ => vec!["John Ray".to_string()],
            };
            Ok(lines)
        }
    }

    #[tokio::test]
    async fn yields_one_outcome_per_image_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            RgbImage::from_pixel(600, 1400, Rgb([255, 255, 255]))
                .save(dir.path().join(name))
                .unwrap();
        }

        let recognizer = Arc::new(Counting(AtomicUsize::new(0)));
        let stream = route_stream(dir.path(), recognizer, &RouteConfig::default())
            .await
            .unwrap();
        let outcomes: Vec<ImageOutcome> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes.iter().map(|o| o.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(outcomes[0].is_routed());
        assert!(outcomes[1].error.is_some());
        assert!(outcomes[2].is_routed());
        assert!(dir.path().join("Jane Doe").join("a.png").is_file());
        assert!(dir.path().join("b.png").is_file());
        assert!(dir.path().join("John Ray").join("c.png").is_file());
    }

    #[tokio::test]
    async fn missing_source_fails_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = Arc::new(Counting(AtomicUsize::new(0)));
        let config = RouteConfig::default();
        let result = route_stream(dir.path().join("nope"), recognizer, &config).await;
        assert!(matches!(result, Err(ScanRouteError::SourceNotFound { .. })));
    }
}
