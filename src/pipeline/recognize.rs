//! Text recognition: turn a binary label mask into recognized lines.
//!
//! The pipeline only depends on the [`TextRecognizer`] trait. One recognizer
//! is created per run and shared behind an `Arc`, so whatever it loads at
//! start-up (executable lookup, language models) is paid for once.
//!
//! [`TesseractRecognizer`] is the bundled implementation. It shells out to
//! the `tesseract` binary with TSV output and folds word rows back into one
//! string per detected line. Recognition is never retried: a failed call is
//! reported for that image and the batch moves on.

use crate::config::RouteConfig;
use crate::error::ScanRouteError;
use image::{imageops, GrayImage};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Characters the recognizer may emit: ASCII letters, digits and space.
pub const DEFAULT_ALLOWLIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 ";

/// Failure inside a recognizer implementation.
#[derive(Debug, Error)]
pub enum RecognizeError {
    /// Could not stage the image for the recognizer.
    #[error("could not write temporary image: {0}")]
    Stage(String),

    /// The recognizer process could not be started.
    #[error("could not start '{exe}': {source}")]
    Spawn {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The recognizer ran and reported failure.
    #[error("recognizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Settings passed unchanged to every recognition call of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub allowlist: String,
    pub language: String,
    pub page_segmentation_mode: u8,
}

impl RecognitionOptions {
    pub fn from_config(config: &RouteConfig) -> Self {
        Self {
            allowlist: config.allowlist.clone(),
            language: config.language.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
        }
    }
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            allowlist: DEFAULT_ALLOWLIST.to_string(),
            language: "eng".to_string(),
            page_segmentation_mode: 6,
        }
    }
}

/// A long-lived text recognition capability.
///
/// `recognize` may block for a long time; the pipeline always calls it from
/// `spawn_blocking`. The returned strings are in the recognizer's scan order,
/// which is not necessarily reading order.
pub trait TextRecognizer: Send + Sync {
    fn recognize(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
    ) -> Result<Vec<String>, RecognizeError>;
}

/// [`TextRecognizer`] backed by the tesseract command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    exe: PathBuf,
    tessdata: Option<PathBuf>,
}

impl TesseractRecognizer {
    /// Use an explicit executable, with tesseract's built-in tessdata lookup
    /// unless `tessdata` is given.
    pub fn new(exe: impl Into<PathBuf>, tessdata: Option<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            tessdata,
        }
    }

    /// Locate tesseract and its language model for `config`.
    ///
    /// Blocking: may download the model on first use with a blocking HTTP
    /// client, which panics when called on an async runtime thread. From
    /// async code use [`Self::locate_async`], or wrap this call in
    /// `tokio::task::spawn_blocking` / `block_in_place`.
    pub fn locate(config: &RouteConfig) -> Result<Self, ScanRouteError> {
        Self::locate_with_progress(config, None)
    }

    /// [`Self::locate`] on tokio's blocking pool, safe to await from async code.
    pub async fn locate_async(config: &RouteConfig) -> Result<Self, ScanRouteError> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || Self::locate(&config))
            .await
            .map_err(|e| ScanRouteError::Internal(format!("Locate task panicked: {}", e)))?
    }

    /// [`Self::locate`], reporting `(downloaded, total)` bytes while a
    /// language model is being fetched. Blocking, like [`Self::locate`].
    pub fn locate_with_progress(
        config: &RouteConfig,
        on_progress: Option<&dyn Fn(u64, Option<u64>)>,
    ) -> Result<Self, ScanRouteError> {
        let exe = match config.tesseract_path {
            Some(ref p) => p.clone(),
            None => tesseract_locate::find_tesseract()
                .map_err(|e| ScanRouteError::RecognizerUnavailable(e.to_string()))?,
        };

        let version = tesseract_locate::tesseract_version(&exe)
            .map_err(|e| ScanRouteError::RecognizerUnavailable(e.to_string()))?;
        info!("Using {} at {}", version, exe.display());

        let tessdata = match tesseract_locate::ensure_traineddata(&config.language, on_progress) {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!(
                    "Language model '{}' unavailable ({}); relying on tesseract defaults",
                    config.language, e
                );
                None
            }
        };

        Ok(Self::new(exe, tessdata))
    }

    pub fn executable(&self) -> &Path {
        &self.exe
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
    ) -> Result<Vec<String>, RecognizeError> {
        // tesseract reads dark glyphs on a light page; the mask is the reverse.
        let mut page = image.clone();
        imageops::invert(&mut page);

        let input =
            NamedTempFile::with_suffix(".png").map_err(|e| RecognizeError::Stage(e.to_string()))?;
        page.save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| RecognizeError::Stage(e.to_string()))?;

        let mut cmd = Command::new(&self.exe);
        cmd.arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&options.language)
            .arg("--psm")
            .arg(options.page_segmentation_mode.to_string());
        if let Some(ref dir) = self.tessdata {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.arg("-c")
            .arg(format!("tessedit_char_whitelist={}", options.allowlist))
            .arg("tsv");

        let output = cmd.output().map_err(|e| RecognizeError::Spawn {
            exe: self.exe.clone(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(RecognizeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let lines = parse_tsv_lines(&String::from_utf8_lossy(&output.stdout));
        debug!("tesseract returned {} lines", lines.len());
        Ok(lines)
    }
}

/// Fold tesseract TSV word rows into one string per text line.
///
/// TSV fields: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Only level-5 (word) rows carry text.
pub fn parse_tsv_lines(tsv: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut current_words: Vec<&str> = Vec::new();

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        if current_key.is_some_and(|k| k != key) && !current_words.is_empty() {
            lines.push(current_words.join(" "));
            current_words.clear();
        }
        current_key = Some(key);
        current_words.push(text);
    }

    if !current_words.is_empty() {
        lines.push(current_words.join(" "));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\t\
                          left\ttop\twidth\theight\tconf\ttext";

    fn word(block: u32, par: u32, line: u32, n: u32, text: &str) -> String {
        format!("5\t1\t{block}\t{par}\t{line}\t{n}\t0\t0\t10\t10\t91.5\t{text}")
    }

    #[test]
    fn tsv_words_grouped_by_line() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t580\t453\t-1\t".to_string(),
            word(1, 1, 1, 1, "INVOICE"),
            "4\t1\t1\t1\t2\t0\t0\t0\t100\t10\t-1\t".to_string(),
            word(1, 1, 2, 1, "Jane"),
            word(1, 1, 2, 2, "Doe"),
            word(2, 1, 1, 1, "2024"),
        ]
        .join("\n");

        assert_eq!(parse_tsv_lines(&tsv), vec!["INVOICE", "Jane Doe", "2024"]);
    }

    #[test]
    fn tsv_skips_blank_words_and_short_rows() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, 1, "  "),
            "5\t1\t1".to_string(),
            word(1, 1, 1, 2, "TOTAL"),
        ]
        .join("\n");
        assert_eq!(parse_tsv_lines(&tsv), vec!["TOTAL"]);
    }

    #[test]
    fn tsv_header_only_yields_nothing() {
        assert!(parse_tsv_lines(HEADER).is_empty());
        assert!(parse_tsv_lines("").is_empty());
    }

    #[test]
    fn options_from_default_config() {
        let opts = RecognitionOptions::from_config(&RouteConfig::default());
        assert_eq!(opts, RecognitionOptions::default());
        assert!(opts.allowlist.ends_with(' '));
        assert_eq!(opts.allowlist.len(), 26 * 2 + 10 + 1);
    }

    #[test]
    fn missing_executable_is_spawn_error() {
        let r = TesseractRecognizer::new("/definitely/not/tesseract", None);
        let img = GrayImage::new(4, 4);
        let err = r.recognize(&img, &RecognitionOptions::default()).unwrap_err();
        assert!(matches!(err, RecognizeError::Spawn { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn locate_async_reports_bad_path_without_blocking_the_runtime() {
        let config = RouteConfig::builder()
            .tesseract_path("/definitely/not/tesseract")
            .build()
            .unwrap();
        let err = TesseractRecognizer::locate_async(&config).await.unwrap_err();
        assert!(
            matches!(err, ScanRouteError::RecognizerUnavailable(_)),
            "got {err:?}"
        );
    }
}
