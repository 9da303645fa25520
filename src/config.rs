//! Configuration types for a scan-routing run.
//!
//! Every knob lives in [`RouteConfig`], built via [`RouteConfigBuilder`].
//! Keeping them in one struct makes it easy to log the exact settings of a
//! run and to diff two runs that routed the same scans differently.
//!
//! There is no configuration file. The defaults describe the scanner layout
//! and the local upload page this tool was built for; the CLI exposes each
//! field as a flag with a `SCANROUTE_*` environment fallback.

use crate::error::ScanRouteError;
use crate::pipeline::geometry::CropBands;
use crate::pipeline::recognize::DEFAULT_ALLOWLIST;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Placeholder replaced by the group letter in [`RouteConfig::form_selector`].
pub const PREFIX_PLACEHOLDER: &str = "{prefix}";

/// Configuration for routing and uploading a folder of scans.
///
/// Built via [`RouteConfig::builder()`] or using [`RouteConfig::default()`].
///
/// # Example
/// ```rust
/// use scanroute::RouteConfig;
///
/// let config = RouteConfig::builder()
///     .server_url("http://localhost:3000/")
///     .action_pause_ms(100)
///     .skip_upload(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RouteConfig {
    /// Where the label band sits, relative to the bottom of each scan.
    pub crop: CropBands,

    /// Grey levels kept by the binarisation step. Default: 200–255.
    ///
    /// Labels are printed in light ink; anything darker is background.
    pub threshold: IntensityBand,

    /// Characters the recognizer may emit. Default: ASCII letters, digits, space.
    pub allowlist: String,

    /// Rotation applied to the mask before recognition. Default: none.
    pub rotation: Rotation,

    /// Recognizer language model. Default: "eng".
    pub language: String,

    /// tesseract page segmentation mode (0–13). Default: 6, a single block.
    pub page_segmentation_mode: u8,

    /// Explicit tesseract executable. If None, it is located automatically.
    pub tesseract_path: Option<PathBuf>,

    /// Page that hosts the upload forms. Default: `http://localhost:3000/`.
    pub server_url: String,

    /// WebDriver endpoint (chromedriver). Default: `http://localhost:4444`.
    pub webdriver_url: String,

    /// CSS selector of the upload form for one letter; `{prefix}` is
    /// replaced by the letter. Default: `.uploadForm[data-form-type={prefix}]`.
    pub form_selector: String,

    /// Pause after each upload UI action, in milliseconds. Default: 50.
    ///
    /// The page's client-side handler needs a moment to register a file
    /// selection before the submit click arrives.
    pub action_pause_ms: u64,

    /// WebDriver implicit wait for element lookups, in milliseconds. Default: 3000.
    pub implicit_wait_ms: u64,

    /// How long to poll for the upload server before giving up. Default: 30.
    pub server_wait_secs: u64,

    /// Command (program + args) that starts the upload server. Default: None.
    ///
    /// When None the server must already be running.
    pub server_command: Option<Vec<String>>,

    /// Run the browser without a window. Default: false.
    pub headless: bool,

    /// Stop after grouping; no server, no browser. Default: false.
    pub skip_upload: bool,

    /// Optional progress callback for per-image and per-group events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            crop: CropBands::default(),
            threshold: IntensityBand::default(),
            allowlist: DEFAULT_ALLOWLIST.to_string(),
            rotation: Rotation::default(),
            language: "eng".to_string(),
            page_segmentation_mode: 6,
            tesseract_path: None,
            server_url: "http://localhost:3000/".to_string(),
            webdriver_url: "http://localhost:4444".to_string(),
            form_selector: format!(".uploadForm[data-form-type={PREFIX_PLACEHOLDER}]"),
            action_pause_ms: 50,
            implicit_wait_ms: 3000,
            server_wait_secs: 30,
            server_command: None,
            headless: false,
            skip_upload: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteConfig")
            .field("crop", &self.crop)
            .field("threshold", &self.threshold)
            .field("allowlist", &self.allowlist)
            .field("rotation", &self.rotation)
            .field("language", &self.language)
            .field("page_segmentation_mode", &self.page_segmentation_mode)
            .field("tesseract_path", &self.tesseract_path)
            .field("server_url", &self.server_url)
            .field("webdriver_url", &self.webdriver_url)
            .field("form_selector", &self.form_selector)
            .field("action_pause_ms", &self.action_pause_ms)
            .field("implicit_wait_ms", &self.implicit_wait_ms)
            .field("server_wait_secs", &self.server_wait_secs)
            .field("server_command", &self.server_command)
            .field("headless", &self.headless)
            .field("skip_upload", &self.skip_upload)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl RouteConfig {
    /// Create a new builder for `RouteConfig`.
    pub fn builder() -> RouteConfigBuilder {
        RouteConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RouteConfig`].
#[derive(Debug)]
pub struct RouteConfigBuilder {
    config: RouteConfig,
}

impl RouteConfigBuilder {
    pub fn crop(mut self, bands: CropBands) -> Self {
        self.config.crop = bands;
        self
    }

    pub fn threshold(mut self, band: IntensityBand) -> Self {
        self.config.threshold = band;
        self
    }

    pub fn allowlist(mut self, chars: impl Into<String>) -> Self {
        self.config.allowlist = chars.into();
        self
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn page_segmentation_mode(mut self, psm: u8) -> Self {
        self.config.page_segmentation_mode = psm;
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = Some(path.into());
        self
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    pub fn form_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.form_selector = selector.into();
        self
    }

    pub fn action_pause_ms(mut self, ms: u64) -> Self {
        self.config.action_pause_ms = ms;
        self
    }

    pub fn implicit_wait_ms(mut self, ms: u64) -> Self {
        self.config.implicit_wait_ms = ms;
        self
    }

    pub fn server_wait_secs(mut self, secs: u64) -> Self {
        self.config.server_wait_secs = secs;
        self
    }

    pub fn server_command(mut self, command: Vec<String>) -> Self {
        self.config.server_command = if command.is_empty() {
            None
        } else {
            Some(command)
        };
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn skip_upload(mut self, v: bool) -> Self {
        self.config.skip_upload = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RouteConfig, ScanRouteError> {
        let c = &self.config;
        if c.crop.header_band_height == 0 {
            return Err(ScanRouteError::InvalidConfig(
                "Header band height must be ≥ 1".into(),
            ));
        }
        if c.crop.x_left >= c.crop.x_right {
            return Err(ScanRouteError::InvalidConfig(format!(
                "Left bound {} must be smaller than right bound {}",
                c.crop.x_left, c.crop.x_right
            )));
        }
        if c.threshold.low > c.threshold.high {
            return Err(ScanRouteError::InvalidConfig(format!(
                "Threshold band {}–{} is empty",
                c.threshold.low, c.threshold.high
            )));
        }
        if c.allowlist.is_empty() {
            return Err(ScanRouteError::InvalidConfig(
                "Allowlist must not be empty".into(),
            ));
        }
        if c.page_segmentation_mode > 13 {
            return Err(ScanRouteError::InvalidConfig(format!(
                "Page segmentation mode must be 0–13, got {}",
                c.page_segmentation_mode
            )));
        }
        if !c.form_selector.contains(PREFIX_PLACEHOLDER) {
            return Err(ScanRouteError::InvalidConfig(format!(
                "Form selector must contain {PREFIX_PLACEHOLDER}, got '{}'",
                c.form_selector
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Inclusive range of grey levels kept by the binarisation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityBand {
    pub low: u8,
    pub high: u8,
}

impl Default for IntensityBand {
    fn default() -> Self {
        Self { low: 200, high: 255 }
    }
}

impl IntensityBand {
    pub fn contains(&self, value: u8) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Rotation hint for the recognizer, applied to the mask before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// Upright text (default).
    #[default]
    None,
    /// Rotate 90° clockwise.
    Deg90,
    /// Rotate 180°.
    Deg180,
    /// Rotate 270° clockwise.
    Deg270,
}

impl Rotation {
    /// Map a hint in degrees (0, 90, 180, 270) to a rotation.
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = RouteConfig::builder().build().unwrap();
        assert_eq!(config.crop, CropBands::default());
        assert_eq!(config.threshold, IntensityBand { low: 200, high: 255 });
        assert_eq!(config.action_pause_ms, 50);
        assert!(!config.skip_upload);
    }

    #[test]
    fn default_selector_has_placeholder() {
        let config = RouteConfig::default();
        assert_eq!(config.form_selector, ".uploadForm[data-form-type={prefix}]");
    }

    #[test]
    fn selector_without_placeholder_rejected() {
        let err = RouteConfig::builder()
            .form_selector(".uploadForm")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("{prefix}"));
    }

    #[test]
    fn inverted_horizontal_bounds_rejected() {
        let bands = CropBands {
            x_left: 600,
            x_right: 580,
            ..CropBands::default()
        };
        assert!(RouteConfig::builder().crop(bands).build().is_err());
    }

    #[test]
    fn empty_threshold_band_rejected() {
        let band = IntensityBand { low: 201, high: 200 };
        assert!(RouteConfig::builder().threshold(band).build().is_err());
    }

    #[test]
    fn psm_out_of_range_rejected() {
        assert!(RouteConfig::builder()
            .page_segmentation_mode(14)
            .build()
            .is_err());
    }

    #[test]
    fn empty_server_command_means_none() {
        let config = RouteConfig::builder()
            .server_command(vec![])
            .build()
            .unwrap();
        assert!(config.server_command.is_none());
    }

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(0), Some(Rotation::None));
        assert_eq!(Rotation::from_degrees(270), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn debug_hides_callback() {
        let dbg = format!("{:?}", RouteConfig::default());
        assert!(dbg.contains("progress_callback: None"));
    }
}
