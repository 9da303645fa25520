//! Crop geometry: which band of a scan holds the label.
//!
//! The label sits at a fixed distance above the bottom edge of every scan,
//! but scans differ in height, so the band is anchored to the bottom:
//!
//! ```text
//!  0 ┬───────────────────────┐
//!    │                       │
//!    │                       │
//!  y_top ─ ┌───────┐         │   y_top    = height - text_band_height
//!    │     │ label │         │   y_bottom = y_top + header_band_height
//!  y_bottom└───────┘         │
//!    │                       │
//! height ────────────────────┘
//!        x_left  x_right
//! ```
//!
//! The calculation never clamps. A scan shorter than `text_band_height`
//! yields a negative `y_top`, which [`CropRegion::validate`] rejects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Band parameters, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBands {
    /// Distance from the bottom edge to the top of the label band. Default: 1398.
    pub text_band_height: u32,
    /// Height of the label band. Default: 453.
    pub header_band_height: u32,
    /// Left bound of the band. Default: 0.
    pub x_left: u32,
    /// Right bound of the band (exclusive). Default: 580.
    pub x_right: u32,
}

impl Default for CropBands {
    fn default() -> Self {
        Self {
            text_band_height: 1398,
            header_band_height: 453,
            x_left: 0,
            x_right: 580,
        }
    }
}

/// A rectangle in image pixel space; bottom and right bounds are exclusive.
///
/// Signed, since `y_top` goes negative for scans shorter than the band offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub y_top: i64,
    pub y_bottom: i64,
    pub x_left: i64,
    pub x_right: i64,
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[y {}..{}, x {}..{}]",
            self.y_top, self.y_bottom, self.x_left, self.x_right
        )
    }
}

/// Pixel rectangle that passed validation, ready for `crop_imm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Compute the region for an image of `image_height` pixels.
    pub fn from_height(image_height: u32, bands: &CropBands) -> Self {
        let y_top = i64::from(image_height) - i64::from(bands.text_band_height);
        let y_bottom = y_top + i64::from(bands.header_band_height);
        Self {
            y_top,
            y_bottom,
            x_left: i64::from(bands.x_left),
            x_right: i64::from(bands.x_right),
        }
    }

    /// Check `0 <= y_top < y_bottom <= height` and `0 <= x_left < x_right <= width`.
    ///
    /// Returns the same rectangle in unsigned form on success and `None`
    /// when any bound is violated.
    pub fn validate(&self, width: u32, height: u32) -> Option<PixelRect> {
        let vertical_ok =
            0 <= self.y_top && self.y_top < self.y_bottom && self.y_bottom <= i64::from(height);
        let horizontal_ok =
            0 <= self.x_left && self.x_left < self.x_right && self.x_right <= i64::from(width);
        if !(vertical_ok && horizontal_ok) {
            return None;
        }
        Some(PixelRect {
            x: self.x_left as u32,
            y: self.y_top as u32,
            width: (self.x_right - self.x_left) as u32,
            height: (self.y_bottom - self.y_top) as u32,
        })
    }

    pub fn height(&self) -> i64 {
        self.y_bottom - self.y_top
    }
}
