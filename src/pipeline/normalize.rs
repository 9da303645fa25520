//! Image normalisation: decode, crop to the label band, binarise.
//!
//! ## Why a bright-band mask?
//!
//! Labels are printed in light ink on a darker strip. Keeping only pixels
//! whose grey level falls inside a bright band (200–255 by default) drops the
//! strip, table rules and scanner noise in one pass, leaving white glyphs on
//! black for the recognizer.
//!
//! Grey levels use the Rec.601 weights (0.299, 0.587, 0.114) that the
//! 200 cutoff was tuned against, not the Rec.709 weights of
//! `imageops::grayscale`; reddish ink near the cutoff lands on different
//! sides of it under the two.
//!
//! Everything here is a pure transform over pixel data and runs on the
//! calling thread; the pipeline moves it onto `spawn_blocking` together with
//! recognition because large scans take tens of milliseconds to decode.

use crate::config::{IntensityBand, RouteConfig, Rotation};
use crate::error::ImageError;
use crate::pipeline::geometry::CropRegion;
use image::{imageops, GrayImage, Luma, RgbImage};
use std::path::Path;
use tracing::debug;

/// Decode an image file into 3-channel pixels.
pub fn load_image(path: &Path) -> Result<RgbImage, ImageError> {
    let img = image::open(path).map_err(|e| ImageError::Decode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(img.to_rgb8())
}

/// Crop `image` to `region`, convert to grey and apply the intensity band.
///
/// An out-of-bounds region is a [`ImageError::Geometry`]; the crop is never
/// clamped to the image edge.
pub fn normalize(
    path: &Path,
    image: &RgbImage,
    region: &CropRegion,
    band: IntensityBand,
    rotation: Rotation,
) -> Result<GrayImage, ImageError> {
    let (width, height) = image.dimensions();
    let rect = region.validate(width, height).ok_or_else(|| ImageError::Geometry {
        path: path.to_path_buf(),
        region: *region,
        width,
        height,
    })?;

    let cropped = imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
    let gray = luma_601(&cropped);
    let mask = threshold_band(&gray, band);
    debug!(
        "Normalised {} → {}x{} mask (region {})",
        path.display(),
        mask.width(),
        mask.height(),
        region
    );

    Ok(rotate(mask, rotation))
}

/// Decode `path`, derive its crop region from its height, and normalise.
pub fn normalize_file(path: &Path, config: &RouteConfig) -> Result<GrayImage, ImageError> {
    let image = load_image(path)?;
    let region = CropRegion::from_height(image.height(), &config.crop);
    normalize(path, &image, &region, config.threshold, config.rotation)
}

/// Rec.601 grey level of every pixel, rounded to nearest.
pub fn luma_601(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let weighted = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
        output.put_pixel(x, y, Luma([((weighted + 500) / 1000) as u8]));
    }

    output
}

/// Binary mask: 255 where `band.low <= v <= band.high`, 0 elsewhere.
pub fn threshold_band(gray: &GrayImage, band: IntensityBand) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = if band.contains(pixel[0]) { 255u8 } else { 0u8 };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

fn rotate(mask: GrayImage, rotation: Rotation) -> GrayImage {
    match rotation {
        Rotation::None => mask,
        Rotation::Deg90 => imageops::rotate90(&mask),
        Rotation::Deg180 => imageops::rotate180(&mask),
        Rotation::Deg270 => imageops::rotate270(&mask),
    }
}
