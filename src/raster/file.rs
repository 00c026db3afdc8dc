//! Standalone PNG/JPEG assets

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;

use super::normalize::to_gray_image;
use crate::error::{Error, Result};
use crate::profile::{Bound, ComplianceProfile, Orientation};

/// Encoded format of a raster asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    /// Format for a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(RasterFormat::Png),
            "jpg" | "jpeg" => Some(RasterFormat::Jpeg),
            _ => None,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Measurement of a standalone raster against the profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterAudit {
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    pub grayscale: bool,
    pub oversized: bool,
}

impl RasterAudit {
    pub fn is_compliant(&self, profile: &ComplianceProfile) -> bool {
        !self.oversized && (self.grayscale || !profile.require_grayscale)
    }
}

/// Result of rewriting a raster
#[derive(Debug, Clone)]
pub struct RasterFix {
    pub before: (u32, u32),
    pub after: (u32, u32),
    pub converted_to_gray: bool,
    pub bytes: Vec<u8>,
}

impl RasterFix {
    pub fn resized(&self) -> bool {
        self.before != self.after
    }
}

/// Largest size with the same aspect ratio that fits `bound` for this
/// orientation. Never enlarges.
pub fn fit_within(width: u32, height: u32, bound: Bound) -> (u32, u32) {
    let bound = bound.oriented(Orientation::of(width as f32, height as f32));
    let scale = (bound.width / width as f32).min(bound.height / height as f32);
    if scale >= 1.0 {
        return (width, height);
    }

    let fit_w = ((width as f32 * scale).round() as u32).clamp(1, bound.width as u32);
    let fit_h = ((height as f32 * scale).round() as u32).clamp(1, bound.height as u32);
    (fit_w, fit_h)
}

fn decode(bytes: &[u8], format: RasterFormat) -> Result<DynamicImage> {
    Ok(image::load_from_memory_with_format(bytes, format.image_format())?)
}

fn is_gray(img: &DynamicImage) -> bool {
    matches!(
        img.color(),
        image::ColorType::L8 | image::ColorType::La8 | image::ColorType::L16 | image::ColorType::La16
    )
}

/// Measure a raster's pixel size and channel layout.
pub fn audit_raster(bytes: &[u8], format: RasterFormat, profile: &ComplianceProfile) -> Result<RasterAudit> {
    let img = decode(bytes, format)?;
    let (width, height) = img.dimensions();

    Ok(RasterAudit {
        width,
        height,
        orientation: Orientation::of(width as f32, height as f32),
        grayscale: is_gray(&img),
        oversized: profile.raster_bound().is_exceeded_by(width as f32, height as f32, 0.0),
    })
}

/// Resize and/or convert to gray in one decode, re-encoding in the source format.
///
/// PNG output is lossless; JPEG output uses `jpeg_quality`.
pub fn fix_raster(
    bytes: &[u8],
    format: RasterFormat,
    profile: &ComplianceProfile,
    jpeg_quality: u8,
) -> Result<RasterFix> {
    let mut img = decode(bytes, format)?;
    let before = img.dimensions();

    let after = fit_within(before.0, before.1, profile.raster_bound());
    if after != before {
        img = img.resize_exact(after.0, after.1, image::imageops::FilterType::Lanczos3);
    }

    let converted_to_gray = profile.require_grayscale && !is_gray(&img);
    if converted_to_gray {
        img = to_gray_image(&img);
    }

    let bytes = encode(&img, format, jpeg_quality)?;
    Ok(RasterFix { before, after, converted_to_gray, bytes })
}

/// Encode `img` in `format`; JPEG drops alpha and 16-bit depth.
pub fn encode(img: &DynamicImage, format: RasterFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        RasterFormat::Png => {
            img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        }
        RasterFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, jpeg_quality.clamp(1, 100));
            if is_gray(img) {
                let gray = img.to_luma8();
                encoder.encode(gray.as_raw(), gray.width(), gray.height(), image::ExtendedColorType::L8)?;
            } else {
                let rgb = img.to_rgb8();
                encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)?;
            }
        }
    }
    if out.is_empty() {
        return Err(Error::Undecodable("encoder produced no data".to_string()));
    }
    Ok(out)
}
