//! Color-to-grayscale conversion of raw pixel samples
//!
//! PDF image streams carry interleaved samples, big-endian for 16-bit
//! components. This module turns 1/3/4 channel samples into a single gray
//! channel of the same width, height and bit depth. When the sample buffer
//! does not match the declared geometry it falls back to decoding the bytes
//! as a complete encoded image, and finally to a white fill.

use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Allowed relative deviation between actual and expected sample length.
const LENGTH_TOLERANCE: f64 = 0.10;

/// Largest sample buffer a declared geometry may imply (256 MiB).
///
/// A 16-bit CMYK page at 600 dpi is well under this. Anything larger comes
/// from corrupt or hostile Width/Height values and is never allocated.
pub const MAX_SAMPLE_BYTES: usize = 256 * 1024 * 1024;

/// Luma for 8-bit RGB using the BT.601 weights.
pub fn luma8(r: u8, g: u8, b: u8) -> u8 {
    luma(r as f32, g as f32, b as f32).clamp(0.0, 255.0) as u8
}

/// Luma for 16-bit RGB using the BT.601 weights.
pub fn luma16(r: u16, g: u16, b: u16) -> u16 {
    luma(r as f32, g as f32, b as f32).clamp(0.0, 65535.0) as u16
}

fn luma(r: f32, g: f32, b: f32) -> f32 {
    (0.299 * r + 0.587 * g + 0.114 * b).round()
}

/// Project CMYK (0..=max) onto RGB.
fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32, max: f32) -> (f32, f32, f32) {
    let k = 1.0 - k / max;
    (
        (1.0 - c / max) * k * max,
        (1.0 - m / max) * k * max,
        (1.0 - y / max) * k * max,
    )
}

/// Convert a decoded image to gray using the same weights as the raw path.
///
/// Alpha is carried through as gray+alpha. 16-bit sources stay 16-bit.
pub fn to_gray_image(img: &DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    let sixteen_bit = img.color().bytes_per_pixel() / img.color().channel_count() > 1;
    let has_alpha = img.color().has_alpha();

    match (sixteen_bit, has_alpha) {
        (false, false) => {
            let rgb = img.to_rgb8();
            let gray = image::GrayImage::from_fn(width, height, |x, y| {
                let p = rgb.get_pixel(x, y).0;
                image::Luma([luma8(p[0], p[1], p[2])])
            });
            DynamicImage::ImageLuma8(gray)
        }
        (false, true) => {
            let rgba = img.to_rgba8();
            let gray = image::GrayAlphaImage::from_fn(width, height, |x, y| {
                let p = rgba.get_pixel(x, y).0;
                image::LumaA([luma8(p[0], p[1], p[2]), p[3]])
            });
            DynamicImage::ImageLumaA8(gray)
        }
        (true, false) => {
            let rgb = img.to_rgb16();
            let gray = image::ImageBuffer::from_fn(width, height, |x, y| {
                let p = rgb.get_pixel(x, y).0;
                image::Luma([luma16(p[0], p[1], p[2])])
            });
            DynamicImage::ImageLuma16(gray)
        }
        (true, true) => {
            let rgba = img.to_rgba16();
            let gray = image::ImageBuffer::from_fn(width, height, |x, y| {
                let p = rgba.get_pixel(x, y).0;
                image::LumaA([luma16(p[0], p[1], p[2]), p[3]])
            });
            DynamicImage::ImageLumaA16(gray)
        }
    }
}

/// What to do when raw samples cannot be decoded by any path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Emit a same-size white image so the document stays complete
    #[default]
    WhiteFill,
    /// Surface the failure so the object is reported unfixable
    Fail,
}

/// Raw interleaved samples with their declared geometry
#[derive(Debug, Clone, Copy)]
pub struct RawRaster<'a> {
    pub samples: &'a [u8],
    pub channels: u8,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
}

impl RawRaster<'_> {
    /// Byte length implied by the declared geometry (rows padded to whole bytes).
    ///
    /// Fails for empty or implausibly large geometry instead of overflowing.
    pub fn expected_len(&self) -> Result<usize> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Undecodable(format!("empty geometry {}x{}", self.width, self.height)));
        }
        (self.width as usize)
            .checked_mul(self.channels as usize)
            .and_then(|n| n.checked_mul(self.bits_per_component as usize))
            .map(|bits| bits.div_ceil(8))
            .and_then(|row| row.checked_mul(self.height as usize))
            .filter(|&len| len <= MAX_SAMPLE_BYTES)
            .ok_or_else(|| Error::Undecodable(format!("declared geometry {}x{} is too large", self.width, self.height)))
    }

    fn within_tolerance(&self, expected: usize) -> bool {
        let expected = expected as f64;
        let actual = self.samples.len() as f64;
        (actual - expected).abs() <= expected * LENGTH_TOLERANCE
    }
}

/// Which path produced the gray samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Conversion {
    /// Per-pixel arithmetic on the raw samples
    Samples,
    /// The bytes were a complete encoded image and went through the codec
    Reencoded,
    /// Nothing decodable; uniform white of the declared size
    WhiteFill,
}

/// Single-channel output of the normalizer
#[derive(Debug, Clone)]
pub struct GrayRaster {
    pub samples: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub conversion: Conversion,
}

impl GrayRaster {
    /// The color space name to declare for these samples.
    pub fn color_space(&self) -> &'static str {
        "DeviceGray"
    }
}

/// Converts raw color samples to grayscale
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterColorNormalizer {
    pub fallback: FallbackPolicy,
}

impl RasterColorNormalizer {
    pub fn new(fallback: FallbackPolicy) -> Self {
        Self { fallback }
    }

    /// Convert `raw` to single-channel samples of the same size and depth.
    pub fn normalize(&self, raw: &RawRaster) -> Result<GrayRaster> {
        if !matches!(raw.channels, 1 | 3 | 4) {
            return Err(Error::UnsupportedColorSpace(format!("{} channels", raw.channels)));
        }
        if !matches!(raw.bits_per_component, 8 | 16) {
            return Err(Error::UnsupportedBitDepth(raw.bits_per_component));
        }

        let expected = raw.expected_len()?;

        if raw.within_tolerance(expected) {
            let samples = convert_samples(raw, expected);
            return Ok(GrayRaster {
                samples,
                width: raw.width,
                height: raw.height,
                bits_per_component: raw.bits_per_component,
                conversion: Conversion::Samples,
            });
        }

        debug!(
            expected,
            actual = raw.samples.len(),
            "sample length outside tolerance, decoding as encoded image"
        );

        match decode_encoded(raw) {
            Ok(samples) => Ok(GrayRaster {
                samples,
                width: raw.width,
                height: raw.height,
                bits_per_component: raw.bits_per_component,
                conversion: Conversion::Reencoded,
            }),
            Err(e) => match self.fallback {
                FallbackPolicy::Fail => Err(Error::SampleLength {
                    expected,
                    actual: raw.samples.len(),
                }),
                FallbackPolicy::WhiteFill => {
                    warn!(
                        width = raw.width,
                        height = raw.height,
                        "undecodable samples ({}), substituting white",
                        e
                    );
                    white_fill(raw.width, raw.height, raw.bits_per_component)
                }
            },
        }
    }
}

/// Uniform white gray raster of the given size and depth.
pub fn white_fill(width: u32, height: u32, bits_per_component: u8) -> Result<GrayRaster> {
    let bytes = RawRaster { samples: &[], channels: 1, width, height, bits_per_component }.expected_len()?;
    Ok(GrayRaster {
        samples: vec![0xFF; bytes],
        width,
        height,
        bits_per_component,
        conversion: Conversion::WhiteFill,
    })
}

/// Per-pixel conversion. Short buffers are padded with white, long ones truncated.
fn convert_samples(raw: &RawRaster, expected: usize) -> Vec<u8> {
    let mut samples = raw.samples.to_vec();
    samples.resize(expected, 0xFF);

    // Bounded by `expected`, which already passed the size ceiling
    let pixel_count = raw.width as usize * raw.height as usize;
    let channels = raw.channels as usize;

    if raw.bits_per_component == 8 {
        let mut out = Vec::with_capacity(pixel_count);
        for px in samples.chunks_exact(channels) {
            out.push(match channels {
                1 => px[0],
                3 => luma8(px[0], px[1], px[2]),
                _ => {
                    let (r, g, b) = cmyk_to_rgb(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32, 255.0);
                    luma(r, g, b).clamp(0.0, 255.0) as u8
                }
            });
        }
        out
    } else {
        let mut out = Vec::with_capacity(pixel_count * 2);
        for px in samples.chunks_exact(channels * 2) {
            let c = |i: usize| u16::from_be_bytes([px[i * 2], px[i * 2 + 1]]);
            let y = match channels {
                1 => c(0),
                3 => luma16(c(0), c(1), c(2)),
                _ => {
                    let (r, g, b) = cmyk_to_rgb(c(0) as f32, c(1) as f32, c(2) as f32, c(3) as f32, 65535.0);
                    luma(r, g, b).clamp(0.0, 65535.0) as u16
                }
            };
            out.extend_from_slice(&y.to_be_bytes());
        }
        out
    }
}

/// Treat the bytes as an encoded image and produce gray samples of the declared size.
fn decode_encoded(raw: &RawRaster) -> Result<Vec<u8>> {
    let img = image::load_from_memory(raw.samples)?;
    let img = if img.dimensions() != (raw.width, raw.height) {
        img.resize_exact(raw.width, raw.height, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let gray = to_gray_image(&img);
    if raw.bits_per_component == 16 {
        Ok(gray
            .to_luma16()
            .into_raw()
            .into_iter()
            .flat_map(|v| v.to_be_bytes())
            .collect())
    } else {
        Ok(gray.to_luma8().into_raw())
    }
}
