//! Grayscale conversion of image XObjects
//!
//! Each image reachable from the page tree is visited once and, unless it is
//! already gray, decoded according to its filter, converted, re-encoded and
//! stored back at the same object reference. A failure on one image never
//! aborts the document; it is recorded and the walk continues.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use tracing::{debug, warn};

use super::store::{number, ImageFilter, ImageObject, ObjectStore};
use crate::error::{Error, Result};
use crate::raster::normalize::to_gray_image;
use crate::raster::{Conversion, FallbackPolicy, RasterColorNormalizer, RawRaster};

/// Default JPEG quality for re-encoded DCTDecode images
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// An image that could not be converted
#[derive(Debug, Clone, Serialize)]
pub struct UnfixableImage {
    pub object_ref: ObjectId,
    pub reason: String,
}

/// Outcome of a rewrite pass over one document
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageRewriteSummary {
    /// Images rewritten as DeviceGray
    pub converted: usize,
    /// Images that were already gray (or stencil masks)
    pub already_gray: usize,
    /// Converted images whose samples were replaced with white
    pub white_filled: usize,
    pub unfixable: Vec<UnfixableImage>,
}

/// Rewrites color image XObjects as grayscale in place
#[derive(Debug, Clone, Copy)]
pub struct ImageObjectRewriter {
    normalizer: RasterColorNormalizer,
    jpeg_quality: u8,
}

impl Default for ImageObjectRewriter {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY, FallbackPolicy::default())
    }
}

impl ImageObjectRewriter {
    pub fn new(jpeg_quality: u8, fallback: FallbackPolicy) -> Self {
        Self {
            normalizer: RasterColorNormalizer::new(fallback),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Convert every non-gray image in `store`.
    pub fn rewrite_all<S: ObjectStore + ?Sized>(&self, store: &mut S) -> ImageRewriteSummary {
        let mut summary = ImageRewriteSummary::default();

        for image in store.enumerate_images() {
            if !image.needs_conversion() {
                summary.already_gray += 1;
                continue;
            }

            let converted = match store.lookup(image.object_ref) {
                Ok(Object::Stream(stream)) => self.convert(&*store, &image, stream),
                Ok(_) => Err(Error::General("image reference is not a stream".to_string())),
                Err(e) => Err(e),
            };
            let result = converted.and_then(|(stream, conversion)| {
                store.assign(image.object_ref, Object::Stream(stream))?;
                Ok(conversion)
            });

            match result {
                Ok(conversion) => {
                    summary.converted += 1;
                    if conversion == Conversion::WhiteFill {
                        summary.white_filled += 1;
                    }
                    debug!(
                        object = ?image.object_ref,
                        from = %image.color_space.label(),
                        ?conversion,
                        "converted image to DeviceGray"
                    );
                }
                Err(e) => {
                    warn!(object = ?image.object_ref, "image unfixable: {}", e);
                    summary.unfixable.push(UnfixableImage {
                        object_ref: image.object_ref,
                        reason: e.to_string(),
                    });
                }
            }
        }

        summary
    }

    /// Produce the grayscale replacement for one image stream.
    ///
    /// `store` resolves indirect entries of the stream dictionary.
    pub fn convert<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        image: &ImageObject,
        stream: &Stream,
    ) -> Result<(Stream, Conversion)> {
        let channels = image
            .color_space
            .channels()
            .ok_or_else(|| Error::UnsupportedColorSpace(image.color_space.label()))?;

        match &image.filter {
            ImageFilter::DCTDecode => {
                let jpeg = self.regray_jpeg(&stream.content)?;
                let mut dict = gray_dict(&stream.dict, 8);
                dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
                Ok((Stream::new(dict, jpeg).with_compression(false), Conversion::Reencoded))
            }
            ImageFilter::FlateDecode => {
                let inflated = inflate(&stream.content)?;
                let parms = decode_parms(store, &stream.dict)?;
                let samples = match parms {
                    Some(parms) => undo_predictor(parms, inflated, channels, image)?,
                    None => inflated,
                };
                self.flate_gray(image, stream, &samples, channels)
            }
            ImageFilter::None => self.flate_gray(image, stream, &stream.content, channels),
            ImageFilter::Other(filter) => Err(Error::UnsupportedFilter(filter.clone())),
        }
    }

    /// Normalize raw samples and wrap them as a Flate-compressed gray stream.
    fn flate_gray(
        &self,
        image: &ImageObject,
        stream: &Stream,
        samples: &[u8],
        channels: u8,
    ) -> Result<(Stream, Conversion)> {
        let gray = self.normalizer.normalize(&RawRaster {
            samples,
            channels,
            width: image.width,
            height: image.height,
            bits_per_component: image.bits_per_component,
        })?;

        let mut dict = gray_dict(&stream.dict, gray.bits_per_component);
        dict.set("ColorSpace", Object::Name(gray.color_space().as_bytes().to_vec()));
        dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        let compressed = deflate(&gray.samples)?;
        Ok((Stream::new(dict, compressed).with_compression(false), gray.conversion))
    }

    /// Decode a JPEG and re-encode it single channel.
    fn regray_jpeg(&self, data: &[u8]) -> Result<Vec<u8>> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| Error::Undecodable(format!("JPEG: {}", e)))?;
        let gray = to_gray_image(&img).to_luma8();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.jpeg_quality).encode(
            gray.as_raw(),
            gray.width(),
            gray.height(),
            image::ExtendedColorType::L8,
        )?;
        Ok(out)
    }
}

/// Copy an image dictionary, declaring DeviceGray and dropping entries that
/// described the old channel layout or encoding.
fn gray_dict(original: &Dictionary, bits_per_component: u8) -> Dictionary {
    let mut dict = original.clone();
    dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(bits_per_component as i64));
    dict.remove(b"Decode");
    dict.remove(b"DecodeParms");
    dict.remove(b"Length");
    dict
}

/// Images in `doc` that a grayscale profile would reject.
pub fn audit_colors(doc: &Document) -> Vec<ImageObject> {
    doc.enumerate_images()
        .into_iter()
        .filter(ImageObject::needs_conversion)
        .collect()
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Undecodable(format!("FlateDecode: {}", e)))?;
    Ok(out)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// The DecodeParms dictionary of a single-filter image, if any.
///
/// Accepts a direct dictionary, a reference to one, or a one-element array
/// holding either. Null entries mean no parameters.
fn decode_parms<'a, S: ObjectStore + ?Sized>(store: &'a S, dict: &'a Dictionary) -> Result<Option<&'a Dictionary>> {
    let Ok(entry) = dict.get(b"DecodeParms") else {
        return Ok(None);
    };
    let entry = match entry {
        Object::Array(items) => match items.as_slice() {
            [] => return Ok(None),
            [single] => single,
            _ => {
                return Err(Error::UnsupportedFilter(format!(
                    "DecodeParms with {} entries for a single filter",
                    items.len()
                )))
            }
        },
        other => other,
    };
    let entry = match entry {
        Object::Reference(id) => store.lookup(*id)?,
        other => other,
    };

    match entry {
        Object::Dictionary(parms) => Ok(Some(parms)),
        Object::Null => Ok(None),
        other => Err(Error::Undecodable(format!("DecodeParms is a {}", other.enum_variant()))),
    }
}

/// Undo a PNG predictor declared in DecodeParms. TIFF predictors are not supported.
fn undo_predictor(parms: &Dictionary, data: Vec<u8>, channels: u8, image: &ImageObject) -> Result<Vec<u8>> {
    match decode_parm(parms, b"Predictor", 1) {
        1 => Ok(data),
        2 => Err(Error::UnsupportedFilter("FlateDecode with TIFF predictor".to_string())),
        _ => {
            let colors = decode_parm(parms, b"Colors", channels as usize);
            let bpc = decode_parm(parms, b"BitsPerComponent", image.bits_per_component as usize);
            let columns = decode_parm(parms, b"Columns", image.width as usize);
            undo_png_predictor(&data, colors, bpc, columns)
        }
    }
}

fn decode_parm(parms: &Dictionary, key: &[u8], default: usize) -> usize {
    parms
        .get(key)
        .ok()
        .and_then(number)
        .map(|n| n.max(0.0) as usize)
        .unwrap_or(default)
}

/// Reverse PNG row filters (None, Sub, Up, Average, Paeth).
fn undo_png_predictor(data: &[u8], colors: usize, bpc: usize, columns: usize) -> Result<Vec<u8>> {
    let pixel_bits = colors
        .checked_mul(bpc)
        .ok_or_else(|| Error::Undecodable("predictor pixel size overflows".to_string()))?;
    let bpp = pixel_bits.div_ceil(8).max(1);
    let row_len = columns
        .checked_mul(pixel_bits)
        .map(|bits| bits.div_ceil(8))
        .ok_or_else(|| Error::Undecodable("predictor row length overflows".to_string()))?;
    if row_len == 0 {
        return Err(Error::Undecodable("predictor row length is zero".to_string()));
    }
    // Each row carries a filter byte; a row longer than the data is corrupt
    if row_len >= data.len() {
        return Err(Error::Undecodable(format!(
            "predictor row of {} bytes exceeds {} bytes of data",
            row_len,
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < row_len + 1 {
            break;
        }
        let filter = chunk[0];
        let mut row = chunk[1..].to_vec();

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match filter {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(Error::Undecodable(format!("unknown PNG row filter {}", other)));
                }
            };
        }

        out.extend_from_slice(&row);
        prev = row;
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
