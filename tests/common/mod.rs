//! PDF and image builders shared by the integration tests

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GrayImage, Luma, Rgb, RgbImage};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// A page to build: MediaBox size and image XObjects named /Im1, /Im2, ...
pub struct PageSpec {
    pub width: i64,
    pub height: i64,
    pub images: Vec<ObjectId>,
}

impl PageSpec {
    pub fn blank(width: i64, height: i64) -> Self {
        Self { width, height, images: Vec::new() }
    }

    pub fn letter(images: Vec<ObjectId>) -> Self {
        Self { width: 612, height: 792, images }
    }
}

/// Start a document and reserve its Pages id
pub fn new_doc() -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    (doc, pages_id)
}

/// Add the pages, the page tree and the catalog, then save.
pub fn finish_doc(mut doc: Document, pages_id: ObjectId, pages: &[PageSpec], path: &Path) {
    let mut kids = Vec::new();
    for spec in pages {
        let content = if spec.images.is_empty() {
            "0 0 m 100 100 l S".to_string()
        } else {
            (1..=spec.images.len())
                .map(|n| format!("q 100 0 0 100 50 50 cm /Im{} Do Q", n))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(spec.width),
                Object::Integer(spec.height),
            ],
        };
        if !spec.images.is_empty() {
            let mut xobjects = Dictionary::new();
            for (n, &image_id) in spec.images.iter().enumerate() {
                xobjects.set(format!("Im{}", n + 1), image_id);
            }
            page.set("Resources", dictionary! { "XObject" => xobjects });
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => Object::Integer(kids.len() as i64),
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Write a PDF with blank pages of the given sizes
pub fn write_blank_pdf(path: &Path, sizes: &[(i64, i64)]) {
    let (doc, pages_id) = new_doc();
    let pages: Vec<PageSpec> = sizes.iter().map(|&(w, h)| PageSpec::blank(w, h)).collect();
    finish_doc(doc, pages_id, &pages, path);
}

fn image_dict(width: i64, height: i64, color_space: &str, filter: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(width),
        "Height" => Object::Integer(height),
        "ColorSpace" => color_space,
        "BitsPerComponent" => Object::Integer(8),
        "Filter" => filter,
    }
}

/// Add a 4×4 RGB image with Flate-compressed samples
pub fn add_flate_rgb_image(doc: &mut Document) -> ObjectId {
    let samples: Vec<u8> = (0..16u8).flat_map(|i| [i * 16, 255 - i * 16, 128]).collect();
    doc.add_object(Stream::new(image_dict(4, 4, "DeviceRGB", "FlateDecode"), deflate(&samples)).with_compression(false))
}

/// Add a 16×8 RGB JPEG image
pub fn add_dct_rgb_image(doc: &mut Document) -> ObjectId {
    let img = RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 15) as u8, (y * 30) as u8, 200]));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .encode(img.as_raw(), 16, 8, ExtendedColorType::Rgb8)
        .unwrap();

    doc.add_object(Stream::new(image_dict(16, 8, "DeviceRGB", "DCTDecode"), jpeg).with_compression(false))
}

/// Two Letter pages sharing one Flate RGB image
pub fn write_shared_image_pdf(path: &Path) {
    let (mut doc, pages_id) = new_doc();
    let image = add_flate_rgb_image(&mut doc);
    let pages = [PageSpec::letter(vec![image]), PageSpec::letter(vec![image])];
    finish_doc(doc, pages_id, &pages, path);
}

/// One Letter page with a JPEG RGB image
pub fn write_dct_image_pdf(path: &Path) {
    let (mut doc, pages_id) = new_doc();
    let image = add_dct_rgb_image(&mut doc);
    finish_doc(doc, pages_id, &[PageSpec::letter(vec![image])], path);
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// One Letter page whose RGB image declares an absurd 4e9 x 4e9 size
pub fn write_huge_image_pdf(path: &Path) {
    let (mut doc, pages_id) = new_doc();
    let dict = image_dict(4_000_000_000, 4_000_000_000, "DeviceRGB", "FlateDecode");
    let image = doc.add_object(Stream::new(dict, deflate(&[1, 2, 3])).with_compression(false));
    finish_doc(doc, pages_id, &[PageSpec::letter(vec![image])], path);
}

/// One Letter page showing a Flate RGB image and an LZW RGB image
pub fn write_mixed_filter_pdf(path: &Path) {
    let (mut doc, pages_id) = new_doc();
    let flate = add_flate_rgb_image(&mut doc);
    let lzw = doc.add_object(
        Stream::new(image_dict(4, 4, "DeviceRGB", "LZWDecode"), vec![0x80, 0x0B, 0x60]).with_compression(false),
    );
    finish_doc(doc, pages_id, &[PageSpec::letter(vec![flate, lzw])], path);
}

pub fn write_color_png(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([180, 40, 40])))
        .save(path)
        .unwrap();
}

pub fn write_gray_png(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([128])))
        .save(path)
        .unwrap();
}

/// The image reference stored under `name` on every page, in page order
pub fn page_xobject_refs(doc: &Document, name: &[u8]) -> Vec<ObjectId> {
    doc.get_pages()
        .into_values()
        .filter_map(|page_id| {
            let page = doc.get_dictionary(page_id).ok()?;
            let resources = page.get(b"Resources").ok()?.as_dict().ok()?;
            let xobjects = resources.get(b"XObject").ok()?.as_dict().ok()?;
            xobjects.get(name).ok()?.as_reference().ok()
        })
        .collect()
}

/// The `/Im1` reference of every page, in page order
pub fn page_image_refs(doc: &Document) -> Vec<ObjectId> {
    page_xobject_refs(doc, b"Im1")
}

/// Width and height of each page's MediaBox
pub fn page_sizes(doc: &Document) -> Vec<(f32, f32)> {
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            let media_box = doc.get_dictionary(page_id).unwrap().get(b"MediaBox").unwrap();
            let values: Vec<f32> = media_box
                .as_array()
                .unwrap()
                .iter()
                .map(|v| match v {
                    Object::Integer(i) => *i as f32,
                    Object::Real(r) => *r as f32,
                    _ => panic!("non-numeric MediaBox entry"),
                })
                .collect();
            (values[2] - values[0], values[3] - values[1])
        })
        .collect()
}

pub fn name_of<'a>(dict: &'a Dictionary, key: &[u8]) -> &'a [u8] {
    match dict.get(key).unwrap() {
        Object::Name(n) => n,
        other => panic!("expected a name, got {:?}", other),
    }
}
