//! Object graph access for the image rewriter
//!
//! The rewriter only needs three things from a PDF library: look an object
//! up by reference, replace it at the same reference, and list the image
//! XObjects reachable from the page tree. [`ObjectStore`] captures that, and
//! `lopdf::Document` implements it.

use std::collections::BTreeSet;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Guard against cyclic Parent chains in malformed page trees
const MAX_TREE_DEPTH: usize = 64;

/// Minimal object graph interface used by the image rewriter
pub trait ObjectStore {
    /// Resolve a reference
    fn lookup(&self, id: ObjectId) -> Result<&Object>;

    /// Replace the object stored at an existing reference
    fn assign(&mut self, id: ObjectId, object: Object) -> Result<()>;

    /// Every image XObject reachable from the pages, each listed once
    fn enumerate_images(&self) -> Vec<ImageObject>;
}

impl ObjectStore for Document {
    fn lookup(&self, id: ObjectId) -> Result<&Object> {
        Ok(self.get_object(id)?)
    }

    fn assign(&mut self, id: ObjectId, object: Object) -> Result<()> {
        if !self.objects.contains_key(&id) {
            return Err(Error::Pdf(lopdf::Error::ObjectNotFound(id)));
        }
        self.objects.insert(id, object);
        Ok(())
    }

    fn enumerate_images(&self) -> Vec<ImageObject> {
        collect_images(self)
    }
}

/// Declared color space of an image XObject
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColorSpaceKind {
    DeviceGray,
    CalGray,
    DeviceRGB,
    CalRGB,
    DeviceCMYK,
    /// ICC profile with `N` components
    IccBased(u8),
    Other(String),
}

impl ColorSpaceKind {
    /// Interleaved components per pixel, when the space is convertible
    pub fn channels(&self) -> Option<u8> {
        match self {
            ColorSpaceKind::DeviceGray | ColorSpaceKind::CalGray => Some(1),
            ColorSpaceKind::DeviceRGB | ColorSpaceKind::CalRGB => Some(3),
            ColorSpaceKind::DeviceCMYK => Some(4),
            ColorSpaceKind::IccBased(n) if matches!(*n, 1 | 3 | 4) => Some(*n),
            _ => None,
        }
    }

    pub fn is_gray(&self) -> bool {
        self.channels() == Some(1)
    }

    pub fn label(&self) -> String {
        match self {
            ColorSpaceKind::IccBased(n) => format!("ICCBased(N={})", n),
            ColorSpaceKind::Other(name) => name.clone(),
            other => format!("{:?}", other),
        }
    }
}

/// Declared stream filter of an image XObject
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImageFilter {
    None,
    FlateDecode,
    DCTDecode,
    Other(String),
}

/// An embedded raster and its declared encoding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageObject {
    /// Stable identity; rewriting keeps the same reference
    pub object_ref: ObjectId,
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpaceKind,
    pub filter: ImageFilter,
    pub bits_per_component: u8,
    /// Stencil masks carry no color of their own
    pub image_mask: bool,
}

impl ImageObject {
    /// Whether this image must be converted to satisfy a grayscale profile
    pub fn needs_conversion(&self) -> bool {
        !self.image_mask && !self.color_space.is_gray()
    }

    /// Read the declared attributes of an image stream.
    pub fn from_stream(doc: &Document, object_ref: ObjectId, stream: &Stream) -> Self {
        let dict = &stream.dict;

        let image_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
        let color_space = match dict.get(b"ColorSpace") {
            Ok(obj) => parse_color_space(doc, obj),
            Err(_) => ColorSpaceKind::Other("none".to_string()),
        };

        Self {
            object_ref,
            width: integer_entry(doc, dict, b"Width").unwrap_or(0),
            height: integer_entry(doc, dict, b"Height").unwrap_or(0),
            color_space,
            filter: parse_filter(dict),
            bits_per_component: integer_entry(doc, dict, b"BitsPerComponent").unwrap_or(8) as u8,
            image_mask,
        }
    }
}

fn integer_entry(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(number)
        .map(|n| n.max(0.0) as u32)
}

fn parse_color_space(doc: &Document, obj: &Object) -> ColorSpaceKind {
    let Some(obj) = resolve(doc, obj) else {
        return ColorSpaceKind::Other("unresolved".to_string());
    };

    match obj {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"G" => ColorSpaceKind::DeviceGray,
            b"DeviceRGB" | b"RGB" => ColorSpaceKind::DeviceRGB,
            b"DeviceCMYK" | b"CMYK" => ColorSpaceKind::DeviceCMYK,
            other => ColorSpaceKind::Other(String::from_utf8_lossy(other).to_string()),
        },
        Object::Array(arr) => {
            let family = arr.first().and_then(name).unwrap_or(&b""[..]);
            match family {
                b"CalGray" => ColorSpaceKind::CalGray,
                b"CalRGB" => ColorSpaceKind::CalRGB,
                b"ICCBased" => {
                    let components = arr
                        .get(1)
                        .and_then(|o| resolve(doc, o))
                        .and_then(|o| match o {
                            Object::Stream(s) => s.dict.get(b"N").ok().and_then(number),
                            _ => None,
                        })
                        .map(|n| n as u8)
                        .unwrap_or(0);
                    ColorSpaceKind::IccBased(components)
                }
                // Single-element arrays like [/DeviceRGB]
                _ if arr.len() == 1 => parse_color_space(doc, &arr[0]),
                other => ColorSpaceKind::Other(String::from_utf8_lossy(other).to_string()),
            }
        }
        _ => ColorSpaceKind::Other("malformed".to_string()),
    }
}

fn parse_filter(dict: &Dictionary) -> ImageFilter {
    let single = |n: &[u8]| match n {
        b"FlateDecode" | b"Fl" => ImageFilter::FlateDecode,
        b"DCTDecode" | b"DCT" => ImageFilter::DCTDecode,
        other => ImageFilter::Other(String::from_utf8_lossy(other).to_string()),
    };

    match dict.get(b"Filter") {
        Err(_) => ImageFilter::None,
        Ok(Object::Name(n)) => single(n.as_slice()),
        Ok(Object::Array(arr)) if arr.is_empty() => ImageFilter::None,
        Ok(Object::Array(arr)) if arr.len() == 1 => match &arr[0] {
            Object::Name(n) => single(n.as_slice()),
            _ => ImageFilter::Other("malformed".to_string()),
        },
        Ok(Object::Array(arr)) => ImageFilter::Other(
            arr.iter()
                .filter_map(name)
                .map(|n| String::from_utf8_lossy(n).to_string())
                .collect::<Vec<_>>()
                .join("+"),
        ),
        Ok(_) => ImageFilter::Other("malformed".to_string()),
    }
}

/// Walk every page's resources (and nested Form XObjects) collecting image
/// XObjects. Shared objects appear once, in first-seen page order.
pub fn collect_images(doc: &Document) -> Vec<ImageObject> {
    let mut visited: BTreeSet<ObjectId> = BTreeSet::new();
    let mut images = Vec::new();

    for (_page_num, page_id) in doc.get_pages() {
        if let Some(resources) = inherited_attribute(doc, page_id, b"Resources") {
            collect_from_resources(doc, resources, &mut visited, &mut images);
        }
    }

    debug!(count = images.len(), "enumerated image objects");
    images
}

fn collect_from_resources(
    doc: &Document,
    resources: &Object,
    visited: &mut BTreeSet<ObjectId>,
    images: &mut Vec<ImageObject>,
) {
    let Some(Object::Dictionary(resources)) = resolve(doc, resources) else {
        return;
    };
    let Some(Object::Dictionary(xobjects)) = resources.get(b"XObject").ok().and_then(|o| resolve(doc, o)) else {
        return;
    };

    for (_name, value) in xobjects.iter() {
        let Object::Reference(id) = value else {
            continue;
        };
        if !visited.insert(*id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(*id) else {
            continue;
        };

        match stream.dict.get(b"Subtype").ok().and_then(name) {
            Some(b"Image") => images.push(ImageObject::from_stream(doc, *id, stream)),
            Some(b"Form") => {
                if let Ok(form_resources) = stream.dict.get(b"Resources") {
                    collect_from_resources(doc, form_resources, visited, images);
                }
            }
            _ => {}
        }
    }
}

/// Look up a page attribute, following the Parent chain for inheritable keys.
pub fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return None,
        }
    }
    None
}

/// Follow a reference one level; direct objects are returned as-is.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Numeric value of an Integer or Real object
pub fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Numeric object, written as an Integer when the value is integral
pub fn pdf_number(value: f32) -> Object {
    if value.fract() == 0.0 && value.abs() < i32::MAX as f32 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value.into())
    }
}

pub fn name(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(n) => Some(n.as_slice()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn image_stream(color_space: Object, filter: Option<&str>) -> Stream {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(2),
            "Height" => Object::Integer(3),
            "BitsPerComponent" => Object::Integer(8),
            "ColorSpace" => color_space,
        };
        if let Some(f) = filter {
            dict.set("Filter", Object::Name(f.as_bytes().to_vec()));
        }
        Stream::new(dict, vec![0; 18])
    }

    #[test]
    fn test_image_object_from_stream() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(Object::Name(b"DeviceRGB".to_vec()), Some("FlateDecode"));
        let image = ImageObject::from_stream(&doc, (7, 0), &stream);

        assert_eq!(image.object_ref, (7, 0));
        assert_eq!((image.width, image.height), (2, 3));
        assert_eq!(image.color_space, ColorSpaceKind::DeviceRGB);
        assert_eq!(image.filter, ImageFilter::FlateDecode);
        assert!(image.needs_conversion());
    }

    #[test]
    fn test_icc_based_uses_component_count() {
        let mut doc = Document::with_version("1.5");
        let icc = doc.add_object(Stream::new(dictionary! { "N" => Object::Integer(1) }, vec![]));
        let cs = Object::Array(vec![Object::Name(b"ICCBased".to_vec()), Object::Reference(icc)]);
        let image = ImageObject::from_stream(&doc, (9, 0), &image_stream(cs, None));

        assert_eq!(image.color_space, ColorSpaceKind::IccBased(1));
        assert!(!image.needs_conversion());
        assert_eq!(image.filter, ImageFilter::None);
    }

    #[test]
    fn test_indexed_is_not_convertible() {
        let doc = Document::with_version("1.5");
        let cs = Object::Array(vec![
            Object::Name(b"Indexed".to_vec()),
            Object::Name(b"DeviceRGB".to_vec()),
            Object::Integer(1),
            Object::String(vec![0; 6], lopdf::StringFormat::Hexadecimal),
        ]);
        let image = ImageObject::from_stream(&doc, (3, 0), &image_stream(cs, None));

        assert_eq!(image.color_space, ColorSpaceKind::Other("Indexed".to_string()));
        assert_eq!(image.color_space.channels(), None);
        assert!(image.needs_conversion());
    }

    #[test]
    fn test_filter_arrays() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Array(vec![Object::Name(b"DCTDecode".to_vec())]));
        assert_eq!(parse_filter(&dict), ImageFilter::DCTDecode);

        dict.set(
            "Filter",
            Object::Array(vec![Object::Name(b"FlateDecode".to_vec()), Object::Name(b"DCTDecode".to_vec())]),
        );
        assert_eq!(parse_filter(&dict), ImageFilter::Other("FlateDecode+DCTDecode".to_string()));
    }

    #[test]
    fn test_images_shared_through_forms_are_listed_once() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let shared = doc.add_object(image_stream(Object::Name(b"DeviceRGB".to_vec()), None));
        let form_only = doc.add_object(image_stream(Object::Name(b"DeviceCMYK".to_vec()), None));

        // The form draws the shared image, its own image, and itself
        let form_id = doc.new_object_id();
        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im1" => shared, "Im2" => form_only, "Fm1" => form_id },
                },
            },
            b"/Im1 Do /Im2 Do".to_vec(),
        );
        doc.objects.insert(form_id, Object::Stream(form));

        let page = |xobjects: Dictionary| {
            dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
                "Resources" => dictionary! { "XObject" => xobjects },
            }
        };
        let first = doc.add_object(page(dictionary! { "Im1" => shared, "Fm1" => form_id }));
        let second = doc.add_object(page(dictionary! { "Im9" => shared }));
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => Object::Integer(2),
                "Kids" => vec![Object::Reference(first), Object::Reference(second)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let refs: Vec<ObjectId> = doc.enumerate_images().iter().map(|i| i.object_ref).collect();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&shared));
        assert!(refs.contains(&form_only));
    }

    #[test]
    fn test_assign_requires_existing_reference() {
        let mut doc = Document::with_version("1.5");
        let id = doc.add_object(Object::Integer(1));

        assert!(doc.assign(id, Object::Integer(2)).is_ok());
        assert!(matches!(doc.lookup(id).unwrap(), Object::Integer(2)));
        assert!(doc.assign((999, 0), Object::Null).is_err());
    }

    #[test]
    fn test_pdf_number() {
        assert!(matches!(pdf_number(612.0), Object::Integer(612)));
        assert!(matches!(pdf_number(0.5), Object::Real(_)));
    }
}
