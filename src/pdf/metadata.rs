//! PDF metadata and compliance inventory

use std::path::{Path, PathBuf};

use lopdf::{Document, Object};
use serde::Serialize;

use super::geometry::{audit_pages, PageGeometry};
use super::store::{collect_images, resolve, ImageObject};
use crate::error::{Error, Result};
use crate::profile::ComplianceProfile;

/// Count pages by reading the Count field from the Pages dictionary
/// This is more reliable than get_pages() which doesn't handle nested page trees
fn count_pages_from_catalog(doc: &Document) -> Result<usize> {
    let catalog = doc
        .catalog()
        .map_err(|_| Error::General("No catalog in trailer".to_string()))?;

    let pages = catalog
        .get(b"Pages")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| Error::General("Catalog has no Pages dictionary".to_string()))?;

    match pages.get(b"Count") {
        Ok(Object::Integer(n)) if *n >= 0 => Ok(*n as usize),
        Ok(_) => Err(Error::General("Count is not a non-negative integer".to_string())),
        Err(_) => Err(Error::General("No Count in Pages".to_string())),
    }
}

/// A text entry of the Info dictionary, if it is valid UTF-8
fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok().and_then(|obj| resolve(doc, obj))?;
    let bytes = info.as_dict().ok()?.get(key).ok()?.as_str().ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Everything `info` reports about one PDF
#[derive(Debug, Clone, Serialize)]
pub struct PdfMetadata {
    pub path: PathBuf,
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
    /// Per-page MediaBox measurement against the profile
    pub pages: Vec<PageGeometry>,
    /// Every reachable image XObject with its declared encoding
    pub images: Vec<ImageObject>,
}

impl PdfMetadata {
    pub fn oversized_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_oversized()).count()
    }

    pub fn color_images(&self) -> usize {
        self.images.iter().filter(|i| i.needs_conversion()).count()
    }
}

/// Extract metadata and a page/image inventory from a PDF file
pub fn extract_metadata(path: &Path, profile: &ComplianceProfile) -> Result<PdfMetadata> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;

    let page_count = count_pages_from_catalog(&doc)?;
    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(PdfMetadata {
        path: path.to_path_buf(),
        page_count,
        title: info_string(&doc, b"Title"),
        author: info_string(&doc, b"Author"),
        pages: audit_pages(&doc, profile)?,
        images: collect_images(&doc),
    })
}

/// Count the number of pages in a PDF file
///
/// This is a quick operation that reads the Count field from the Pages dictionary.
pub fn count_pages(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let page_count = count_pages_from_catalog(&doc)?;

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(page_count)
}
