//! Page geometry audit and scale-to-fit repair
//!
//! Pages are measured by their declared MediaBox. An oversized page gets a new
//! MediaBox equal to the profile bound for its orientation, and its content is
//! wrapped in a `q … cm … Q` pair that scales it uniformly and centers it.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use tracing::debug;

use super::store::{inherited_attribute, number, pdf_number, resolve};
use crate::error::{Error, Result};
use crate::profile::{ComplianceProfile, Orientation};

/// Page boxes that live in the old coordinate space and are dropped on fix.
/// CropBox is inheritable, so it is overwritten instead.
const STALE_BOXES: [&[u8]; 3] = [b"BleedBox", b"TrimBox", b"ArtBox"];

/// Represents a PDF transformation matrix [a b c d e f]
/// where: x' = a*x + c*y + e, y' = b*x + d*y + f
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformMatrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl TransformMatrix {
    /// Uniform scale followed by translation
    pub fn scale_translate(scale: f32, tx: f32, ty: f32) -> Self {
        Self { a: scale, b: 0.0, c: 0.0, d: scale, e: tx, f: ty }
    }

    /// Map a point through the matrix
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Content stream operator setting this matrix
    fn to_cm(self) -> String {
        format!(
            "{} {} {} {} {} {} cm",
            fmt_num(self.a),
            fmt_num(self.b),
            fmt_num(self.c),
            fmt_num(self.d),
            fmt_num(self.e),
            fmt_num(self.f)
        )
    }
}

/// Format a number for a content stream without exponent notation
fn fmt_num(value: f32) -> String {
    let s = format!("{:.6}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Compliance class of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageClass {
    Compliant,
    OversizedPortrait,
    OversizedLandscape,
}

/// Measurement of one page's MediaBox
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageGeometry {
    /// 0-based page index
    pub index: usize,
    #[serde(skip)]
    pub page_id: ObjectId,
    /// Lower-left corner of the MediaBox
    pub origin: (f32, f32),
    pub width_pt: f32,
    pub height_pt: f32,
    pub class: PageClass,
}

impl PageGeometry {
    pub fn orientation(&self) -> Orientation {
        Orientation::of(self.width_pt, self.height_pt)
    }

    pub fn is_oversized(&self) -> bool {
        self.class != PageClass::Compliant
    }
}

/// Classify a page size against the profile's orientation-aware bound.
pub fn classify(width: f32, height: f32, profile: &ComplianceProfile) -> PageClass {
    if !profile.page_bound().is_exceeded_by(width, height, profile.tolerance_pt) {
        return PageClass::Compliant;
    }
    match Orientation::of(width, height) {
        Orientation::Portrait => PageClass::OversizedPortrait,
        Orientation::Landscape => PageClass::OversizedLandscape,
    }
}

/// Read a page's MediaBox as `[llx, lly, urx, ury]`, normalised so that
/// `llx <= urx` and `lly <= ury`.
pub fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f32; 4]> {
    let Some(Object::Array(values)) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return Err(Error::General(format!("page {:?} has no MediaBox", page_id)));
    };

    let coords: Vec<f32> = values
        .iter()
        .filter_map(|o| resolve(doc, o).and_then(number))
        .collect();
    if coords.len() != 4 {
        return Err(Error::General(format!("page {:?} has a malformed MediaBox", page_id)));
    }

    Ok([
        coords[0].min(coords[2]),
        coords[1].min(coords[3]),
        coords[0].max(coords[2]),
        coords[1].max(coords[3]),
    ])
}

/// Measure every page of `doc`. Pure read.
pub fn audit_pages(doc: &Document, profile: &ComplianceProfile) -> Result<Vec<PageGeometry>> {
    let mut pages = Vec::new();

    for (index, (_page_num, page_id)) in doc.get_pages().into_iter().enumerate() {
        let [llx, lly, urx, ury] = media_box(doc, page_id)?;
        let (width_pt, height_pt) = (urx - llx, ury - lly);

        pages.push(PageGeometry {
            index,
            page_id,
            origin: (llx, lly),
            width_pt,
            height_pt,
            class: classify(width_pt, height_pt, profile),
        });
    }

    Ok(pages)
}

/// Scale and centering offset that fit a page into the profile bound
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageFit {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub target_width: f32,
    pub target_height: f32,
}

/// Compute the uniform scale-to-fit factor and centering offset for a
/// `width × height` page against the bound for its orientation.
pub fn compute_fit(width: f32, height: f32, profile: &ComplianceProfile) -> PageFit {
    let bound = profile.page_bound().oriented(Orientation::of(width, height));
    let scale = (bound.width / width).min(bound.height / height);

    PageFit {
        scale,
        offset_x: (bound.width - width * scale) / 2.0,
        offset_y: (bound.height - height * scale) / 2.0,
        target_width: bound.width,
        target_height: bound.height,
    }
}

/// A page that was rewritten, with its measurement before the fix
#[derive(Debug, Clone, Serialize)]
pub struct FixedPage {
    pub before: PageGeometry,
    pub fit: PageFit,
}

/// Rewrite one page so it exactly matches the profile bound.
///
/// The MediaBox becomes `[0 0 W H]`; the existing content streams are
/// bracketed by a prefix stream holding the fit transform and a suffix
/// restoring the graphics state. Annotation rectangles are mapped through the
/// same transform.
pub fn fix_page(doc: &mut Document, page: &PageGeometry, profile: &ComplianceProfile) -> Result<PageFit> {
    let fit = compute_fit(page.width_pt, page.height_pt, profile);
    let (llx, lly) = page.origin;
    let matrix = TransformMatrix::scale_translate(
        fit.scale,
        fit.offset_x - llx * fit.scale,
        fit.offset_y - lly * fit.scale,
    );

    let existing = content_references(doc, page.page_id)?;

    let prefix_id = doc.add_object(Stream::new(
        Dictionary::new(),
        format!("q\n{}\n", matrix.to_cm()).into_bytes(),
    ));
    let suffix_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(prefix_id));
    contents.extend(existing);
    contents.push(Object::Reference(suffix_id));

    let new_box = Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        pdf_number(fit.target_width),
        pdf_number(fit.target_height),
    ]);

    let annotation_ids = {
        let page_dict = doc.get_dictionary_mut(page.page_id)?;
        page_dict.set("Contents", Object::Array(contents));
        page_dict.set("MediaBox", new_box.clone());
        page_dict.set("CropBox", new_box);
        for key in STALE_BOXES {
            page_dict.remove(key);
        }
        map_direct_annotations(page_dict, &matrix)
    };
    for id in annotation_ids {
        if let Ok(Object::Dictionary(annot)) = doc.get_object_mut(id) {
            map_rect(annot, &matrix);
        }
    }

    debug!(
        page = page.index,
        scale = fit.scale,
        offset_x = fit.offset_x,
        offset_y = fit.offset_y,
        "fitted page to {}x{}",
        fit.target_width,
        fit.target_height
    );

    Ok(fit)
}

/// Fix every oversized page of `doc`, returning what was changed.
pub fn fix_oversized_pages(doc: &mut Document, profile: &ComplianceProfile) -> Result<Vec<FixedPage>> {
    let mut fixed = Vec::new();
    for page in audit_pages(doc, profile)? {
        if page.is_oversized() {
            let fit = fix_page(doc, &page, profile)?;
            fixed.push(FixedPage { before: page, fit });
        }
    }
    Ok(fixed)
}

/// Content stream references of a page, flattening an indirect array.
fn content_references(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page_dict = doc.get_dictionary(page_id)?;
    let refs = match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(arr) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    };
    Ok(refs)
}

/// Map Rect of annotations stored inline in the page's Annots array and return
/// the references of those stored as separate objects.
fn map_direct_annotations(page_dict: &mut Dictionary, matrix: &TransformMatrix) -> Vec<ObjectId> {
    let mut indirect = Vec::new();
    if let Ok(Object::Array(annots)) = page_dict.get_mut(b"Annots") {
        for annot in annots.iter_mut() {
            match annot {
                Object::Reference(id) => indirect.push(*id),
                Object::Dictionary(dict) => map_rect(dict, matrix),
                _ => {}
            }
        }
    }
    indirect
}

fn map_rect(annot: &mut Dictionary, matrix: &TransformMatrix) {
    let Ok(Object::Array(rect)) = annot.get(b"Rect") else {
        return;
    };
    let coords: Vec<f32> = rect.iter().filter_map(number).collect();
    if coords.len() != 4 {
        return;
    }

    let (x0, y0) = matrix.apply(coords[0], coords[1]);
    let (x1, y1) = matrix.apply(coords[2], coords[3]);
    annot.set(
        "Rect",
        Object::Array(vec![pdf_number(x0), pdf_number(y0), pdf_number(x1), pdf_number(y1)]),
    );
}
