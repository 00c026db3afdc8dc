//! Combining many small PDFs into one document

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::geometry::fix_oversized_pages;
use super::store::inherited_attribute;
use crate::asset::{check_asset_count, AssetCountCheck};
use crate::error::{Error, Result};
use crate::profile::ComplianceProfile;
use crate::vault::{BackupRecord, OriginalsVault, VaultConcern};

/// Page attributes a page may inherit from its ancestors in the page tree.
/// They are copied onto the page before it is moved under a new parent.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Options for combining PDFs
#[derive(Debug, Clone)]
pub struct CombineOptions {
    /// Input PDF file paths in the order their pages should appear
    pub input_paths: Vec<PathBuf>,
    /// Output PDF file path
    pub output_path: PathBuf,
    /// Move the sources into `_originals` next to them after a verified combine
    pub move_sources: bool,
}

/// What a combine produced
#[derive(Debug, Clone, Serialize)]
pub struct CombineResult {
    pub output_path: PathBuf,
    pub source_pages: usize,
    pub output_pages: usize,
    /// Pages that had to be fitted to the profile bound
    pub pages_fixed: usize,
    pub moved: Vec<BackupRecord>,
    /// Visible assets in the output directory after the combine
    pub asset_count: AssetCountCheck,
}

/// Combine several PDFs into one, fitting any oversized page to the profile.
///
/// Pages are copied in input order. A path listed more than once is combined
/// once, at its first position. The output is reloaded and its page count
/// checked against the sources before anything is moved; when
/// `move_sources` is set the sources then go into `<source dir>/_originals`.
///
/// # Example
///
/// ```no_run
/// use pdf_compliance::pdf::{combine_pdfs, CombineOptions};
/// use pdf_compliance::ComplianceProfile;
/// use std::path::PathBuf;
///
/// let options = CombineOptions {
///     input_paths: vec![PathBuf::from("fig-1.pdf"), PathBuf::from("fig-2.pdf")],
///     output_path: PathBuf::from("figures.pdf"),
///     move_sources: true,
/// };
///
/// let result = combine_pdfs(&options, &ComplianceProfile::publication()).expect("combine failed");
/// println!("{} pages", result.output_pages);
/// ```
pub fn combine_pdfs(options: &CombineOptions, profile: &ComplianceProfile) -> Result<CombineResult> {
    if options.input_paths.is_empty() {
        return Err(Error::General("No input files provided".to_string()));
    }

    let inputs = unique_inputs(&options.input_paths);

    for path in &inputs {
        if !path.exists() {
            return Err(Error::FileNotFound(path.clone()));
        }
        if same_file(path, &options.output_path) {
            return Err(Error::General(format!(
                "output {} is also an input",
                options.output_path.display()
            )));
        }
    }

    let mut documents = Vec::with_capacity(inputs.len());
    let mut source_pages = 0;
    for path in &inputs {
        let doc = Document::load(path)?;
        let pages = doc.get_pages().len();
        if pages == 0 {
            return Err(Error::EmptyPdf(path.clone()));
        }
        source_pages += pages;
        documents.push(doc);
    }

    let mut combined = concatenate(documents)?;
    verify_page_count(source_pages, combined.get_pages().len(), "combined document")?;

    let fixed = fix_oversized_pages(&mut combined, profile)?;
    for page in &fixed {
        info!(
            page = page.before.index,
            "combined page {}x{} fitted to {}x{}",
            page.before.width_pt,
            page.before.height_pt,
            page.fit.target_width,
            page.fit.target_height
        );
    }

    combined.compress();
    combined.save(&options.output_path)?;

    let output_pages = Document::load(&options.output_path)?.get_pages().len();
    verify_page_count(source_pages, output_pages, "saved output")?;
    info!(
        output = %options.output_path.display(),
        sources = inputs.len(),
        pages = output_pages,
        "combined documents"
    );

    let mut moved = Vec::new();
    if options.move_sources {
        for path in &inputs {
            let vault = OriginalsVault::for_concern(parent_dir(path), VaultConcern::Geometry);
            moved.push(vault.stash(path)?);
        }
    }

    let asset_count = check_asset_count(parent_dir(&options.output_path), profile.max_asset_count)?;
    debug!(count = asset_count.count, max = asset_count.max, "asset count after combine");

    Ok(CombineResult {
        output_path: options.output_path.clone(),
        source_pages,
        output_pages,
        pages_fixed: fixed.len(),
        moved,
        asset_count,
    })
}

/// Drop repeated inputs, keeping the first occurrence of each file.
fn unique_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = BTreeSet::new();
    let mut unique = Vec::with_capacity(paths.len());
    for path in paths {
        let key = path.canonicalize().unwrap_or_else(|_| path.clone());
        if seen.insert(key) {
            unique.push(path.clone());
        } else {
            warn!(path = %path.display(), "input listed more than once, combining it once");
        }
    }
    unique
}

fn verify_page_count(expected: usize, actual: usize, stage: &str) -> Result<()> {
    if actual != expected {
        return Err(Error::General(format!(
            "{} has {} pages, sources have {}",
            stage, actual, expected
        )));
    }
    Ok(())
}

/// Renumber each document past the previous ones and gather all their pages
/// under a single new page tree.
fn concatenate(documents: Vec<Document>) -> Result<Document> {
    let mut max_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut doc in documents {
        materialise_inherited(&mut doc)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        page_ids.extend(doc.get_pages().into_values());
        objects.extend(doc.objects);
    }

    let mut combined = Document::with_version("1.5");
    combined.objects.extend(objects);
    // new_object_id() must not hand out ids already taken by the sources
    combined.max_id = max_id - 1;

    let pages_id = combined.new_object_id();
    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(page_ids.len() as i64));
    pages.set(
        "Kids",
        Object::Array(page_ids.iter().map(|&id| Object::Reference(id)).collect()),
    );

    let catalog_id = combined.new_object_id();
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));

    combined.objects.insert(pages_id, Object::Dictionary(pages));
    combined.objects.insert(catalog_id, Object::Dictionary(catalog));
    combined.trailer.set("Root", Object::Reference(catalog_id));

    for &page_id in &page_ids {
        combined.get_dictionary_mut(page_id)?.set("Parent", Object::Reference(pages_id));
    }

    // The sources' catalogs and intermediate page tree nodes are now unreachable
    let pruned = combined.prune_objects();
    debug!(pruned = pruned.len(), "dropped unreachable source objects");

    Ok(combined)
}

/// Copy inheritable attributes from the page tree onto each page.
fn materialise_inherited(doc: &mut Document) -> Result<()> {
    for page_id in doc.get_pages().into_values() {
        let missing: Vec<(&[u8], Object)> = {
            let page = doc.get_dictionary(page_id)?;
            INHERITABLE
                .iter()
                .copied()
                .filter(|key| !page.has(key))
                .filter_map(|key| inherited_attribute(doc, page_id, key).map(|v| (key, v.clone())))
                .collect()
        };

        if missing.is_empty() {
            continue;
        }
        let page = doc.get_dictionary_mut(page_id)?;
        for (key, value) in missing {
            page.set(key, value);
        }
    }
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};
    use std::fs;
    use tempfile::TempDir;

    /// Write a PDF whose pages have the given sizes. With `inherit` the
    /// MediaBox of every page is set on the Pages node instead.
    fn write_pdf(path: &Path, sizes: &[(i64, i64)], inherit: bool) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for &(w, h) in sizes {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), b"0 0 m 10 10 l S".to_vec()));
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if !inherit {
                page.set("MediaBox", vec![Object::Integer(0), Object::Integer(0), Object::Integer(w), Object::Integer(h)]);
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }
        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(sizes.len() as i64),
        };
        if inherit {
            let (w, h) = sizes[0];
            pages.set("MediaBox", vec![Object::Integer(0), Object::Integer(0), Object::Integer(w), Object::Integer(h)]);
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn options(dir: &TempDir, names: &[&str], move_sources: bool) -> CombineOptions {
        CombineOptions {
            input_paths: names.iter().map(|n| dir.path().join(n)).collect(),
            output_path: dir.path().join("combined.pdf"),
            move_sources,
        }
    }

    #[test]
    fn test_combine_keeps_page_order_and_count() {
        let dir = TempDir::new().unwrap();
        write_pdf(&dir.path().join("a.pdf"), &[(612, 792), (500, 700)], false);
        write_pdf(&dir.path().join("b.pdf"), &[(792, 612)], false);

        let result = combine_pdfs(&options(&dir, &["a.pdf", "b.pdf"], false), &ComplianceProfile::publication()).unwrap();

        assert_eq!(result.source_pages, 3);
        assert_eq!(result.output_pages, 3);
        assert_eq!(result.pages_fixed, 0);
        assert!(result.moved.is_empty());

        let doc = Document::load(&result.output_path).unwrap();
        let widths: Vec<f32> = doc
            .get_pages()
            .into_values()
            .map(|id| {
                let [llx, _, urx, _] = crate::pdf::geometry::media_box(&doc, id).unwrap();
                urx - llx
            })
            .collect();
        assert_eq!(widths, vec![612.0, 500.0, 792.0]);
    }

    #[test]
    fn test_combine_fits_oversized_and_materialises_inherited_box() {
        let dir = TempDir::new().unwrap();
        write_pdf(&dir.path().join("big.pdf"), &[(1000, 1400)], true);

        let result = combine_pdfs(&options(&dir, &["big.pdf"], false), &ComplianceProfile::publication()).unwrap();
        assert_eq!(result.pages_fixed, 1);

        let doc = Document::load(&result.output_path).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        assert!(page.has(b"MediaBox"));
        assert_eq!(crate::pdf::geometry::media_box(&doc, page_id).unwrap(), [0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn test_combine_moves_sources_and_reduces_asset_count() {
        let dir = TempDir::new().unwrap();
        for name in ["1.pdf", "2.pdf", "3.pdf"] {
            write_pdf(&dir.path().join(name), &[(612, 792)], false);
        }

        let result = combine_pdfs(&options(&dir, &["1.pdf", "2.pdf", "3.pdf"], true), &ComplianceProfile::publication()).unwrap();

        assert_eq!(result.moved.len(), 3);
        assert_eq!(result.asset_count.count, 1);
        assert!(result.asset_count.passed());
        assert!(!dir.path().join("1.pdf").exists());
        assert!(dir.path().join("_originals").join("1.pdf").exists());
    }

    #[test]
    fn test_source_pages_count_every_input_document() {
        let dir = TempDir::new().unwrap();
        write_pdf(&dir.path().join("a.pdf"), &[(612, 792), (612, 792)], true);
        write_pdf(&dir.path().join("b.pdf"), &[(1000, 1400), (612, 792), (612, 792)], false);

        let result = combine_pdfs(&options(&dir, &["a.pdf", "b.pdf"], false), &ComplianceProfile::publication()).unwrap();

        assert_eq!(result.source_pages, 5);
        assert_eq!(result.output_pages, 5);
    }

    #[test]
    fn test_page_count_mismatch_is_an_error() {
        assert!(verify_page_count(3, 3, "saved output").is_ok());
        let err = verify_page_count(3, 2, "combined document").unwrap_err();
        assert_eq!(err.to_string(), "combined document has 2 pages, sources have 3");
    }

    #[test]
    fn test_repeated_input_is_combined_and_moved_once() {
        let dir = TempDir::new().unwrap();
        write_pdf(&dir.path().join("a.pdf"), &[(612, 792)], false);
        write_pdf(&dir.path().join("b.pdf"), &[(612, 792), (612, 792)], false);

        let mut repeated = options(&dir, &["a.pdf", "b.pdf", "a.pdf"], true);
        repeated.input_paths.push(dir.path().join(".").join("b.pdf"));
        let result = combine_pdfs(&repeated, &ComplianceProfile::publication()).unwrap();

        assert_eq!(result.source_pages, 3);
        assert_eq!(result.output_pages, 3);
        assert_eq!(result.moved.len(), 2);
        assert!(dir.path().join("_originals").join("a.pdf").exists());
        assert!(!dir.path().join("_originals").join("a (1).pdf").exists());
        assert_eq!(result.asset_count.count, 1);
    }

    #[test]
    fn test_combine_rejects_bad_inputs() {
        let dir = TempDir::new().unwrap();
        let profile = ComplianceProfile::publication();

        let empty = CombineOptions {
            input_paths: vec![],
            output_path: dir.path().join("out.pdf"),
            move_sources: false,
        };
        assert!(matches!(combine_pdfs(&empty, &profile), Err(Error::General(_))));

        let missing = options(&dir, &["missing.pdf"], false);
        assert!(matches!(combine_pdfs(&missing, &profile), Err(Error::FileNotFound(_))));

        write_pdf(&dir.path().join("combined.pdf"), &[(612, 792)], false);
        let overwrite = options(&dir, &["combined.pdf"], true);
        assert!(matches!(combine_pdfs(&overwrite, &profile), Err(Error::General(_))));
        assert!(fs::metadata(dir.path().join("combined.pdf")).is_ok());
    }
}
