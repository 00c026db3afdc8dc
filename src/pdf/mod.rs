//! PDF manipulation module

pub mod combine;
pub mod geometry;
pub mod images;
pub mod metadata;
pub mod store;

// Re-export commonly used items
pub use combine::{combine_pdfs, CombineOptions, CombineResult};
pub use geometry::{audit_pages, compute_fit, fix_oversized_pages, FixedPage, PageClass, PageFit, PageGeometry};
pub use images::{audit_colors, ImageObjectRewriter, ImageRewriteSummary, UnfixableImage, DEFAULT_JPEG_QUALITY};
pub use metadata::{count_pages, extract_metadata, PdfMetadata};
pub use store::{ColorSpaceKind, ImageFilter, ImageObject, ObjectStore};
