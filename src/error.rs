//! Error types for the compliance pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the compliance pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raster codec error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// No files matched pattern
    #[error("No PDF files found matching pattern: {0}")]
    NoFilesMatched(String),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// Color space the normalizer cannot convert
    #[error("Unsupported color space: {0}")]
    UnsupportedColorSpace(String),

    /// Stream filter the rewriter cannot decode
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Bits per component outside 8/16
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u8),

    /// Decoded sample buffer does not match the declared geometry
    #[error("Sample length mismatch: expected {expected} bytes, got {actual}")]
    SampleLength { expected: usize, actual: usize },

    /// Image bytes could not be decoded by any path
    #[error("Undecodable image: {0}")]
    Undecodable(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this error should stop the whole run.
    ///
    /// Environment problems (unreadable/unwritable files, uncreatable vault
    /// directories) are fatal. Data problems only mark the asset or object
    /// they came from as unfixable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Pdf(lopdf::Error::IO(_)))
    }
}
