//! PDF Compliance Library
//!
//! Audits a folder of PDF and raster assets against a publication profile and
//! repairs them in place. This library provides functionality to:
//! - Measure page geometry and fit oversized pages to the profile bound
//! - Convert embedded and standalone color images to grayscale
//! - Resize oversized PNG/JPEG assets
//! - Combine small PDFs to stay under the asset-count ceiling
//! - Keep byte-identical backups of every asset before it is rewritten
//!
//! # Example
//!
//! ```no_run
//! use pdf_compliance::pipeline::{run, RunOptions};
//!
//! let report = run(&RunOptions::new("figures")).expect("run failed");
//! println!("{}", report);
//! ```

pub mod asset;
pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod profile;
pub mod raster;
pub mod report;
pub mod vault;

// Re-export commonly used items
pub use error::{Error, Result};
pub use profile::ComplianceProfile;
pub use report::{ComplianceOutcome, ComplianceReport, Verdict};
