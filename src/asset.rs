//! Asset discovery in the working directory

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::raster::RasterFormat;

/// What an asset is, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Pdf,
    Raster(RasterFormat),
}

impl AssetKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("pdf") {
            Some(AssetKind::Pdf)
        } else {
            RasterFormat::from_extension(ext).map(AssetKind::Raster)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Pdf => "pdf",
            AssetKind::Raster(_) => "raster",
        }
    }
}

/// A file on disk the pipeline audits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub path: PathBuf,
    pub kind: AssetKind,
    pub byte_len: u64,
}

/// Hidden files and vault directories start with `.` or `_`.
fn is_visible(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| !n.starts_with('.') && !n.starts_with('_'))
        .unwrap_or(false)
}

/// List the visible assets directly inside `dir`, sorted by file name.
pub fn scan_directory(dir: &Path) -> Result<Vec<Asset>> {
    if !dir.is_dir() {
        return Err(Error::FileNotFound(dir.to_path_buf()));
    }

    let mut assets = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if !metadata.is_file() || !is_visible(&path) {
            continue;
        }
        if let Some(kind) = AssetKind::from_path(&path) {
            assets.push(Asset {
                path,
                kind,
                byte_len: metadata.len(),
            });
        }
    }

    assets.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(assets)
}

/// Visible asset count against the profile ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetCountCheck {
    pub count: usize,
    pub max: usize,
}

impl AssetCountCheck {
    pub fn passed(&self) -> bool {
        self.count <= self.max
    }
}

/// Count visible assets in `dir` and compare with `max`.
pub fn check_asset_count(dir: &Path, max: usize) -> Result<AssetCountCheck> {
    Ok(AssetCountCheck {
        count: scan_directory(dir)?.len(),
        max,
    })
}

/// Expand glob patterns in input paths, sorted and without repeats.
///
/// Patterns without glob characters are taken literally.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            let entries = glob(pattern).map_err(|e| Error::InvalidGlob(format!("{}: {}", pattern, e)))?;
            for entry in entries {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => warn!("glob error for {}: {}", pattern, e),
                }
            }
            if !matched {
                return Err(Error::NoFilesMatched(pattern.clone()));
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    // Overlapping patterns would otherwise list a file twice
    paths.sort();
    paths.dedup();
    Ok(paths)
}
