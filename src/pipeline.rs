//! The audit/fix driver over one directory
//!
//! Assets are handled one at a time in file-name order. For each asset the
//! geometry concern runs before the color concern; every write is preceded by a
//! backup to the vault for that concern, and the fixed file is re-audited from
//! disk before moving on.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{debug, info, warn};

use crate::asset::{check_asset_count, scan_directory, Asset, AssetKind};
use crate::error::{Error, Result};
use crate::pdf::geometry::{audit_pages, fix_oversized_pages};
use crate::pdf::images::{audit_colors, ImageObjectRewriter, DEFAULT_JPEG_QUALITY};
use crate::profile::ComplianceProfile;
use crate::raster::{audit_raster, fix_raster, FallbackPolicy, RasterFormat};
use crate::report::{AssetReport, ComplianceOutcome, ComplianceReport};
use crate::vault::{OriginalsVault, VaultConcern};

/// Options for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_dir: PathBuf,
    pub profile: ComplianceProfile,
    /// Audit only; nothing is written
    pub dry_run: bool,
    pub jpeg_quality: u8,
    pub fallback: FallbackPolicy,
}

impl RunOptions {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            profile: ComplianceProfile::publication(),
            dry_run: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fallback: FallbackPolicy::default(),
        }
    }

    fn vault(&self, concern: VaultConcern) -> OriginalsVault {
        OriginalsVault::for_concern(&self.input_dir, concern)
    }
}

/// Audit every asset in `options.input_dir` and, unless this is a dry run,
/// fix what can be fixed.
///
/// Only I/O failures abort the run. Any other failure marks the asset it came
/// from as unfixable and the run continues.
pub fn run(options: &RunOptions) -> Result<ComplianceReport> {
    let mut report = ComplianceReport::new(&options.input_dir, &options.profile, options.dry_run);

    let assets = scan_directory(&options.input_dir)?;
    info!(dir = %options.input_dir.display(), assets = assets.len(), dry_run = options.dry_run, "starting run");

    for asset in assets {
        let mut asset_report = AssetReport::new(&asset.path, asset.kind);

        let result = match asset.kind {
            AssetKind::Pdf => process_pdf(&asset, options, &mut asset_report),
            AssetKind::Raster(format) => process_raster(&asset, format, options, &mut asset_report),
        };

        if let Err(e) = result {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(asset = %asset.path.display(), "unfixable: {}", e);
            asset_report.push(ComplianceOutcome::unfixable(e.to_string()));
        }

        let asset_report = asset_report.finish();
        for outcome in &asset_report.outcomes {
            info!(asset = %asset.path.display(), "{}", outcome);
        }
        report.push(asset_report);
    }

    let count = check_asset_count(&options.input_dir, options.profile.max_asset_count)?;
    if !count.passed() {
        warn!(count = count.count, max = count.max, "asset count exceeds ceiling");
    }
    report.asset_count = Some(count);

    info!(verdict = %report.verdict(), "run complete");
    Ok(report)
}

fn save(doc: &mut Document, path: &Path) -> Result<()> {
    doc.compress();
    doc.save(path)?;
    Ok(())
}

fn process_pdf(asset: &Asset, options: &RunOptions, report: &mut AssetReport) -> Result<()> {
    let profile = &options.profile;
    let bytes = fs::read(&asset.path)?;
    let mut doc = Document::load_mem(&bytes)?;
    if doc.get_pages().is_empty() {
        return Err(Error::EmptyPdf(asset.path.clone()));
    }

    let oversized = audit_pages(&doc, profile)?.iter().filter(|p| p.is_oversized()).count();
    let color_images = if profile.require_grayscale { audit_colors(&doc).len() } else { 0 };
    debug!(asset = %asset.path.display(), oversized, color_images, "audited pdf");

    if options.dry_run {
        if oversized > 0 {
            report.push(ComplianceOutcome::Oversized { detail: format!("{} page(s)", oversized) });
        }
        if color_images > 0 {
            report.push(ComplianceOutcome::NotGrayscale { images: color_images });
        }
        return Ok(());
    }

    if oversized > 0 {
        let fixed = fix_oversized_pages(&mut doc, profile)?;
        report.backups.push(options.vault(VaultConcern::Geometry).backup(&asset.path)?);
        save(&mut doc, &asset.path)?;

        let mut targets: Vec<(f32, f32)> = Vec::new();
        for page in &fixed {
            let target = (page.fit.target_width, page.fit.target_height);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        report.push(ComplianceOutcome::FixedGeometry { pages: fixed.len(), targets });
    }

    if color_images > 0 {
        let rewriter = ImageObjectRewriter::new(options.jpeg_quality, options.fallback);
        let summary = rewriter.rewrite_all(&mut doc);
        if summary.converted > 0 {
            report.backups.push(options.vault(VaultConcern::Color).backup(&asset.path)?);
            save(&mut doc, &asset.path)?;
        }
        if summary.white_filled > 0 {
            warn!(asset = %asset.path.display(), images = summary.white_filled, "images replaced with white fill");
        }
        report.push(ComplianceOutcome::FixedColor {
            images: summary.converted,
            unfixable: summary.unfixable.len(),
        });
    }

    if oversized > 0 || color_images > 0 {
        reaudit_pdf(&asset.path, profile, report)?;
    }
    Ok(())
}

/// Check the written file again. Leftover color images are already counted
/// as unfixable by the rewrite; leftover geometry is not expected.
fn reaudit_pdf(path: &Path, profile: &ComplianceProfile, report: &mut AssetReport) -> Result<()> {
    let doc = Document::load_mem(&fs::read(path)?)?;
    let still_oversized = audit_pages(&doc, profile)?.iter().filter(|p| p.is_oversized()).count();
    if still_oversized > 0 {
        report.push(ComplianceOutcome::unfixable(format!(
            "{} page(s) still oversized after fix",
            still_oversized
        )));
    }
    Ok(())
}

fn process_raster(asset: &Asset, format: RasterFormat, options: &RunOptions, report: &mut AssetReport) -> Result<()> {
    let profile = &options.profile;
    let bytes = fs::read(&asset.path)?;
    let audit = audit_raster(&bytes, format, profile)?;
    debug!(asset = %asset.path.display(), width = audit.width, height = audit.height, grayscale = audit.grayscale, "audited raster");

    if audit.is_compliant(profile) {
        return Ok(());
    }

    if options.dry_run {
        if audit.oversized {
            report.push(ComplianceOutcome::Oversized {
                detail: format!("{}x{} px", audit.width, audit.height),
            });
        }
        if profile.require_grayscale && !audit.grayscale {
            report.push(ComplianceOutcome::NotGrayscale { images: 1 });
        }
        return Ok(());
    }

    let fix = fix_raster(&bytes, format, profile, options.jpeg_quality)?;
    if fix.resized() {
        report.backups.push(options.vault(VaultConcern::Geometry).backup(&asset.path)?);
    }
    if fix.converted_to_gray {
        report.backups.push(options.vault(VaultConcern::Color).backup(&asset.path)?);
    }
    fs::write(&asset.path, &fix.bytes)?;

    if fix.resized() {
        report.push(ComplianceOutcome::Resized { from: fix.before, to: fix.after });
    }
    if fix.converted_to_gray {
        report.push(ComplianceOutcome::FixedColor { images: 1, unfixable: 0 });
    }

    let after = audit_raster(&fs::read(&asset.path)?, format, profile)?;
    if !after.is_compliant(profile) {
        report.push(ComplianceOutcome::unfixable(format!(
            "raster still non-compliant after fix ({}x{}, grayscale: {})",
            after.width, after.height, after.grayscale
        )));
    }
    Ok(())
}
