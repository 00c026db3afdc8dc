//! Per-asset outcomes and the run summary

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::asset::{AssetCountCheck, AssetKind};
use crate::error::{Error, Result};
use crate::profile::ComplianceProfile;
use crate::vault::BackupRecord;

/// What happened to one concern of one asset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ComplianceOutcome {
    Compliant,
    /// Audit-only: geometry violates the profile
    Oversized { detail: String },
    /// Audit-only: color content violates the profile
    NotGrayscale { images: usize },
    /// PDF pages fitted to the profile bound. `targets` lists each distinct
    /// page size used, in page order (portrait and landscape differ).
    FixedGeometry { pages: usize, targets: Vec<(f32, f32)> },
    /// Standalone raster scaled down
    Resized { from: (u32, u32), to: (u32, u32) },
    /// Images converted to grayscale; `unfixable` could not be
    FixedColor { images: usize, unfixable: usize },
    Unfixable { reason: String },
}

impl ComplianceOutcome {
    pub fn unfixable(reason: impl Into<String>) -> Self {
        ComplianceOutcome::Unfixable { reason: reason.into() }
    }

    fn is_geometry_issue(&self) -> bool {
        matches!(
            self,
            ComplianceOutcome::Oversized { .. }
                | ComplianceOutcome::FixedGeometry { .. }
                | ComplianceOutcome::Resized { .. }
        )
    }

    fn is_fix(&self) -> bool {
        matches!(
            self,
            ComplianceOutcome::FixedGeometry { .. }
                | ComplianceOutcome::Resized { .. }
                | ComplianceOutcome::FixedColor { .. }
        )
    }

    /// Needs an operator: unfixable outright, partially converted, or
    /// non-compliant in an audit-only run.
    fn needs_attention(&self) -> bool {
        match self {
            ComplianceOutcome::Compliant
            | ComplianceOutcome::FixedGeometry { .. }
            | ComplianceOutcome::Resized { .. } => false,
            ComplianceOutcome::FixedColor { unfixable, .. } => *unfixable > 0,
            _ => true,
        }
    }
}

impl fmt::Display for ComplianceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceOutcome::Compliant => write!(f, "compliant"),
            ComplianceOutcome::Oversized { detail } => write!(f, "oversized ({})", detail),
            ComplianceOutcome::NotGrayscale { images } => write!(f, "{} color image(s)", images),
            ComplianceOutcome::FixedGeometry { pages, targets } => {
                let sizes: Vec<String> = targets.iter().map(|(w, h)| format!("{}x{}", w, h)).collect();
                write!(f, "oversized → fixed to {} ({} page(s))", sizes.join(", "), pages)
            }
            ComplianceOutcome::Resized { from, to } => {
                write!(f, "oversized {}x{} → fixed to {}x{}", from.0, from.1, to.0, to.1)
            }
            ComplianceOutcome::FixedColor { images, unfixable: 0 } => {
                write!(f, "{} images converted to grayscale", images)
            }
            ComplianceOutcome::FixedColor { images, unfixable } => {
                write!(f, "fixed with {} images converted, {} unfixable", images, unfixable)
            }
            ComplianceOutcome::Unfixable { reason } => write!(f, "unfixable: {}", reason),
        }
    }
}

/// Everything that happened to one asset in a run
#[derive(Debug, Clone, Serialize)]
pub struct AssetReport {
    pub path: PathBuf,
    pub kind: AssetKind,
    pub outcomes: Vec<ComplianceOutcome>,
    pub backups: Vec<BackupRecord>,
}

impl AssetReport {
    pub fn new(path: &Path, kind: AssetKind) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            outcomes: Vec::new(),
            backups: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: ComplianceOutcome) {
        self.outcomes.push(outcome);
    }

    /// An asset with nothing to report is compliant
    pub fn finish(mut self) -> Self {
        if self.outcomes.is_empty() {
            self.outcomes.push(ComplianceOutcome::Compliant);
        }
        self
    }

    pub fn is_compliant(&self) -> bool {
        self.outcomes.iter().all(|o| *o == ComplianceOutcome::Compliant)
    }

    pub fn needs_attention(&self) -> bool {
        self.outcomes.iter().any(ComplianceOutcome::needs_attention)
    }

    pub fn was_fixed(&self) -> bool {
        self.outcomes.iter().any(ComplianceOutcome::is_fix)
    }

    fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Counts for one asset kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindTally {
    pub checked: usize,
    pub oversized: usize,
    pub fixed: usize,
    pub unfixable: usize,
}

/// Counts per asset kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub pdf: KindTally,
    pub raster: KindTally,
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// Summary of a run over one directory
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    /// RFC 3339 timestamp of the run
    pub generated_at: String,
    pub input_dir: PathBuf,
    pub dry_run: bool,
    pub profile: ComplianceProfile,
    pub assets: Vec<AssetReport>,
    pub asset_count: Option<AssetCountCheck>,
}

impl ComplianceReport {
    pub fn new(input_dir: &Path, profile: &ComplianceProfile, dry_run: bool) -> Self {
        Self {
            generated_at: chrono::Local::now().to_rfc3339(),
            input_dir: input_dir.to_path_buf(),
            dry_run,
            profile: profile.clone(),
            assets: Vec::new(),
            asset_count: None,
        }
    }

    pub fn push(&mut self, asset: AssetReport) {
        self.assets.push(asset);
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for asset in &self.assets {
            let kind = match asset.kind {
                AssetKind::Pdf => &mut tally.pdf,
                AssetKind::Raster(_) => &mut tally.raster,
            };
            kind.checked += 1;
            if asset.outcomes.iter().any(ComplianceOutcome::is_geometry_issue) {
                kind.oversized += 1;
            }
            if asset.was_fixed() {
                kind.fixed += 1;
            }
            if asset.needs_attention() {
                kind.unfixable += 1;
            }
        }
        tally
    }

    /// FAIL when any asset needs attention or the asset count is over the ceiling.
    pub fn verdict(&self) -> Verdict {
        let count_ok = self.asset_count.map(|c| c.passed()).unwrap_or(true);
        if count_ok && !self.assets.iter().any(AssetReport::needs_attention) {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Json<'a> {
            #[serde(flatten)]
            report: &'a ComplianceReport,
            tally: Tally,
            verdict: Verdict,
        }

        serde_json::to_string_pretty(&Json {
            report: self,
            tally: self.tally(),
            verdict: self.verdict(),
        })
        .map_err(|e| Error::General(format!("failed to serialize report: {}", e)))
    }
}

impl fmt::Display for ComplianceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { "audit" } else { "fix" };
        writeln!(f, "Compliance {} of {} ({})", mode, self.input_dir.display(), self.generated_at)?;

        for asset in &self.assets {
            let outcomes: Vec<String> = asset.outcomes.iter().map(|o| o.to_string()).collect();
            writeln!(f, "  {}: {}", asset.display_name(), outcomes.join("; "))?;
        }

        let tally = self.tally();
        for (label, kind) in [("pdf", tally.pdf), ("raster", tally.raster)] {
            writeln!(
                f,
                "{:>7}: {} checked, {} oversized, {} fixed, {} unfixable",
                label, kind.checked, kind.oversized, kind.fixed, kind.unfixable
            )?;
        }
        if let Some(count) = self.asset_count {
            writeln!(f, " assets: {} of {} allowed", count.count, count.max)?;
        }
        write!(f, "Verdict: {}", self.verdict())
    }
}
