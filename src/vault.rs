//! Non-destructive backups of assets before they are rewritten

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Vault directory for geometry, raster size and combine backups
pub const GEOMETRY_VAULT: &str = "_originals";
/// Vault directory for color conversion backups
pub const COLOR_VAULT: &str = "_originals_color";

/// Which kind of fix a vault protects against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultConcern {
    Geometry,
    Color,
}

impl VaultConcern {
    pub fn dir_name(self) -> &'static str {
        match self {
            VaultConcern::Geometry => GEOMETRY_VAULT,
            VaultConcern::Color => COLOR_VAULT,
        }
    }
}

/// Where an asset's original bytes were preserved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub original: PathBuf,
    pub vault_path: PathBuf,
    /// False when an earlier backup was already present and kept
    pub created: bool,
}

/// A backup directory keyed by file name
#[derive(Debug, Clone)]
pub struct OriginalsVault {
    dir: PathBuf,
}

impl OriginalsVault {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The vault for `concern` inside `input_dir`
    pub fn for_concern(input_dir: &Path, concern: VaultConcern) -> Self {
        Self::new(input_dir.join(concern.dir_name()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Vault location for an asset, by file name.
    pub fn path_for(&self, asset: &Path) -> Result<PathBuf> {
        let name = asset
            .file_name()
            .ok_or_else(|| Error::General(format!("not a file path: {}", asset.display())))?;
        Ok(self.dir.join(name))
    }

    /// Copy `asset` into the vault unless a backup of it already exists.
    ///
    /// The earliest copy always wins, so repeated runs never replace the
    /// original with an already-fixed version.
    pub fn backup(&self, asset: &Path) -> Result<BackupRecord> {
        if !asset.exists() {
            return Err(Error::FileNotFound(asset.to_path_buf()));
        }
        let vault_path = self.path_for(asset)?;

        if vault_path.exists() {
            debug!(asset = %asset.display(), "backup already present, keeping earliest original");
            return Ok(BackupRecord {
                original: asset.to_path_buf(),
                vault_path,
                created: false,
            });
        }

        fs::create_dir_all(&self.dir)?;
        fs::copy(asset, &vault_path)?;
        info!(asset = %asset.display(), vault = %vault_path.display(), "backed up original");

        Ok(BackupRecord {
            original: asset.to_path_buf(),
            vault_path,
            created: true,
        })
    }

    /// Move `asset` into the vault. An existing entry with the same name is
    /// never overwritten; the moved file gets a numbered name instead.
    pub fn stash(&self, asset: &Path) -> Result<BackupRecord> {
        if !asset.exists() {
            return Err(Error::FileNotFound(asset.to_path_buf()));
        }
        fs::create_dir_all(&self.dir)?;

        let vault_path = self.free_path_for(asset)?;
        fs::rename(asset, &vault_path)?;
        info!(asset = %asset.display(), vault = %vault_path.display(), "moved source into vault");

        Ok(BackupRecord {
            original: asset.to_path_buf(),
            vault_path,
            created: true,
        })
    }

    fn free_path_for(&self, asset: &Path) -> Result<PathBuf> {
        let candidate = self.path_for(asset)?;
        if !candidate.exists() {
            return Ok(candidate);
        }

        let stem = asset.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let ext = asset.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        (1..)
            .map(|n| self.dir.join(format!("{} ({}){}", stem, n, ext)))
            .find(|p| !p.exists())
            .ok_or_else(|| Error::General(format!("no free vault name for {}", asset.display())))
    }
}
