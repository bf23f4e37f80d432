//! Post-build relocation
//!
//! Moves archived bundles to their final directories and applies the deferred
//! hash-free renames. Moves are guarded by modification time so that running
//! the same relocation twice does nothing the second time.

use crate::catalog::{LocationId, LocationTable};
use crate::error::{PackError, Result};
use crate::registry::FileRegistry;
use crate::validation::{file_name_of, strip_hash_from_bundle_location};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// A bundle whose temporary `_{hash}` suffix is stripped once catalog entries are processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRename {
    /// Bundle location whose internal id follows the rename
    pub location: LocationId,

    /// Path the hashed bundle was moved to
    pub target_path: PathBuf,

    /// Hash carried in the temporary suffix
    pub hash: String,
}

/// A pending rename that could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Files of one extra catalog that move into its own folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRelocation {
    pub name: String,

    /// Catalog build folder the bundles move into
    pub build_dir: PathBuf,

    /// Bundle file names currently in the global build folder
    pub bundles: Vec<String>,
}

/// Performs and counts file moves
#[derive(Debug, Default)]
pub struct Relocator {
    moves: usize,
}

impl Relocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files actually moved
    pub fn moves(&self) -> usize {
        self.moves
    }

    /// Move `src` to `dst` unless the destination is already up to date
    ///
    /// Nothing happens when the paths are equal, when `src` is gone but `dst`
    /// exists, or when both exist with the same modification time. Returns
    /// whether a move happened.
    pub fn move_if_timestamp_differs(&mut self, src: &Path, dst: &Path) -> Result<bool> {
        if src == dst {
            return Ok(false);
        }

        let src_meta = match fs::metadata(src) {
            Ok(meta) => meta,
            Err(_) if dst.exists() => return Ok(false),
            Err(e) => return Err(PackError::Io(e)),
        };

        let src_time = src_meta.modified()?;
        if let Ok(dst_meta) = fs::metadata(dst) {
            if dst_meta.modified()? == src_time {
                return Ok(false);
            }
        }

        move_file(src, dst)?;
        self.moves += 1;
        debug!("Moved {} -> {}", src.display(), dst.display());
        Ok(true)
    }

    /// Strip temporary hashes from bundle files, in registration order
    ///
    /// A failure is logged and collected; the remaining renames still run.
    pub fn apply_pending_renames(
        &mut self,
        pending: &[PendingRename],
        table: &mut LocationTable,
        registry: &mut FileRegistry,
    ) -> Vec<RelocationFailure> {
        let mut failures = Vec::new();

        for rename in pending {
            if let Err(e) = self.apply_rename(rename, table, registry) {
                error!(
                    "Failed to strip hash from bundle {}: {}",
                    rename.target_path.display(),
                    e
                );
                failures.push(RelocationFailure {
                    path: rename.target_path.clone(),
                    reason: e.to_string(),
                });
            }
        }

        failures
    }

    fn apply_rename(
        &mut self,
        rename: &PendingRename,
        table: &mut LocationTable,
        registry: &mut FileRegistry,
    ) -> Result<()> {
        let target = rename.target_path.to_string_lossy();
        let stripped = strip_hash_from_bundle_location(&target, &rename.hash).ok_or_else(|| {
            PackError::InvalidLocation(format!("bundle '{}' carries no hash", target))
        })?;
        let stripped = PathBuf::from(stripped);

        if rename.target_path.exists() {
            if stripped.exists() {
                fs::remove_file(&stripped)?;
            }
            move_file(&rename.target_path, &stripped)?;
            self.moves += 1;
        }

        if !registry.replace_bundle_entry(&rename.target_path, &stripped) {
            error!(
                "Unable to find registered file for bundle {}",
                rename.target_path.display()
            );
        }

        let location = table.get(rename.location).ok_or_else(|| {
            PackError::InvalidLocation(format!("bundle '{}' has no location", target))
        })?;
        let new_file = stripped
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if file_name_of(&location.internal_id) != new_file {
            if let Some(internal_id) =
                strip_hash_from_bundle_location(&location.internal_id, &rename.hash)
            {
                table.set_internal_id(rename.location, internal_id)?;
            }
        }

        Ok(())
    }

    /// Move extra catalogs' bundles and remote files into per-catalog folders
    ///
    /// Runs after every catalog is written. Bundle move failures are fatal;
    /// remote sidecar failures are logged.
    pub fn relocate_catalog_outputs(
        &mut self,
        global_build_dir: &Path,
        remote_build_dir: Option<&Path>,
        catalogs: &[CatalogRelocation],
    ) -> Result<()> {
        for catalog in catalogs {
            for bundle in &catalog.bundles {
                let src = global_build_dir.join(bundle);
                let dst = catalog.build_dir.join(bundle);
                self.move_if_timestamp_differs(&src, &dst)?;
            }

            let Some(remote) = remote_build_dir else {
                continue;
            };
            let folder = remote.join(&catalog.name);
            for ext in ["json", "hash"] {
                let file = format!("{}.{}", catalog.name, ext);
                let src = remote.join(&file);
                let dst = folder.join(&file);
                if let Err(e) = self.move_if_timestamp_differs(&src, &dst) {
                    warn!("Could not move {} into {}: {}", src.display(), folder.display(), e);
                }
            }
        }

        Ok(())
    }
}

/// Rename, falling back to copy and remove across filesystems
fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if dst.exists() {
        fs::remove_file(dst)?;
    }

    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let modified = fs::metadata(src)?.modified()?;
    fs::copy(src, dst)?;
    fs::File::options()
        .write(true)
        .open(dst)?
        .set_modified(modified)?;
    fs::remove_file(src)?;
    Ok(())
}
