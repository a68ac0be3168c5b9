//! Compare the manifest with what is on disk and clear stale output.
//!
//! Verification is existence-only. The archive is a trusted, immutable
//! bundled asset, and the extractor only ever renames complete files into
//! place, so a present file is a complete file.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{ProvisionError, Result};
use crate::utils::manifest::Manifest;

/// Manifest entries with no file under `target_dir`, in manifest order.
pub fn missing_entries<'a>(manifest: &'a Manifest, target_dir: &Path) -> Vec<&'a str> {
    manifest
        .iter()
        .filter(|entry| !target_dir.join(entry).exists())
        .collect()
}

/// True if `target_dir` is absent or any manifest entry is missing from it.
pub fn needs_extraction(manifest: &Manifest, target_dir: &Path) -> bool {
    if !target_dir.is_dir() {
        debug!(dir = %target_dir.display(), "target directory absent");
        return true;
    }

    // Stop at the first gap; the whole directory is rebuilt either way
    match manifest.iter().find(|entry| !target_dir.join(entry).exists()) {
        Some(entry) => {
            warn!(entry, dir = %target_dir.display(), "extracted file missing");
            true
        }
        None => false,
    }
}

/// Recursively delete `dir`. Deleting an absent directory is not an error.
pub fn reset(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "deleted output directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ProvisionError::DeleteFailed {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
