pub mod check;
pub mod list;
pub mod reset;
pub mod run;

use std::path::Path;

use tracing::debug;
use unbundle_core::{Manifest, ProvisionError};

/// Load a manifest file, reporting parse and I/O problems as manifest errors.
pub(crate) fn load_manifest(path: &Path) -> Result<Manifest, ProvisionError> {
    let manifest = Manifest::load(path).map_err(|e| ProvisionError::ManifestError {
        reason: format!("{}: {}", path.display(), e),
    })?;
    manifest.validate()?;
    debug!(path = %path.display(), entries = manifest.len(), "manifest loaded");
    Ok(manifest)
}
