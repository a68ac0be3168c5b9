use std::path::Path;

use unbundle_core::{Layout, ProvisionError, reconcile};

use crate::commands::load_manifest;

pub enum CheckResult {
    Complete,
    /// Extraction is needed. `entries` is empty when the directory itself
    /// is absent and the manifest lists nothing.
    Missing { entries: Vec<String> },
}

pub fn run(manifest_path: &Path, layout: &Layout) -> Result<CheckResult, ProvisionError> {
    let manifest = load_manifest(manifest_path)?;
    let target = layout.entries_dir();

    if !reconcile::needs_extraction(&manifest, &target) {
        return Ok(CheckResult::Complete);
    }
    let entries = reconcile::missing_entries(&manifest, &target)
        .into_iter()
        .map(String::from)
        .collect();
    Ok(CheckResult::Missing { entries })
}
