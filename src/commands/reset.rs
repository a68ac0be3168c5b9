use std::path::PathBuf;

use unbundle_core::{Layout, ProvisionError, reconcile};

/// Delete the output directory so the next run extracts from scratch.
/// Returns the directory that was cleared.
pub fn run(layout: &Layout) -> Result<PathBuf, ProvisionError> {
    let output = layout.output_dir();
    reconcile::reset(&output)?;
    Ok(output)
}
