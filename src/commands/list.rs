use std::path::Path;

use unbundle_core::{ArchiveHandle, Manifest, ProvisionError};

/// Build a manifest from the files directly under `subdir` in the archive.
pub fn run(archive: &Path, subdir: &str) -> Result<Manifest, ProvisionError> {
    let handle = ArchiveHandle::open(archive)?;
    Ok(Manifest::new(handle.entries_under(subdir)))
}
