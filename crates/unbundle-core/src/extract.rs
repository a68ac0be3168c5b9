//! Streaming extraction of a single archive entry.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::archive::{ArchiveEntry, ArchiveHandle};
use crate::error::{ProvisionError, Result};
use crate::provision::{COPY_BUFFER_SIZE, PARTIAL_PREFIX, PARTIAL_SUFFIX};

/// Stream `entry` to `destination`, reporting progress as bytes decompress.
///
/// The data is written to a hidden temporary file next to `destination` and
/// renamed into place once complete, so an interrupted or failed extraction
/// never leaves a file at `destination`. `on_progress` sees strictly
/// increasing fractions below 1.0 while streaming and exactly one `1.0` once
/// the file is in place. No retry happens here.
///
/// Returns the number of bytes written.
pub fn extract_entry<F>(
    handle: &mut ArchiveHandle,
    entry: &ArchiveEntry,
    destination: &Path,
    mut on_progress: F,
) -> Result<u64>
where
    F: FnMut(f64),
{
    let failed = |source: io::Error| ProvisionError::ExtractionFailed {
        entry: entry.name.clone(),
        source,
    };

    let parent = destination.parent().ok_or_else(|| {
        failed(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("destination '{}' has no parent", destination.display()),
        ))
    })?;
    // Idempotent; sibling tasks may race on the same directory
    fs::create_dir_all(parent).map_err(failed)?;

    let mut reader = handle
        .archive
        .by_index(entry.index)
        .map_err(|e| failed(io::Error::other(e)))?;

    let partial = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(parent)
        .map_err(failed)?;
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, partial);

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    let mut last_reported = 0.0;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(failed(e)),
        };
        writer.write_all(&buffer[..n]).map_err(failed)?;
        written += n as u64;

        if entry.size > 0 {
            let fraction = written as f64 / entry.size as f64;
            // 1.0 is reserved for after the rename
            if fraction > last_reported && fraction < 1.0 {
                on_progress(fraction);
                last_reported = fraction;
            }
        }
    }

    if written != entry.size {
        return Err(failed(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected {} bytes, extracted {}", entry.size, written),
        )));
    }

    let partial = writer.into_inner().map_err(|e| failed(e.into_error()))?;
    partial.as_file().sync_all().map_err(failed)?;
    partial.persist(destination).map_err(|e| failed(e.error))?;

    debug!(entry = %entry.name, bytes = written, "extracted");
    on_progress(1.0);
    Ok(written)
}
