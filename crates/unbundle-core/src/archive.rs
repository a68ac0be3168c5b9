//! Read-only access to the bundled zip archive.
//!
//! A handle keeps a seek cursor, so every extraction task opens its own
//! handle instead of sharing one across threads.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ProvisionError, Result};

/// Metadata for one resolved archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Full name inside the archive, e.g. `NO2/a.tif`
    pub name: String,
    /// Position in the central directory
    pub index: usize,
    /// Decompressed size in bytes
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
}

pub struct ArchiveHandle {
    path: PathBuf,
    pub(crate) archive: ZipArchive<BufReader<File>>,
}

impl ArchiveHandle {
    /// Open the archive and read its central directory.
    pub fn open(path: &Path) -> Result<Self> {
        let unreadable = |source: ZipError| ProvisionError::ArchiveUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(|e| unreadable(e.into()))?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(unreadable)?;

        Ok(ArchiveHandle {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries, directories included.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Look up a file entry by its full name inside the archive.
    pub fn resolve(&mut self, logical_name: &str) -> Result<ArchiveEntry> {
        let not_found = || ProvisionError::EntryNotFound {
            name: logical_name.to_string(),
        };
        let index = self.archive.index_for_name(logical_name).ok_or_else(not_found)?;
        let file = self
            .archive
            .by_index(index)
            .map_err(|e| ProvisionError::ExtractionFailed {
                entry: logical_name.to_string(),
                source: std::io::Error::other(e),
            })?;
        if file.is_dir() {
            return Err(not_found());
        }

        Ok(ArchiveEntry {
            name: file.name().to_string(),
            index,
            size: file.size(),
            compressed_size: file.compressed_size(),
            crc32: file.crc32(),
        })
    }

    /// Names of all file entries, in central-directory order.
    pub fn entry_names(&self) -> Vec<String> {
        let mut names: Vec<(usize, String)> = self
            .archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .filter_map(|name| {
                self.archive
                    .index_for_name(name)
                    .map(|index| (index, name.to_string()))
            })
            .collect();
        names.sort_by_key(|(index, _)| *index);
        names.into_iter().map(|(_, name)| name).collect()
    }

    /// File names directly under `subdir`, with the prefix stripped.
    pub fn entries_under(&self, subdir: &str) -> Vec<String> {
        let prefix = format!("{}/", subdir.trim_end_matches('/'));
        self.entry_names()
            .into_iter()
            .filter_map(|name| {
                let rest = name.strip_prefix(&prefix)?;
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }
}
