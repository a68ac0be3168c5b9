use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{ProvisionError, Result};

/// The authoritative list of files one extraction run must produce.
///
/// Entry names are flat file names: they are looked up in the archive under
/// the layout's subdirectory and written to the same name on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub entries: Vec<String>,
}

impl Manifest {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Manifest {
            title: None,
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn load(path: &Path) -> io::Result<Manifest> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Check that every entry is a plain, unique file name.
    ///
    /// Each extraction task owns exactly one destination path, so duplicates
    /// and anything that could escape the entries directory are rejected.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            let invalid = |reason: &str| ProvisionError::ManifestError {
                reason: format!("invalid entry '{}': {}", entry, reason),
            };
            if entry.is_empty() {
                return Err(invalid("empty name"));
            }
            if entry.contains('/') || entry.contains('\\') {
                return Err(invalid("must not contain path separators"));
            }
            if entry == "." || entry == ".." {
                return Err(invalid("must name a file"));
            }
            if entry.contains('\0') {
                return Err(invalid("contains a null byte"));
            }
            if !seen.insert(entry.as_str()) {
                return Err(invalid("listed more than once"));
            }
        }
        Ok(())
    }
}
