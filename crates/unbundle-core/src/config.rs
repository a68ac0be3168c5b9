//! Explicit run configuration.
//!
//! Everything a run touches on disk is derived from a [`Layout`]; nothing is
//! read from process-wide state.

use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};
use crate::provision::{APP_DIR_NAME, ASSET_DIR, ENTRY_SUBDIR};
use crate::utils::manifest::Manifest;

/// Where extracted assets live and how entries map into the archive.
///
/// ```text
/// <data_root>/<asset_dir>/<subdir>/<entry>    on disk
/// <subdir>/<entry>                            inside the archive
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub data_root: PathBuf,
    pub asset_dir: String,
    pub subdir: String,
}

impl Layout {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Layout {
            data_root: data_root.into(),
            asset_dir: ASSET_DIR.to_string(),
            subdir: ENTRY_SUBDIR.to_string(),
        }
    }

    pub fn with_asset_dir(mut self, asset_dir: impl Into<String>) -> Self {
        self.asset_dir = asset_dir.into();
        self
    }

    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = subdir.into();
        self
    }

    /// Platform data directory for this application.
    pub fn default_root() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ProvisionError::NoDataDir)
    }

    /// Directory that is deleted wholesale when the asset set is incomplete.
    pub fn output_dir(&self) -> PathBuf {
        self.data_root.join(&self.asset_dir)
    }

    /// Directory holding one file per manifest entry.
    pub fn entries_dir(&self) -> PathBuf {
        self.output_dir().join(&self.subdir)
    }

    pub fn output_path(&self, entry: &str) -> PathBuf {
        self.entries_dir().join(entry)
    }

    /// Logical name of an entry inside the archive.
    pub fn archive_name(&self, entry: &str) -> String {
        format!("{}/{}", self.subdir, entry)
    }
}

/// Everything one provisioning run needs.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub archive: PathBuf,
    pub manifest: Manifest,
    pub layout: Layout,
    /// Worker threads; `None` runs one worker per manifest entry.
    pub workers: Option<usize>,
}

impl ProvisionConfig {
    pub fn new(archive: impl Into<PathBuf>, manifest: Manifest, data_root: &Path) -> Self {
        ProvisionConfig {
            archive: archive.into(),
            manifest,
            layout: Layout::new(data_root),
            workers: None,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(self.manifest.len()).max(1)
    }
}
