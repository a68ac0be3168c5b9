use std::fmt;
use std::io;
use std::path::PathBuf;

use zip::result::ZipError;

/// Error type for provisioning operations.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Archive file missing, unreadable, or not a valid zip
    #[error("archive '{path}' is unreadable: {source}")]
    ArchiveUnreadable {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    /// Manifest names an entry the archive does not contain
    #[error("entry '{name}' not found in archive")]
    EntryNotFound { name: String },

    /// I/O or decompression error while streaming an entry
    #[error("failed to extract '{entry}': {source}")]
    ExtractionFailed {
        entry: String,
        #[source]
        source: io::Error,
    },

    /// A stale output directory could not be removed
    #[error("failed to delete '{path}': {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest error: {reason}")]
    ManifestError { reason: String },

    #[error("could not determine a data directory for this platform")]
    NoDataDir,

    #[error("failed to start extraction workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Aggregate failure of a run: one record per failed entry
    #[error("{} of {total} entries failed to extract", .failures.len())]
    Incomplete {
        total: usize,
        failures: Vec<EntryFailure>,
    },
}

impl ProvisionError {
    /// True when running the whole subsystem again can succeed without
    /// replacing the archive or fixing the manifest.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisionError::ExtractionFailed { .. }
            | ProvisionError::DeleteFailed { .. }
            | ProvisionError::CreateDirFailed { .. }
            | ProvisionError::WorkerPool(_) => true,
            ProvisionError::Incomplete { failures, .. } => {
                failures.iter().all(|f| f.error.is_retryable())
            }
            ProvisionError::ArchiveUnreadable { .. }
            | ProvisionError::EntryNotFound { .. }
            | ProvisionError::ManifestError { .. }
            | ProvisionError::NoDataDir => false,
        }
    }

    /// Actionable text for the presentation layer.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProvisionError::ArchiveUnreadable { .. } => {
                "The bundled data archive could not be read. Please reinstall the app."
            }
            ProvisionError::EntryNotFound { .. } | ProvisionError::ManifestError { .. } => {
                "The bundled data does not match this version of the app. Please reinstall the app."
            }
            ProvisionError::NoDataDir => "No writable data directory is available.",
            ProvisionError::Incomplete { .. } if !self.is_retryable() => {
                "The bundled data does not match this version of the app. Please reinstall the app."
            }
            _ => "Please force-close and relaunch the app",
        }
    }
}

/// A single entry that failed during an extraction run.
#[derive(Debug)]
pub struct EntryFailure {
    pub entry: String,
    pub error: ProvisionError,
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entry, self.error)
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
