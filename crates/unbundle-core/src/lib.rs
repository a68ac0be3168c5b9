//! Provision bundled archive assets onto disk.
//!
//! Given a zip archive shipped with an application and a manifest of the
//! files it must produce, [`Provisioner`] makes sure the asset directory holds
//! every file, rebuilding it from the archive on first run or whenever
//! something is missing, and reports one aggregate progress value while
//! entries extract in parallel.

pub mod archive;
pub mod config;
pub mod error;
pub mod extract;
pub mod progress;
pub mod provision;
pub mod reconcile;

pub mod utils {
    pub mod manifest;
}

#[cfg(test)]
pub(crate) mod testing;

pub use archive::{ArchiveEntry, ArchiveHandle};
pub use config::{Layout, ProvisionConfig};
pub use error::{EntryFailure, ProvisionError, Result};
pub use progress::{ProgressAggregator, ProgressUpdate};
pub use provision::{Outcome, ProvisionEvent, Provisioner, RunState};
pub use utils::manifest::Manifest;
