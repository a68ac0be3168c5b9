use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};

use unbundle_core::{
    Layout, Outcome, ProvisionConfig, ProvisionError, ProvisionEvent, Provisioner, RunState,
};

use crate::commands::load_manifest;

/// Provision the asset directory described by `layout` from `archive`.
///
/// Workflow:
/// 1. Load and validate the manifest
/// 2. Skip if every entry is already on disk
/// 3. Otherwise reset the directory and extract all entries in parallel
/// 4. Print state changes, whole-percent progress, and failed entries
pub fn run(
    archive: &Path,
    manifest_path: &Path,
    layout: Layout,
    workers: Option<usize>,
) -> Result<Outcome, ProvisionError> {
    let manifest = load_manifest(manifest_path)?;
    let mut config = ProvisionConfig::new(archive, manifest, &layout.data_root).with_layout(layout);
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    let provisioner = Provisioner::new(config)?;

    let last_percent = AtomicU16::new(u16::MAX);
    provisioner.run(move |event| match event {
        ProvisionEvent::State(state @ (RunState::Checking | RunState::Extracting)) => {
            println!("{}...", state);
        }
        ProvisionEvent::State(_) => {}
        ProvisionEvent::Progress(update) => {
            let percent = u16::from(update.percent());
            if last_percent.swap(percent, Ordering::Relaxed) != percent {
                println!("  {}", update);
            }
        }
        ProvisionEvent::EntryFailed { entry, message } => {
            eprintln!("  failed {}: {}", entry, message);
        }
    })
}
