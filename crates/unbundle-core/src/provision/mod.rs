//! Run orchestration: reconcile, reset, extract in parallel, report.
//!
//! ```text
//! Idle -> Checking -> Skipped
//!                  -> Extracting -> Completed
//!                                -> Failed
//!                  -> Failed        (unreadable archive, reset failure)
//! ```
//!
//! A failed run is never repaired in place. The next run finds the missing
//! files through the reconciler and rebuilds the whole directory.

mod constants;

use std::fmt;
use std::fs;
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::archive::ArchiveHandle;
use crate::config::ProvisionConfig;
use crate::error::{EntryFailure, ProvisionError, Result};
use crate::extract::extract_entry;
use crate::progress::{ProgressAggregator, ProgressUpdate};
use crate::reconcile;

pub use constants::{
    APP_DIR_NAME, ASSET_DIR, COPY_BUFFER_SIZE, ENTRY_SUBDIR, PARTIAL_PREFIX, PARTIAL_SUFFIX,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Checking,
    Skipped,
    Extracting,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Skipped | RunState::Completed | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Checking => write!(f, "Checking"),
            RunState::Skipped => write!(f, "Already present"),
            RunState::Extracting => write!(f, "Extracting"),
            RunState::Completed => write!(f, "Completed"),
            RunState::Failed => write!(f, "Failed"),
        }
    }
}

/// Successful end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every manifest entry was already on disk
    AlreadyPresent,
    /// The directory was rebuilt from the archive
    Extracted { files: usize },
}

impl Outcome {
    /// Status string for the presentation layer.
    pub fn status_message(&self) -> &'static str {
        match self {
            Outcome::AlreadyPresent => "Found!",
            Outcome::Extracted { .. } => "Saved!",
        }
    }
}

/// Events emitted while a run progresses. Delivered from whichever thread
/// produced them; the receiver marshals onto its own presentation loop.
#[derive(Debug, Clone)]
pub enum ProvisionEvent {
    State(RunState),
    Progress(ProgressUpdate),
    EntryFailed { entry: String, message: String },
}

type EventSink = Arc<dyn Fn(ProvisionEvent) + Send + Sync>;

/// Coordinates one asset directory against one archive.
pub struct Provisioner {
    config: ProvisionConfig,
    state: Mutex<RunState>,
}

impl Provisioner {
    pub fn new(config: ProvisionConfig) -> Result<Self> {
        config.manifest.validate()?;
        Ok(Provisioner {
            config,
            state: Mutex::new(RunState::Idle),
        })
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a run would extract, without touching the disk.
    pub fn needs_extraction(&self) -> bool {
        reconcile::needs_extraction(&self.config.manifest, &self.config.layout.entries_dir())
    }

    /// Ensure the entries directory holds every manifest entry.
    ///
    /// `on_event` receives state transitions, aggregate progress, and one
    /// event per failed entry. Per-entry failures do not stop sibling tasks;
    /// they are collected into a single [`ProvisionError::Incomplete`].
    pub fn run<F>(&self, on_event: F) -> Result<Outcome>
    where
        F: Fn(ProvisionEvent) + Send + Sync + 'static,
    {
        let events: EventSink = Arc::new(on_event);
        let result = self.reconcile_and_extract(&events);

        let terminal = match &result {
            Ok(Outcome::AlreadyPresent) => RunState::Skipped,
            Ok(Outcome::Extracted { .. }) => RunState::Completed,
            Err(e) => {
                info!(error = %e, "provisioning failed");
                RunState::Failed
            }
        };
        self.transition(terminal, &events);
        result
    }

    fn reconcile_and_extract(&self, events: &EventSink) -> Result<Outcome> {
        let layout = &self.config.layout;
        let manifest = &self.config.manifest;
        let target = layout.entries_dir();

        self.transition(RunState::Checking, events);
        if !reconcile::needs_extraction(manifest, &target) {
            info!(dir = %target.display(), entries = manifest.len(), "assets already present");
            return Ok(Outcome::AlreadyPresent);
        }

        // Fail before touching the directory if there is nothing to extract from
        let handle = ArchiveHandle::open(&self.config.archive)?;
        debug!(archive = %handle.path().display(), entries = handle.len(), "archive opened");
        drop(handle);

        let output = layout.output_dir();
        info!(dir = %output.display(), "rebuilding asset directory");
        reconcile::reset(&output)?;
        fs::create_dir_all(&target).map_err(|source| ProvisionError::CreateDirFailed {
            path: target.clone(),
            source,
        })?;

        self.transition(RunState::Extracting, events);
        let aggregator = ProgressAggregator::new(manifest.len());
        let sink = Arc::clone(events);
        aggregator.on_update(move |update| sink(ProvisionEvent::Progress(update)));

        let failures = self.extract_all(&aggregator)?;
        if failures.is_empty() {
            aggregator.finish();
            info!(files = manifest.len(), "extraction complete");
            return Ok(Outcome::Extracted {
                files: manifest.len(),
            });
        }

        for failure in &failures {
            debug!(entry = %failure.entry, error = %failure.error, "entry failed");
            events(ProvisionEvent::EntryFailed {
                entry: failure.entry.clone(),
                message: failure.error.to_string(),
            });
        }
        Err(ProvisionError::Incomplete {
            total: manifest.len(),
            failures,
        })
    }

    /// Run one task per manifest entry and wait for all of them.
    fn extract_all(&self, aggregator: &ProgressAggregator) -> Result<Vec<EntryFailure>> {
        let workers = self.config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("unbundle-{}", i))
            .build()?;
        debug!(workers, tasks = self.config.manifest.len(), "starting extraction");

        let entries: Vec<&str> = self.config.manifest.iter().collect();
        let failures = pool.install(|| {
            entries
                .par_iter()
                .enumerate()
                .filter_map(|(task, entry)| {
                    self.extract_one(task, entry, aggregator)
                        .err()
                        .map(|error| EntryFailure {
                            entry: entry.to_string(),
                            error,
                        })
                })
                .collect::<Vec<_>>()
        });
        Ok(failures)
    }

    fn extract_one(
        &self,
        task: usize,
        entry: &str,
        aggregator: &ProgressAggregator,
    ) -> Result<u64> {
        let layout = &self.config.layout;
        let mut handle = ArchiveHandle::open(&self.config.archive)?;
        let resolved = handle.resolve(&layout.archive_name(entry))?;
        let destination = layout.output_path(entry);
        debug!(task, entry, size = resolved.size, "extracting");

        extract_entry(&mut handle, &resolved, &destination, |fraction| {
            aggregator.report(task, fraction);
        })
    }

    fn transition(&self, next: RunState, events: &EventSink) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        debug!(state = %next, "state changed");
        events(ProvisionEvent::State(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use crate::testing::{corrupt_payload, sample_bytes, write_archive, write_stored_archive};
    use crate::utils::manifest::Manifest;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture { dir: tempdir().unwrap() }
        }

        fn archive(&self) -> std::path::PathBuf {
            self.dir.path().join("NO2.zip")
        }

        fn root(&self) -> std::path::PathBuf {
            self.dir.path().join("data")
        }

        fn layout(&self) -> Layout {
            Layout::new(self.root())
        }

        fn provisioner(&self, entries: &[&str]) -> Provisioner {
            let manifest = Manifest::new(entries.iter().copied());
            let config = ProvisionConfig::new(self.archive(), manifest, &self.root());
            Provisioner::new(config).unwrap()
        }
    }

    fn record(provisioner: &Provisioner) -> (Result<Outcome>, Vec<ProvisionEvent>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let result = provisioner.run(move |event| sink.lock().unwrap().push(event));
        let events = events.lock().unwrap().clone();
        (result, events)
    }

    fn states(events: &[ProvisionEvent]) -> Vec<RunState> {
        events
            .iter()
            .filter_map(|e| match e {
                ProvisionEvent::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    fn fractions(events: &[ProvisionEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                ProvisionEvent::Progress(update) => Some(update.fraction),
                _ => None,
            })
            .collect()
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn extracts_into_empty_directory() {
        let fx = Fixture::new();
        write_archive(&fx.archive(), &[("NO2/a.txt", b"alpha"), ("NO2/b.txt", b"bravo")]);
        let provisioner = fx.provisioner(&["a.txt", "b.txt"]);

        let (result, events) = record(&provisioner);

        assert_eq!(result.unwrap(), Outcome::Extracted { files: 2 });
        assert_eq!(provisioner.state(), RunState::Completed);
        assert_eq!(
            states(&events),
            vec![RunState::Checking, RunState::Extracting, RunState::Completed]
        );
        assert_eq!(fractions(&events).last().copied(), Some(1.0));
        let layout = fx.layout();
        assert_eq!(fs::read(layout.output_path("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(layout.output_path("b.txt")).unwrap(), b"bravo");
    }

    #[test]
    fn second_run_is_skipped() {
        let fx = Fixture::new();
        write_archive(&fx.archive(), &[("NO2/a.txt", b"alpha"), ("NO2/b.txt", b"bravo")]);
        let provisioner = fx.provisioner(&["a.txt", "b.txt"]);

        provisioner.run(|_| {}).unwrap();
        let (result, events) = record(&provisioner);

        assert_eq!(result.unwrap(), Outcome::AlreadyPresent);
        assert_eq!(provisioner.state(), RunState::Skipped);
        assert_eq!(states(&events), vec![RunState::Checking, RunState::Skipped]);
        assert!(fractions(&events).is_empty());
    }

    #[test]
    fn skipped_run_does_not_need_archive() {
        let fx = Fixture::new();
        let layout = fx.layout();
        fs::create_dir_all(layout.entries_dir()).unwrap();
        fs::write(layout.output_path("a.txt"), b"alpha").unwrap();
        let provisioner = fx.provisioner(&["a.txt"]);

        assert!(!provisioner.needs_extraction());
        assert_eq!(provisioner.run(|_| {}).unwrap(), Outcome::AlreadyPresent);
    }

    #[test]
    fn partial_directory_is_rebuilt_wholesale() {
        let fx = Fixture::new();
        write_archive(&fx.archive(), &[("NO2/a.txt", b"alpha"), ("NO2/b.txt", b"bravo")]);
        let layout = fx.layout();
        fs::create_dir_all(layout.entries_dir()).unwrap();
        fs::write(layout.output_path("a.txt"), b"old alpha").unwrap();
        fs::write(layout.output_dir().join("stray.bin"), b"leftover").unwrap();
        let provisioner = fx.provisioner(&["a.txt", "b.txt"]);

        assert!(provisioner.needs_extraction());
        assert_eq!(provisioner.run(|_| {}).unwrap(), Outcome::Extracted { files: 2 });

        assert!(!layout.output_dir().join("stray.bin").exists());
        assert_eq!(fs::read(layout.output_path("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(layout.output_path("b.txt")).unwrap(), b"bravo");
    }

    #[test]
    fn unreadable_archive_fails_without_touching_directory() {
        let fx = Fixture::new();
        let layout = fx.layout();
        fs::create_dir_all(layout.entries_dir()).unwrap();
        fs::write(layout.output_path("a.txt"), b"keep me").unwrap();
        let provisioner = fx.provisioner(&["a.txt", "b.txt"]);

        let (result, events) = record(&provisioner);

        assert!(matches!(result, Err(ProvisionError::ArchiveUnreadable { .. })));
        assert_eq!(provisioner.state(), RunState::Failed);
        assert_eq!(states(&events), vec![RunState::Checking, RunState::Failed]);
        assert_eq!(fs::read(layout.output_path("a.txt")).unwrap(), b"keep me");
    }

    #[cfg(unix)]
    #[test]
    fn reset_failure_fails_run_with_relaunch_message() {
        let fx = Fixture::new();
        write_archive(&fx.archive(), &[("NO2/a.txt", b"alpha")]);
        // A plain file as data root makes removing <root>/rasters fail with ENOTDIR
        fs::write(fx.root(), b"not a directory").unwrap();
        let provisioner = fx.provisioner(&["a.txt"]);

        let (result, events) = record(&provisioner);

        let err = result.unwrap_err();
        assert!(matches!(err, ProvisionError::DeleteFailed { .. }));
        assert!(err.is_retryable());
        assert!(err.user_message().contains("relaunch"));
        assert_eq!(provisioner.state(), RunState::Failed);
        assert_eq!(states(&events), vec![RunState::Checking, RunState::Failed]);
        assert!(fractions(&events).is_empty());
        assert!(fx.root().is_file());
    }

    #[test]
    fn missing_entry_fails_only_that_task() {
        let fx = Fixture::new();
        write_archive(&fx.archive(), &[("NO2/a.txt", b"alpha"), ("NO2/c.txt", b"charlie")]);
        let provisioner = fx.provisioner(&["a.txt", "b.txt", "c.txt"]);

        let (result, events) = record(&provisioner);

        match result {
            Err(ProvisionError::Incomplete { total, failures }) => {
                assert_eq!(total, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].entry, "b.txt");
                assert!(matches!(failures[0].error, ProvisionError::EntryNotFound { .. }));
            }
            other => panic!("expected Incomplete, got {:?}", other),
        }
        assert_eq!(provisioner.state(), RunState::Failed);
        assert!(events.iter().any(|e| matches!(
            e,
            ProvisionEvent::EntryFailed { entry, .. } if entry == "b.txt"
        )));
        let layout = fx.layout();
        assert_eq!(files_in(&layout.entries_dir()), vec!["a.txt", "c.txt"]);
    }

    #[test]
    fn corrupt_entry_fails_run_and_next_run_recovers() {
        let fx = Fixture::new();
        let good_b = sample_bytes(3000, 11);
        write_stored_archive(
            &fx.archive(),
            &[
                ("NO2/a.txt", b"alpha"),
                ("NO2/b.txt", b"CORRUPTED-PAYLOAD-b"),
                ("NO2/c.txt", b"charlie"),
            ],
        );
        corrupt_payload(&fx.archive(), b"CORRUPTED-PAYLOAD");
        let provisioner = fx.provisioner(&["a.txt", "b.txt", "c.txt"]);

        let (result, events) = record(&provisioner);

        match result {
            Err(ProvisionError::Incomplete { ref failures, .. }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].entry, "b.txt");
                assert!(matches!(failures[0].error, ProvisionError::ExtractionFailed { .. }));
            }
            ref other => panic!("expected Incomplete, got {:?}", other),
        }
        assert!(result.unwrap_err().is_retryable());
        assert!(fractions(&events).iter().all(|f| *f < 1.0));
        let layout = fx.layout();
        assert_eq!(files_in(&layout.entries_dir()), vec!["a.txt", "c.txt"]);
        assert!(provisioner.needs_extraction());

        // Replace the damaged archive; the next launch rebuilds everything
        fs::remove_file(fx.archive()).unwrap();
        write_archive(
            &fx.archive(),
            &[("NO2/a.txt", b"alpha"), ("NO2/b.txt", &good_b), ("NO2/c.txt", b"charlie")],
        );
        assert_eq!(provisioner.run(|_| {}).unwrap(), Outcome::Extracted { files: 3 });
        assert_eq!(fs::read(layout.output_path("b.txt")).unwrap(), good_b);
    }

    #[test]
    fn progress_is_monotonic_and_complete() {
        let fx = Fixture::new();
        let blobs: Vec<Vec<u8>> = (0..5u8)
            .map(|seed| sample_bytes(3 * COPY_BUFFER_SIZE + seed as usize, seed))
            .collect();
        let names: Vec<String> = (0..5).map(|i| format!("pnw_NO2_{}.tif", 1997 + i)).collect();
        let archive_names: Vec<String> = names.iter().map(|n| format!("NO2/{}", n)).collect();
        let files: Vec<(&str, &[u8])> = archive_names
            .iter()
            .zip(&blobs)
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        write_archive(&fx.archive(), &files);
        let entries: Vec<&str> = names.iter().map(String::as_str).collect();
        let provisioner = fx.provisioner(&entries);

        let (result, events) = record(&provisioner);
        assert_eq!(result.unwrap(), Outcome::Extracted { files: 5 });

        let fractions = fractions(&events);
        assert!(fractions.len() > 5);
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));
        for (name, blob) in names.iter().zip(&blobs) {
            assert_eq!(&fs::read(fx.layout().output_path(name)).unwrap(), blob);
        }
    }

    #[test]
    fn empty_manifest_completes_immediately() {
        let fx = Fixture::new();
        write_archive(&fx.archive(), &[("NO2/a.txt", b"alpha")]);
        let provisioner = fx.provisioner(&[]);

        let (result, events) = record(&provisioner);

        assert_eq!(result.unwrap(), Outcome::Extracted { files: 0 });
        assert_eq!(fractions(&events), vec![1.0]);
        assert!(fx.layout().entries_dir().is_dir());
        assert_eq!(provisioner.run(|_| {}).unwrap(), Outcome::AlreadyPresent);
    }

    #[test]
    fn single_worker_still_extracts_everything() {
        let fx = Fixture::new();
        write_archive(
            &fx.archive(),
            &[("NO2/a.txt", b"alpha"), ("NO2/b.txt", b"bravo"), ("NO2/c.txt", b"charlie")],
        );
        let config = ProvisionConfig::new(
            fx.archive(),
            Manifest::new(["a.txt", "b.txt", "c.txt"]),
            &fx.root(),
        )
        .with_workers(1);
        let provisioner = Provisioner::new(config).unwrap();

        assert_eq!(provisioner.run(|_| {}).unwrap(), Outcome::Extracted { files: 3 });
        assert_eq!(
            files_in(&fx.layout().entries_dir()),
            vec!["a.txt", "b.txt", "c.txt"]
        );
    }

    #[test]
    fn custom_layout_is_honored() {
        let fx = Fixture::new();
        write_archive(&fx.archive(), &[("O3/x.tif", b"ozone")]);
        let layout = Layout::new(fx.root()).with_asset_dir("grids").with_subdir("O3");
        let config = ProvisionConfig::new(fx.archive(), Manifest::new(["x.tif"]), &fx.root())
            .with_layout(layout.clone());
        let provisioner = Provisioner::new(config).unwrap();

        provisioner.run(|_| {}).unwrap();

        assert_eq!(fs::read(layout.output_path("x.tif")).unwrap(), b"ozone");
        assert_eq!(layout.output_path("x.tif"), fx.root().join("grids/O3/x.tif"));
    }

    #[test]
    fn invalid_manifest_is_rejected() {
        let fx = Fixture::new();
        let config = ProvisionConfig::new(fx.archive(), Manifest::new(["../escape"]), &fx.root());

        let result = Provisioner::new(config);
        assert!(matches!(result, Err(ProvisionError::ManifestError { .. })));
    }

    #[test]
    fn new_provisioner_is_idle() {
        let fx = Fixture::new();
        let provisioner = fx.provisioner(&["a.txt"]);
        assert_eq!(provisioner.state(), RunState::Idle);
        assert!(!provisioner.state().is_terminal());
        assert_eq!(Outcome::AlreadyPresent.status_message(), "Found!");
        assert_eq!(Outcome::Extracted { files: 1 }.status_message(), "Saved!");
    }
}
