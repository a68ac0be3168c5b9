//! Aggregate progress across concurrently running extraction tasks.
//!
//! Every task stores its latest local fraction; the overall fraction is
//! recomputed as `sum / total` on each report. All writes go through one
//! mutex and subscribers run while it is held, so they observe updates in
//! the order they were computed. The latest overall value is also published
//! through an atomic so readers never wait on the lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

type Subscriber = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// A snapshot of overall progress, delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Overall fraction in `[0, 1]`
    pub fraction: f64,
    /// Tasks that have reported `1.0`
    pub completed: usize,
    pub total: usize,
}

impl ProgressUpdate {
    /// Whole percent, rounded down.
    pub fn percent(&self) -> u8 {
        (self.fraction * 100.0).floor().clamp(0.0, 100.0) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }

    /// Status string for the presentation layer, e.g. `42%`.
    pub fn status(&self) -> String {
        format!("{}%", self.percent())
    }
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{} files)", self.status(), self.completed, self.total)
    }
}

struct ProgressState {
    locals: Vec<f64>,
    completed: usize,
    subscribers: Vec<Subscriber>,
}

pub struct ProgressAggregator {
    total: usize,
    overall: AtomicU64,
    state: Mutex<ProgressState>,
}

impl ProgressAggregator {
    /// An aggregator for `total` tasks. With no tasks the run is already
    /// complete and the overall fraction is `1.0`.
    pub fn new(total: usize) -> Self {
        let initial = if total == 0 { 1.0 } else { 0.0 };
        ProgressAggregator {
            total,
            overall: AtomicU64::new(f64::to_bits(initial)),
            state: Mutex::new(ProgressState {
                locals: vec![0.0; total],
                completed: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Register a callback invoked once per accepted report.
    ///
    /// Callbacks run on the reporting worker's thread with the aggregator
    /// locked: they may call [`current_overall`](Self::current_overall) but
    /// must not report progress or subscribe.
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.lock().subscribers.push(Box::new(callback));
    }

    /// Replace the stored fraction for `task` and notify subscribers.
    ///
    /// Values are clamped to `[0, 1]`. Reports for an unknown task or with a
    /// NaN fraction are dropped and return `None`.
    pub fn report(&self, task: usize, fraction: f64) -> Option<ProgressUpdate> {
        if fraction.is_nan() {
            warn!(task, "ignoring NaN progress report");
            return None;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        let mut state = self.lock();
        let Some(slot) = state.locals.get_mut(task) else {
            warn!(task, total = self.total, "ignoring progress for unknown task");
            return None;
        };
        let was_done = *slot >= 1.0;
        *slot = fraction;
        if !was_done && fraction >= 1.0 {
            state.completed += 1;
        } else if was_done && fraction < 1.0 {
            state.completed -= 1;
        }

        let update = self.publish(&state);
        Some(update)
    }

    /// Mark every task finished and notify subscribers with `1.0`.
    pub fn finish(&self) -> ProgressUpdate {
        let mut state = self.lock();
        state.locals.iter_mut().for_each(|local| *local = 1.0);
        state.completed = self.total;
        self.publish(&state)
    }

    /// Latest overall fraction, without taking the lock.
    pub fn current_overall(&self) -> f64 {
        f64::from_bits(self.overall.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> ProgressUpdate {
        let state = self.lock();
        ProgressUpdate {
            fraction: self.current_overall(),
            completed: state.completed,
            total: self.total,
        }
    }

    fn publish(&self, state: &ProgressState) -> ProgressUpdate {
        let fraction = if self.total == 0 {
            1.0
        } else {
            (state.locals.iter().sum::<f64>() / self.total as f64).min(1.0)
        };
        self.overall.store(fraction.to_bits(), Ordering::Release);

        let update = ProgressUpdate {
            fraction,
            completed: state.completed,
            total: self.total,
        };
        for subscriber in &state.subscribers {
            subscriber(update);
        }
        update
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        // A panicking subscriber must not wedge every other worker
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("total", &self.total)
            .field("overall", &self.current_overall())
            .finish_non_exhaustive()
    }
}
