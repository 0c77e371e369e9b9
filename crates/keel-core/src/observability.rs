//! Runner counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of a runner's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerStats {
    pub runs: u64,
    pub completed: u64,
    pub failed: u64,
    pub lock_contention: u64,
    pub panics: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RunnerCounters {
    runs: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    lock_contention: AtomicU64,
    panics: AtomicU64,
}

impl RunnerCounters {
    pub(crate) fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_contention(&self) {
        self.lock_contention.fetch_add(1, Ordering::Relaxed);
        self.record_failed();
    }

    pub(crate) fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RunnerStats {
        RunnerStats {
            runs: self.runs.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            lock_contention: self.lock_contention.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}
