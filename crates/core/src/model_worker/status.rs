//! Executioner counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of executioner activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionerStats {
    /// Requests accepted into the queue
    pub submitted: u64,
    /// Submissions refused because the queue was full
    pub rejected: u64,
    /// Requests that produced an output
    pub completed: u64,
    /// Requests that got a model error
    pub failed: u64,
    /// Requests withdrawn before running
    pub cancelled: u64,
    /// Requests dropped by shutdown
    pub shut_down: u64,
    /// Model calls made
    pub batches: u64,
    /// Largest batch handed to the model
    pub largest_batch: u64,
}

impl ExecutionerStats {
    /// Requests that reached a terminal state
    pub fn resolved(&self) -> u64 {
        self.completed + self.failed + self.cancelled + self.shut_down
    }

    /// Average requests per model call
    pub fn average_batch_size(&self) -> f64 {
        if self.batches > 0 {
            (self.completed + self.failed) as f64 / self.batches as f64
        } else {
            0.0
        }
    }
}

/// Lock-free counters updated by submitters and workers
#[derive(Debug, Default)]
pub(crate) struct StatusTracker {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    shut_down: AtomicU64,
    batches: AtomicU64,
    largest_batch: AtomicU64,
}

impl StatusTracker {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_shut_down(&self, count: usize) {
        self.shut_down.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self, size: usize, succeeded: bool) {
        let size = size as u64;
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.largest_batch.fetch_max(size, Ordering::Relaxed);
        if succeeded {
            self.completed.fetch_add(size, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(size, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> ExecutionerStats {
        ExecutionerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            shut_down: self.shut_down.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            largest_batch: self.largest_batch.load(Ordering::Relaxed),
        }
    }
}
