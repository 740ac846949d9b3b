use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters kept by every dispatcher
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Tasks rejected because the backlog was full
    pub shed_count: AtomicU64,
    /// Tasks accepted but not yet finished (approximate)
    pub queue_depth: AtomicUsize,
    /// Tasks accepted
    pub dispatched_count: AtomicU64,
    /// Tasks finished, successfully or not
    pub completed_count: AtomicU64,
    /// Tasks that ended with an unhandled failure
    pub failed_count: AtomicU64,
}

impl DispatcherMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    /// Reserve room for one task if fewer than `bound` are queued
    pub fn try_record_dispatch(&self, bound: usize) -> bool {
        let reserved = self
            .queue_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                (depth < bound).then_some(depth + 1)
            })
            .is_ok();
        if reserved {
            self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        }
        reserved
    }

    /// Undo a dispatch whose hand-off failed
    pub fn record_rejection(&self) {
        self.dispatched_count.fetch_sub(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn record_completion(&self, succeeded: bool) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
        }
        self.queue_depth.fetch_sub(1, Ordering::AcqRel);
    }

    /// A queued task was discarded without running
    pub fn record_dropped(&self) {
        self.queue_depth.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn record_shed(&self) {
        self.shed_count.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_shed_count(&self) -> u64 {
        self.shed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }
}
