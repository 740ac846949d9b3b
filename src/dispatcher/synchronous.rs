use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::{Dispatcher, DispatcherKind, DispatcherMetrics, Task};
use crate::error::{ReactorError, Result};

/// Runs each task on the calling thread before `dispatch` returns.
///
/// The first consumer failure nobody handled is returned to the caller.
#[derive(Debug)]
pub struct SynchronousDispatcher {
    name: String,
    alive: AtomicBool,
    metrics: DispatcherMetrics,
}

impl SynchronousDispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alive: AtomicBool::new(true),
            metrics: DispatcherMetrics::new(),
        }
    }
}

impl Dispatcher for SynchronousDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DispatcherKind {
        DispatcherKind::Synchronous
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn dispatch(&self, task: Task) -> Result<()> {
        if !self.alive() {
            return Err(ReactorError::Shutdown {
                dispatcher: self.name.clone(),
            });
        }
        self.metrics.record_dispatch();
        let mut scratch = Vec::new();
        let outcome = task.execute(&mut scratch);
        self.metrics.record_completion(outcome.is_ok());
        outcome
    }

    fn shutdown(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            debug!(dispatcher = %self.name, "Synchronous dispatcher shut down");
        }
    }

    fn halt(&self) {
        self.shutdown();
    }

    fn metrics(&self) -> &DispatcherMetrics {
        &self.metrics
    }

    fn workers(&self) -> usize {
        0
    }
}
