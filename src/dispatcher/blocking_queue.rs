use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::{Dispatcher, DispatcherKind, DispatcherMetrics, Task};
use crate::error::{ReactorError, Result};

/// Default queue capacity
pub const DEFAULT_BACKLOG: usize = 128;

struct State {
    name: String,
    halted: AtomicBool,
    metrics: DispatcherMetrics,
}

/// One dedicated worker thread draining a bounded FIFO queue.
///
/// `dispatch` blocks the producer while the queue is full. Tasks run in
/// submission order.
pub struct BlockingQueueDispatcher {
    state: Arc<State>,
    backlog: usize,
    alive: AtomicBool,
    sender: Mutex<Option<SyncSender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BlockingQueueDispatcher {
    pub fn new(name: impl Into<String>, backlog: usize) -> Result<Self> {
        let name = name.into();
        let backlog = backlog.max(1);
        let (tx, rx) = sync_channel::<Task>(backlog);
        let state = Arc::new(State {
            name: name.clone(),
            halted: AtomicBool::new(false),
            metrics: DispatcherMetrics::new(),
        });

        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name(format!("{}-worker", name))
            .spawn(move || work(&worker_state, rx))
            .map_err(|e| {
                ReactorError::configuration(format!(
                    "failed to spawn worker thread for dispatcher '{}': {}",
                    name, e
                ))
            })?;

        info!(dispatcher = %state.name, backlog = backlog, "Blocking-queue dispatcher started");

        Ok(Self {
            state,
            backlog,
            alive: AtomicBool::new(true),
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn stop(&self) {
        self.alive.store(false, Ordering::Release);
        self.sender.lock().take();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Stopped from one of our own consumers; the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                warn!(dispatcher = %self.state.name, "Worker thread panicked");
            }
        }
    }
}

fn work(state: &State, rx: Receiver<Task>) {
    debug!(dispatcher = %state.name, "Worker thread started");
    let mut scratch = Vec::new();
    for task in rx.iter() {
        if state.halted.load(Ordering::Acquire) {
            state.metrics.record_dropped();
            continue;
        }
        let ok = task.run_detached(&state.name, &mut scratch);
        state.metrics.record_completion(ok);
    }
    debug!(dispatcher = %state.name, "Worker thread exiting");
}

impl Dispatcher for BlockingQueueDispatcher {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn kind(&self) -> DispatcherKind {
        DispatcherKind::BlockingQueue
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn dispatch(&self, task: Task) -> Result<()> {
        let shutdown = || ReactorError::Shutdown {
            dispatcher: self.state.name.clone(),
        };
        if !self.alive() {
            return Err(shutdown());
        }
        let sender = self.sender.lock().clone().ok_or_else(shutdown)?;

        self.state.metrics.record_dispatch();
        // Blocks while the queue is full
        if sender.send(task).is_err() {
            self.state.metrics.record_rejection();
            return Err(shutdown());
        }
        Ok(())
    }

    fn shutdown(&self) {
        if self.alive() {
            info!(dispatcher = %self.state.name, "Shutting down blocking-queue dispatcher");
        }
        self.stop();
    }

    fn halt(&self) {
        self.state.halted.store(true, Ordering::Release);
        if self.alive() {
            info!(dispatcher = %self.state.name, "Halting blocking-queue dispatcher");
        }
        self.stop();
    }

    fn metrics(&self) -> &DispatcherMetrics {
        &self.state.metrics
    }

    fn backlog(&self) -> Option<usize> {
        Some(self.backlog)
    }
}

impl Drop for BlockingQueueDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
