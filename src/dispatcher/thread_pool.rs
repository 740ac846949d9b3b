//! Thread-pool dispatcher: N worker coroutines on the `may` runtime sharing one queue.
//!
//! ## Configuration
//!
//! - `BRRTR_POOL_WORKERS`: worker coroutines (default: available parallelism)
//! - `BRRTR_POOL_BACKLOG`: tasks accepted but not yet finished (default: 128)
//! - `BRRTR_BACKPRESSURE_MODE`: `block` or `shed` when the backlog is full (default: block)
//! - `BRRTR_BACKPRESSURE_TIMEOUT_MS`: how long `block` waits, 0 for no limit (default: 0)
//! - `BRRTR_STACK_SIZE`: worker stack size (see [`crate::runtime_config`])

use may::sync::mpmc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{resolve_workers, Dispatcher, DispatcherKind, DispatcherMetrics, Task};
use crate::error::{ReactorError, Result};
use crate::registry::Match;
use crate::routing::Consumer;
use crate::runtime_config::RuntimeConfig;

/// Default backlog
pub const DEFAULT_BACKLOG: usize = 128;

/// How long an idle worker waits before re-checking for shutdown
const IDLE_POLL: Duration = Duration::from_millis(20);

/// What `dispatch` does when the backlog is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    /// Wait for room, up to the configured timeout
    #[default]
    Block,
    /// Reject immediately with [`ReactorError::Saturated`]
    Shed,
}

impl BackpressureMode {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "block" => Some(Self::Block),
            "shed" => Some(Self::Shed),
            _ => None,
        }
    }
}

/// Configuration for a thread-pool dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolConfig {
    pub workers: usize,
    pub backlog: usize,
    pub backpressure_mode: BackpressureMode,
    /// Block mode wait limit in milliseconds; 0 waits indefinitely
    pub backpressure_timeout_ms: u64,
    pub stack_size: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            workers: resolve_workers(0),
            backlog: DEFAULT_BACKLOG,
            backpressure_mode: BackpressureMode::Block,
            backpressure_timeout_ms: 0,
            stack_size: RuntimeConfig::from_env().stack_size,
        }
    }
}

impl ThreadPoolConfig {
    /// `size` below 1 resolves to available parallelism
    #[must_use]
    pub fn new(size: i64, backlog: usize) -> Self {
        Self {
            workers: resolve_workers(size),
            backlog,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let workers = std::env::var("BRRTR_POOL_WORKERS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map_or(defaults.workers, resolve_workers);
        let backlog = std::env::var("BRRTR_POOL_BACKLOG")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.backlog);
        let backpressure_mode = std::env::var("BRRTR_BACKPRESSURE_MODE")
            .ok()
            .and_then(|s| BackpressureMode::parse(&s))
            .unwrap_or_default();
        let backpressure_timeout_ms = std::env::var("BRRTR_BACKPRESSURE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.backpressure_timeout_ms);
        Self {
            workers,
            backlog,
            backpressure_mode,
            backpressure_timeout_ms,
            stack_size: defaults.stack_size,
        }
    }

    #[must_use]
    pub fn with_backpressure(mut self, mode: BackpressureMode, timeout_ms: u64) -> Self {
        self.backpressure_mode = mode;
        self.backpressure_timeout_ms = timeout_ms;
        self
    }
}

struct Shared {
    name: String,
    halted: AtomicBool,
    /// Set once the sender is gone and no further task can arrive
    closed: AtomicBool,
    metrics: DispatcherMetrics,
    running_workers: AtomicUsize,
}

/// Fixed pool of worker coroutines pulling from one backlog.
///
/// Each task runs exactly once on exactly one worker; there is no ordering
/// across tasks.
pub struct ThreadPoolDispatcher {
    shared: Arc<Shared>,
    config: ThreadPoolConfig,
    alive: AtomicBool,
    sender: Mutex<Option<mpmc::Sender<Task>>>,
}

impl ThreadPoolDispatcher {
    pub fn new(name: impl Into<String>, config: ThreadPoolConfig) -> Result<Self> {
        let name = name.into();
        let config = ThreadPoolConfig {
            workers: config.workers.max(1),
            backlog: config.backlog.max(1),
            ..config
        };
        let (tx, rx) = mpmc::channel::<Task>();
        let shared = Arc::new(Shared {
            name: name.clone(),
            halted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            metrics: DispatcherMetrics::new(),
            running_workers: AtomicUsize::new(0),
        });

        info!(
            dispatcher = %name,
            workers = config.workers,
            backlog = config.backlog,
            backpressure_mode = ?config.backpressure_mode,
            stack_size = config.stack_size,
            "Creating thread-pool dispatcher"
        );

        for worker_id in 0..config.workers {
            let rx = rx.clone();
            let worker_shared = Arc::clone(&shared);
            worker_shared.running_workers.fetch_add(1, Ordering::AcqRel);

            // SAFETY: may::coroutine::Builder::spawn() is unsafe because the runtime
            // cannot check what the coroutine touches. The closure owns everything it
            // uses (Arc handles and its receiver clone), panics inside consumers are
            // caught by the router, and nothing borrows from this stack frame.
            #[allow(unsafe_code)]
            let spawn_result = unsafe {
                may::coroutine::Builder::new()
                    .name(format!("{}-{}", name, worker_id))
                    .stack_size(config.stack_size)
                    .spawn(move || work(&worker_shared, rx, worker_id))
            };

            if let Err(e) = spawn_result {
                shared.running_workers.fetch_sub(1, Ordering::AcqRel);
                error!(
                    dispatcher = %name,
                    worker_id = worker_id,
                    error = %e,
                    "Failed to spawn worker coroutine"
                );
            }
        }

        if shared.running_workers.load(Ordering::Acquire) == 0 {
            return Err(ReactorError::configuration(format!(
                "dispatcher '{}' could not start any worker",
                name
            )));
        }

        Ok(Self {
            shared,
            config,
            alive: AtomicBool::new(true),
            sender: Mutex::new(Some(tx)),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Wait until every worker has exited after `shutdown`/`halt`. Returns `false` on timeout.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.shared.running_workers.load(Ordering::Acquire) > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            may::coroutine::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Drop the sender, then tell idle workers nothing more is coming
    fn close(&self) {
        self.sender.lock().take();
        self.shared.closed.store(true, Ordering::Release);
    }

    fn shutdown_error(&self) -> ReactorError {
        ReactorError::Shutdown {
            dispatcher: self.shared.name.clone(),
        }
    }

    fn saturated(&self) -> ReactorError {
        self.shared.metrics.record_shed();
        warn!(
            dispatcher = %self.shared.name,
            backlog = self.config.backlog,
            shed_count = self.shared.metrics.get_shed_count(),
            "Backlog full, task rejected"
        );
        ReactorError::Saturated {
            dispatcher: self.shared.name.clone(),
            backlog: self.config.backlog,
        }
    }

    /// Reserve a backlog slot according to the backpressure mode
    fn reserve(&self) -> Result<()> {
        let metrics = &self.shared.metrics;
        if metrics.try_record_dispatch(self.config.backlog) {
            return Ok(());
        }
        match self.config.backpressure_mode {
            BackpressureMode::Shed => Err(self.saturated()),
            BackpressureMode::Block => {
                let deadline = (self.config.backpressure_timeout_ms > 0).then(|| {
                    Instant::now() + Duration::from_millis(self.config.backpressure_timeout_ms)
                });
                loop {
                    may::coroutine::sleep(Duration::from_millis(1));
                    if !self.alive() {
                        return Err(self.shutdown_error());
                    }
                    if metrics.try_record_dispatch(self.config.backlog) {
                        return Ok(());
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(self.saturated());
                    }
                }
            }
        }
    }
}

fn work(shared: &Shared, rx: mpmc::Receiver<Task>, worker_id: usize) {
    debug!(dispatcher = %shared.name, worker_id = worker_id, "Worker coroutine started");
    let mut scratch = Vec::new();

    // A disconnect only wakes one blocked receiver, so idle workers poll the closed flag
    loop {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(task) => run(shared, task, &mut scratch),
            Err(RecvTimeoutError::Timeout) if !shared.closed.load(Ordering::Acquire) => {}
            Err(_) => break,
        }
    }
    while let Ok(task) = rx.try_recv() {
        run(shared, task, &mut scratch);
    }

    shared.running_workers.fetch_sub(1, Ordering::AcqRel);
    debug!(dispatcher = %shared.name, worker_id = worker_id, "Worker coroutine exiting");
}

fn run(shared: &Shared, task: Task, scratch: &mut Vec<Match<Consumer>>) {
    if shared.halted.load(Ordering::Acquire) {
        shared.metrics.record_dropped();
        return;
    }
    let ok = task.run_detached(&shared.name, scratch);
    shared.metrics.record_completion(ok);
}

impl Dispatcher for ThreadPoolDispatcher {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn kind(&self) -> DispatcherKind {
        DispatcherKind::ThreadPool
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn dispatch(&self, task: Task) -> Result<()> {
        if !self.alive() {
            return Err(self.shutdown_error());
        }
        self.reserve()?;

        let sent = match self.sender.lock().as_ref() {
            Some(tx) => tx.send(task).is_ok(),
            None => false,
        };
        if !sent {
            self.shared.metrics.record_rejection();
            return Err(self.shutdown_error());
        }
        Ok(())
    }

    /// Stops accepting tasks; workers drain the backlog and exit in the background.
    /// Use [`ThreadPoolDispatcher::await_termination`] to wait for them.
    fn shutdown(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            info!(dispatcher = %self.shared.name, "Shutting down thread-pool dispatcher");
        }
        self.close();
    }

    fn halt(&self) {
        self.shared.halted.store(true, Ordering::Release);
        if self.alive.swap(false, Ordering::AcqRel) {
            info!(dispatcher = %self.shared.name, "Halting thread-pool dispatcher");
        }
        self.close();
    }

    fn metrics(&self) -> &DispatcherMetrics {
        &self.shared.metrics
    }

    fn backlog(&self) -> Option<usize> {
        Some(self.config.backlog)
    }

    fn workers(&self) -> usize {
        self.config.workers
    }
}

impl Drop for ThreadPoolDispatcher {
    fn drop(&mut self) {
        self.sender.get_mut().take();
        self.shared.closed.store(true, Ordering::Release);
    }
}
