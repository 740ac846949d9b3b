//! # Dispatcher Module
//!
//! Strategies for scheduling and executing [`Task`]s.
//!
//! ## Overview
//!
//! Every strategy implements [`Dispatcher`] and funnels into the same final
//! step, [`Task::execute`]: look up the task's key in its registry, then hand
//! the matches to the router.
//!
//! | Strategy | Threads | Backlog | Ordering | Full backlog |
//! |----------|---------|---------|----------|--------------|
//! | [`SynchronousDispatcher`] | caller | none | caller order | n/a |
//! | [`BlockingQueueDispatcher`] | 1 OS thread | bounded FIFO | FIFO | producer blocks |
//! | [`ThreadPoolDispatcher`] | N `may` coroutines | bounded | none | block or shed |
//! | [`RingBufferDispatcher`] | 1 OS thread | power-of-two ring | total order | producer spins |
//!
//! ## Lifecycle
//!
//! `shutdown()` stops accepting work and lets queued tasks drain; `halt()`
//! stops immediately and may drop queued tasks. Both are idempotent, and after
//! either one `dispatch` fails with [`ReactorError::Shutdown`].
//!
//! ## Failure Isolation
//!
//! Consumer failures are handled by the router (see [`crate::routing`]). A
//! failure nobody handled is returned to the caller by the synchronous
//! dispatcher and logged at `error` level by the others; the worker keeps
//! running either way.

mod blocking_queue;
mod metrics;
mod ring_buffer;
mod synchronous;
mod task;
mod thread_pool;
#[cfg(test)]
mod tests;

pub use blocking_queue::BlockingQueueDispatcher;
pub use metrics::DispatcherMetrics;
pub use ring_buffer::{RingBufferDispatcher, WaitStrategy};
pub use synchronous::SynchronousDispatcher;
pub use task::{CompletionConsumer, ErrorConsumer, Task};
pub use thread_pool::{BackpressureMode, ThreadPoolConfig, ThreadPoolDispatcher};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ReactorError, Result};

/// A strategy for scheduling and executing tasks
pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> DispatcherKind;

    /// Whether new tasks are accepted
    fn alive(&self) -> bool;

    /// Schedule a task. Results reach consumers, never the return value,
    /// except for a synchronous dispatcher's unhandled consumer failure.
    fn dispatch(&self, task: Task) -> Result<()>;

    /// Stop accepting tasks and let queued ones drain
    fn shutdown(&self);

    /// Stop immediately; queued tasks may be dropped
    fn halt(&self);

    fn metrics(&self) -> &DispatcherMetrics;

    /// Queue capacity, if the strategy has one
    fn backlog(&self) -> Option<usize> {
        None
    }

    /// Number of threads or coroutines executing tasks
    fn workers(&self) -> usize {
        1
    }
}

/// The closed set of dispatcher strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DispatcherKind {
    Synchronous,
    BlockingQueue,
    ThreadPool,
    RingBuffer,
}

impl DispatcherKind {
    /// Canonical configuration name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatcherKind::Synchronous => "synchronous",
            DispatcherKind::BlockingQueue => "eventLoop",
            DispatcherKind::ThreadPool => "threadPoolExecutor",
            DispatcherKind::RingBuffer => "ringBuffer",
        }
    }

    /// Backlog used when a configuration leaves it out
    #[must_use]
    pub fn default_backlog(&self) -> Option<usize> {
        match self {
            DispatcherKind::Synchronous => None,
            DispatcherKind::BlockingQueue => Some(blocking_queue::DEFAULT_BACKLOG),
            DispatcherKind::ThreadPool => Some(thread_pool::DEFAULT_BACKLOG),
            DispatcherKind::RingBuffer => Some(ring_buffer::DEFAULT_BACKLOG),
        }
    }
}

impl FromStr for DispatcherKind {
    type Err = ReactorError;

    /// Accepts the canonical names plus kebab/snake case spellings
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "synchronous" | "sync" => Ok(DispatcherKind::Synchronous),
            "eventloop" | "blockingqueue" => Ok(DispatcherKind::BlockingQueue),
            "threadpoolexecutor" | "threadpool" => Ok(DispatcherKind::ThreadPool),
            "ringbuffer" => Ok(DispatcherKind::RingBuffer),
            _ => Err(ReactorError::configuration(format!(
                "unknown dispatcher type '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for DispatcherKind {
    type Error = ReactorError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DispatcherKind> for String {
    fn from(kind: DispatcherKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for DispatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker count for a requested size; anything below 1 means available parallelism
#[must_use]
pub fn resolve_workers(size: i64) -> usize {
    if size < 1 {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    } else {
        usize::try_from(size).unwrap_or(usize::MAX)
    }
}
