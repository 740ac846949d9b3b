//! Ring-buffer dispatcher: a pre-allocated power-of-two slot arena with a
//! single consumer thread.
//!
//! ## Sequence Protocol
//!
//! Slot `i` starts with sequence `i`. For the task at position `p`
//! (slot `p & mask`):
//!
//! 1. a producer claims `p` with one `fetch_add` on the tail;
//! 2. it waits until the slot's sequence equals `p` (the slot is free),
//!    writes the task and publishes by storing `p + 1`;
//! 3. the consumer waits until the sequence equals `p + 1`, runs the task in
//!    place, clears the slot and releases it by storing `p + capacity`.
//!
//! A slot is only ever touched by the one thread the sequence number hands it
//! to, which is what makes the unsynchronized slot contents sound.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Dispatcher, DispatcherKind, DispatcherMetrics, Task};
use crate::error::{ReactorError, Result};

/// Default number of slots
pub const DEFAULT_BACKLOG: usize = 1024;

/// Spins before a waiting producer starts yielding
const PRODUCER_SPIN_LIMIT: u32 = 64;

/// Longest a blocked consumer sleeps without a wake-up
const BLOCKING_PARK: Duration = Duration::from_millis(1);

/// How the consumer waits when no task is published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitStrategy {
    /// Spin on the CPU; lowest latency, burns a core
    BusySpin,
    /// Spin briefly then yield the thread
    Yielding,
    /// Park on a condition variable until a producer signals
    #[default]
    Blocking,
}

impl WaitStrategy {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "busy-spin" | "busyspin" | "spin" => Some(Self::BusySpin),
            "yielding" | "yield" => Some(Self::Yielding),
            "blocking" | "block" => Some(Self::Blocking),
            _ => None,
        }
    }
}

struct Slot {
    sequence: AtomicU64,
    task: UnsafeCell<Option<Task>>,
}

struct Ring {
    name: String,
    slots: Box<[Slot]>,
    mask: u64,
    tail: AtomicU64,
    /// Producers between their liveness check and their publish
    in_flight: AtomicUsize,
    alive: AtomicBool,
    halted: AtomicBool,
    wait: WaitStrategy,
    sleeping: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
    metrics: DispatcherMetrics,
}

// SAFETY: the only non-Sync field is each slot's `UnsafeCell<Option<Task>>`.
// Access to a slot's cell is handed between threads by its sequence number
// (see the module docs): exactly one producer owns it between claim and
// publish, and only the consumer owns it between publish and release. The
// Acquire/Release pairs on `sequence` order those accesses. `Task` is `Send`.
#[allow(unsafe_code)]
unsafe impl Sync for Ring {}

impl Ring {
    fn slot(&self, position: u64) -> &Slot {
        &self.slots[(position & self.mask) as usize]
    }

    fn capacity(&self) -> u64 {
        self.mask + 1
    }

    fn wake_consumer(&self) {
        if self.wait == WaitStrategy::Blocking && self.sleeping.load(Ordering::SeqCst) {
            let _guard = self.lock.lock();
            self.wakeup.notify_one();
        }
    }

    fn publish(&self, task: Task) -> Result<()> {
        let position = self.tail.fetch_add(1, Ordering::AcqRel);
        let slot = self.slot(position);

        // Ring full: wait for the consumer to release this slot
        let mut spins = 0u32;
        while slot.sequence.load(Ordering::Acquire) != position {
            if self.halted.load(Ordering::Acquire) {
                return Err(ReactorError::Shutdown {
                    dispatcher: self.name.clone(),
                });
            }
            if spins < PRODUCER_SPIN_LIMIT {
                std::hint::spin_loop();
                spins += 1;
            } else {
                thread::yield_now();
            }
        }

        // SAFETY: the sequence equals our claimed position, so the consumer has
        // released the slot and no other producer can hold the same position.
        #[allow(unsafe_code)]
        unsafe {
            *slot.task.get() = Some(task);
        }
        slot.sequence.store(position + 1, Ordering::SeqCst);
        self.wake_consumer();
        Ok(())
    }

    fn drained(&self, next: u64) -> bool {
        !self.alive.load(Ordering::SeqCst)
            && self.in_flight.load(Ordering::SeqCst) == 0
            && self.tail.load(Ordering::SeqCst) == next
    }

    fn consume(&self) {
        debug!(dispatcher = %self.name, capacity = self.capacity(), "Ring consumer started");
        let mut next: u64 = 0;
        let mut scratch = Vec::new();
        let mut idle_spins = 0u32;

        loop {
            if self.halted.load(Ordering::Acquire) {
                self.discard_published(next);
                break;
            }
            let slot = self.slot(next);
            if slot.sequence.load(Ordering::Acquire) == next + 1 {
                // SAFETY: sequence `next + 1` means the producer published this slot
                // and will not touch it again until we release it below.
                #[allow(unsafe_code)]
                let cell = unsafe { &mut *slot.task.get() };
                if let Some(task) = cell.as_ref() {
                    let ok = task.run_detached(&self.name, &mut scratch);
                    self.metrics.record_completion(ok);
                }
                *cell = None;
                slot.sequence.store(next + self.capacity(), Ordering::Release);
                next += 1;
                idle_spins = 0;
                continue;
            }

            if self.drained(next) {
                break;
            }
            self.idle(next, &mut idle_spins);
        }
        debug!(dispatcher = %self.name, processed = next, "Ring consumer exiting");
    }

    /// After a halt, drop whatever producers already published without running it
    fn discard_published(&self, mut next: u64) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            thread::yield_now();
        }
        loop {
            let slot = self.slot(next);
            if slot.sequence.load(Ordering::Acquire) != next + 1 {
                break;
            }
            // SAFETY: same hand-off as in `consume`; no producer is in flight.
            #[allow(unsafe_code)]
            let cell = unsafe { &mut *slot.task.get() };
            if cell.take().is_some() {
                self.metrics.record_dropped();
            }
            slot.sequence.store(next + self.capacity(), Ordering::Release);
            next += 1;
        }
    }

    fn idle(&self, next: u64, idle_spins: &mut u32) {
        match self.wait {
            WaitStrategy::BusySpin => std::hint::spin_loop(),
            WaitStrategy::Yielding => {
                if *idle_spins < PRODUCER_SPIN_LIMIT {
                    *idle_spins += 1;
                    std::hint::spin_loop();
                } else {
                    thread::yield_now();
                }
            }
            WaitStrategy::Blocking => {
                let mut guard = self.lock.lock();
                self.sleeping.store(true, Ordering::SeqCst);
                let published = self.slot(next).sequence.load(Ordering::SeqCst) == next + 1;
                if !published && !self.drained(next) && !self.halted.load(Ordering::Acquire) {
                    // Bounded park: covers a publish racing with the flag store
                    let _timed_out = self.wakeup.wait_for(&mut guard, BLOCKING_PARK);
                }
                self.sleeping.store(false, Ordering::SeqCst);
            }
        }
    }

    fn wake_for_stop(&self) {
        let _guard = self.lock.lock();
        self.wakeup.notify_all();
    }
}

/// Multi-producer, single-consumer ring of pre-allocated task slots.
///
/// Tasks run on the consumer thread in strict sequence order. Producers never
/// block each other; when the ring is full a producer spins until its slot is
/// released.
pub struct RingBufferDispatcher {
    ring: Arc<Ring>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl RingBufferDispatcher {
    /// `backlog` is rounded up to the next power of two
    pub fn new(name: impl Into<String>, backlog: usize, wait: WaitStrategy) -> Result<Self> {
        let name = name.into();
        let capacity = backlog.max(2).checked_next_power_of_two().ok_or_else(|| {
            ReactorError::configuration(format!(
                "dispatcher '{}' backlog {} is too large for a ring",
                name, backlog
            ))
        })?;
        if capacity != backlog {
            debug!(
                dispatcher = %name,
                requested = backlog,
                capacity = capacity,
                "Ring capacity rounded up to a power of two"
            );
        }

        let slots: Box<[Slot]> = (0..capacity as u64)
            .map(|i| Slot {
                sequence: AtomicU64::new(i),
                task: UnsafeCell::new(None),
            })
            .collect();

        let ring = Arc::new(Ring {
            name: name.clone(),
            slots,
            mask: capacity as u64 - 1,
            tail: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            halted: AtomicBool::new(false),
            wait,
            sleeping: AtomicBool::new(false),
            lock: Mutex::new(()),
            wakeup: Condvar::new(),
            metrics: DispatcherMetrics::new(),
        });

        let consumer_ring = Arc::clone(&ring);
        let consumer = thread::Builder::new()
            .name(format!("{}-ring", name))
            .spawn(move || consumer_ring.consume())
            .map_err(|e| {
                ReactorError::configuration(format!(
                    "failed to spawn consumer thread for dispatcher '{}': {}",
                    name, e
                ))
            })?;

        info!(
            dispatcher = %ring.name,
            capacity = capacity,
            wait_strategy = ?wait,
            "Ring-buffer dispatcher started"
        );

        Ok(Self {
            ring,
            consumer: Mutex::new(Some(consumer)),
        })
    }

    /// Number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }

    #[must_use]
    pub fn wait_strategy(&self) -> WaitStrategy {
        self.ring.wait
    }

    fn join_consumer(&self) {
        self.ring.wake_for_stop();
        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Stopped from a consumer running on the ring thread
                return;
            }
            if handle.join().is_err() {
                warn!(dispatcher = %self.ring.name, "Ring consumer thread panicked");
            }
        }
    }
}

impl Dispatcher for RingBufferDispatcher {
    fn name(&self) -> &str {
        &self.ring.name
    }

    fn kind(&self) -> DispatcherKind {
        DispatcherKind::RingBuffer
    }

    fn alive(&self) -> bool {
        self.ring.alive.load(Ordering::SeqCst)
    }

    fn dispatch(&self, task: Task) -> Result<()> {
        let ring = &self.ring;
        ring.in_flight.fetch_add(1, Ordering::SeqCst);
        if !ring.alive.load(Ordering::SeqCst) {
            ring.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(ReactorError::Shutdown {
                dispatcher: ring.name.clone(),
            });
        }

        ring.metrics.record_dispatch();
        let outcome = ring.publish(task);
        if outcome.is_err() {
            ring.metrics.record_rejection();
        }
        ring.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    /// Stops accepting tasks, drains everything already published and joins the consumer.
    fn shutdown(&self) {
        if self.ring.alive.swap(false, Ordering::SeqCst) {
            info!(dispatcher = %self.ring.name, "Shutting down ring-buffer dispatcher");
        }
        self.join_consumer();
    }

    fn halt(&self) {
        self.ring.halted.store(true, Ordering::SeqCst);
        if self.ring.alive.swap(false, Ordering::SeqCst) {
            info!(dispatcher = %self.ring.name, "Halting ring-buffer dispatcher");
        }
        self.join_consumer();
    }

    fn metrics(&self) -> &DispatcherMetrics {
        &self.ring.metrics
    }

    fn backlog(&self) -> Option<usize> {
        Some(self.capacity())
    }
}

impl Drop for RingBufferDispatcher {
    fn drop(&mut self) {
        self.ring.alive.store(false, Ordering::SeqCst);
        self.join_consumer();
    }
}
