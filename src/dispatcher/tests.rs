#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::event::Event;
use crate::routing::{Consumer, ConsumerFilteringRouter, ConsumerRegistry, EventRouter};
use crate::selector::{Key, Selector};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn router() -> Arc<dyn EventRouter> {
    Arc::new(ConsumerFilteringRouter::default())
}

fn task_for(registry: &ConsumerRegistry, key: &str, n: usize) -> Task {
    Task::new(Key::from(key), Event::wrap(n), registry.clone(), router())
}

/// Registry with one consumer on `key` appending each `usize` payload to the returned log
fn collecting(key: &str) -> (ConsumerRegistry, Arc<Mutex<Vec<usize>>>) {
    let registry = ConsumerRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    registry.register(
        Selector::exact(key),
        Consumer::payload(move |n: &usize| {
            sink.lock().push(*n);
            Ok(())
        }),
    );
    (registry, seen)
}

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn test_dispatcher_kind_parsing() {
    assert_eq!("synchronous".parse::<DispatcherKind>().unwrap(), DispatcherKind::Synchronous);
    assert_eq!("eventLoop".parse::<DispatcherKind>().unwrap(), DispatcherKind::BlockingQueue);
    assert_eq!("event-loop".parse::<DispatcherKind>().unwrap(), DispatcherKind::BlockingQueue);
    assert_eq!(
        "threadPoolExecutor".parse::<DispatcherKind>().unwrap(),
        DispatcherKind::ThreadPool
    );
    assert_eq!("ring_buffer".parse::<DispatcherKind>().unwrap(), DispatcherKind::RingBuffer);

    let err = "actor".parse::<DispatcherKind>().unwrap_err();
    assert_eq!(err.kind(), "configuration");
}

#[test]
fn test_dispatcher_kind_serde_uses_canonical_names() {
    let json = serde_json::to_string(&DispatcherKind::ThreadPool).unwrap();
    assert_eq!(json, "\"threadPoolExecutor\"");
    let kind: DispatcherKind = serde_json::from_str("\"ringBuffer\"").unwrap();
    assert_eq!(kind, DispatcherKind::RingBuffer);
    assert!(serde_json::from_str::<DispatcherKind>("\"bogus\"").is_err());
}

#[test]
fn test_resolve_workers() {
    assert_eq!(resolve_workers(3), 3);
    assert!(resolve_workers(0) >= 1);
    assert_eq!(resolve_workers(-1), resolve_workers(0));
}

#[test]
fn test_synchronous_runs_inline_and_returns_failure() {
    let (registry, seen) = collecting("k");
    registry.register(
        Selector::exact("fail"),
        Consumer::event(|_| Err(anyhow::anyhow!("boom"))),
    );
    let d = SynchronousDispatcher::new("sync");

    d.dispatch(task_for(&registry, "k", 7)).unwrap();
    assert_eq!(*seen.lock(), vec![7]);

    let err = d.dispatch(task_for(&registry, "fail", 0)).unwrap_err();
    assert_eq!(err.kind(), "consumer");
    assert_eq!(d.metrics().get_completed_count(), 2);
    assert_eq!(d.metrics().get_failed_count(), 1);
    assert_eq!(d.metrics().get_queue_depth(), 0);
    assert_eq!(d.workers(), 0);
}

#[test]
fn test_synchronous_rejects_after_shutdown() {
    let (registry, seen) = collecting("k");
    let d = SynchronousDispatcher::new("sync");
    d.shutdown();
    d.shutdown();
    assert!(!d.alive());

    let err = d.dispatch(task_for(&registry, "k", 1)).unwrap_err();
    assert!(matches!(err, ReactorError::Shutdown { ref dispatcher } if dispatcher == "sync"));
    assert!(seen.lock().is_empty());
}

#[test]
fn test_blocking_queue_preserves_fifo_order() {
    let (registry, seen) = collecting("k");
    let d = BlockingQueueDispatcher::new("loop", 4).unwrap();
    assert_eq!(d.backlog(), Some(4));

    for n in 0..100 {
        d.dispatch(task_for(&registry, "k", n)).unwrap();
    }
    d.shutdown();

    assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    assert_eq!(d.metrics().get_completed_count(), 100);
}

#[test]
fn test_blocking_queue_survives_failing_consumer() {
    let (registry, seen) = collecting("k");
    registry.register(Selector::exact("k"), Consumer::event(|_| panic!("bad consumer")));
    let d = BlockingQueueDispatcher::new("loop", 8).unwrap();

    for n in 0..5 {
        d.dispatch(task_for(&registry, "k", n)).unwrap();
    }
    d.shutdown();

    assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(d.metrics().get_failed_count(), 5);
}

#[test]
fn test_blocking_queue_rejects_after_halt() {
    let (registry, _) = collecting("k");
    let d = BlockingQueueDispatcher::new("loop", 8).unwrap();
    d.halt();
    d.halt();

    let err = d.dispatch(task_for(&registry, "k", 1)).unwrap_err();
    assert_eq!(err.kind(), "shutdown");
}

#[test]
fn test_thread_pool_runs_each_task_exactly_once() {
    may::config().set_workers(2);
    let registry = ConsumerRegistry::new();
    let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..200).map(|_| AtomicUsize::new(0)).collect());
    let sink = Arc::clone(&hits);
    registry.register(
        Selector::exact("k"),
        Consumer::payload(move |n: &usize| {
            sink[*n].fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    let d = ThreadPoolDispatcher::new("pool", ThreadPoolConfig::new(4, 64)).unwrap();
    assert_eq!(d.workers(), 4);
    for n in 0..200 {
        d.dispatch(task_for(&registry, "k", n)).unwrap();
    }
    d.shutdown();
    assert!(d.await_termination(Duration::from_secs(10)));

    assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
    assert_eq!(d.metrics().get_completed_count(), 200);
    assert_eq!(d.metrics().get_queue_depth(), 0);
}

#[test]
fn test_thread_pool_shutdown_drains_backlog_then_terminates() {
    may::config().set_workers(2);
    let registry = ConsumerRegistry::new();
    let delivered = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&delivered);
    registry.register(
        Selector::exact("k"),
        Consumer::event(move |_| {
            may::coroutine::sleep(Duration::from_millis(1));
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    // More workers than tasks, so several sit idle in recv when the sender goes away
    let d = ThreadPoolDispatcher::new("drain", ThreadPoolConfig::new(8, 64)).unwrap();
    for n in 0..5 {
        d.dispatch(task_for(&registry, "k", n)).unwrap();
    }
    d.shutdown();

    assert!(d.await_termination(Duration::from_secs(10)));
    assert_eq!(delivered.load(Ordering::SeqCst), 5);
    assert_eq!(d.metrics().get_queue_depth(), 0);
}

#[test]
fn test_thread_pool_idle_workers_terminate() {
    may::config().set_workers(2);
    let d = ThreadPoolDispatcher::new("idle", ThreadPoolConfig::new(6, 8)).unwrap();
    // Let every worker reach its blocking receive first
    thread::sleep(Duration::from_millis(50));
    d.shutdown();
    assert!(d.await_termination(Duration::from_secs(10)));
}

#[test]
fn test_thread_pool_shed_mode_rejects_when_full() {
    may::config().set_workers(2);
    let registry = ConsumerRegistry::new();
    let gate = Arc::new(AtomicUsize::new(0));
    let wait_gate = Arc::clone(&gate);
    registry.register(
        Selector::exact("slow"),
        Consumer::event(move |_| {
            while wait_gate.load(Ordering::SeqCst) == 0 {
                may::coroutine::sleep(Duration::from_millis(1));
            }
            Ok(())
        }),
    );

    let config = ThreadPoolConfig::new(1, 2).with_backpressure(BackpressureMode::Shed, 0);
    let d = ThreadPoolDispatcher::new("shed", config).unwrap();
    d.dispatch(task_for(&registry, "slow", 0)).unwrap();
    d.dispatch(task_for(&registry, "slow", 1)).unwrap();

    let err = d.dispatch(task_for(&registry, "slow", 2)).unwrap_err();
    assert!(matches!(err, ReactorError::Saturated { backlog: 2, .. }));
    assert_eq!(d.metrics().get_shed_count(), 1);

    gate.store(1, Ordering::SeqCst);
    d.shutdown();
    assert!(d.await_termination(Duration::from_secs(10)));
    assert_eq!(d.metrics().get_completed_count(), 2);
}

#[test]
fn test_thread_pool_block_mode_times_out() {
    may::config().set_workers(2);
    let registry = ConsumerRegistry::new();
    let gate = Arc::new(AtomicUsize::new(0));
    let wait_gate = Arc::clone(&gate);
    registry.register(
        Selector::exact("slow"),
        Consumer::event(move |_| {
            while wait_gate.load(Ordering::SeqCst) == 0 {
                may::coroutine::sleep(Duration::from_millis(1));
            }
            Ok(())
        }),
    );

    let config = ThreadPoolConfig::new(1, 1).with_backpressure(BackpressureMode::Block, 20);
    let d = ThreadPoolDispatcher::new("block", config).unwrap();
    d.dispatch(task_for(&registry, "slow", 0)).unwrap();

    let start = Instant::now();
    let err = d.dispatch(task_for(&registry, "slow", 1)).unwrap_err();
    assert_eq!(err.kind(), "saturated");
    assert!(start.elapsed() >= Duration::from_millis(20));

    gate.store(1, Ordering::SeqCst);
    d.shutdown();
    assert!(d.await_termination(Duration::from_secs(10)));
}

#[test]
fn test_thread_pool_rejects_after_shutdown() {
    may::config().set_workers(2);
    let (registry, _) = collecting("k");
    let d = ThreadPoolDispatcher::new("pool", ThreadPoolConfig::new(2, 8)).unwrap();
    d.shutdown();
    let err = d.dispatch(task_for(&registry, "k", 0)).unwrap_err();
    assert_eq!(err.kind(), "shutdown");
    assert!(d.await_termination(Duration::from_secs(10)));
}

#[test]
fn test_backpressure_mode_parse() {
    assert_eq!(BackpressureMode::parse("SHED"), Some(BackpressureMode::Shed));
    assert_eq!(BackpressureMode::parse("block"), Some(BackpressureMode::Block));
    assert_eq!(BackpressureMode::parse("drop"), None);
}

/// Registry whose `k` consumer signals `started` and then waits for `gate`
fn gated(started: &Arc<AtomicUsize>, gate: &Arc<AtomicUsize>) -> ConsumerRegistry {
    let registry = ConsumerRegistry::new();
    let started = Arc::clone(started);
    let gate = Arc::clone(gate);
    registry.register(
        Selector::exact("k"),
        Consumer::event(move |_| {
            started.fetch_add(1, Ordering::SeqCst);
            while gate.load(Ordering::SeqCst) == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }),
    );
    registry
}

fn open_gate_later(gate: &Arc<AtomicUsize>) -> thread::JoinHandle<()> {
    let gate = Arc::clone(gate);
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        gate.store(1, Ordering::SeqCst);
    })
}

#[test]
fn test_blocking_queue_halt_records_dropped_tasks() {
    let started = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(AtomicUsize::new(0));
    let registry = gated(&started, &gate);
    let d = BlockingQueueDispatcher::new("loop", 8).unwrap();

    for n in 0..4 {
        d.dispatch(task_for(&registry, "k", n)).unwrap();
    }
    assert!(wait_for(Duration::from_secs(5), || started.load(Ordering::SeqCst) == 1));
    let opener = open_gate_later(&gate);
    d.halt();
    opener.join().unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(d.metrics().get_completed_count(), 1);
    assert_eq!(d.metrics().get_dispatched_count(), 4);
    assert_eq!(d.metrics().get_queue_depth(), 0);
}

#[test]
fn test_ring_buffer_halt_records_dropped_tasks() {
    let started = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(AtomicUsize::new(0));
    let registry = gated(&started, &gate);
    let d = RingBufferDispatcher::new("ring", 8, WaitStrategy::Blocking).unwrap();

    for n in 0..4 {
        d.dispatch(task_for(&registry, "k", n)).unwrap();
    }
    assert!(wait_for(Duration::from_secs(5), || started.load(Ordering::SeqCst) == 1));
    let opener = open_gate_later(&gate);
    d.halt();
    opener.join().unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(d.metrics().get_completed_count(), 1);
    assert_eq!(d.metrics().get_queue_depth(), 0);
}

#[test]
fn test_ring_buffer_rejects_oversized_backlog() {
    let err = RingBufferDispatcher::new("huge", usize::MAX, WaitStrategy::Blocking)
        .err()
        .expect("oversized ring must be rejected");
    assert_eq!(err.kind(), "configuration");
}

#[test]
fn test_ring_buffer_rounds_capacity_up() {
    let d = RingBufferDispatcher::new("ring", 1000, WaitStrategy::Blocking).unwrap();
    assert_eq!(d.capacity(), 1024);
    assert_eq!(d.backlog(), Some(1024));
    d.shutdown();
}

#[test]
fn test_ring_buffer_preserves_single_producer_order() {
    let (registry, seen) = collecting("k");
    // Smaller than the number of tasks so producers wrap around the ring
    let d = RingBufferDispatcher::new("ring", 8, WaitStrategy::Yielding).unwrap();

    for n in 0..500 {
        d.dispatch(task_for(&registry, "k", n)).unwrap();
    }
    d.shutdown();

    assert_eq!(*seen.lock(), (0..500).collect::<Vec<_>>());
    assert_eq!(d.metrics().get_completed_count(), 500);
}

#[test]
fn test_ring_buffer_multiple_producers_keep_per_producer_order() {
    let registry = ConsumerRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    registry.register(
        Selector::exact("k"),
        Consumer::payload(move |pair: &(usize, usize)| {
            sink.lock().push(*pair);
            Ok(())
        }),
    );

    let d = Arc::new(RingBufferDispatcher::new("ring", 16, WaitStrategy::Blocking).unwrap());
    let producers: Vec<_> = (0..4usize)
        .map(|p| {
            let d = Arc::clone(&d);
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..250usize {
                    let task = Task::new(Key::from("k"), Event::wrap((p, i)), registry.clone(), router());
                    d.dispatch(task).unwrap();
                }
            })
        })
        .collect();
    for handle in producers {
        handle.join().unwrap();
    }
    d.shutdown();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1000);
    for p in 0..4usize {
        let order: Vec<usize> = seen.iter().filter(|(q, _)| *q == p).map(|(_, i)| *i).collect();
        assert_eq!(order, (0..250).collect::<Vec<_>>());
    }
}

#[test]
fn test_ring_buffer_busy_spin_delivers() {
    let (registry, seen) = collecting("k");
    let d = RingBufferDispatcher::new("spin", 4, WaitStrategy::BusySpin).unwrap();
    for n in 0..10 {
        d.dispatch(task_for(&registry, "k", n)).unwrap();
    }
    assert!(wait_for(Duration::from_secs(5), || seen.lock().len() == 10));
    d.shutdown();
}

#[test]
fn test_ring_buffer_rejects_after_shutdown_and_halt() {
    let (registry, _) = collecting("k");
    let d = RingBufferDispatcher::new("ring", 4, WaitStrategy::Blocking).unwrap();
    d.shutdown();
    assert_eq!(d.dispatch(task_for(&registry, "k", 0)).unwrap_err().kind(), "shutdown");

    let h = RingBufferDispatcher::new("ring", 4, WaitStrategy::Blocking).unwrap();
    h.halt();
    h.halt();
    assert_eq!(h.dispatch(task_for(&registry, "k", 0)).unwrap_err().kind(), "shutdown");
}

#[test]
fn test_wait_strategy_parse() {
    assert_eq!(WaitStrategy::parse("busy_spin"), Some(WaitStrategy::BusySpin));
    assert_eq!(WaitStrategy::parse("Yielding"), Some(WaitStrategy::Yielding));
    assert_eq!(WaitStrategy::parse("blocking"), Some(WaitStrategy::Blocking));
    assert_eq!(WaitStrategy::parse("sleepy"), None);
}

#[test]
fn test_dispatch_from_inside_a_consumer() {
    let registry = ConsumerRegistry::new();
    let d = Arc::new(BlockingQueueDispatcher::new("nested", 16).unwrap());
    let seen = Arc::new(AtomicUsize::new(0));

    let inner_seen = Arc::clone(&seen);
    registry.register(
        Selector::exact("inner"),
        Consumer::event(move |_| {
            inner_seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    let outer_d = Arc::clone(&d);
    let outer_registry = registry.clone();
    registry.register(
        Selector::exact("outer"),
        Consumer::event(move |_| {
            outer_d.dispatch(task_for(&outer_registry, "inner", 0))?;
            Ok(())
        }),
    );

    d.dispatch(task_for(&registry, "outer", 0)).unwrap();
    assert!(wait_for(Duration::from_secs(5), || seen.load(Ordering::SeqCst) == 1));
    d.shutdown();
}
