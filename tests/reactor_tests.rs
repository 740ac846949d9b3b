#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests: reactor → dispatcher → registry → router → consumers
//!
//! # Test Coverage
//!
//! - Every dispatcher strategy delivers to every matching consumer
//! - URI and regex selectors expose captured variables across threads
//! - Request/reply through `receive` on an asynchronous dispatcher
//! - Failure escalation to `on_error` subscriptions off the caller's thread
//! - Round-robin filtering configured through the builder
//! - Shutdown drains queued work, then rejects new work

mod common;

use brrtreactor::dispatcher::{ThreadPoolConfig, WaitStrategy};
use brrtreactor::selector::var;
use brrtreactor::{
    BlockingQueueDispatcher, Consumer, Dispatcher, Environment, Event, Filter, Key, Reactor,
    ReactorError, RingBufferDispatcher, Selector, SynchronousDispatcher, ThreadPoolDispatcher,
};
use common::test_runtime::{setup_may_runtime, wait_for};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn all_dispatchers() -> Vec<Arc<dyn Dispatcher>> {
    setup_may_runtime();
    vec![
        Arc::new(SynchronousDispatcher::new("sync")),
        Arc::new(BlockingQueueDispatcher::new("eventLoop", 16).unwrap()),
        Arc::new(ThreadPoolDispatcher::new("pool", ThreadPoolConfig::new(2, 64)).unwrap()),
        Arc::new(RingBufferDispatcher::new("ring", 64, WaitStrategy::Blocking).unwrap()),
    ]
}

#[test]
fn test_every_dispatcher_delivers_to_all_consumers() {
    for dispatcher in all_dispatchers() {
        let name = dispatcher.name().to_string();
        let reactor = Reactor::with_dispatcher(Arc::clone(&dispatcher));
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            reactor.on(
                Selector::exact("orders.created"),
                Consumer::payload(move |n: &usize| {
                    hits.fetch_add(*n, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        for _ in 0..100 {
            reactor.notify("orders.created", Event::wrap(1usize)).unwrap();
        }
        reactor.notify("orders.ignored", Event::wrap(1usize)).unwrap();

        assert!(
            wait_for(TIMEOUT, || hits.load(Ordering::SeqCst) == 300),
            "{} delivered {}",
            name,
            hits.load(Ordering::SeqCst)
        );
        dispatcher.shutdown();
        assert!(!dispatcher.alive(), "{} still alive", name);
    }
}

#[test]
fn test_captured_variables_reach_async_consumers() {
    setup_may_runtime();
    let reactor = Reactor::with_dispatcher(Arc::new(
        RingBufferDispatcher::new("ring", 16, WaitStrategy::Yielding).unwrap(),
    ));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    reactor.on(
        Selector::uri("/zoo/{category}/animals/{id}").unwrap(),
        Consumer::with_vars(move |_, vars| {
            sink.lock().unwrap().push(format!(
                "{}:{}",
                var(vars, "category").unwrap_or("?"),
                var(vars, "id").unwrap_or("?")
            ));
            Ok(())
        }),
    );
    let sink = Arc::clone(&seen);
    reactor.on(
        Selector::regex(r"metrics\.(?P<name>[a-z]+)\.(\d+)").unwrap(),
        Consumer::with_vars(move |_, vars| {
            sink.lock().unwrap().push(format!(
                "{}#{}",
                var(vars, "name").unwrap_or("?"),
                var(vars, "group2").unwrap_or("?")
            ));
            Ok(())
        }),
    );

    reactor.notify_key("/zoo/cats/animals/7").unwrap();
    reactor.notify_key("metrics.cpu.3").unwrap();
    reactor.notify_key("/zoo/cats/animals").unwrap();

    assert!(wait_for(TIMEOUT, || seen.lock().unwrap().len() == 2));
    reactor.dispatcher().shutdown();
    assert_eq!(*seen.lock().unwrap(), vec!["cats:7", "cpu#3"]);
}

#[test]
fn test_request_reply_over_event_loop() {
    let reactor = Reactor::with_dispatcher(Arc::new(
        BlockingQueueDispatcher::new("eventLoop", 32).unwrap(),
    ));
    reactor.receive(Selector::exact("square"), |event| {
        let n = event.data::<i64>().copied().unwrap_or_default();
        Ok(Event::wrap(n * n))
    });

    let replies = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&replies);
    let reply_key = Key::unique();
    reactor.on(
        Selector::exact(reply_key.clone()),
        Consumer::payload(move |n: &i64| {
            sink.lock().unwrap().push(*n);
            Ok(())
        }),
    );

    for n in 1..=4i64 {
        reactor
            .notify("square", Event::wrap(n).with_reply_to(reply_key.clone()))
            .unwrap();
    }

    assert!(wait_for(TIMEOUT, || replies.lock().unwrap().len() == 4));
    reactor.dispatcher().shutdown();
    assert_eq!(*replies.lock().unwrap(), vec![1, 4, 9, 16]);
}

#[test]
fn test_failures_escalate_on_worker_threads() {
    let reactor = Reactor::with_dispatcher(Arc::new(
        BlockingQueueDispatcher::new("eventLoop", 32).unwrap(),
    ));
    let escalated = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&escalated);
    reactor.on_error(Consumer::payload(move |e: &ReactorError| {
        sink.lock().unwrap().push(e.kind());
        Ok(())
    }));
    let survivors = Arc::new(AtomicUsize::new(0));
    reactor.on(
        Selector::exact("job"),
        Consumer::event(|_| panic!("job exploded")),
    );
    let counter = Arc::clone(&survivors);
    reactor.on(
        Selector::exact("job"),
        Consumer::event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    for _ in 0..10 {
        reactor.notify_key("job").unwrap();
    }

    assert!(wait_for(TIMEOUT, || survivors.load(Ordering::SeqCst) == 10
        && escalated.lock().unwrap().len() == 10));
    reactor.dispatcher().shutdown();
    assert!(escalated
        .lock()
        .unwrap()
        .iter()
        .all(|kind| *kind == "consumer"));
}

#[test]
fn test_round_robin_across_builder_reactor() {
    let env = Environment::new().unwrap();
    let reactor = Reactor::builder(&env)
        .dispatcher_name("sync")
        .filter(Filter::round_robin())
        .build()
        .unwrap();

    let counts: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for count in &counts {
        let count = Arc::clone(count);
        reactor.on(
            Selector::exact("work"),
            Consumer::event(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }

    for _ in 0..9 {
        reactor.notify_key("work").unwrap();
    }
    env.shutdown();
    for count in &counts {
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}

#[test]
fn test_shutdown_drains_then_rejects() {
    let dispatcher = Arc::new(BlockingQueueDispatcher::new("eventLoop", 8).unwrap());
    let reactor = Reactor::with_dispatcher(Arc::clone(&dispatcher) as Arc<dyn Dispatcher>);
    let done = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&done);
    reactor.on(
        Selector::exact("slow"),
        Consumer::event(move |_| {
            std::thread::sleep(Duration::from_millis(1));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    for _ in 0..20 {
        reactor.notify_key("slow").unwrap();
    }
    dispatcher.shutdown();
    assert_eq!(done.load(Ordering::SeqCst), 20);

    let err = reactor.notify_key("slow").unwrap_err();
    assert!(matches!(err, ReactorError::Shutdown { .. }));
}

#[test]
fn test_cancel_after_use_fires_once_across_threads() {
    setup_may_runtime();
    let reactor = Reactor::with_dispatcher(Arc::new(
        ThreadPoolDispatcher::new("pool", ThreadPoolConfig::new(4, 128)).unwrap(),
    ));
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let registration = reactor.on(
        Selector::exact("once"),
        Consumer::event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    registration.cancel_after_use();

    for _ in 0..50 {
        reactor.notify_key("once").unwrap();
    }
    let pool = Arc::clone(reactor.dispatcher());
    pool.shutdown();
    assert!(wait_for(TIMEOUT, || pool.metrics().get_queue_depth() == 0));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(registration.is_cancelled());
}
