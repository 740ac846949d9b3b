#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::dispatcher::Task;
use crate::selector::{var, Selector};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, label: &'static str) -> Consumer {
    let log = Arc::clone(log);
    Consumer::event(move |_| {
        log.lock().push(label.to_string());
        Ok(())
    })
}

fn task(key: &str, registry: &ConsumerRegistry, filter: Filter) -> Task {
    Task::new(
        Key::from(key),
        Event::wrap("payload".to_string()),
        registry.clone(),
        Arc::new(ConsumerFilteringRouter::new(filter)),
    )
}

fn run(task: &Task) -> Result<()> {
    let mut scratch = Vec::new();
    task.execute(&mut scratch)
}

#[test]
fn test_pass_through_invokes_all_in_registration_order() {
    let registry = ConsumerRegistry::new();
    let log: Log = Arc::default();
    registry.register(Selector::exact("k"), recorder(&log, "a"));
    registry.register(Selector::regex("k.*").unwrap(), recorder(&log, "b"));
    registry.register(Selector::exact("other"), recorder(&log, "never"));

    run(&task("k", &registry, Filter::PassThrough)).unwrap();
    assert_eq!(*log.lock(), vec!["a", "b"]);
}

#[test]
fn test_round_robin_rotates_per_key() {
    let registry = ConsumerRegistry::new();
    let log: Log = Arc::default();
    registry.register(Selector::exact("k"), recorder(&log, "a"));
    registry.register(Selector::exact("k"), recorder(&log, "b"));
    registry.register(Selector::exact("k"), recorder(&log, "c"));

    let filter = Filter::round_robin();
    for _ in 0..4 {
        run(&task("k", &registry, filter.clone())).unwrap();
    }
    assert_eq!(*log.lock(), vec!["a", "b", "c", "a"]);
}

#[test]
fn test_round_robin_forgets_least_recent_key() {
    let filter = Filter::round_robin_with_capacity(2);
    let items = ["a", "b", "c"];
    let pick = |key: &str| filter.apply(&Key::from(key), &items[..])[0];

    assert_eq!(pick("x"), "a");
    assert_eq!(pick("x"), "b");
    assert_eq!(pick("y"), "a");
    // Third key evicts "x", which starts over
    assert_eq!(pick("z"), "a");
    assert_eq!(pick("x"), "a");
    assert_eq!(pick("z"), "b");

    let Filter::RoundRobin(counters) = &filter else {
        panic!("expected round-robin");
    };
    assert_eq!(counters.lock().len(), 2);
}

#[test]
fn test_first_filter_picks_earliest() {
    let registry = ConsumerRegistry::new();
    let log: Log = Arc::default();
    registry.register(Selector::exact("k"), recorder(&log, "a"));
    registry.register(Selector::exact("k"), recorder(&log, "b"));

    run(&task("k", &registry, Filter::First)).unwrap();
    run(&task("k", &registry, Filter::First)).unwrap();
    assert_eq!(*log.lock(), vec!["a", "a"]);
}

#[test]
fn test_filter_from_name() {
    assert_eq!(Filter::from_name("round_robin").unwrap().name(), "round-robin");
    assert_eq!(Filter::from_name("PassThrough").unwrap().name(), "pass-through");
    assert_eq!(Filter::from_name("first").unwrap().name(), "first");
    assert!(Filter::from_name("random").is_none());
}

#[test]
fn test_paused_registration_is_skipped() {
    let registry = ConsumerRegistry::new();
    let log: Log = Arc::default();
    let paused = registry.register(Selector::exact("k"), recorder(&log, "a"));
    registry.register(Selector::exact("k"), recorder(&log, "b"));
    paused.pause();

    run(&task("k", &registry, Filter::PassThrough)).unwrap();
    assert_eq!(*log.lock(), vec!["b"]);

    paused.resume();
    run(&task("k", &registry, Filter::PassThrough)).unwrap();
    assert_eq!(*log.lock(), vec!["b", "a", "b"]);
}

#[test]
fn test_paused_registrations_do_not_take_a_round_robin_turn() {
    let registry = ConsumerRegistry::new();
    let log: Log = Arc::default();
    registry.register(Selector::exact("k"), recorder(&log, "a"));
    registry
        .register(Selector::exact("k"), recorder(&log, "b"))
        .pause();

    let filter = Filter::round_robin();
    run(&task("k", &registry, filter.clone())).unwrap();
    run(&task("k", &registry, filter)).unwrap();
    assert_eq!(*log.lock(), vec!["a", "a"]);
}

#[test]
fn test_cancel_after_use_fires_once() {
    let registry = ConsumerRegistry::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    registry
        .register(
            Selector::exact("k"),
            Consumer::event(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .cancel_after_use();

    run(&task("k", &registry, Filter::PassThrough)).unwrap();
    run(&task("k", &registry, Filter::PassThrough)).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
}

#[test]
fn test_payload_consumer_receives_typed_data() {
    let registry = ConsumerRegistry::new();
    let seen = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&seen);
    registry.register(
        Selector::exact("k"),
        Consumer::payload(move |s: &String| {
            sink.lock().push_str(s);
            Ok(())
        }),
    );

    run(&task("k", &registry, Filter::PassThrough)).unwrap();
    assert_eq!(*seen.lock(), "payload");
}

#[test]
fn test_payload_type_mismatch_is_a_consumer_failure() {
    let registry = ConsumerRegistry::new();
    let reg = registry.register(Selector::exact("k"), Consumer::payload(|_: &u32| Ok(())));

    let err = run(&task("k", &registry, Filter::PassThrough)).unwrap_err();
    match err {
        ReactorError::ConsumerInvocation {
            key,
            registration,
            message,
        } => {
            assert_eq!(key, "k");
            assert_eq!(registration, reg.id());
            assert!(message.contains("u32"), "message: {}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_with_vars_consumer_sees_captures() {
    let registry = ConsumerRegistry::new();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    registry.register(
        Selector::uri("/orders/{id}").unwrap(),
        Consumer::with_vars(move |_, vars| {
            *sink.lock() = var(vars, "id").map(str::to_string);
            Ok(())
        }),
    );

    run(&task("/orders/17", &registry, Filter::PassThrough)).unwrap();
    assert_eq!(seen.lock().as_deref(), Some("17"));
}

#[test]
fn test_panicking_consumer_does_not_stop_the_others() {
    let registry = ConsumerRegistry::new();
    let log: Log = Arc::default();
    registry.register(
        Selector::exact("k"),
        Consumer::event(|_| panic!("consumer exploded")),
    );
    registry.register(Selector::exact("k"), recorder(&log, "after"));

    let err = run(&task("k", &registry, Filter::PassThrough)).unwrap_err();
    assert_eq!(err.kind(), "consumer");
    assert!(err.to_string().contains("consumer exploded"));
    assert_eq!(*log.lock(), vec!["after"]);
}

#[test]
fn test_failure_escalates_to_error_subscriptions() {
    let registry = ConsumerRegistry::new();
    let escalated = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&escalated);
    registry.register(
        Selector::errors(),
        Consumer::payload(move |err: &ReactorError| {
            sink.lock().push(err.kind());
            Ok(())
        }),
    );
    registry.register(
        Selector::exact("k"),
        Consumer::event(|_| Err(anyhow::anyhow!("bad input"))),
    );

    run(&task("k", &registry, Filter::PassThrough)).unwrap();
    assert_eq!(*escalated.lock(), vec!["consumer"]);
}

#[test]
fn test_failing_error_subscription_is_not_escalated_again() {
    let registry = ConsumerRegistry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry.register(
        Selector::errors(),
        Consumer::event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("error handler also failed"))
        }),
    );
    registry.register(
        Selector::exact("k"),
        Consumer::event(|_| Err(anyhow::anyhow!("bad input"))),
    );

    // Handled by the error subscription even though it failed itself
    run(&task("k", &registry, Filter::PassThrough)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_task_error_consumer_takes_precedence() {
    let registry = ConsumerRegistry::new();
    let escalated = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&escalated);
    registry.register(
        Selector::errors(),
        Consumer::event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    registry.register(
        Selector::exact("k"),
        Consumer::event(|_| Err(anyhow::anyhow!("bad input"))),
    );

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let on_error: crate::dispatcher::ErrorConsumer = Arc::new(move |err: &ReactorError| {
        sink.lock().push(err.to_string());
    });
    let t = task("k", &registry, Filter::PassThrough).with_error_consumer(Some(on_error));

    run(&t).unwrap();
    assert_eq!(received.lock().len(), 1);
    assert!(received.lock()[0].contains("bad input"));
    assert_eq!(escalated.load(Ordering::SeqCst), 0);
}

#[test]
fn test_completion_runs_after_consumers_even_on_failure() {
    let registry = ConsumerRegistry::new();
    let log: Log = Arc::default();
    registry.register(Selector::exact("k"), recorder(&log, "consumer"));
    registry.register(
        Selector::exact("k"),
        Consumer::event(|_| Err(anyhow::anyhow!("nope"))),
    );

    let done_log = Arc::clone(&log);
    let on_complete: crate::dispatcher::CompletionConsumer = Arc::new(move |_: &Event| {
        done_log.lock().push("complete".to_string());
    });
    let t = task("k", &registry, Filter::PassThrough).with_completion(Some(on_complete));

    assert!(run(&t).is_err());
    assert_eq!(*log.lock(), vec!["consumer", "complete"]);
}

#[test]
fn test_no_match_still_completes() {
    let registry = ConsumerRegistry::new();
    let completed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completed);
    let on_complete: crate::dispatcher::CompletionConsumer = Arc::new(move |_: &Event| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let t = task("nobody", &registry, Filter::round_robin()).with_completion(Some(on_complete));

    run(&t).unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}
