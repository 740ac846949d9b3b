use brrtreactor::dispatcher::WaitStrategy;
use brrtreactor::registry::Registry;
use brrtreactor::selector::{Key, Selector};
use brrtreactor::{
    BlockingQueueDispatcher, Consumer, Dispatcher, Event, Reactor, RingBufferDispatcher,
    SynchronousDispatcher,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn example_registry() -> Registry<&'static str> {
    let registry = Registry::new();
    let templates = [
        ("/zoo/animals", "get_animals"),
        ("/zoo/animals/{id}", "get_animal"),
        ("/zoo/animals/{id}/toys/{toy_id}", "animal_toy"),
        (
            "/zoo/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}",
            "habitat_section",
        ),
        (
            "/inventory/{warehouse_id}/feeds/{feed_id}/items/{item_id}/batches/{batch_id}",
            "post_item_batch",
        ),
        ("/complex/{a}/{b}/{c}/{d}/{e}/{f}/{g}/{h}/{i}", "complex_many_params"),
    ];
    for (template, name) in templates {
        registry.register(Selector::uri(template).expect("valid template"), name);
    }
    registry.register(Selector::exact("zoo.health"), "health_check");
    registry.register(
        Selector::regex(r"zoo\.(?P<event>[a-z]+)").expect("valid regex"),
        "zoo_events",
    );
    registry
}

fn bench_select_throughput(c: &mut Criterion) {
    let registry = example_registry();
    let keys: Vec<Key> = [
        "/zoo/animals/123",
        "/zoo/animals/123/toys/456",
        "/zoo/cats/animals/123/habitats/88/sections/5",
        "/inventory/1/feeds/2/items/3/batches/4",
        "/complex/1/2/3/4/5/6/7/8/9",
        "zoo.health",
        "zoo.feeding",
    ]
    .into_iter()
    .map(Key::from)
    .collect();

    c.bench_function("registry_select", |b| {
        let mut scratch = Vec::new();
        b.iter(|| {
            for key in &keys {
                registry.select_into(key, &mut scratch);
                black_box(&scratch);
            }
        })
    });
}

fn counting_reactor(dispatcher: Arc<dyn Dispatcher>) -> (Reactor, Arc<AtomicU64>) {
    let reactor = Reactor::with_dispatcher(dispatcher);
    let count = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&count);
    reactor.on(
        Selector::exact("bench"),
        Consumer::event(move |_| {
            sink.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }),
    );
    (reactor, count)
}

fn wait_until(count: &AtomicU64, target: u64) {
    while count.load(Ordering::Relaxed) < target {
        std::hint::spin_loop();
    }
}

fn bench_dispatch_throughput(c: &mut Criterion) {
    const BATCH: u64 = 1_000;
    let mut group = c.benchmark_group("notify_batch");

    let (sync, _) = counting_reactor(Arc::new(SynchronousDispatcher::new("sync")));
    group.bench_function("synchronous", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                sync.notify("bench", Event::wrap(i)).expect("notify");
            }
        })
    });

    let queue = BlockingQueueDispatcher::new("eventLoop", 1024).expect("queue dispatcher");
    let (queued, queued_count) = counting_reactor(Arc::new(queue));
    group.bench_function("blocking_queue", |b| {
        b.iter(|| {
            let target = queued_count.load(Ordering::Relaxed) + BATCH;
            for i in 0..BATCH {
                queued.notify("bench", Event::wrap(i)).expect("notify");
            }
            wait_until(&queued_count, target);
        })
    });

    let ring = RingBufferDispatcher::new("ringBuffer", 1024, WaitStrategy::Yielding)
        .expect("ring dispatcher");
    let (ringed, ring_count) = counting_reactor(Arc::new(ring));
    group.bench_function("ring_buffer", |b| {
        b.iter(|| {
            let target = ring_count.load(Ordering::Relaxed) + BATCH;
            for i in 0..BATCH {
                ringed.notify("bench", Event::wrap(i)).expect("notify");
            }
            wait_until(&ring_count, target);
        })
    });

    group.finish();
    queued.dispatcher().shutdown();
    ringed.dispatcher().shutdown();
}

criterion_group!(benches, bench_select_throughput, bench_dispatch_throughput);
criterion_main!(benches);
