//! Performance benchmarks for the capture pipeline.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use layerscope::{
    CapturedEvent, EventId, EventSource, EventStore, FilterEngine, FilterMode, GroupingConfig,
    GroupingEngine, GroupingMode, TabId, Timestamp,
};

fn make_event(name: &str, ts: i64, index: u64) -> CapturedEvent {
    CapturedEvent {
        id: EventId(format!("{}-{}", ts, index)),
        timestamp: Timestamp(ts),
        name: name.to_string(),
        payload: serde_json::json!({"event": name, "page": "/checkout", "value": index}),
        source: EventSource::live("dataLayer"),
        raw_push: serde_json::json!({"event": name}),
        sequence_index: index,
        group_id: None,
    }
}

fn event_stream(count: usize) -> Vec<CapturedEvent> {
    let names = ["gtm.js", "page_view", "click", "purchase"];
    (0..count)
        .map(|i| make_event(names[i % names.len()], (i as i64) * 250, i as u64))
        .collect()
}

/// Benchmark insertion into a store already at capacity.
fn bench_store_insert_at_capacity(c: &mut Criterion) {
    let store = EventStore::new(1000);
    let tab = TabId(1);
    for event in event_stream(1000) {
        store.add_event(tab, event);
    }

    let mut index = 0u64;
    c.bench_function("store_insert_at_capacity", |b| {
        b.iter(|| {
            index += 1;
            store.add_event(tab, black_box(make_event("page_view", index as i64, index)));
        });
    });
}

/// Benchmark filter evaluation over a full buffer.
fn bench_filter_throughput(c: &mut Criterion) {
    let events = event_stream(1000);

    let engine = FilterEngine::new();
    engine.set_filter_mode(FilterMode::Exclude);
    engine.add_filter("gtm.js");
    engine.set_search_text("checkout");

    c.bench_function("filter_1000_events", |b| {
        b.iter(|| {
            let visible = events
                .iter()
                .filter(|e| engine.event_passes_filter(e))
                .count();
            black_box(visible);
        });
    });
}

/// Benchmark full group rebuilds with varying buffer sizes.
fn bench_rebuild_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_groups");

    for size in [100, 500, 1000] {
        group.bench_with_input(BenchmarkId::new("events", size), &size, |b, &size| {
            let events = event_stream(size);
            let mut engine = GroupingEngine::new(GroupingConfig {
                enabled: true,
                mode: GroupingMode::TimeWindow,
                time_window_ms: 500,
                trigger_event_names: Vec::new(),
            });

            b.iter(|| {
                black_box(engine.rebuild_groups(&events));
            });
        });
    }

    group.finish();
}

/// Benchmark the incremental grouping fast path.
fn bench_incremental_grouping(c: &mut Criterion) {
    let mut engine = GroupingEngine::new(GroupingConfig {
        enabled: true,
        mode: GroupingMode::TriggerEvent,
        time_window_ms: 0,
        trigger_event_names: vec!["gtm".to_string()],
    });

    let mut index = 0u64;
    c.bench_function("incremental_group_event", |b| {
        b.iter(|| {
            index += 1;
            let mut event = make_event("page_view", index as i64, index);
            black_box(engine.add_event(&mut event));
        });
    });
}

criterion_group!(
    benches,
    bench_store_insert_at_capacity,
    bench_filter_throughput,
    bench_rebuild_groups,
    bench_incremental_grouping,
);

criterion_main!(benches);
