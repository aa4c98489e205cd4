//! Locator compilation and event dispatch benchmarks.
//!
//! Run with: cargo bench --bench locator
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;

use cdp_pilot::{Event, EventRegistry, Locator, SessionId};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LOCATORS: &[(&str, &str)] = &[
    ("empty", ""),
    ("css", "css:div.item > a[href]"),
    ("xpath", "//div[@id='main']//a"),
    ("text", "text:Sign in"),
    ("text_quoted", "text:say \"hi\" it's"),
    ("tag", "t:button@type=submit"),
    ("all_of", "@@class=btn@@data-role=primary@@!disabled"),
    ("any_of", "@|id=a@|id=b@|id=c"),
];

const HANDLER_COUNTS: &[usize] = &[1, 16, 128];

// ============================================================================
// Benchmark: Locator Parsing
// ============================================================================

fn bench_locator_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("locator_parse");

    for &(name, raw) in LOCATORS {
        group.bench_with_input(BenchmarkId::from_parameter(name), raw, |b, raw| {
            b.iter(|| Locator::parse(black_box(raw)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Event Dispatch
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_dispatch");

    for &count in HANDLER_COUNTS {
        let registry = EventRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let scope = SessionId::new("S1");

        for i in 0..count {
            let hits = Arc::clone(&hits);
            let handler = Arc::new(move |_: &Event| {
                hits.fetch_add(1, Ordering::Relaxed);
            });
            if i % 2 == 0 {
                registry.on("Network.loadingFinished", handler);
            } else {
                registry.on_session(&scope, "Network.loadingFinished", handler);
            }
        }

        let event = Event::new(
            "Network.loadingFinished",
            json!({"requestId": "1000.1", "encodedDataLength": 512}),
            Some(scope.clone()),
        );

        group.bench_with_input(BenchmarkId::new("handlers", count), &event, |b, event| {
            b.iter(|| registry.dispatch(black_box(event)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_locator_parse, bench_dispatch);
criterion_main!(benches);
