//! Benchmarks for translation, backoff and the client hot path.

#![allow(clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use workbridge::adapters::{from_canonical, to_canonical};
use workbridge::prelude::*;
use workbridge::resilience::BackoffGenerator;
use workbridge::testing::InMemoryBackend;

fn translation_benchmark(c: &mut Criterion) {
    let native = json!({
        "id": 42,
        "rev": 7,
        "fields": {
            "System.Title": "Checkout times out",
            "System.WorkItemType": "Bug",
            "System.State": "Active",
            "System.Tags": "payments; p1",
            "Microsoft.VSTS.Common.Priority": 1,
            "Custom.Team": "checkout",
        }
    });

    c.bench_function("to_canonical_azure", |b| {
        b.iter(|| to_canonical(black_box(&native), Backend::AzureDevops))
    });

    let item = to_canonical(&native, Backend::AzureDevops).expect("valid item");
    c.bench_function("from_canonical_azure", |b| {
        b.iter(|| from_canonical(black_box(&item), Backend::AzureDevops))
    });
}

fn backoff_benchmark(c: &mut Criterion) {
    let backoff = BackoffGenerator::new(Duration::from_millis(500), Duration::from_secs(30)).with_seed(1);

    c.bench_function("backoff_next", |b| {
        b.iter(|| backoff.next(black_box(4), Some(Duration::from_secs(1))))
    });
}

fn client_benchmark(c: &mut Criterion) {
    let backend = Arc::new(InMemoryBackend::new(Backend::GitHub, "octo/app"));
    backend.insert_native(json!({
        "number": 1,
        "title": "Flaky test",
        "state": "open",
        "labels": [{"name": "ci"}],
        "updated_at": "2024-01-01T00:00:00Z",
    }));
    let client = WorkItemClient::builder(backend.target())
        .credentials(Credential::new("bench"))
        .transport(backend.clone())
        .build()
        .expect("valid client");

    c.bench_function("get_work_item_in_memory", |b| {
        b.iter(|| tokio_test::block_on(client.get_work_item(black_box("1"))))
    });
}

criterion_group!(benches, translation_benchmark, backoff_benchmark, client_benchmark);
criterion_main!(benches);
