//! Store adapter benchmarks over the in-memory backend.
//!
//! Run with: cargo bench --bench store

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Value};
use sqrlstore::{AdapterOptions, Listener, MemoryClient, SetOptions, StoreAdapter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn create_runtime() -> Runtime {
  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap()
}

fn create_store(rt: &Runtime) -> StoreAdapter {
  rt.block_on(async {
    StoreAdapter::new(Arc::new(MemoryClient::new()), AdapterOptions::default())
      .await
      .unwrap()
  })
}

fn bench_key_value(c: &mut Criterion) {
  let rt = create_runtime();
  let store = create_store(&rt);

  let mut group = c.benchmark_group("key_value");
  group.throughput(Throughput::Elements(1));

  let document = json!({
    "user_id": "123",
    "items": [
      {"product": "Widget", "quantity": 5, "price": 9.99},
      {"product": "Gadget", "quantity": 2, "price": 19.99}
    ],
    "status": "pending"
  });

  group.bench_function("set_document", |b| {
    b.iter(|| {
      rt.block_on(async {
        store
          .set("order:1", black_box(&document), SetOptions::default())
          .await
          .unwrap();
      });
    });
  });

  group.bench_function("get_document", |b| {
    b.iter(|| {
      rt.block_on(async {
        black_box(store.get("order:1").await.unwrap());
      });
    });
  });

  group.bench_function("increment", |b| {
    b.iter(|| {
      rt.block_on(async {
        black_box(store.increment("counter").await.unwrap());
      });
    });
  });

  group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
  let rt = create_runtime();
  let store = create_store(&rt);
  let received = Arc::new(AtomicU64::new(0));

  rt.block_on(async {
    for _ in 0..16 {
      let counter = received.clone();
      let listener: Listener = Arc::new(move |_: &Value| {
        counter.fetch_add(1, Ordering::Relaxed);
      });
      store.subscribe("events", listener).await.unwrap();
    }
  });

  let mut group = c.benchmark_group("pubsub");
  group.throughput(Throughput::Elements(16));
  group.bench_function("publish_16_listeners", |b| {
    b.iter(|| {
      rt.block_on(async {
        store
          .publish("events", black_box(&json!({"type": "tick"})))
          .await
          .unwrap();
      });
    });
  });
  group.finish();
}

criterion_group!(benches, bench_key_value, bench_fan_out);
criterion_main!(benches);
