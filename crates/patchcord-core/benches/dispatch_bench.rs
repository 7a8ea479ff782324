//! Criterion benchmarks for the dispatch producer and flush paths.
//!
//! Three axes:
//!
//! - **Produce** - cost of one `set_attribute` per dispatch type
//! - **Flush** - draining a burst of async changes across many listeners
//! - **Suspension** - `is_suspended` with nothing, one and many paused patterns
//!
//! Run with: `cargo bench -p patchcord-core`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use patchcord_core::{
    AttributeListener, DispatchThread, DispatchType, HashedPath, Processor, RootObject,
    SuspensionState,
};

const NUM_ATTRIBUTES: usize = 128;
const LISTENER_COUNTS: &[usize] = &[1, 8, 64, 256];

fn listeners_on(
    root: &RootObject,
    processor: &Processor,
    count: usize,
    dispatch: DispatchType,
) -> Vec<AttributeListener> {
    (0..count)
        .map(|i| {
            let mut listener = AttributeListener::new(root, format!("l{i}"), |_, changed| {
                black_box(changed.len());
            });
            processor
                .add_attribute_listener(&mut listener, &[i % NUM_ATTRIBUTES], dispatch)
                .unwrap();
            listener
        })
        .collect()
}

fn bench_produce(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/produce");

    for dispatch in [
        DispatchType::Sync,
        DispatchType::Async,
        DispatchType::AsyncHighPriority,
    ] {
        let root = RootObject::new();
        let processor = Processor::with_attributes(&root, "synth", NUM_ATTRIBUTES).unwrap();
        let _listeners = listeners_on(&root, &processor, 64, dispatch);

        group.bench_function(BenchmarkId::new("set_attribute", dispatch), |b| {
            let mut slot = 0;
            b.iter(|| {
                processor.set_attribute(black_box(slot), 0.5, dispatch);
                slot = (slot + 1) % NUM_ATTRIBUTES;
            });
            root.flush_queues(DispatchThread::Ui);
        });
    }

    // Nobody listening: the common case for most processors
    let root = RootObject::new();
    let processor = Processor::with_attributes(&root, "idle", NUM_ATTRIBUTES).unwrap();
    group.bench_function("set_attribute/no_listeners", |b| {
        b.iter(|| processor.set_attribute(black_box(3), 0.5, DispatchType::Async));
    });

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/flush");

    for &count in LISTENER_COUNTS {
        let root = RootObject::new();
        let processor = Processor::with_attributes(&root, "synth", NUM_ATTRIBUTES).unwrap();
        let _listeners = listeners_on(&root, &processor, count, DispatchType::Async);

        group.bench_with_input(BenchmarkId::new("burst", count), &count, |b, _| {
            b.iter(|| {
                for slot in 0..NUM_ATTRIBUTES {
                    processor.set_attribute(slot, 0.5, DispatchType::Async);
                }
                black_box(root.flush_queues(DispatchThread::Ui))
            });
        });
    }

    group.finish();
}

fn bench_suspension(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/suspension");
    let target = HashedPath::parse("modules.synth.attribute").unwrap();

    for paused in [0usize, 1, 16] {
        let root = RootObject::new();
        for i in 0..paused {
            let pattern = HashedPath::parse(&format!("modules.other{i}")).unwrap();
            root.set_state(&pattern, SuspensionState::Paused);
        }
        group.bench_with_input(
            BenchmarkId::new("is_suspended", paused),
            &paused,
            |b, _| b.iter(|| black_box(root.is_suspended(black_box(&target)))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_produce, bench_flush, bench_suspension);
criterion_main!(benches);
