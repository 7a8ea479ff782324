//! Property-based tests for patchcord-core dispatch.
//!
//! Checks call-count and coalescing guarantees for arbitrary call counts
//! and slot sets, and bitmap set/get agreement, using proptest.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use proptest::prelude::*;
use patchcord_core::{
    AttributeListener, DispatchThread, DispatchType, Processor, RootObject, SlotBitmap,
};

fn async_type() -> impl Strategy<Value = DispatchType> {
    prop_oneof![
        Just(DispatchType::Async),
        Just(DispatchType::AsyncHighPriority)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// For any n, n synchronous changes of a watched slot produce exactly
    /// n callbacks.
    #[test]
    fn sync_call_count_equality(n in 0usize..300, slot in 0usize..64) {
        let root = RootObject::new();
        let processor = Processor::with_attributes(&root, "p", 64).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut listener = AttributeListener::new(&root, "t", move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        processor
            .add_attribute_listener(&mut listener, &[slot], DispatchType::Sync)
            .unwrap();

        for _ in 0..n {
            processor.set_attribute(slot, 0.0, DispatchType::Sync);
        }
        prop_assert_eq!(count.load(Ordering::Relaxed), n);
    }

    /// For any n >= 1, n asynchronous changes before a flush produce
    /// exactly one callback.
    #[test]
    fn async_coalescing(n in 1usize..300, slot in 0usize..64, dispatch in async_type()) {
        let root = RootObject::new();
        let processor = Processor::with_attributes(&root, "p", 64).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut listener = AttributeListener::new(&root, "t", move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        processor
            .add_attribute_listener(&mut listener, &[slot], dispatch)
            .unwrap();

        for _ in 0..n {
            processor.set_attribute(slot, 0.0, dispatch);
        }
        root.flush_queues(DispatchThread::Ui);
        prop_assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    /// A flush reports exactly the intersection of the changed slots and
    /// the listener's interest, and fires only when it is non-empty.
    #[test]
    fn slot_isolation(
        interest in prop::collection::btree_set(0usize..200, 1..16),
        changed in prop::collection::vec(0usize..200, 0..64),
    ) {
        let root = RootObject::new();
        let processor = Processor::with_attributes(&root, "p", 200).unwrap();
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let d = Arc::clone(&delivered);
        let mut listener = AttributeListener::new(&root, "t", move |_, slots| {
            d.lock().push(slots.iter().collect::<BTreeSet<_>>());
        });
        let slots: Vec<usize> = interest.iter().copied().collect();
        processor
            .add_attribute_listener(&mut listener, &slots, DispatchType::Async)
            .unwrap();

        for &slot in &changed {
            processor.set_attribute(slot, 0.0, DispatchType::Async);
        }
        root.flush_queues(DispatchThread::Ui);

        let expected: BTreeSet<usize> = changed
            .iter()
            .copied()
            .filter(|slot| interest.contains(slot))
            .collect();
        let delivered = delivered.lock();
        if expected.is_empty() {
            prop_assert!(delivered.is_empty());
        } else {
            prop_assert_eq!(delivered.len(), 1);
            prop_assert_eq!(&delivered[0], &expected);
        }
    }

    /// Every bit set below the ceiling reads back, nothing else does.
    #[test]
    fn bitmap_set_get_agreement(
        ceiling_blocks in 1usize..8,
        bits in prop::collection::btree_set(0usize..256, 0..40),
    ) {
        let ceiling = ceiling_blocks * 32;
        let mut bitmap = SlotBitmap::with_ceiling(ceiling);
        for &bit in &bits {
            let result = bitmap.set_bit(bit, true);
            prop_assert_eq!(result.is_ok(), bit < ceiling);
        }

        let expected: Vec<usize> = bits.iter().copied().filter(|&b| b < ceiling).collect();
        prop_assert_eq!(bitmap.iter().collect::<Vec<_>>(), expected.clone());
        prop_assert_eq!(bitmap.count_ones(), expected.len());
        prop_assert_eq!(bitmap.highest_set_bit(), expected.last().copied().unwrap_or(0));
        for slot in 0..ceiling {
            prop_assert_eq!(bitmap.get(slot), bits.contains(&slot));
        }
    }
}
