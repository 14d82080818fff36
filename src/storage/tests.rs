use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::VecStorage;

#[test]
fn test_single_small_hole() {
    let mut storage = VecStorage::default();
    for i in 0..10 {
        storage.set(i, Some(i as i64));
    }

    assert_eq!(storage.set(5, None), Some(5));
    assert_eq!(storage.cardinality(), 9);
    assert_eq!(storage.get(5), None);
    assert!(!storage.contains(5));

    let collected: Vec<_> = storage.iter().map(|(index, &value)| (index, value)).collect();
    assert_eq!(
        collected,
        (0..10).filter(|&i| i != 5).map(|i| (i, i as i64)).collect::<Vec<_>>()
    );
}

#[test]
fn test_single_big_hole_with_reinsertion() {
    let mut storage = VecStorage::default();
    for i in 0..10 {
        storage.set(i, Some(i as i64));
    }
    for i in 3..7 {
        storage.set(i, None);
    }
    storage.set(4, Some(40));

    for (_, value) in storage.iter_mut() {
        *value += 1;
    }

    let collected: Vec<_> = storage.iter().map(|(index, &value)| (index, value)).collect();
    assert_eq!(collected, vec![(0, 1), (1, 2), (2, 3), (4, 41), (7, 8), (8, 9), (9, 10)]);
    assert_eq!(storage.cardinality(), 7);
}

#[test]
fn replacing_returns_old_value() {
    let mut storage = VecStorage::default();
    assert_eq!(storage.set(3, Some("a")), None);
    assert_eq!(storage.set(3, Some("b")), Some("a"));
    assert_eq!(storage.cardinality(), 1);
    assert_eq!(storage.get_mut(3).map(|value| *value), Some("b"));
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) { self.0.fetch_add(1, Ordering::SeqCst); }
}

#[test]
fn values_are_dropped_exactly_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let mut storage = VecStorage::default();
        for i in [0, 2, 5, 9] {
            storage.set(i, Some(DropCounter(Arc::clone(&counter))));
        }
        drop(storage.set(2, None));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}
