use std::sync::atomic::AtomicUsize;

use super::*;

#[test]
fn atomic_box_keeps_first_value() {
    let slot = AtomicBox::new();
    assert!(slot.get().is_none());

    let first = *slot.get_or_init(|| 1);
    let second = *slot.get_or_init(|| 2);
    assert_eq!(first, 1);
    assert_eq!(second, 1);
}

#[test]
fn atomic_box_concurrent_init_runs_winner_once() {
    let slot = AtomicBox::<usize>::new();
    let calls = AtomicUsize::new(0);

    rayon::scope(|scope| {
        for i in 0..8 {
            let slot = &slot;
            let calls = &calls;
            scope.spawn(move |_| {
                slot.get_or_init(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    i
                });
            });
        }
    });

    let value = *slot.get().expect("initialized by a worker");
    assert!(value < 8);
    assert!(calls.load(Ordering::SeqCst) >= 1);
    for _ in 0..4 {
        assert_eq!(*slot.get_or_init(|| usize::MAX), value);
    }
}
