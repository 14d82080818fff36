use std::collections::{BTreeSet, HashSet};

use rand::Rng;

use super::*;

#[test]
fn fresh_indices_are_sequential() {
    let storage = IdentifierStorage::<Vec<u32>>::new(8);
    let ids: Vec<_> = (0..4).map(|_| storage.acquire()).collect();
    assert_eq!(ids.iter().map(|id| id.index()).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert_eq!(storage.live_count(), 4);
    assert_eq!(storage.maximum_used_count(), 4);
}

#[test]
fn reuse_bumps_generation() {
    let storage = IdentifierStorage::<Vec<u32>>::new(8);
    let first = storage.acquire();
    storage.release(first);
    let second = storage.acquire();

    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert!(second.generation() > first.generation());
    assert!(!storage.is_valid(first));
    assert!(storage.is_valid(second));
    assert_eq!(storage.active_identifier(first.index()), Some(second));
}

#[test]
fn vec_recycler_is_filo() {
    let storage = IdentifierStorage::<Vec<u32>>::new(8);
    let ids: Vec<_> = (0..3).map(|_| storage.acquire()).collect();
    storage.release(ids[0]);
    storage.release(ids[2]);

    assert_eq!(storage.acquire().index(), 2);
    assert_eq!(storage.acquire().index(), 0);
    assert_eq!(storage.acquire().index(), 3);
}

#[test]
fn btree_recycler_prefers_lowest_or_nearest() {
    let storage = IdentifierStorage::<BTreeSet<u32>>::new(16);
    let ids: Vec<_> = (0..8).map(|_| storage.acquire()).collect();
    for &index in &[1, 4, 6] {
        storage.release(ids[index]);
    }

    assert_eq!(storage.acquire_with_hint(BTreeHint { near: Some(5) }).index(), 4);
    assert_eq!(storage.acquire().index(), 1);
    assert_eq!(storage.acquire().index(), 6);
}

#[test]
#[should_panic = "Identifier storage exhausted all 2 indices"]
fn exhaustion_is_fatal() {
    let storage = IdentifierStorage::<Vec<u32>>::new(2);
    storage.acquire();
    storage.acquire();
    storage.acquire();
}

#[test]
#[should_panic = "Cannot release stale identifier"]
fn double_release_panics() {
    let storage = IdentifierStorage::<Vec<u32>>::new(2);
    let id = storage.acquire();
    storage.release(id);
    storage.release(id);
}

#[test]
fn iter_live_skips_released() {
    let storage = IdentifierStorage::<Vec<u32>>::new(8);
    let ids: Vec<_> = (0..4).map(|_| storage.acquire()).collect();
    storage.release(ids[1]);

    let live: Vec<_> = storage.iter_live().collect();
    assert_eq!(live, vec![ids[0], ids[2], ids[3]]);
}

#[test]
fn random_sequences_never_collide() {
    let mut rng = rand::thread_rng();
    let storage = IdentifierStorage::<Vec<u32>>::new(64);

    let mut live: Vec<ComponentIdentifier> = Vec::new();
    let mut retired: HashSet<ComponentIdentifier> = HashSet::new();

    for _ in 0..4096 {
        if live.len() < 64 && (live.is_empty() || rng.gen_bool(0.55)) {
            let id = storage.acquire();
            assert!(!live.contains(&id), "{id:?} is already live");
            assert!(!retired.contains(&id), "{id:?} was issued before");
            live.push(id);
        } else {
            let id = live.swap_remove(rng.gen_range(0..live.len()));
            storage.release(id);
            retired.insert(id);
        }

        assert_eq!(storage.live_count(), live.len());
    }

    for id in &live {
        assert!(storage.is_valid(*id));
    }
    for id in &retired {
        assert!(!storage.is_valid(*id));
    }
}

#[test]
fn concurrent_acquire_yields_unique_identifiers() {
    let storage = IdentifierStorage::<Vec<u32>>::new(1024);
    let ids = parking_lot::Mutex::new(Vec::new());

    rayon::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|_| {
                let local: Vec<_> = (0..64).map(|_| storage.acquire()).collect();
                ids.lock().extend(local);
            });
        }
    });

    let ids = ids.into_inner();
    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 8 * 64);
}
