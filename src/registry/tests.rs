use std::sync::Arc;

use super::*;
use crate::data::{Tags, TypeIndex};
use crate::test_util::{self, Health, Node};

fn new_registry() -> SceneRegistry { SceneRegistry::new(Arc::new(ComponentTypeRegistry::new()), 16) }

#[test]
fn reservation_precedes_creation() {
    let registry = new_registry();
    let id = registry.acquire_identifier();
    let ty = CachedType::Tags.type_identifier();

    assert!(registry.reserve_data_component(id, ty));
    assert!(!registry.reserve_data_component(id, ty));
    assert!(registry.has_reserved_data_component_of_type(id, ty));
    assert!(!registry.has_data_component_of_type(id, ty));
    assert!(!registry.has_data_components(id));

    registry.on_data_component_created(id, ty);
    assert!(registry.has_data_component_of_type(id, ty));
    assert_eq!(registry.data_component_count(id), 1);
    assert_eq!(registry.data_component_mask(id).iter().collect::<Vec<_>>(), vec![ty]);
}

#[test]
fn removal_takes_two_steps() {
    let registry = new_registry();
    let id = registry.acquire_identifier();
    let ty = CachedType::Tags.type_identifier();
    registry.reserve_data_component(id, ty);
    registry.on_data_component_created(id, ty);

    assert!(registry.on_data_component_removed(id, ty));
    assert!(!registry.on_data_component_removed(id, ty));
    assert!(!registry.has_data_component_of_type(id, ty));
    assert!(registry.has_reserved_data_component_of_type(id, ty));

    registry.on_data_component_destroyed(id, ty);
    assert!(!registry.has_reserved_data_component_of_type(id, ty));
    registry.on_component_removed(id);
    assert!(!registry.is_valid(id));
}

#[test]
fn batch_removal_clears_every_live_bit() {
    let registry = new_registry();
    let id = registry.acquire_identifier();
    let types = [CachedType::Tags.type_identifier(), CachedType::Parent.type_identifier()];
    for ty in types {
        registry.reserve_data_component(id, ty);
        registry.on_data_component_created(id, ty);
    }

    let removed = registry.start_batch_component_removal(id);
    assert_eq!(removed.count(), 2);
    assert!(!registry.has_data_components(id));
    for ty in removed.iter() {
        registry.on_data_component_destroyed(id, ty);
    }
    registry.on_component_removed(id);
}

#[test]
#[should_panic = "was created without a reservation"]
fn creation_requires_reservation() {
    let registry = new_registry();
    let id = registry.acquire_identifier();
    registry.on_data_component_created(id, CachedType::Tags.type_identifier());
}

#[test]
#[should_panic = "must be removed before it is destroyed"]
fn destruction_requires_removal() {
    let registry = new_registry();
    let id = registry.acquire_identifier();
    let ty = CachedType::Tags.type_identifier();
    registry.reserve_data_component(id, ty);
    registry.on_data_component_created(id, ty);
    registry.on_data_component_destroyed(id, ty);
}

#[test]
fn stale_identifiers_see_no_data_components() {
    let registry = new_registry();
    let tags = CachedType::Tags.type_identifier();
    let parent = CachedType::Parent.type_identifier();

    let stale = registry.acquire_identifier();
    registry.reserve_data_component(stale, tags);
    registry.on_data_component_created(stale, tags);
    registry.on_data_component_removed(stale, tags);
    registry.on_data_component_destroyed(stale, tags);
    registry.on_component_removed(stale);

    let id = registry.acquire_identifier();
    assert_eq!(id.index(), stale.index());
    assert!(registry.reserve_data_component(id, tags));
    registry.on_data_component_created(id, tags);

    assert!(!registry.has_data_component_of_type(stale, tags));
    assert!(!registry.has_reserved_data_component_of_type(stale, tags));
    assert!(!registry.has_data_components(stale));
    assert_eq!(registry.data_component_count(stale), 0);
    assert!(registry.data_component_mask(stale).iter().next().is_none());
    assert!(!registry.reserve_data_component(stale, parent));
    assert!(!registry.has_reserved_data_component_of_type(id, parent));
    assert!(registry.has_data_component_of_type(id, tags));
}

#[test]
fn masks_match_a_reference_model() {
    use std::collections::HashSet;

    use rand::Rng;
    use strum::IntoEnumIterator;

    let registry = new_registry();
    let mut rng = rand::thread_rng();
    let types: Vec<ComponentTypeIdentifier> = CachedType::iter().map(CachedType::type_identifier).take(5).collect();
    let mut ids: Vec<ComponentIdentifier> = (0..4).map(|_| registry.acquire_identifier()).collect();

    let mut reserved: HashSet<(ComponentIdentifier, ComponentTypeIdentifier)> = HashSet::new();
    let mut live: HashSet<(ComponentIdentifier, ComponentTypeIdentifier)> = HashSet::new();

    for step in 0..2000 {
        let slot = rng.gen_range(0..ids.len());
        let id = ids[slot];
        let ty = types[rng.gen_range(0..types.len())];

        match rng.gen_range(0..6) {
            0 => {
                assert_eq!(registry.reserve_data_component(id, ty), reserved.insert((id, ty)), "step {step}");
            }
            1 => {
                if reserved.contains(&(id, ty)) && !live.contains(&(id, ty)) {
                    registry.on_data_component_created(id, ty);
                    live.insert((id, ty));
                }
            }
            2 => {
                assert_eq!(registry.on_data_component_removed(id, ty), live.remove(&(id, ty)), "step {step}");
            }
            3 => {
                if !live.contains(&(id, ty)) {
                    registry.on_data_component_destroyed(id, ty);
                    reserved.remove(&(id, ty));
                }
            }
            4 => {
                let removed: HashSet<_> = registry.start_batch_component_removal(id).iter().collect();
                let expected: HashSet<_> =
                    types.iter().copied().filter(|&ty| live.remove(&(id, ty))).collect();
                assert_eq!(removed, expected, "step {step}");
            }
            _ => {
                if types.iter().all(|&ty| !reserved.contains(&(id, ty))) {
                    registry.on_component_removed(id);
                    ids[slot] = registry.acquire_identifier();
                    assert_ne!(ids[slot], id);
                    assert!(types.iter().all(|&ty| !registry.has_reserved_data_component_of_type(id, ty)));
                }
            }
        }

        for &id in &ids {
            for &ty in &types {
                assert_eq!(registry.has_data_component_of_type(id, ty), live.contains(&(id, ty)), "step {step}");
                assert_eq!(
                    registry.has_reserved_data_component_of_type(id, ty),
                    reserved.contains(&(id, ty)),
                    "step {step}"
                );
            }
            let count = types.iter().filter(|&&ty| live.contains(&(id, ty))).count();
            assert_eq!(registry.data_component_count(id), count, "step {step}");
        }
    }
}

#[test]
fn cached_types_resolve_without_creation() {
    let registry = new_registry();
    let ty = registry.types().find::<Tags>().expect("cached types are preregistered");
    assert_eq!(CachedType::from_type_identifier(ty), Some(CachedType::Tags));
    assert_eq!(registry.cached::<Tags>().type_identifier(), ty);
    assert_eq!(
        registry.find_component_type_data::<TypeIndex>().map(|data| data.type_identifier()),
        Some(CachedType::TypeIndex.type_identifier()),
    );
}

#[test]
fn cold_types_are_created_lazily() {
    let registry = new_registry();
    assert!(registry.find_component_type_data::<Node>().is_none());

    let data = registry.get_or_create_component_type_data::<Node>();
    assert_eq!(CachedType::from_type_identifier(data.type_identifier()), None);
    assert!(std::ptr::eq(
        data,
        registry.find_component_type_data::<Node>().expect("created above"),
    ));
    assert!(registry.iter_component_type_data().any(|data| data.type_name() == "test_util::Node"));
}

#[test]
fn concurrent_creation_publishes_one_storage() {
    let registry = new_registry();
    let addresses: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    registry.get_or_create_component_type_data::<Health>() as *const _ as usize
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().expect("thread panicked")).collect()
    });
    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn scene_data_components_are_tracked_in_masks() {
    let scene = test_util::new_scene();
    let id = scene.spawn(crate::Spawn::new(Node::new("a"))).expect("root is live");
    let health = scene.registry().types().register::<Health>();

    assert!(scene.create_data_component(id, Health(3)));
    assert!(scene.registry().has_data_component_of_type(id, health));
    assert!(!scene.create_data_component(id, Health(4)));
    assert_eq!(scene.data_component::<Health>(id).map(|health| *health), Some(Health(3)));

    assert_eq!(scene.remove_data_component::<Health>(id), Some(Health(3)));
    assert!(!scene.registry().has_reserved_data_component_of_type(id, health));
}
