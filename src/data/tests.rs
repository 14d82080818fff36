use glam::{Quat, Vec3};

use super::*;

#[test]
fn try_set_is_a_one_shot_gate() {
    let flags = AtomicFlags::new(ComponentFlags::IS_DISABLED);
    assert!(flags.try_set(ComponentFlags::IS_DESTROYING));
    assert!(!flags.try_set(ComponentFlags::IS_DESTROYING));
    assert!(!flags.try_set(ComponentFlags::IS_DESTROYING | ComponentFlags::IS_REFERENCED));
    assert_eq!(flags.load(), ComponentFlags::IS_DISABLED | ComponentFlags::IS_DESTROYING);
}

#[test]
fn fetch_remove_reports_previous_flags() {
    let flags = AtomicFlags::new(ComponentFlags::IS_DISABLED | ComponentFlags::IS_MESH_SCENE);
    let previous = flags.fetch_remove(ComponentFlags::IS_MESH_SCENE);
    assert!(previous.contains(ComponentFlags::IS_MESH_SCENE));
    assert_eq!(flags.load(), ComponentFlags::IS_DISABLED);
}

#[test]
fn composite_flags_cover_their_sources() {
    assert!(ComponentFlags::DISABLED_FROM_ANY_SOURCE.contains(ComponentFlags::WAS_DISABLED_BY_PARENT));
    assert!(ComponentFlags::DETACHED_FROM_ANY_SOURCE.contains(ComponentFlags::IS_DETACHED_FROM_TREE));
    assert!(!ComponentFlags::INHERITED.intersects(ComponentFlags::IS_DISABLED));
}

#[test]
fn tags_add_and_remove() {
    let tags = Tags::default().with(3).with(63);
    assert!(tags.contains(3));
    assert!(tags.contains(63));
    assert!(!tags.contains(4));
    assert!(tags.without(3).without(63).is_empty());
}

#[test]
fn local_transform_round_trips_through_parent() {
    let parent = Transform {
        location: Vec3::new(10.0, 0.0, -5.0),
        rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        scale:    Vec3::splat(2.0),
    };
    let world = Transform::from_location(Vec3::new(12.0, 1.0, -5.0));

    let local = world.relative_to(&parent);
    let restored = parent.combine(&local);
    assert!(restored.location.abs_diff_eq(world.location, 1e-4), "{restored:?}");
    assert!(restored.scale.abs_diff_eq(world.scale, 1e-4), "{restored:?}");
}

#[test]
fn aabb_radius_and_containment() {
    let aabb = Aabb::from_radius(1.0);
    assert!((aabb.radius_squared() - 3.0).abs() < 1e-6);
    assert!(aabb.contains_point(Vec3::new(1.0, -1.0, 0.5)));
    assert!(!aabb.contains_point(Vec3::new(1.5, 0.0, 0.0)));

    let moved = aabb.transformed(&Transform::from_location(Vec3::new(5.0, 0.0, 0.0)));
    assert_eq!(moved, Aabb::new(Vec3::new(4.0, -1.0, -1.0), Vec3::new(6.0, 1.0, 1.0)));
    assert!(moved.union(&aabb).contains(&aabb));
}

#[test]
fn persisted_data_components_serialize() {
    let world = WorldTransform(Transform::from_location(Vec3::X));
    let value = Component::serialize(&world).expect("persisted");
    let restored = <WorldTransform as Component>::deserialize(&value).expect("valid json");
    assert_eq!(restored.0.location, Vec3::X);

    assert!(Component::serialize(&Flags::default()).is_none());
    assert!(<Flags as Component>::deserialize(&value).is_err());
}
