use glam::Vec3;

use super::*;
use crate::data::Transform;
use crate::test_util::{self, Node, RecordingTracer, TraceEvent};
use crate::{SceneConfig, Spawn};

fn spawn_at(scene: &Scene, location: Vec3, radius: f32) -> ComponentIdentifier {
    scene
        .spawn(
            Spawn::new(Node::new("item"))
                .with_world_transform(Transform::from_location(location))
                .with_bounds(Aabb::from_radius(radius)),
        )
        .expect("root is live")
}

#[test]
fn octants_follow_axis_signs() {
    let pool = NodePool::new(1);
    let root = pool.get(NodeIndex::ROOT);
    root.init(Vec3::ZERO, 8., None);

    assert_eq!(root.child_index_at(Vec3::new(-1., -1., -1.)), 0);
    assert_eq!(root.child_index_at(Vec3::new(1., -1., -1.)), 4);
    assert_eq!(root.child_index_at(Vec3::new(-1., 1., 1.)), 3);
    assert_eq!(root.child_index_at(Vec3::new(1., 1., 1.)), 7);

    for slot in 0..8 {
        let bounds = root.child_static_bounds(slot);
        assert_eq!(bounds.half_extents(), Vec3::splat(4.));
        assert_eq!(root.child_index_at(bounds.center()), slot);
    }
}

#[test]
fn child_slots_are_reserved_exclusively() {
    let pool = NodePool::new(1);
    let root = pool.get(NodeIndex::ROOT);
    root.init(Vec3::ZERO, 8., None);

    assert_eq!(root.reserve_child(2), Reservation::Reserved);
    assert_eq!(root.reserve_child(2), Reservation::Pending);
    assert_eq!(root.child(2), None);

    let child = pool.allocate().expect("pool has one node");
    assert_eq!(pool.allocate(), None);
    pool.get(child).init(root.child_static_bounds(2).center(), 4., Some((NodeIndex::ROOT, 2)));
    root.add_child(2, child);

    assert_eq!(root.reserve_child(2), Reservation::Existing(child));
    assert_eq!(root.children().collect::<Vec<_>>(), vec![child]);
    assert_eq!(root.remove_child(2, child), RemovalResult::RemovedLastElement);
    assert!(root.is_empty());
}

#[test]
fn small_items_descend_to_balanced_nodes() {
    let scene = test_util::new_scene();
    let octree = scene.octree();
    let id = spawn_at(&scene, Vec3::new(10., 10., 10.), 1.);

    let index = octree.node_of(&scene, id).expect("spatial component is in the tree");
    let node = octree.node(index);
    assert_eq!(node.radius(), 16.);
    assert_eq!(octree.node_depth(index), 6);
    assert!(node.static_bounds().contains_point(Vec3::new(10., 10., 10.)));
    assert!(node.components().contains(&id));
    assert_eq!(octree.live_nodes(), 7);

    let mut ancestor = node.parent();
    while let Some(index) = ancestor {
        let content = octree.node(index).content_bounds();
        assert!(index == NodeIndex::ROOT || content.map_or(false, |bounds| bounds.contains_point(Vec3::splat(10.))));
        ancestor = octree.node(index).parent();
    }
}

#[test]
fn large_items_stay_high() {
    let scene = test_util::new_scene();
    let octree = scene.octree();

    let huge = spawn_at(&scene, Vec3::new(10., 10., 10.), 100.);
    assert_eq!(octree.node_of(&scene, huge), Some(NodeIndex::ROOT));

    let medium = spawn_at(&scene, Vec3::new(10., 10., 10.), 10.);
    let index = octree.node_of(&scene, medium).expect("spatial component is in the tree");
    assert_eq!(octree.node(index).radius(), 256.);
}

#[test]
fn non_spatial_components_are_not_indexed() {
    let scene = test_util::new_scene();
    let id = scene.spawn(Spawn::new(Node::new("abstract"))).expect("root is live");
    assert_eq!(scene.octree().node_of(&scene, id), None);
    assert_eq!(scene.octree().node_of(&scene, scene.root_id()), None);
    assert_eq!(scene.octree().live_nodes(), 1);
}

#[test]
fn small_moves_keep_the_node() {
    let scene = test_util::new_scene();
    let id = spawn_at(&scene, Vec3::new(10., 10., 10.), 1.);
    let before = scene.octree().node_of(&scene, id);

    scene.component(id).expect("live").set_world_location(Vec3::new(11., 10., 10.));
    assert_eq!(scene.octree().node_of(&scene, id), before);
}

#[test]
fn relocation_and_cleanup() {
    let tracer = RecordingTracer::default();
    let scene = test_util::new_scene_with(test_util::test_config(), tracer.clone());
    let octree = scene.octree();
    let id = spawn_at(&scene, Vec3::new(10., 10., 10.), 1.);
    let from = octree.node_of(&scene, id).expect("spatial component is in the tree");
    tracer.take();

    let target = Vec3::new(500., -300., 200.);
    scene.component(id).expect("live").set_world_location(target);
    let to = octree.node_of(&scene, id).expect("spatial component is in the tree");
    assert_ne!(from, to);
    assert!(octree.node(to).static_bounds().contains_point(target));
    assert_eq!(octree.node(to).radius(), 16.);

    let events = tracer.take();
    assert!(events.contains(&TraceEvent::ComponentRelocated { id, from, to }));
    assert!(events.contains(&TraceEvent::OctreeNodeFlagged(from)));
    assert_eq!(octree.cleanup_job().queued(), 1);
    assert_eq!(octree.live_nodes(), 13);

    scene.run_frame();
    let destroyed = tracer
        .take()
        .into_iter()
        .filter(|event| matches!(event, TraceEvent::OctreeNodeDestroyed(_)))
        .count();
    assert_eq!(destroyed, 6);
    assert_eq!(octree.live_nodes(), 7);
    assert_eq!(octree.cleanup_job().queued(), 0);
    assert!(octree.node(from).was_deleted());
}

#[test]
fn destroying_the_last_item_empties_the_tree() {
    let scene = test_util::new_scene();
    let a = spawn_at(&scene, Vec3::new(10., 10., 10.), 1.);
    let b = spawn_at(&scene, Vec3::new(-10., 10., 10.), 1.);
    assert_eq!(scene.octree().live_nodes(), 13);

    assert!(scene.destroy(a));
    scene.run_frame();
    assert_eq!(scene.octree().live_nodes(), 7);

    assert!(scene.destroy(b));
    scene.run_frame();
    assert_eq!(scene.octree().live_nodes(), 1);
    assert!(!scene.octree().root_node().has_children());
}

#[test]
fn pool_exhaustion_keeps_the_deepest_node() {
    let config = test_util::test_config().with_octree_pool_capacity(3);
    let scene = test_util::new_scene_with(config, crate::tracer::Noop);
    let id = spawn_at(&scene, Vec3::new(10., 10., 10.), 1.);

    let index = scene.octree().node_of(&scene, id).expect("spatial component is in the tree");
    assert_eq!(scene.octree().node_depth(index), 3);
    assert_eq!(scene.octree().node(index).radius(), 128.);
    assert_eq!(scene.octree().pool().available(), 0);
}

#[test]
fn tags_propagate_to_ancestors() {
    let scene = test_util::new_scene();
    let id = spawn_at(&scene, Vec3::new(10., 10., 10.), 1.);
    let other = spawn_at(&scene, Vec3::new(-10., 10., 10.), 1.);
    scene.component(id).expect("live").add_tag(5);

    let octree = scene.octree();
    let mut index = octree.node_of(&scene, id);
    while let Some(current) = index {
        assert!(octree.node(current).contains_any_tags(1 << 5));
        index = octree.node(current).parent();
    }
    let other = octree.node_of(&scene, other).expect("spatial component is in the tree");
    assert!(!octree.node(other).contains_any_tags(1 << 5));
}

#[test]
fn detached_components_leave_the_tree() {
    let scene = test_util::new_scene();
    let id = spawn_at(&scene, Vec3::new(10., 10., 10.), 1.);
    let component = scene.component(id).expect("live");

    assert!(component.detach_from_octree());
    assert_eq!(scene.octree().node_of(&scene, id), None);
    assert_eq!(scene.octree().cleanup_job().queued(), 1);

    assert!(component.attach_to_octree());
    assert!(scene.octree().node_of(&scene, id).is_some());
}

#[test]
#[should_panic = "Octree deletion queue overflow"]
fn deletion_queue_is_bounded() {
    let config: SceneConfig = test_util::test_config().with_deletion_queue_capacity(1);
    let scene = test_util::new_scene_with(config, crate::tracer::Noop);
    let a = spawn_at(&scene, Vec3::new(10., 10., 10.), 1.);
    let b = spawn_at(&scene, Vec3::new(-10., 10., 10.), 1.);
    scene.destroy(a);
    scene.destroy(b);
}
