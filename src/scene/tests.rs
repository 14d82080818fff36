use super::*;
use crate::frame_graph::StageId;
use crate::octree::CLEANUP_STAGE;
use crate::test_util::{self, Health, Node};

#[test]
fn new_scene_has_a_root() {
    let scene = test_util::new_scene();
    let root = scene.root();

    assert!(root.is_root_scene());
    assert!(root.is_enabled());
    assert!(root.parent().is_none());
    assert_eq!(root.world_transform(), Some(Transform::IDENTITY));
    assert_eq!(scene.octree().node_of(&scene, root.id()), None);
    assert!(scene.component_implementation::<SceneRoot>(root.id()).is_some());
    assert_eq!(scene.registry().identifiers().live_count(), 1);
}

#[test]
fn missing_components_report_destroying() {
    let scene = test_util::new_scene();
    let id = scene.spawn(Spawn::new(Node::new("gone"))).expect("root is live");
    scene.destroy(id);

    assert!(scene.component(id).is_none());
    assert_eq!(scene.flags(id), ComponentFlags::IS_DISABLED | ComponentFlags::IS_DESTROYING);
}

#[test]
fn component_implementation_checks_the_type() {
    let scene = test_util::new_scene();
    let id = scene.spawn(Spawn::new(Node::new("a"))).expect("root is live");

    assert_eq!(scene.component_implementation::<Node>(id).map(|node| node.label.clone()).as_deref(), Some("a"));
    assert!(scene.component_implementation::<SceneRoot>(id).is_none());
    assert!(scene.component_implementation::<Health>(id).is_none());
}

#[test]
fn data_component_helpers() {
    let scene = test_util::new_scene();
    let id = scene.spawn(Spawn::new(Node::new("a"))).expect("root is live");

    assert!(!scene.has_data_component::<Health>(id));
    assert!(scene.create_data_component(id, Health(10)));
    assert!(scene.has_data_component::<Health>(id));
    assert_eq!(scene.data_component::<Health>(id).map(|health| *health), Some(Health(10)));

    assert_eq!(scene.remove_data_component::<Health>(id), Some(Health(10)));
    assert_eq!(scene.remove_data_component::<Health>(id), None);
    assert!(!scene.has_data_component::<Health>(id));
    assert!(scene.data_component::<Health>(id).is_none());
}

#[test]
fn destroy_releases_data_components() {
    let scene = test_util::new_scene();
    let id = scene.spawn(Spawn::new(Node::new("a"))).expect("root is live");
    scene.create_data_component(id, Health(1));
    let health = scene.registry().find_component_type_data::<Health>().expect("created above");

    assert!(scene.destroy(id));
    assert!(health.is_empty());
    assert!(!scene.registry().has_data_components(id));
}

#[test]
fn disabling_the_root_suspends_octree_cleanup() {
    let scene = test_util::new_scene();
    let has_cleanup_stage = || scene.registry().inspect_frame_graph(|graph| graph.contains_stage(CLEANUP_STAGE));
    scene.run_frame();
    assert!(has_cleanup_stage());

    assert!(scene.root().disable());
    scene.run_frame();
    assert!(!has_cleanup_stage());

    assert!(scene.root().enable());
    scene.run_frame();
    assert!(has_cleanup_stage());
    assert!(scene.registry().inspect_frame_graph(|graph| {
        graph.is_directly_followed_by(CLEANUP_STAGE, StageId::Anchor(frame_graph::Anchor::EndFrame))
    }));
}

#[test]
fn frames_run_on_a_thread_pool() {
    let config = test_util::test_config().with_concurrency(2);
    let scene = test_util::new_scene_with(config, crate::tracer::Noop);
    let counter = scene.spawn(Spawn::new(test_util::Counter::default())).expect("root is live");
    let data = scene.registry().get_or_create_component_type_data::<test_util::Counter>();
    data.enable_update(&scene, counter);

    for _ in 0..3 {
        scene.run_frame();
    }
    assert_eq!(data.with(counter, |counter| counter.0), Some(3));
}
