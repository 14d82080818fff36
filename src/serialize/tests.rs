use std::sync::Arc;

use glam::Vec3;
use serde_json::json;

use super::*;
use crate::component::ComponentTypeRegistry;
use crate::data::Transform;
use crate::test_util::{self, Counter, Health, Node};
use crate::{tracer, Spawn};

fn scene_pair() -> (Scene, Scene) {
    test_util::init();
    let types = Arc::new(ComponentTypeRegistry::new());
    let new_scene = || {
        Scene::new(test_util::test_config(), Arc::clone(&types), Box::new(tracer::Noop)).expect("scene construction")
    };
    (new_scene(), new_scene())
}

#[test]
fn subtree_round_trip() {
    let (source, target) = scene_pair();
    let guid = Uuid::from_u128(0x67e5_5044_10b1_426f_9247_bb68_0e5f_e0c8);

    let parent = source
        .spawn(Spawn::new(Node::new("parent")).with_guid(guid).with_flags(ComponentFlags::IS_DISABLED))
        .expect("root is live");
    source.create_data_component(parent, Health(5));
    source.component(parent).expect("live").add_tag(3);
    let child = source
        .spawn(
            Spawn::new(Node::new("child"))
                .with_parent(parent)
                .with_world_transform(Transform::from_location(Vec3::new(5., 0., 0.))),
        )
        .expect("parent is live");
    let skipped = source.spawn(Spawn::new(Node::new("skipped")).with_parent(parent)).expect("parent is live");
    source.component(skipped).expect("live").disable_save_to_disk();

    let value = source.serialize_component(parent).expect("parent is live");
    assert_eq!(value["type"], json!("test_util::Node"));
    assert_eq!(value["guid"], json!(guid.to_string()));
    assert_eq!(value["disabled"], json!(true));
    assert!(value.get("referenced").is_none());
    assert_eq!(value["value"], json!({ "label": "parent" }));
    let data_components = value["data_components"].as_array().expect("parent has persisted data");
    assert!(data_components.contains(&json!({ "type": "Tags", "value": 8 })));
    assert!(data_components.contains(&json!({ "type": "test_util::Health", "value": 5 })));
    assert_eq!(value["children"].as_array().map(Vec::len), Some(1));

    let restored = target.deserialize_component(target.root_id(), &value).expect("well-formed");
    let component = target.component(restored).expect("live");
    assert_eq!(component.guid(), Some(guid));
    assert!(component.is_disabled());
    assert!(component.has_tag(3));
    assert_eq!(target.data_component::<Health>(restored).map(|health| *health), Some(Health(5)));
    assert_eq!(
        target.component_implementation::<Node>(restored).map(|node| node.label.clone()).as_deref(),
        Some("parent")
    );

    let children = component.children();
    assert_eq!(children.len(), 1);
    let restored_child = target.component(children[0]).expect("live");
    assert_eq!(restored_child.guid(), source.component(child).expect("live").guid());
    let world = restored_child.world_transform().expect("spatial");
    assert!(world.location.abs_diff_eq(Vec3::new(5., 0., 0.), 1e-4));
    assert!(target.octree().node_of(&target, children[0]).is_some());
}

#[test]
fn unpersisted_types_have_no_value() {
    let (source, target) = scene_pair();
    let id = source.spawn(Spawn::new(Counter::default())).expect("root is live");

    let value = source.serialize_component(id).expect("live");
    assert!(value.get("value").is_none());
    assert!(value.get("children").is_none());

    let err = target.deserialize_component(target.root_id(), &value).expect_err("Counter cannot be restored");
    assert!(matches!(err, Error::NotDeserializable("test_util::Counter")));
}

#[test]
fn unknown_types_are_rejected() {
    let scene = test_util::new_scene();
    let err = scene
        .deserialize_component(scene.root_id(), &json!({ "type": "Missing" }))
        .expect_err("type is not registered");
    assert!(matches!(err, Error::UnknownType(name) if name == "Missing"));
}

#[test]
fn malformed_input_is_rejected() {
    let scene = test_util::new_scene();
    scene.registry().types().register::<Node>();

    for value in [
        json!([]),
        json!({ "value": {} }),
        json!({ "type": "test_util::Node", "value": { "label": "x" }, "guid": "not a guid" }),
        json!({ "type": "test_util::Node", "value": { "label": "x" }, "children": {} }),
    ] {
        let err = scene.deserialize_component(scene.root_id(), &value).expect_err("malformed");
        assert!(matches!(err, Error::Malformed(_)), "{value} gave {err}");
    }
}

#[test]
fn scene_round_trip() {
    let (source, target) = scene_pair();
    for label in ["a", "b", "c"] {
        source.spawn(Spawn::new(Node::new(label))).expect("root is live");
    }

    let value = source.serialize_component(source.root_id()).expect("root is live");
    assert_eq!(value["type"], json!("SceneRoot"));

    let restored = target.deserialize_scene(&value).expect("well-formed");
    let labels: Vec<String> = restored
        .iter()
        .map(|&id| target.component_implementation::<Node>(id).expect("restored as Node").label.clone())
        .collect();
    assert_eq!(labels, ["a", "b", "c"]);
    assert_eq!(target.root().children(), restored);
}

#[test]
fn preferred_indices_order_restored_children() {
    let (source, target) = scene_pair();
    let first = source
        .spawn(Spawn::new(Node::new("first")).with_preferred_index(0))
        .expect("root is live");
    let value = source.serialize_component(first).expect("live");
    assert!(value["data_components"]
        .as_array()
        .expect("preferred index is persisted")
        .contains(&json!({ "type": "PreferredIndex", "value": 0 })));

    let existing = target.spawn(Spawn::new(Node::new("existing"))).expect("root is live");
    let restored = target.deserialize_component(target.root_id(), &value).expect("well-formed");
    assert_eq!(target.root().children(), vec![restored, existing]);
    assert_eq!(
        target.registry().cached::<PreferredIndex>().with(restored, |index| index.0),
        Some(0)
    );
}

#[test]
fn invalid_guids_are_rejected_before_spawning() {
    let scene = test_util::new_scene();
    scene.registry().types().register::<Node>();

    let value = json!({ "type": "test_util::Node", "value": { "label": "x" }, "guid": 5 });
    let err = scene.deserialize_component(scene.root_id(), &value).expect_err("malformed");
    assert!(matches!(err, Error::Malformed(_)));
    assert_eq!(scene.root().child_count(), 0);
}
