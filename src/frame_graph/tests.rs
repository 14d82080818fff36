use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::octree::CLEANUP_STAGE;
use crate::test_util::{self, Counter, EventTracer, RecordingTracer, TraceEvent};
use crate::{Scene, Spawn};

fn anchor(anchor: Anchor) -> StageId { StageId::Anchor(anchor) }

fn counting_stage(counter: &Arc<AtomicUsize>) -> StageRunner {
    let counter = Arc::clone(counter);
    Arc::new(move |_: &Scene| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_anchor_order() {
    let order = Topology::init(&StageGraph::new()).sequential_order();
    assert_eq!(order.first(), Some(&anchor(Anchor::StartFrame)));
    assert_eq!(order.last(), Some(&anchor(Anchor::EndFrame)));

    let position = |stage| order.iter().position(|&other| other == stage).expect("anchor is scheduled");
    assert!(position(anchor(Anchor::DynamicUpdatesStart)) < position(anchor(Anchor::DynamicLateUpdatesFinished)));
    assert!(position(anchor(Anchor::PhysicsSimulationStart)) < position(anchor(Anchor::PhysicsSimulationFinished)));
    assert!(position(anchor(Anchor::PhysicsStepStart)) < position(anchor(Anchor::PhysicsStepFinished)));
}

#[test]
fn test_edges_are_idempotent() {
    let mut graph = StageGraph::new();
    let custom = StageId::Custom("custom");
    assert!(graph.add_stage(custom, None));
    assert!(!graph.add_stage(custom, None));

    assert!(graph.add_subsequent_stage(anchor(Anchor::StartFrame), custom));
    assert!(!graph.add_subsequent_stage(anchor(Anchor::StartFrame), custom));
    assert!(graph.is_directly_followed_by(anchor(Anchor::StartFrame), custom));

    assert!(graph.remove_subsequent_stage(anchor(Anchor::StartFrame), custom));
    assert!(!graph.is_directly_followed_by(anchor(Anchor::StartFrame), custom));

    graph.add_subsequent_stage(custom, anchor(Anchor::EndFrame));
    assert!(graph.remove_stage(custom));
    assert!(!graph.contains_stage(custom));
    assert!(!graph.remove_stage(custom));
}

#[test]
#[should_panic = "Anchor stage EndFrame cannot be removed"]
fn test_remove_anchor() { StageGraph::new().remove_stage(anchor(Anchor::EndFrame)); }

#[test]
#[should_panic = "Frame graph stages have a cyclic dependency"]
fn test_cycle_detection() {
    let frame_graph = FrameGraph::new();
    frame_graph.modify(Box::new(|graph: &mut StageGraph| {
        let stage = StageId::Custom("loop");
        graph.add_stage(stage, None);
        graph.add_subsequent_stage(anchor(Anchor::EndFrame), stage);
        graph.add_subsequent_stage(stage, anchor(Anchor::StartFrame));
    }));
    frame_graph.flush();
    frame_graph.topology();
}

#[test]
fn test_modifications_are_deferred_until_next_frame() {
    let tracer = RecordingTracer::default();
    let scene = test_util::new_scene_with(test_util::test_config(), tracer.clone());
    tracer.take();
    let counter = Arc::new(AtomicUsize::new(0));
    let stage = StageId::Custom("deferred");

    let runner = counting_stage(&counter);
    scene.registry().modify_frame_graph(move |graph| {
        graph.add_stage(stage, Some(runner));
        graph.add_subsequent_stage(anchor(Anchor::DynamicUpdatesStart), stage);
        graph.add_subsequent_stage(stage, anchor(Anchor::DynamicLateUpdatesFinished));
    });

    // the octree cleanup stage is queued by the scene itself
    assert_eq!(scene.registry().pending_frame_graph_modifications(), 2);
    assert!(!scene.registry().inspect_frame_graph(|graph| graph.contains_stage(stage)));

    scene.run_frame();
    assert_eq!(scene.registry().pending_frame_graph_modifications(), 0);
    assert!(scene.registry().inspect_frame_graph(|graph| graph.contains_stage(stage)));
    assert!(scene.registry().inspect_frame_graph(|graph| graph.contains_stage(CLEANUP_STAGE)));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let events = tracer.take();
    assert_eq!(events.first(), Some(&TraceEvent::StartFrame));
    assert_eq!(events.get(1), Some(&TraceEvent::FlushFrameGraph(2)));
    assert_eq!(events.last(), Some(&TraceEvent::EndFrame));

    let position = |event: TraceEvent| events.iter().position(|other| *other == event).expect("event recorded");
    assert!(
        position(TraceEvent::EndStage(anchor(Anchor::DynamicUpdatesStart)))
            < position(TraceEvent::StartStage(stage))
    );
    assert!(
        position(TraceEvent::EndStage(stage))
            < position(TraceEvent::StartStage(anchor(Anchor::DynamicLateUpdatesFinished)))
    );

    scene.run_frame();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(!tracer.take().iter().any(|event| matches!(event, TraceEvent::FlushFrameGraph(_))));
}

#[test]
fn test_component_update_stage_lifecycle() {
    let scene = test_util::new_scene();
    let id = scene.spawn(Spawn::new(Counter::default())).expect("root is live");
    let data = scene.registry().get_or_create_component_type_data::<Counter>();
    let stage = StageId::ComponentUpdate(data.type_identifier());

    assert!(data.enable_update(&scene, id));
    assert!(!data.enable_update(&scene, id));
    scene.run_frame();
    scene.run_frame();
    assert_eq!(data.with(id, |counter| counter.0), Some(2));
    assert!(scene.registry().inspect_frame_graph(|graph| {
        graph.is_directly_followed_by(anchor(Anchor::DynamicUpdatesStart), stage)
            && graph.is_directly_followed_by(stage, anchor(Anchor::DynamicRenderUpdatesFinished))
            && graph.is_directly_followed_by(stage, anchor(Anchor::DynamicLateUpdatesFinished))
    }));

    let order = scene.registry().frame_graph().topology().sequential_order();
    let position = |stage| order.iter().position(|&other| other == stage).expect("stage is scheduled");
    assert!(position(stage) < position(anchor(Anchor::DynamicRenderUpdatesFinished)));

    assert!(data.disable_update(&scene, id));
    scene.run_frame();
    assert_eq!(data.with(id, |counter| counter.0), Some(2));
    assert!(!scene.registry().inspect_frame_graph(|graph| graph.contains_stage(stage)));
}

#[test]
fn test_concurrent_execution_respects_edges() {
    let config = test_util::test_config().with_concurrency(3);
    let scene = test_util::new_scene_with(config, crate::tracer::Noop);

    let tracer = Arc::new(EventTracer::new([("a", "b"), ("b", "c"), ("a", "d")]));
    for (name, before) in [("a", None), ("b", Some("a")), ("c", Some("b")), ("d", Some("a"))] {
        let tracer = Arc::clone(&tracer);
        let runner: StageRunner = Arc::new(move |_: &Scene| tracer.trace(name));
        scene.registry().modify_frame_graph(move |graph| {
            let stage = StageId::Custom(name);
            graph.add_stage(stage, Some(runner));
            match before {
                Some(before) => graph.add_subsequent_stage(StageId::Custom(before), stage),
                None => graph.add_subsequent_stage(anchor(Anchor::StartFrame), stage),
            };
            graph.add_subsequent_stage(stage, anchor(Anchor::EndFrame));
        });
    }

    scene.run_frame();
    drop(scene);

    let tracer = Arc::try_unwrap(tracer).ok().expect("the scene released its stages");
    let mut events = tracer.get_events();
    events.sort_unstable();
    assert_eq!(events, ["a", "b", "c", "d"]);
}
