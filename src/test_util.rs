#![allow(missing_docs)]

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::{Mutex, Once};
use serde::{Deserialize, Serialize};

use crate::component::{ComponentTypeIdentifier, ComponentTypeRegistry};
use crate::config::SceneConfig;
use crate::error::Result;
use crate::frame_graph::StageId;
use crate::octree::NodeIndex;
use crate::tracer::{self, Tracer};
use crate::{Component, ComponentIdentifier, Scene};

/// Records event and ensures that they are in the correct order.
pub struct EventTracer<T: fmt::Debug + Eq + Hash> {
    dependencies: HashMap<T, Vec<T>>,
    seen:         Mutex<IndexSet<T>>,
}

impl<T: fmt::Debug + Eq + Hash> EventTracer<T> {
    /// Creates a new event tracer that ensures `a` executes after `b` for each `(a, b)` input.
    pub fn new(orders: impl IntoIterator<Item = (T, T)>) -> Self {
        let mut dependencies: HashMap<T, Vec<T>> = HashMap::new();
        for (before, after) in orders {
            dependencies.entry(after).or_default().push(before);
        }
        let seen = Mutex::new(IndexSet::new());

        Self { dependencies, seen }
    }

    /// Records that `event` has happened.
    ///
    /// # Panics
    /// Panics if the same `event` was sent twice or a dependency is not satisfied.
    pub fn trace(&self, event: T) {
        let mut seen = self.seen.lock();

        if let Some(deps) = self.dependencies.get(&event) {
            for dep in deps {
                assert!(seen.contains(dep), "{:?} should happen after {:?}", event, dep);
            }
        }

        let (index, new) = seen.insert_full(event);
        assert!(
            new,
            "{:?} is inserted twice",
            seen.get_index(index).expect("insert_full should return valid index")
        );
    }

    /// Returns the events observed in this tracer.
    pub fn get_events(self) -> Vec<T> {
        let seen = self.seen.into_inner();
        seen.into_iter().collect()
    }
}

/// A structural event observed by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    StartFrame,
    EndFrame,
    FlushFrameGraph(usize),
    StartStage(StageId),
    EndStage(StageId),
    CreateInstance(String, ComponentIdentifier),
    RemoveInstance(String, ComponentIdentifier),
    OctreeNodeCreated { node: NodeIndex, parent: NodeIndex, slot: u8 },
    OctreeNodeFlagged(NodeIndex),
    OctreeNodeDestroyed(NodeIndex),
    ComponentRelocated { id: ComponentIdentifier, from: NodeIndex, to: NodeIndex },
}

/// A tracer that stores every event it receives.
///
/// Clones share the same buffer,
/// so a clone can be moved into a scene while the test keeps reading the original.
#[derive(Clone, Default)]
pub struct RecordingTracer(Arc<Mutex<Vec<TraceEvent>>>);

impl RecordingTracer {
    /// Removes and returns all events recorded so far.
    pub fn take(&self) -> Vec<TraceEvent> { std::mem::take(&mut *self.0.lock()) }

    fn push(&self, event: TraceEvent) { self.0.lock().push(event) }
}

impl Tracer for RecordingTracer {
    fn start_frame(&self) { self.push(TraceEvent::StartFrame) }

    fn end_frame(&self, _elapsed: std::time::Duration) { self.push(TraceEvent::EndFrame) }

    fn flush_frame_graph(&self, commands: usize) { self.push(TraceEvent::FlushFrameGraph(commands)) }

    fn start_stage(&self, _thread: tracer::Thread, stage: StageId) { self.push(TraceEvent::StartStage(stage)) }

    fn end_stage(&self, _thread: tracer::Thread, stage: StageId) { self.push(TraceEvent::EndStage(stage)) }

    fn create_instance(&self, _ty: ComponentTypeIdentifier, name: &str, id: ComponentIdentifier) {
        self.push(TraceEvent::CreateInstance(name.to_string(), id))
    }

    fn remove_instance(&self, _ty: ComponentTypeIdentifier, name: &str, id: ComponentIdentifier) {
        self.push(TraceEvent::RemoveInstance(name.to_string(), id))
    }

    fn octree_node_created(&self, node: NodeIndex, parent: NodeIndex, slot: u8) {
        self.push(TraceEvent::OctreeNodeCreated { node, parent, slot })
    }

    fn octree_node_flagged(&self, node: NodeIndex) { self.push(TraceEvent::OctreeNodeFlagged(node)) }

    fn octree_node_destroyed(&self, node: NodeIndex) { self.push(TraceEvent::OctreeNodeDestroyed(node)) }

    fn component_relocated(&self, id: ComponentIdentifier, from: NodeIndex, to: NodeIndex) {
        self.push(TraceEvent::ComponentRelocated { id, from, to })
    }
}

/// A hierarchy component that counts its per-frame updates.
#[derive(Debug, Default)]
pub struct Counter(pub u32);

impl Component for Counter {
    const NAME: &'static str = "test_util::Counter";

    fn update(&mut self, _scene: &Scene, _id: ComponentIdentifier) { self.0 += 1 }
}

/// A persisted hierarchy component with a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub label: String,
}

impl Node {
    pub fn new(label: &str) -> Self { Self { label: label.to_string() } }
}

impl Component for Node {
    const NAME: &'static str = "test_util::Node";

    fn serialize(&self) -> Option<serde_json::Value> { serde_json::to_value(self).ok() }

    fn deserialize(value: &serde_json::Value) -> Result<Self> {
        Ok(<Self as Deserialize>::deserialize(value)?)
    }
}

/// A persisted data component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health(pub u32);

impl Component for Health {
    const NAME: &'static str = "test_util::Health";
    const IS_DATA_COMPONENT: bool = true;

    fn serialize(&self) -> Option<serde_json::Value> { serde_json::to_value(self).ok() }

    fn deserialize(value: &serde_json::Value) -> Result<Self> {
        Ok(<Self as Deserialize>::deserialize(value)?)
    }
}

/// A configuration small enough for unit tests, running every stage on the calling thread.
pub fn test_config() -> SceneConfig {
    SceneConfig::default()
        .with_max_components(1024)
        .with_octree_pool_capacity(1024)
        .with_deletion_queue_capacity(1024)
        .with_concurrency(0)
}

/// Creates a scene with [`test_config`] and a fresh type registry.
pub fn new_scene() -> Scene { new_scene_with(test_config(), tracer::Noop) }

/// Creates a scene with a fresh type registry.
pub fn new_scene_with(config: SceneConfig, tracer: impl Tracer + 'static) -> Scene {
    init();
    Scene::new(config, Arc::new(ComponentTypeRegistry::new()), Box::new(tracer)).expect("scene construction")
}

/// Initializes logging once per process.
pub fn init() {
    static SET_LOGGER_ONCE: Once = Once::new();
    SET_LOGGER_ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
