//! The frame graph is the DAG of stages executed once per frame.
//!
//! Stages are identified by [`StageId`].
//! The anchor stages always exist and give other systems fixed points to hook into;
//! component update stages and custom stages are added and removed at runtime.
//!
//! The graph is never edited while a frame is executing.
//! All edits go through [`SceneRegistry::modify_frame_graph`](crate::registry::SceneRegistry::modify_frame_graph),
//! which enqueues them into a command buffer that is flushed at the start of the next frame.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use crate::component::ComponentTypeIdentifier;
use crate::Scene;

mod executor;
pub(crate) use executor::execute;
mod planner;
mod topology;
pub(crate) use topology::Topology;

/// The fixed stages of the frame graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::EnumIter)]
pub enum Anchor {
    /// The first stage of every frame.
    StartFrame,
    /// Physics simulation may start.
    PhysicsSimulationStart,
    /// Physics simulation has finished.
    PhysicsSimulationFinished,
    /// A fixed physics step may start.
    PhysicsStepStart,
    /// A fixed physics step has finished.
    PhysicsStepFinished,
    /// Dynamic component updates may start.
    DynamicUpdatesStart,
    /// Updates that affect rendering have finished.
    DynamicRenderUpdatesFinished,
    /// All dynamic and late updates have finished.
    DynamicLateUpdatesFinished,
    /// The last stage of every frame.
    EndFrame,
}

/// Identifies a stage in the frame graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageId {
    /// One of the fixed stages.
    Anchor(Anchor),
    /// Runs [`Component::update`](crate::Component::update) for the registered instances of a type.
    ComponentUpdate(ComponentTypeIdentifier),
    /// A stage added by other systems, identified by name.
    Custom(&'static str),
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Anchor(anchor) => write!(f, "{anchor:?}"),
            Self::ComponentUpdate(ty) => write!(f, "update({ty})"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// The work performed by a custom stage.
pub type StageRunner = Arc<dyn Fn(&Scene) + Send + Sync>;

/// The editable form of the frame graph.
pub struct StageGraph {
    stages: IndexMap<StageId, StageEntry>,
}

struct StageEntry {
    runner:     Option<StageRunner>,
    subsequent: IndexSet<StageId>,
}

impl StageGraph {
    /// Creates a graph containing the anchor stages wired in their fixed order.
    pub(crate) fn new() -> Self {
        use strum::IntoEnumIterator;

        let mut graph = Self { stages: IndexMap::new() };
        for anchor in Anchor::iter() {
            graph.add_stage(StageId::Anchor(anchor), None);
        }

        for (before, after) in [
            (Anchor::StartFrame, Anchor::PhysicsSimulationStart),
            (Anchor::StartFrame, Anchor::DynamicUpdatesStart),
            (Anchor::StartFrame, Anchor::DynamicRenderUpdatesFinished),
            (Anchor::DynamicUpdatesStart, Anchor::DynamicLateUpdatesFinished),
            (Anchor::PhysicsSimulationStart, Anchor::PhysicsSimulationFinished),
            (Anchor::PhysicsStepStart, Anchor::PhysicsStepFinished),
            (Anchor::DynamicRenderUpdatesFinished, Anchor::EndFrame),
            (Anchor::DynamicLateUpdatesFinished, Anchor::EndFrame),
            (Anchor::PhysicsSimulationFinished, Anchor::EndFrame),
        ] {
            graph.add_subsequent_stage(StageId::Anchor(before), StageId::Anchor(after));
        }

        graph
    }

    /// Adds a stage. Returns false if it already exists, in which case nothing changes.
    pub fn add_stage(&mut self, id: StageId, runner: Option<StageRunner>) -> bool {
        if self.stages.contains_key(&id) {
            return false;
        }
        self.stages.insert(id, StageEntry { runner, subsequent: IndexSet::new() });
        true
    }

    /// Removes a stage and all edges touching it. Returns false if it did not exist.
    ///
    /// # Panics
    /// Panics if `id` is an anchor.
    pub fn remove_stage(&mut self, id: StageId) -> bool {
        assert!(!matches!(id, StageId::Anchor(_)), "Anchor stage {id} cannot be removed");

        if self.stages.shift_remove(&id).is_none() {
            return false;
        }
        for entry in self.stages.values_mut() {
            entry.subsequent.shift_remove(&id);
        }
        true
    }

    /// Requires `after` to start only after `before` has completed.
    /// Returns false if the edge already exists.
    ///
    /// # Panics
    /// Panics if either stage does not exist.
    pub fn add_subsequent_stage(&mut self, before: StageId, after: StageId) -> bool {
        assert!(self.stages.contains_key(&after), "Stage {after} does not exist");
        let entry = match self.stages.get_mut(&before) {
            Some(entry) => entry,
            None => panic!("Stage {before} does not exist"),
        };
        entry.subsequent.insert(after)
    }

    /// Removes the edge from `before` to `after`. Returns false if it did not exist.
    pub fn remove_subsequent_stage(&mut self, before: StageId, after: StageId) -> bool {
        match self.stages.get_mut(&before) {
            Some(entry) => entry.subsequent.shift_remove(&after),
            None => false,
        }
    }

    /// Checks whether there is an edge from `before` to `after`.
    pub fn is_directly_followed_by(&self, before: StageId, after: StageId) -> bool {
        self.stages.get(&before).map_or(false, |entry| entry.subsequent.contains(&after))
    }

    /// Checks whether a stage exists.
    pub fn contains_stage(&self, id: StageId) -> bool { self.stages.contains_key(&id) }

    /// The number of stages.
    pub fn len(&self) -> usize { self.stages.len() }

    /// Whether the graph has no stages. Never true for a graph created by a scene.
    pub fn is_empty(&self) -> bool { self.stages.is_empty() }

    /// Iterates over all stages in insertion order.
    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ { self.stages.keys().copied() }
}

type Command = Box<dyn FnOnce(&mut StageGraph) + Send>;

/// The frame graph together with its pending edits and its compiled form.
pub(crate) struct FrameGraph {
    graph:    Mutex<StageGraph>,
    commands: Mutex<Vec<Command>>,
    topology: Mutex<Option<Arc<Topology>>>,
}

impl FrameGraph {
    pub(crate) fn new() -> Self {
        Self {
            graph:    Mutex::new(StageGraph::new()),
            commands: Mutex::new(Vec::new()),
            topology: Mutex::new(None),
        }
    }

    pub(crate) fn modify(&self, command: Command) { self.commands.lock().push(command); }

    pub(crate) fn pending(&self) -> usize { self.commands.lock().len() }

    /// Applies all queued commands in submission order, returning the number applied.
    pub(crate) fn flush(&self) -> usize {
        let commands = std::mem::take(&mut *self.commands.lock());
        if commands.is_empty() {
            return 0;
        }

        let count = commands.len();
        {
            let mut graph = self.graph.lock();
            for command in commands {
                command(&mut graph);
            }
        }
        *self.topology.lock() = None;
        log::debug!("Applied {count} frame graph commands");
        count
    }

    /// Returns the compiled topology, rebuilding it if the graph changed.
    ///
    /// # Panics
    /// Panics if the graph has a cycle.
    pub(crate) fn topology(&self) -> Arc<Topology> {
        let mut topology = self.topology.lock();
        let topology = topology.get_or_insert_with(|| Arc::new(Topology::init(&self.graph.lock())));
        Arc::clone(topology)
    }

    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&StageGraph) -> R) -> R { f(&self.graph.lock()) }
}

#[cfg(test)]
mod tests;
