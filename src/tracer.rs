//! Exposes testing, profiling and tracing capabilities.

use std::time::Duration;

use crate::component::ComponentTypeIdentifier;
use crate::frame_graph::StageId;
use crate::octree::NodeIndex;
use crate::ComponentIdentifier;

/// A handler that receives structural and scheduling events of a scene.
///
/// All methods have empty default implementations,
/// so implementors only override the events they are interested in.
pub trait Tracer: Send + Sync {
    /// A frame starts.
    fn start_frame(&self) {}

    /// A frame ends.
    fn end_frame(&self, _elapsed: Duration) {}

    /// Queued frame graph edits were applied at the start of a frame.
    fn flush_frame_graph(&self, _commands: usize) {}

    /// A thread tries to steal a stage, but all stages have started.
    fn steal_return_complete(&self, _thread: Thread) {}

    /// A thread tries to steal a stage, but no stages are in the runnable pool.
    fn steal_return_pending(&self, _thread: Thread) {}

    /// A stage starts running.
    fn start_stage(&self, _thread: Thread, _stage: StageId) {}

    /// A stage stops running.
    fn end_stage(&self, _thread: Thread, _stage: StageId) {}

    /// An instance of a component type was stored.
    fn create_instance(&self, _ty: ComponentTypeIdentifier, _name: &str, _id: ComponentIdentifier) {}

    /// An instance of a component type was removed.
    fn remove_instance(&self, _ty: ComponentTypeIdentifier, _name: &str, _id: ComponentIdentifier) {}

    /// An octree node was allocated in child slot `slot` of `parent`.
    fn octree_node_created(&self, _node: NodeIndex, _parent: NodeIndex, _slot: u8) {}

    /// An empty octree node was unlinked and queued for destruction.
    fn octree_node_flagged(&self, _node: NodeIndex) {}

    /// A queued octree node was returned to the pool.
    fn octree_node_destroyed(&self, _node: NodeIndex) {}

    /// A component moved from one octree node to another.
    fn component_relocated(&self, _id: ComponentIdentifier, _from: NodeIndex, _to: NodeIndex) {}
}

/// An empty tracer.
pub struct Noop;

impl Tracer for Noop {}

/// Groups multiple tracers into a tuple and dispatches each call to them in serial.
pub struct Aggregate<T>(
    /// A tuple of child tracers to execute in serial.
    pub T,
);

macro_rules! impl_aggregate {
    ($($ident:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($ident: Tracer),*> Tracer for Aggregate<($($ident,)*)> {
            fn start_frame(&self) {
                let ($($ident,)*) = &self.0;
                $($ident.start_frame();)*
            }

            fn end_frame(&self, elapsed: Duration) {
                let ($($ident,)*) = &self.0;
                $($ident.end_frame(elapsed);)*
            }

            fn flush_frame_graph(&self, commands: usize) {
                let ($($ident,)*) = &self.0;
                $($ident.flush_frame_graph(commands);)*
            }

            fn steal_return_complete(&self, thread: Thread) {
                let ($($ident,)*) = &self.0;
                $($ident.steal_return_complete(thread);)*
            }

            fn steal_return_pending(&self, thread: Thread) {
                let ($($ident,)*) = &self.0;
                $($ident.steal_return_pending(thread);)*
            }

            fn start_stage(&self, thread: Thread, stage: StageId) {
                let ($($ident,)*) = &self.0;
                $($ident.start_stage(thread, stage);)*
            }

            fn end_stage(&self, thread: Thread, stage: StageId) {
                let ($($ident,)*) = &self.0;
                $($ident.end_stage(thread, stage);)*
            }

            fn create_instance(&self, ty: ComponentTypeIdentifier, name: &str, id: ComponentIdentifier) {
                let ($($ident,)*) = &self.0;
                $($ident.create_instance(ty, name, id);)*
            }

            fn remove_instance(&self, ty: ComponentTypeIdentifier, name: &str, id: ComponentIdentifier) {
                let ($($ident,)*) = &self.0;
                $($ident.remove_instance(ty, name, id);)*
            }

            fn octree_node_created(&self, node: NodeIndex, parent: NodeIndex, slot: u8) {
                let ($($ident,)*) = &self.0;
                $($ident.octree_node_created(node, parent, slot);)*
            }

            fn octree_node_flagged(&self, node: NodeIndex) {
                let ($($ident,)*) = &self.0;
                $($ident.octree_node_flagged(node);)*
            }

            fn octree_node_destroyed(&self, node: NodeIndex) {
                let ($($ident,)*) = &self.0;
                $($ident.octree_node_destroyed(node);)*
            }

            fn component_relocated(&self, id: ComponentIdentifier, from: NodeIndex, to: NodeIndex) {
                let ($($ident,)*) = &self.0;
                $($ident.component_relocated(id, from, to);)*
            }
        }
    };
}

impl_aggregate!(A, B);
impl_aggregate!(A, B, C);
impl_aggregate!(A, B, C, D);

/// A tracer that logs all events.
pub struct Log(
    /// The log level to log events with.
    pub log::Level,
);

impl Tracer for Log {
    fn start_frame(&self) { log::log!(self.0, "start_frame()") }

    fn end_frame(&self, elapsed: Duration) { log::log!(self.0, "end_frame(elapsed: {elapsed:?})") }

    fn flush_frame_graph(&self, commands: usize) {
        log::log!(self.0, "flush_frame_graph(commands: {commands})")
    }

    fn steal_return_complete(&self, thread: Thread) {
        log::log!(self.0, "steal_return_complete(thread: {thread:?})")
    }

    fn steal_return_pending(&self, thread: Thread) {
        log::log!(self.0, "steal_return_pending(thread: {thread:?})")
    }

    fn start_stage(&self, thread: Thread, stage: StageId) {
        log::log!(self.0, "start_stage(thread: {thread:?}, stage: {stage})")
    }

    fn end_stage(&self, thread: Thread, stage: StageId) {
        log::log!(self.0, "end_stage(thread: {thread:?}, stage: {stage})")
    }

    fn create_instance(&self, ty: ComponentTypeIdentifier, name: &str, id: ComponentIdentifier) {
        log::log!(self.0, "create_instance(ty: {ty}, name: {name}, id: {id})")
    }

    fn remove_instance(&self, ty: ComponentTypeIdentifier, name: &str, id: ComponentIdentifier) {
        log::log!(self.0, "remove_instance(ty: {ty}, name: {name}, id: {id})")
    }

    fn octree_node_created(&self, node: NodeIndex, parent: NodeIndex, slot: u8) {
        log::log!(self.0, "octree_node_created(node: {node:?}, parent: {parent:?}, slot: {slot})")
    }

    fn octree_node_flagged(&self, node: NodeIndex) {
        log::log!(self.0, "octree_node_flagged(node: {node:?})")
    }

    fn octree_node_destroyed(&self, node: NodeIndex) {
        log::log!(self.0, "octree_node_destroyed(node: {node:?})")
    }

    fn component_relocated(&self, id: ComponentIdentifier, from: NodeIndex, to: NodeIndex) {
        log::log!(self.0, "component_relocated(id: {id}, from: {from:?}, to: {to:?})")
    }
}

/// The thread ID for a stage executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Thread {
    /// The main thread, which calls [`Scene::run_frame`](crate::Scene::run_frame).
    Main,
    /// A worker thread. The index is in the range `0..concurrency`.
    Worker(usize),
}
