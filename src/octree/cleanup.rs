use parking_lot::Mutex;

use super::{NodeIndex, NodePool, RemovalResult};
use crate::tracer::Tracer;

/// Collects empty octree nodes during a frame and destroys them at a point
/// where no other stage is traversing the tree.
///
/// Nodes move through `live -> flagged -> queued -> destroyed`.
/// Flagging also unlinks the node from its parent,
/// so traversals that start after the flag never reach it,
/// while traversals already holding its index can still read it until the job runs.
pub struct DestroyEmptyOctreeNodesJob {
    queue:    Mutex<Vec<NodeIndex>>,
    capacity: usize,
}

impl DestroyEmptyOctreeNodesJob {
    /// Creates a job that can queue up to `capacity` nodes per frame.
    pub fn new(capacity: usize) -> Self { Self { queue: Mutex::new(Vec::with_capacity(capacity)), capacity } }

    /// The number of nodes waiting for destruction.
    pub fn queued(&self) -> usize { self.queue.lock().len() }

    /// Flags `index` for deletion and queues it if it is an empty non-root node
    /// that has not been flagged yet.
    ///
    /// Returns true if this call queued the node.
    pub fn flag_node_for_deletion_if_necessary(
        &self,
        pool: &NodePool,
        tracer: &dyn Tracer,
        index: NodeIndex,
    ) -> bool {
        let node = pool.get(index);
        let parent = match node.parent() {
            Some(parent) => parent,
            None => return false,
        };
        if !node.is_empty() || node.is_flagged_for_deletion() || !node.flag_for_deletion() {
            return false;
        }

        pool.get(parent).remove_child(node.slot(), index);
        self.push(&mut self.queue.lock(), index);
        tracer.octree_node_flagged(index);
        log::trace!("Flagged octree node {index:?} for deletion");
        true
    }

    /// Destroys all queued nodes and returns them to the pool,
    /// returning the number of nodes destroyed.
    ///
    /// Parents left empty by the destruction are flagged and destroyed in the same pass.
    pub fn run(&self, pool: &NodePool, tracer: &dyn Tracer) -> usize {
        let mut queue = self.queue.lock();

        let mut next = 0;
        while let Some(&index) = queue.get(next) {
            next += 1;

            let node = pool.get(index);
            debug_assert!(node.is_empty(), "queued octree node {index:?} is not empty");
            let parent = node.parent().expect("the root is never queued");

            pool.release(index);
            tracer.octree_node_destroyed(index);

            self.flag_parent_for_deletion_if_necessary(&mut queue, pool, tracer, parent);
        }

        queue.clear();
        if next > 0 {
            log::debug!("Destroyed {next} empty octree nodes");
        }
        next
    }

    fn flag_parent_for_deletion_if_necessary(
        &self,
        queue: &mut Vec<NodeIndex>,
        pool: &NodePool,
        tracer: &dyn Tracer,
        mut index: NodeIndex,
    ) {
        loop {
            let node = pool.get(index);
            let parent = match node.parent() {
                Some(parent) => parent,
                None => return,
            };
            if !node.is_empty() || node.is_flagged_for_deletion() || !node.flag_for_deletion() {
                return;
            }

            self.push(queue, index);
            tracer.octree_node_flagged(index);

            match pool.get(parent).remove_child(node.slot(), index) {
                RemovalResult::RemovedLastElement => index = parent,
                RemovalResult::Done => return,
            }
        }
    }

    fn push(&self, queue: &mut Vec<NodeIndex>, index: NodeIndex) {
        assert!(
            queue.len() < self.capacity,
            "Octree deletion queue overflow: more than {} nodes flagged in one frame",
            self.capacity
        );
        debug_assert!(!queue.contains(&index), "{index:?} is queued twice");
        queue.push(index);
    }
}
