use parking_lot::Mutex;
use xias::Xias;

use super::{NodeIndex, SceneOctreeNode};

/// A fixed-capacity arena of octree nodes.
///
/// Slot 0 is always the root and never enters the free list.
pub struct NodePool {
    nodes: Box<[SceneOctreeNode]>,
    /// Free slots, popped from the back so that low indices are reused first.
    free:  Mutex<Vec<u32>>,
}

impl NodePool {
    /// Creates a pool that can hold `capacity` nodes besides the root.
    pub fn new(capacity: u32) -> Self {
        let nodes = (0..=capacity).map(|_| SceneOctreeNode::default()).collect();
        let free = (1..=capacity).rev().collect();
        Self { nodes, free: Mutex::new(free) }
    }

    /// The number of nodes besides the root this pool can hold.
    pub fn capacity(&self) -> usize { self.nodes.len() - 1 }

    /// The number of nodes that can still be allocated.
    pub fn available(&self) -> usize { self.free.lock().len() }

    /// Takes a node from the free list.
    ///
    /// The returned node is still in the deleted state until it is initialized.
    pub fn allocate(&self) -> Option<NodeIndex> { self.free.lock().pop().map(NodeIndex) }

    /// Returns a node to the free list.
    pub fn release(&self, index: NodeIndex) {
        assert_ne!(index, NodeIndex::ROOT, "The root octree node cannot be released");
        self.get(index).mark_deleted();

        let mut free = self.free.lock();
        debug_assert!(!free.contains(&index.0), "{index:?} is released twice");
        free.push(index.0);
    }

    /// Returns the node at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub fn get(&self, index: NodeIndex) -> &SceneOctreeNode {
        self.nodes.get(index.0.small_int::<usize>()).expect("octree node index out of range")
    }
}
