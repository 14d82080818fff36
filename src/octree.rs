//! The dynamic octree indexing the 3D components of a scene.
//!
//! Every spatially indexed component is placed in the node whose size is balanced
//! against the size of the component: a node is split further only while the
//! component is smaller than [`TREE_BALANCING_RATIO`] of the node radius.
//! Nodes are created on demand from a fixed [`NodePool`]
//! and destroyed by [`DestroyEmptyOctreeNodesJob`] once they become empty.
//!
//! The octree is read concurrently by consumers during a frame.
//! Structural changes only synchronize on the node being changed:
//! a child slot is claimed through [`SceneOctreeNode::reserve_child`]
//! and an empty node is claimed through [`SceneOctreeNode::flag_for_deletion`].

use std::sync::Arc;

use glam::Vec3;

use crate::data::{Aabb, BoundingBox, OctreeNode, Tags, WorldTransform};
use crate::frame_graph::{Anchor, StageId};
use crate::registry::SceneRegistry;
use crate::tracer::Tracer;
use crate::{ComponentIdentifier, Scene};

mod cleanup;
pub use cleanup::DestroyEmptyOctreeNodesJob;
mod node;
pub use node::{RemovalResult, Reservation, SceneOctreeNode};
mod pool;
pub use pool::NodePool;

/// A component may only descend into a node whose radius,
/// multiplied by this ratio, still exceeds the radius of the component.
pub const TREE_BALANCING_RATIO: f32 = 1. / 16.;

/// Components smaller than this squared radius are treated as this large.
pub const MIN_RADIUS_SQUARED: f32 = 0.01;

/// The frame graph stage that runs [`DestroyEmptyOctreeNodesJob`].
pub const CLEANUP_STAGE: StageId = StageId::Custom("DestroyEmptyOctreeNodes");

/// Identifies a node in a [`NodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub(crate) u32);

impl NodeIndex {
    /// The root node, which exists for the whole lifetime of the octree.
    pub const ROOT: Self = Self(0);

    /// The raw index in the pool.
    pub fn get(self) -> u32 { self.0 }
}

/// Owns the octree of a scene.
pub struct RootSceneComponent {
    pool:    NodePool,
    cleanup: DestroyEmptyOctreeNodesJob,
}

impl RootSceneComponent {
    /// Creates an octree whose root is centered at the origin with half extent `radius`.
    pub fn new(radius: f32, pool_capacity: u32, deletion_queue_capacity: usize) -> Self {
        let pool = NodePool::new(pool_capacity);
        pool.get(NodeIndex::ROOT).init(Vec3::ZERO, radius, None);
        Self { pool, cleanup: DestroyEmptyOctreeNodesJob::new(deletion_queue_capacity) }
    }

    /// The root node.
    pub fn root_node(&self) -> &SceneOctreeNode { self.pool.get(NodeIndex::ROOT) }

    /// The half extent of the root node.
    pub fn radius(&self) -> f32 { self.root_node().radius() }

    /// Returns a node by index.
    ///
    /// Consumers must not keep indices across a frame boundary,
    /// because empty nodes are destroyed at the end of the frame.
    pub fn node(&self, index: NodeIndex) -> &SceneOctreeNode { self.pool.get(index) }

    /// The node pool.
    pub fn pool(&self) -> &NodePool { &self.pool }

    /// The deferred node destruction job.
    pub fn cleanup_job(&self) -> &DestroyEmptyOctreeNodesJob { &self.cleanup }

    /// The number of allocated nodes, including the root.
    pub fn live_nodes(&self) -> usize { self.pool.capacity() - self.pool.available() + 1 }

    /// The number of edges between `index` and the root.
    pub fn node_depth(&self, mut index: NodeIndex) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.node(index).parent() {
            index = parent;
            depth += 1;
        }
        depth
    }

    /// Traverses the tree depth-first from the root.
    ///
    /// `visitor` returns whether the children of the visited node should be visited.
    pub fn visit(&self, mut visitor: impl FnMut(NodeIndex, &SceneOctreeNode) -> bool) {
        let mut stack = vec![NodeIndex::ROOT];
        while let Some(index) = stack.pop() {
            let node = self.node(index);
            if visitor(index, node) {
                stack.extend(node.children());
            }
        }
    }

    /// Descends from `start` to the node balanced for an item of squared radius
    /// `radius_squared` at `location`, creating missing nodes along the way.
    ///
    /// If the pool is exhausted, the deepest node reached so far is returned.
    pub fn get_or_make_ideal_child_node(
        &self,
        tracer: &dyn Tracer,
        start: NodeIndex,
        radius_squared: f32,
        location: Vec3,
        bounds: Aabb,
    ) -> NodeIndex {
        let radius_squared = radius_squared.max(MIN_RADIUS_SQUARED);

        let mut index = start;
        let mut node = self.node(index);
        debug_assert!(!node.was_deleted(), "descending from a deleted node");

        loop {
            let balanced_radius = node.radius() * TREE_BALANCING_RATIO;
            if radius_squared >= balanced_radius * balanced_radius {
                return index;
            }

            let slot = node.child_index_at(location);
            let child = match node.reserve_child(slot) {
                Reservation::Reserved => match self.pool.allocate() {
                    Some(child) => {
                        let child_bounds = node.child_static_bounds(slot);
                        self.node(child).init(child_bounds.center(), node.radius() * 0.5, Some((index, slot)));
                        node.add_child(slot, child);

                        tracer.octree_node_created(child, index, slot);
                        log::trace!("Created octree node {child:?} in octant {slot} of {index:?}");
                        child
                    }
                    None => {
                        node.cancel_reservation(slot);
                        log::error!(
                            "Octree node pool exhausted at {} nodes, keeping item in {index:?}",
                            self.pool.capacity()
                        );
                        return index;
                    }
                },
                Reservation::Existing(child) if self.node(child).is_flagged_for_deletion() => {
                    // the child is being unlinked by another thread
                    std::hint::spin_loop();
                    continue;
                }
                Reservation::Existing(child) => child,
                Reservation::Pending => {
                    std::hint::spin_loop();
                    continue;
                }
            };

            index = child;
            node = self.node(index);
            node.expand_content_bounds(bounds);
        }
    }

    /// Inserts the component `id` into the tree according to its world transform and bounds,
    /// creating its [`OctreeNode`] data component.
    ///
    /// # Panics
    /// Panics if `id` is already in the tree.
    pub fn add_component(&self, scene: &Scene, id: ComponentIdentifier) -> NodeIndex {
        let registry = scene.registry();
        let octree_nodes = registry.cached::<OctreeNode>();
        assert!(
            !registry.has_data_component_of_type(id, octree_nodes.type_identifier()),
            "{id} is already in the octree"
        );

        let (location, bounds) = world_placement(registry, id);
        let index = self.get_or_make_ideal_child_node(
            scene.tracer(),
            NodeIndex::ROOT,
            bounds.radius_squared(),
            location,
            bounds,
        );
        self.place(index, id, tag_mask(registry, id));

        let created = octree_nodes.create_instance(scene, id, None, OctreeNode(index));
        assert!(created, "{id} reserved an octree node concurrently");
        index
    }

    /// Removes the component `id` from the tree and destroys its [`OctreeNode`] data component.
    ///
    /// Returns false if `id` was not in the tree.
    pub fn remove_component(&self, scene: &Scene, id: ComponentIdentifier) -> bool {
        let registry = scene.registry();
        let octree_nodes = registry.cached::<OctreeNode>();
        let current = match octree_nodes.with(id, |node| node.0) {
            Some(current) => current,
            None => return false,
        };

        if self.node(current).remove_component(id) == RemovalResult::RemovedLastElement {
            self.cleanup.flag_node_for_deletion_if_necessary(&self.pool, scene.tracer(), current);
        }

        let removed = registry.on_data_component_removed(id, octree_nodes.type_identifier());
        debug_assert!(removed, "{id} has an octree node instance but no live bit");
        octree_nodes.on_before_remove_instance(scene, id);
        octree_nodes.remove_instance(scene, id);
        true
    }

    /// Moves `id` to a new node if its world location has left the static bounds of its node.
    ///
    /// The search walks up to the first ancestor containing the new location
    /// (or the root) and then back down to the balanced node.
    /// Returns the new node if the component moved.
    pub fn on_component_world_location_or_bounds_changed(
        &self,
        scene: &Scene,
        id: ComponentIdentifier,
    ) -> Option<NodeIndex> {
        let registry = scene.registry();
        let octree_nodes = registry.cached::<OctreeNode>();
        let current = octree_nodes.with(id, |node| node.0)?;
        let current_node = self.node(current);

        let (location, bounds) = world_placement(registry, id);
        let mut start = current_node.parent()?;
        if current_node.static_bounds().contains_point(location) {
            return None;
        }
        while start != NodeIndex::ROOT && !self.node(start).static_bounds().contains_point(location) {
            start = self.node(start).parent().expect("only the root has no parent");
        }

        let target =
            self.get_or_make_ideal_child_node(scene.tracer(), start, bounds.radius_squared(), location, bounds);
        if target == current {
            return None;
        }

        if current_node.remove_component(id) == RemovalResult::RemovedLastElement {
            self.cleanup.flag_node_for_deletion_if_necessary(&self.pool, scene.tracer(), current);
        }
        self.place(target, id, tag_mask(registry, id));
        octree_nodes.with_mut(id, |node| node.0 = target);

        scene.tracer().component_relocated(id, current, target);
        log::trace!("Relocated {id} from octree node {current:?} to {target:?}");
        Some(target)
    }

    /// Merges the current tags of `id` into the tag masks of its node and ancestors.
    pub fn on_component_tags_changed(&self, scene: &Scene, id: ComponentIdentifier) {
        let registry = scene.registry();
        if let Some(index) = registry.cached::<OctreeNode>().with(id, |node| node.0) {
            self.merge_tags(index, tag_mask(registry, id));
        }
    }

    /// Returns the node containing `id`, if it is in the tree.
    pub fn node_of(&self, scene: &Scene, id: ComponentIdentifier) -> Option<NodeIndex> {
        scene.registry().cached::<OctreeNode>().with(id, |node| node.0)
    }

    /// Destroys the nodes queued by [`DestroyEmptyOctreeNodesJob`].
    ///
    /// Must only run when no other stage is traversing the tree.
    pub fn destroy_empty_nodes(&self, tracer: &dyn Tracer) -> usize { self.cleanup.run(&self.pool, tracer) }

    /// Adds the cleanup stage between the late-updates-finished and end-frame anchors.
    pub fn enable(&self, registry: &SceneRegistry) {
        registry.modify_frame_graph(|graph| {
            let runner: Arc<dyn Fn(&Scene) + Send + Sync> =
                Arc::new(|scene: &Scene| {
                    scene.octree().destroy_empty_nodes(scene.tracer());
                });
            graph.add_stage(CLEANUP_STAGE, Some(runner));
            graph.add_subsequent_stage(StageId::Anchor(Anchor::DynamicLateUpdatesFinished), CLEANUP_STAGE);
            graph.add_subsequent_stage(CLEANUP_STAGE, StageId::Anchor(Anchor::EndFrame));
        });
    }

    /// Removes the cleanup stage from the frame graph.
    pub fn disable(&self, registry: &SceneRegistry) {
        registry.modify_frame_graph(|graph| {
            graph.remove_stage(CLEANUP_STAGE);
        });
    }

    fn place(&self, index: NodeIndex, id: ComponentIdentifier, tags: u64) {
        self.node(index).add_component(id);
        self.merge_tags(index, tags);
    }

    fn merge_tags(&self, mut index: NodeIndex, tags: u64) {
        let mut new_bits = self.node(index).merge_tags(tags);
        while new_bits != 0 {
            index = match self.node(index).parent() {
                Some(parent) => parent,
                None => return,
            };
            new_bits = self.node(index).merge_tags(new_bits);
        }
    }
}

/// The world location of `id` and its bounds in world space.
///
/// Components without a [`WorldTransform`] sit at the origin,
/// and components without a [`BoundingBox`] are treated as points.
pub fn world_placement(registry: &SceneRegistry, id: ComponentIdentifier) -> (Vec3, Aabb) {
    let transform = registry.cached::<WorldTransform>().with(id, |transform| transform.0).unwrap_or_default();
    let bounds = match registry.cached::<BoundingBox>().with(id, |bounds| bounds.0) {
        Some(local) => local.transformed(&transform),
        None => Aabb::new(transform.location, transform.location),
    };
    (transform.location, bounds)
}

fn tag_mask(registry: &SceneRegistry, id: ComponentIdentifier) -> u64 {
    registry.cached::<Tags>().with(id, |tags| tags.0).unwrap_or(0)
}

#[cfg(test)]
mod tests;
