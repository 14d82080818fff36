use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use glam::{UVec3, Vec3};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use super::NodeIndex;
use crate::data::Aabb;
use crate::util::AtomicF32;
use crate::ComponentIdentifier;

/// Child slot value of an empty octant.
const EMPTY_SLOT: u32 = 0;
/// Child slot value of an octant whose node is being allocated.
const RESERVED_SLOT: u32 = u32::MAX;
/// Parent value of the root node.
const NO_PARENT: u32 = u32::MAX;

const FLAGGED_FOR_DELETION: u8 = 1 << 0;
const DELETED: u8 = 1 << 1;

/// The outcome of removing an element from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalResult {
    /// The element was removed and the node still contains elements of the same kind,
    /// or the element was not found.
    Done,
    /// The removed element was the last one of its kind.
    RemovedLastElement,
}

/// The outcome of [`SceneOctreeNode::reserve_child`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The slot was empty and now belongs to the caller,
    /// who must either [`add_child`](SceneOctreeNode::add_child)
    /// or [`cancel_reservation`](SceneOctreeNode::cancel_reservation).
    Reserved,
    /// The slot already holds a node.
    Existing(NodeIndex),
    /// Another thread holds the reservation; retry later.
    Pending,
}

/// A cubic cell of the octree.
///
/// Nodes live in a fixed pool and are reinitialized on allocation,
/// so all state is interior-mutable.
/// The static bounds are `center ± radius` on each axis.
pub struct SceneOctreeNode {
    center:         [AtomicF32; 3],
    radius:         AtomicF32,
    parent:         AtomicU32,
    slot:           AtomicU8,
    children:       [AtomicU32; 8],
    child_count:    AtomicU8,
    components:     RwLock<Vec<ComponentIdentifier>>,
    /// The union of the bounds of all items that descended through this node.
    content_bounds: Mutex<Option<Aabb>>,
    tags:           AtomicU64,
    state:          AtomicU8,
}

impl Default for SceneOctreeNode {
    fn default() -> Self {
        Self {
            center:         Default::default(),
            radius:         AtomicF32::default(),
            parent:         AtomicU32::new(NO_PARENT),
            slot:           AtomicU8::new(0),
            children:       Default::default(),
            child_count:    AtomicU8::new(0),
            components:     RwLock::new(Vec::new()),
            content_bounds: Mutex::new(None),
            tags:           AtomicU64::new(0),
            state:          AtomicU8::new(DELETED),
        }
    }
}

impl SceneOctreeNode {
    /// Resets this node to a live, empty node.
    ///
    /// The caller must have exclusive ownership of the node,
    /// i.e. it was just taken from the pool and not linked yet.
    pub(crate) fn init(&self, center: Vec3, radius: f32, parent: Option<(NodeIndex, u8)>) {
        debug_assert!(self.was_deleted(), "reinitializing a live octree node");

        for (axis, value) in self.center.iter().zip(center.to_array()) {
            axis.store(value, Ordering::Relaxed);
        }
        self.radius.store(radius, Ordering::Relaxed);
        let (parent, slot) = parent.map_or((NO_PARENT, 0), |(parent, slot)| (parent.0, slot));
        self.parent.store(parent, Ordering::Relaxed);
        self.slot.store(slot, Ordering::Relaxed);
        for child in &self.children {
            child.store(EMPTY_SLOT, Ordering::Relaxed);
        }
        self.child_count.store(0, Ordering::Relaxed);
        self.components.write().clear();
        *self.content_bounds.lock() = None;
        self.tags.store(0, Ordering::Relaxed);
        self.state.store(0, Ordering::Release);
    }

    /// Marks this node as returned to the pool.
    pub(crate) fn mark_deleted(&self) {
        debug_assert!(self.is_empty(), "deleting a non-empty octree node");
        self.state.fetch_or(DELETED, Ordering::AcqRel);
    }

    /// The center of the static bounds.
    pub fn center(&self) -> Vec3 {
        let [x, y, z] = &self.center;
        Vec3::new(x.load(Ordering::Acquire), y.load(Ordering::Acquire), z.load(Ordering::Acquire))
    }

    /// The half extent of the static bounds.
    pub fn radius(&self) -> f32 { self.radius.load(Ordering::Acquire) }

    /// The squared half extent of the static bounds.
    pub fn radius_squared(&self) -> f32 { self.radius() * self.radius() }

    /// The fixed cube covered by this node.
    pub fn static_bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center(), Vec3::splat(self.radius()))
    }

    /// The union of the bounds of the items placed at or below this node,
    /// which may extend beyond the static bounds.
    pub fn content_bounds(&self) -> Option<Aabb> { *self.content_bounds.lock() }

    /// Grows the content bounds to include `bounds`.
    pub fn expand_content_bounds(&self, bounds: Aabb) {
        let mut content = self.content_bounds.lock();
        *content = Some(match *content {
            Some(content) => content.union(&bounds),
            None => bounds,
        });
    }

    /// The parent of this node, or `None` for the root.
    pub fn parent(&self) -> Option<NodeIndex> {
        match self.parent.load(Ordering::Acquire) {
            NO_PARENT => None,
            index => Some(NodeIndex(index)),
        }
    }

    /// The octant of this node within its parent.
    pub fn slot(&self) -> u8 { self.slot.load(Ordering::Acquire) }

    /// The octant of `point` relative to the center of this node.
    ///
    /// Bit 2 is set if `point` is on the positive x side, bit 1 for y and bit 0 for z.
    pub fn child_index_at(&self, point: Vec3) -> u8 {
        let center = self.center();
        (u8::from(point.x > center.x) << 2) | (u8::from(point.y > center.y) << 1) | u8::from(point.z > center.z)
    }

    /// The position of octant `index` in units of the child size.
    pub fn child_relative_coordinate(index: u8) -> UVec3 {
        debug_assert!(index < 8, "octant index {index} out of range");
        let index = u32::from(index);
        UVec3::new(index / 4, index % 4 / 2, index % 2)
    }

    /// The static bounds of octant `index`.
    pub fn child_static_bounds(&self, index: u8) -> Aabb {
        let radius = self.radius();
        let min = self.center() - Vec3::splat(radius)
            + Self::child_relative_coordinate(index).as_vec3() * radius;
        Aabb::new(min, min + Vec3::splat(radius))
    }

    /// The node in octant `index`, if it is linked.
    pub fn child(&self, index: u8) -> Option<NodeIndex> {
        match self.children[usize::from(index)].load(Ordering::Acquire) {
            EMPTY_SLOT | RESERVED_SLOT => None,
            child => Some(NodeIndex(child)),
        }
    }

    /// Iterates over the linked children.
    pub fn children(&self) -> impl Iterator<Item = NodeIndex> + '_ { (0..8).filter_map(|index| self.child(index)) }

    /// Attempts to reserve octant `index` for a new node.
    pub fn reserve_child(&self, index: u8) -> Reservation {
        match self.children[usize::from(index)].compare_exchange(
            EMPTY_SLOT,
            RESERVED_SLOT,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Reservation::Reserved,
            Err(RESERVED_SLOT) => Reservation::Pending,
            Err(child) => Reservation::Existing(NodeIndex(child)),
        }
    }

    /// Publishes `node` in the reserved octant `index`.
    ///
    /// # Panics
    /// Panics if the octant was not reserved.
    pub fn add_child(&self, index: u8, node: NodeIndex) {
        debug_assert!(!self.is_flagged_for_deletion(), "adding a child to a flagged node");

        let result = self.children[usize::from(index)].compare_exchange(
            RESERVED_SLOT,
            node.0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert!(result.is_ok(), "octant {index} was not reserved");
        let previous = self.child_count.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous < 8, "octree node has more than 8 children");
    }

    /// Releases a reservation without publishing a node.
    pub fn cancel_reservation(&self, index: u8) {
        let result = self.children[usize::from(index)].compare_exchange(
            RESERVED_SLOT,
            EMPTY_SLOT,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert!(result.is_ok(), "octant {index} was not reserved");
    }

    /// Unlinks `node` from octant `index`.
    pub fn remove_child(&self, index: u8, node: NodeIndex) -> RemovalResult {
        debug_assert!(!self.was_deleted(), "removing a child of a deleted node");

        let result = self.children[usize::from(index)].compare_exchange(
            node.0,
            EMPTY_SLOT,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if result.is_err() {
            log::warn!("Octant {index} does not contain {node:?}");
            return RemovalResult::Done;
        }

        match self.child_count.fetch_sub(1, Ordering::AcqRel) {
            1 => RemovalResult::RemovedLastElement,
            _ => RemovalResult::Done,
        }
    }

    /// Whether any octant holds a node.
    pub fn has_children(&self) -> bool { self.child_count.load(Ordering::Acquire) > 0 }

    /// Whether any component is placed in this node.
    pub fn has_components(&self) -> bool { !self.components.read().is_empty() }

    /// Whether this node has neither children nor components.
    pub fn is_empty(&self) -> bool { !self.has_children() && !self.has_components() }

    /// The components placed in this node.
    pub fn components(&self) -> RwLockReadGuard<'_, Vec<ComponentIdentifier>> { self.components.read() }

    /// Places `id` in this node.
    pub fn add_component(&self, id: ComponentIdentifier) {
        debug_assert!(!self.was_deleted(), "adding a component to a deleted node");
        debug_assert!(!self.is_flagged_for_deletion(), "adding a component to a flagged node");
        self.components.write().push(id);
    }

    /// Removes `id` from this node.
    pub fn remove_component(&self, id: ComponentIdentifier) -> RemovalResult {
        let mut components = self.components.write();
        match components.iter().position(|&other| other == id) {
            Some(position) => {
                components.swap_remove(position);
                if components.is_empty() {
                    RemovalResult::RemovedLastElement
                } else {
                    RemovalResult::Done
                }
            }
            None => RemovalResult::Done,
        }
    }

    /// Adds `mask` to the tags of this node, returning the bits that were newly set.
    pub(crate) fn merge_tags(&self, mask: u64) -> u64 {
        let previous = self.tags.fetch_or(mask, Ordering::AcqRel);
        mask & !previous
    }

    /// The union of the tags of all components placed at or below this node.
    ///
    /// Tags are only ever added while the node is live.
    pub fn tags(&self) -> u64 { self.tags.load(Ordering::Acquire) }

    /// Whether any bit of `mask` is in [`tags`](Self::tags).
    pub fn contains_any_tags(&self, mask: u64) -> bool { self.tags() & mask != 0 }

    /// Sets the flagged-for-deletion bit.
    ///
    /// Returns true only for the first caller.
    pub fn flag_for_deletion(&self) -> bool {
        let previous = self.state.fetch_or(FLAGGED_FOR_DELETION, Ordering::AcqRel);
        previous & FLAGGED_FOR_DELETION == 0
    }

    /// Whether this node has been flagged for deletion.
    pub fn is_flagged_for_deletion(&self) -> bool {
        self.state.load(Ordering::Acquire) & FLAGGED_FOR_DELETION != 0
    }

    /// Whether this node is currently in the free list of the pool.
    pub fn was_deleted(&self) -> bool { self.state.load(Ordering::Acquire) & DELETED != 0 }
}
