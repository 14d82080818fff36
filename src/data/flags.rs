use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Lifecycle, visibility and simulation state of a hierarchy component.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ComponentFlags: u32 {
        /// The component is inside [`Scene::spawn`](crate::Scene::spawn).
        const IS_CONSTRUCTING = 1 << 0;
        /// Destruction has started. Set exactly once.
        const IS_DESTROYING = 1 << 1;
        /// The component was disabled explicitly, without affecting its children.
        const IS_DISABLED = 1 << 2;
        /// The component was disabled explicitly together with its subtree.
        const IS_DISABLED_WITH_CHILDREN = 1 << 3;
        /// Some ancestor is disabled with children.
        const WAS_DISABLED_BY_PARENT = 1 << 4;
        /// The component was detached from the spatial tree explicitly.
        const IS_DETACHED_FROM_TREE = 1 << 5;
        /// Some ancestor is detached from the spatial tree.
        const WAS_DETACHED_FROM_OCTREE_BY_PARENT = 1 << 6;
        /// The component is the root of its scene.
        const IS_ROOT_SCENE = 1 << 7;
        /// Simulation of the component is paused.
        const IS_SIMULATION_PAUSED = 1 << 8;
        /// The component is referenced from outside the scene.
        const IS_REFERENCED = 1 << 9;
        /// The component and its subtree are skipped during serialization.
        const DISABLE_SAVE_TO_DISK = 1 << 10;
        /// The component must not be cloned.
        const DISABLE_CLONING = 1 << 11;
        /// The component is the root of a mesh scene.
        const IS_MESH_SCENE = 1 << 12;

        /// Any flag that makes the component disabled.
        const DISABLED_FROM_ANY_SOURCE = Self::IS_DISABLED.bits()
            | Self::IS_DISABLED_WITH_CHILDREN.bits()
            | Self::WAS_DISABLED_BY_PARENT.bits();
        /// Any flag that keeps the component out of the spatial tree.
        const DETACHED_FROM_ANY_SOURCE = Self::IS_DETACHED_FROM_TREE.bits()
            | Self::WAS_DETACHED_FROM_OCTREE_BY_PARENT.bits();
        /// Flags derived from the state of ancestors.
        const INHERITED = Self::WAS_DISABLED_BY_PARENT.bits()
            | Self::WAS_DETACHED_FROM_OCTREE_BY_PARENT.bits();
    }
}

/// A [`ComponentFlags`] that can be updated through a shared reference.
#[derive(Debug, Default)]
pub struct AtomicFlags(AtomicU32);

impl AtomicFlags {
    /// Creates the flags with an initial value.
    pub fn new(flags: ComponentFlags) -> Self { Self(AtomicU32::new(flags.bits())) }

    /// Loads the current flags.
    pub fn load(&self) -> ComponentFlags {
        ComponentFlags::from_bits_retain(self.0.load(Ordering::Acquire))
    }

    /// Sets `flags` and returns the previous value.
    pub fn fetch_or(&self, flags: ComponentFlags) -> ComponentFlags {
        ComponentFlags::from_bits_retain(self.0.fetch_or(flags.bits(), Ordering::AcqRel))
    }

    /// Keeps only `mask` and returns the previous value.
    pub fn fetch_and(&self, mask: ComponentFlags) -> ComponentFlags {
        ComponentFlags::from_bits_retain(self.0.fetch_and(mask.bits(), Ordering::AcqRel))
    }

    /// Clears `flags` and returns the previous value.
    pub fn fetch_remove(&self, flags: ComponentFlags) -> ComponentFlags {
        self.fetch_and(flags.complement())
    }

    /// Sets `flags` only if none of them are currently set.
    ///
    /// Returns true if this call set them.
    pub fn try_set(&self, flags: ComponentFlags) -> bool {
        self.fetch_update(|current| {
            (!current.intersects(flags)).then(|| current | flags)
        })
        .is_ok()
    }

    /// Applies `f` in a compare-and-swap loop until it succeeds or returns `None`.
    pub fn fetch_update(
        &self,
        mut f: impl FnMut(ComponentFlags) -> Option<ComponentFlags>,
    ) -> Result<ComponentFlags, ComponentFlags> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                f(ComponentFlags::from_bits_retain(bits)).map(|flags| flags.bits())
            })
            .map(ComponentFlags::from_bits_retain)
            .map_err(ComponentFlags::from_bits_retain)
    }
}
