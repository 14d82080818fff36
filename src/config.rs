//! Sizing and threading parameters of a scene.

use std::num::NonZeroUsize;
use std::thread;

/// Parameters of [`Scene::new`](crate::Scene::new).
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    /// The maximum number of simultaneously live components.
    ///
    /// Exceeding this number is a fatal error.
    pub max_components:          u32,
    /// The maximum number of octree nodes besides the root.
    pub octree_pool_capacity:    u32,
    /// The maximum number of octree nodes queued for destruction within one frame.
    pub deletion_queue_capacity: usize,
    /// The half extent of the root octree node, in metres.
    pub root_radius:             f32,
    /// The number of worker threads besides the main thread.
    ///
    /// If zero, all stages run on the thread calling [`Scene::run_frame`](crate::Scene::run_frame).
    pub concurrency:             usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        let parallelism = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            max_components:          65536,
            octree_pool_capacity:    50_000,
            deletion_queue_capacity: 32_768,
            root_radius:             1024.,
            concurrency:             parallelism - 1,
        }
    }
}

impl SceneConfig {
    /// Sets [`max_components`](Self::max_components).
    pub fn with_max_components(mut self, max_components: u32) -> Self {
        self.max_components = max_components;
        self
    }

    /// Sets [`octree_pool_capacity`](Self::octree_pool_capacity).
    pub fn with_octree_pool_capacity(mut self, capacity: u32) -> Self {
        self.octree_pool_capacity = capacity;
        self
    }

    /// Sets [`deletion_queue_capacity`](Self::deletion_queue_capacity).
    pub fn with_deletion_queue_capacity(mut self, capacity: usize) -> Self {
        self.deletion_queue_capacity = capacity;
        self
    }

    /// Sets [`root_radius`](Self::root_radius).
    pub fn with_root_radius(mut self, radius: f32) -> Self {
        self.root_radius = radius;
        self
    }

    /// Sets [`concurrency`](Self::concurrency).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}
