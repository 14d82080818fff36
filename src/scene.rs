//! The scene owns one tree of hierarchy components and everything indexed by them.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{MappedRwLockReadGuard, Mutex};

use crate::component::ComponentTypeRegistry;
use crate::config::SceneConfig;
use crate::data::{ComponentFlags, Flags, Transform, TypeIndex};
use crate::error::Result;
use crate::frame_graph;
use crate::hierarchy::{self, ChildTable, HierarchyComponent, SceneRoot, Spawn};
use crate::octree::RootSceneComponent;
use crate::registry::SceneRegistry;
use crate::tracer::Tracer;
use crate::{Component, ComponentIdentifier};

/// A tree of hierarchy components with its spatial index and frame graph.
pub struct Scene {
    config:      SceneConfig,
    registry:    SceneRegistry,
    children:    ChildTable,
    octree:      RootSceneComponent,
    root:        Option<ComponentIdentifier>,
    tracer:      Box<dyn Tracer>,
    thread_pool: Option<rayon::ThreadPool>,
    /// Serializes calls to [`run_frame`](Self::run_frame).
    frame:       Mutex<()>,
}

impl Scene {
    /// Creates a scene with a root component and an empty octree.
    ///
    /// `types` may be shared with other scenes.
    /// Fails only if the worker thread pool cannot be started.
    pub fn new(config: SceneConfig, types: Arc<ComponentTypeRegistry>, tracer: Box<dyn Tracer>) -> Result<Self> {
        let thread_pool = match config.concurrency {
            0 => None,
            concurrency => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(concurrency)
                    .thread_name(|i| format!("dynec-scene executor #{i}"))
                    .build()?,
            ),
        };

        let mut scene = Self {
            registry: SceneRegistry::new(types, config.max_components),
            children: ChildTable::new(config.max_components),
            octree: RootSceneComponent::new(
                config.root_radius,
                config.octree_pool_capacity,
                config.deletion_queue_capacity,
            ),
            root: None,
            tracer,
            thread_pool,
            frame: Mutex::new(()),
            config,
        };

        let root = hierarchy::construct(
            &scene,
            Spawn::new(SceneRoot)
                .with_flags(ComponentFlags::IS_ROOT_SCENE)
                .with_world_transform(Transform::IDENTITY),
        );
        scene.root = Some(root);
        scene.octree.enable(&scene.registry);

        log::debug!("Created scene with root {root}");
        Ok(scene)
    }

    /// Runs one frame.
    ///
    /// Frame graph edits queued since the previous frame are applied first,
    /// then every stage runs once in dependency order.
    ///
    /// # Panics
    /// Panics if the frame graph has a cycle.
    pub fn run_frame(&self) {
        let _frame = self.frame.lock();
        let start = Instant::now();
        self.tracer.start_frame();

        let frame_graph = self.registry.frame_graph();
        let applied = frame_graph.flush();
        if applied > 0 {
            self.tracer.flush_frame_graph(applied);
        }

        let topology = frame_graph.topology();
        frame_graph::execute(self, &topology, self.thread_pool.as_ref(), self.config.concurrency);

        self.tracer.end_frame(start.elapsed());
    }

    /// The configuration this scene was created with.
    pub fn config(&self) -> &SceneConfig { &self.config }

    /// The registry of identifiers, storages and the frame graph.
    pub fn registry(&self) -> &SceneRegistry { &self.registry }

    /// The tracer receiving the events of this scene.
    pub fn tracer(&self) -> &dyn Tracer { &*self.tracer }

    /// The octree of this scene.
    pub fn octree(&self) -> &RootSceneComponent { &self.octree }

    pub(crate) fn children(&self) -> &ChildTable { &self.children }

    /// The identifier of the root component.
    pub fn root_id(&self) -> ComponentIdentifier { self.root.expect("the root is constructed in Scene::new") }

    /// The root component.
    pub fn root(&self) -> HierarchyComponent<'_> { HierarchyComponent::new(self, self.root_id()) }

    /// Returns a handle to the hierarchy component `id` if it is live.
    pub fn component(&self, id: ComponentIdentifier) -> Option<HierarchyComponent<'_>> {
        (self.registry.is_valid(id) && self.registry.cached::<TypeIndex>().contains(id))
            .then(|| HierarchyComponent::new(self, id))
    }

    /// Destroys the hierarchy component `id` and its subtree.
    ///
    /// See [`HierarchyComponent::destroy`].
    pub fn destroy(&self, id: ComponentIdentifier) -> bool {
        self.component(id).map_or(false, |component| component.destroy())
    }

    /// The flags of `id`, or `IS_DISABLED | IS_DESTROYING` if it has none.
    pub fn flags(&self, id: ComponentIdentifier) -> ComponentFlags {
        self.registry
            .cached::<Flags>()
            .with(id, |flags| flags.0.load())
            .unwrap_or(ComponentFlags::IS_DISABLED | ComponentFlags::IS_DESTROYING)
    }

    /// Returns the instance of the hierarchy component `id` if it is a `T`.
    pub fn component_implementation<T: Component>(
        &self,
        id: ComponentIdentifier,
    ) -> Option<MappedRwLockReadGuard<'_, T>> {
        self.registry.find_component_type_data::<T>()?.get_component_implementation(id)
    }

    /// Attaches the data component `value` to `id`.
    ///
    /// Returns false and drops `value` if `id` already has a `T`.
    pub fn create_data_component<T: Component>(&self, id: ComponentIdentifier, value: T) -> bool {
        debug_assert!(T::IS_DATA_COMPONENT, "{} is not a data component", T::NAME);
        self.registry.get_or_create_component_type_data::<T>().create_instance(self, id, None, value)
    }

    /// Detaches and returns the data component `T` of `id`.
    pub fn remove_data_component<T: Component>(&self, id: ComponentIdentifier) -> Option<T> {
        let data = self.registry.find_component_type_data::<T>()?;
        if !self.registry.on_data_component_removed(id, data.type_identifier()) {
            return None;
        }
        data.on_before_remove_instance(self, id);
        data.remove_instance(self, id)
    }

    /// Returns the data component `T` of `id`.
    pub fn data_component<T: Component>(&self, id: ComponentIdentifier) -> Option<MappedRwLockReadGuard<'_, T>> {
        let data = self.registry.find_component_type_data::<T>()?;
        if !self.registry.has_data_component_of_type(id, data.type_identifier()) {
            return None;
        }
        data.get_component_implementation(id)
    }

    /// Checks whether `id` has a live data component `T`.
    pub fn has_data_component<T: Component>(&self, id: ComponentIdentifier) -> bool {
        self.registry
            .types()
            .find::<T>()
            .map_or(false, |ty| self.registry.has_data_component_of_type(id, ty))
    }
}

#[cfg(test)]
mod tests;
