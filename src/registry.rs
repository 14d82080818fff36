//! The scene registry owns everything that is indexed by identifiers:
//! the identifier allocator, the per-type storages, the data component masks
//! and the frame graph.

use std::sync::Arc;

use xias::Xias;

use crate::component::{Component, ComponentTypeIdentifier, ComponentTypeRegistry, MAX_COMPONENT_TYPES};
use crate::frame_graph::{FrameGraph, StageGraph};
use crate::identifier::IdentifierStorage;
use crate::mask::{AtomicTypeMask, TypeMask};
use crate::scene_data::{AnySceneData, ComponentTypeSceneData};
use crate::util::AtomicBox;
use crate::ComponentIdentifier;

mod cached;
pub(crate) use cached::register_cached_types;
pub use cached::{Cached, CachedSceneData, CachedType};

/// Per-scene owner of identifiers, component storages and the frame graph.
pub struct SceneRegistry {
    types:       Arc<ComponentTypeRegistry>,
    identifiers: IdentifierStorage,
    cached:      CachedSceneData,
    /// Lazily created storages of the remaining types, indexed by type identifier.
    cold:        Box<[AtomicBox<Box<dyn AnySceneData>>]>,
    /// Data component types reserved by each component, indexed by identifier index.
    reserved:    Box<[AtomicBox<AtomicTypeMask>]>,
    /// Data component types fully created on each component, indexed by identifier index.
    live:        Box<[AtomicBox<AtomicTypeMask>]>,
    frame_graph: FrameGraph,
}

impl SceneRegistry {
    /// Creates a registry that can hold `max_components` live identifiers.
    pub(crate) fn new(types: Arc<ComponentTypeRegistry>, max_components: u32) -> Self {
        let slots = max_components.small_int::<usize>();
        Self {
            types,
            identifiers: IdentifierStorage::new(max_components),
            cached: CachedSceneData::new(),
            cold: (0..MAX_COMPONENT_TYPES).map(|_| AtomicBox::new()).collect(),
            reserved: (0..slots).map(|_| AtomicBox::new()).collect(),
            live: (0..slots).map(|_| AtomicBox::new()).collect(),
            frame_graph: FrameGraph::new(),
        }
    }

    /// The external type registry this scene resolves types through.
    pub fn types(&self) -> &ComponentTypeRegistry { &self.types }

    /// The identifier allocator.
    pub fn identifiers(&self) -> &IdentifierStorage { &self.identifiers }

    /// Acquires a fresh component identifier.
    pub fn acquire_identifier(&self) -> ComponentIdentifier {
        let id = self.identifiers.acquire();
        log::trace!("Acquired identifier {id:?}");
        id
    }

    /// Returns the identifier of a removed component to the pool.
    ///
    /// All data components of `id` must have been destroyed.
    pub fn on_component_removed(&self, id: ComponentIdentifier) {
        debug_assert!(
            !self.reserved_mask(id).map_or(false, |mask| mask.load().any()),
            "{id} is released with data components still reserved"
        );
        self.identifiers.release(id);
    }

    /// Checks whether `id` is live.
    pub fn is_valid(&self, id: ComponentIdentifier) -> bool { self.identifiers.is_valid(id) }

    /// Returns the storage of a cached type.
    pub fn cached<T: Cached>(&self) -> &ComponentTypeSceneData<T> { T::select(&self.cached) }

    /// Returns the storage of a cached type selected at runtime.
    pub fn cached_dyn(&self, ty: CachedType) -> &dyn AnySceneData { self.cached.get_dyn(ty) }

    /// Returns the storage of `T` if it has been created in this scene.
    pub fn find_component_type_data<T: Component>(&self) -> Option<&ComponentTypeSceneData<T>> {
        let ty = self.types.find::<T>()?;
        let data = self.find_component_type_data_dyn(ty)?;
        Some(downcast(data))
    }

    /// Returns the storage of `T`, registering the type and creating the storage if necessary.
    pub fn get_or_create_component_type_data<T: Component>(&self) -> &ComponentTypeSceneData<T> {
        let ty = self.types.register::<T>();
        downcast(self.get_or_create_component_type_data_dyn(ty))
    }

    /// Returns the storage of the type `ty` if it has been created in this scene.
    pub fn find_component_type_data_dyn(&self, ty: ComponentTypeIdentifier) -> Option<&dyn AnySceneData> {
        if let Some(cached) = CachedType::from_type_identifier(ty) {
            return Some(self.cached_dyn(cached));
        }
        self.cold.get(ty.to_usize())?.get().map(|data| &**data)
    }

    /// Returns the storage of the type `ty`, creating it if necessary.
    ///
    /// Concurrent first accesses race on a compare-and-swap;
    /// exactly one storage is published and the others are dropped unused.
    ///
    /// # Panics
    /// Panics if `ty` is not registered in the type registry.
    pub fn get_or_create_component_type_data_dyn(
        &self,
        ty: ComponentTypeIdentifier,
    ) -> &dyn AnySceneData {
        if let Some(cached) = CachedType::from_type_identifier(ty) {
            return self.cached_dyn(cached);
        }

        let slot = self.cold.get(ty.to_usize()).expect("type identifier out of range");
        let data = slot.get_or_init(|| match self.types.create_scene_data(ty) {
            Some(data) => {
                log::debug!("Created scene data for {}", data.type_name());
                data
            }
            None => panic!("Component type {ty} is not registered"),
        });
        &**data
    }

    /// Iterates over all storages created in this scene, cached ones first.
    pub fn iter_component_type_data(&self) -> impl Iterator<Item = &dyn AnySceneData> + '_ {
        use strum::IntoEnumIterator;

        CachedType::iter()
            .map(|ty| self.cached_dyn(ty))
            .chain(self.cold.iter().filter_map(|slot| slot.get().map(|data| &**data)))
    }

    /// The masks are indexed by identifier index,
    /// so a stale identifier must not see the masks of the component now at its index.
    fn reserved_mask(&self, id: ComponentIdentifier) -> Option<&AtomicTypeMask> {
        if !self.is_valid(id) {
            return None;
        }
        self.reserved.get(id.to_usize()).expect("identifier index out of range").get()
    }

    fn live_mask(&self, id: ComponentIdentifier) -> Option<&AtomicTypeMask> {
        if !self.is_valid(id) {
            return None;
        }
        self.live.get(id.to_usize()).expect("identifier index out of range").get()
    }

    fn reserved_mask_or_init(&self, id: ComponentIdentifier) -> &AtomicTypeMask {
        self.reserved.get(id.to_usize()).expect("identifier index out of range").get_or_init(Default::default)
    }

    fn live_mask_or_init(&self, id: ComponentIdentifier) -> &AtomicTypeMask {
        self.live.get(id.to_usize()).expect("identifier index out of range").get_or_init(Default::default)
    }

    /// Reserves the data component `ty` on `id`.
    ///
    /// Returns false if it was already reserved or `id` is stale,
    /// in which case the caller must not construct the component.
    pub fn reserve_data_component(&self, id: ComponentIdentifier, ty: ComponentTypeIdentifier) -> bool {
        if !self.is_valid(id) {
            log::debug!("Refusing to reserve data component {ty} on stale {id}");
            return false;
        }
        self.reserved_mask_or_init(id).set(ty)
    }

    /// Checks whether the data component `ty` is reserved on `id`.
    pub fn has_reserved_data_component_of_type(
        &self,
        id: ComponentIdentifier,
        ty: ComponentTypeIdentifier,
    ) -> bool {
        self.reserved_mask(id).map_or(false, |mask| mask.is_set(ty))
    }

    /// Marks the reserved data component `ty` on `id` as live.
    ///
    /// # Panics
    /// Panics if the component was not reserved.
    pub fn on_data_component_created(&self, id: ComponentIdentifier, ty: ComponentTypeIdentifier) {
        assert!(
            self.has_reserved_data_component_of_type(id, ty),
            "Data component {ty} of {id} was created without a reservation"
        );
        let new = self.live_mask_or_init(id).set(ty);
        assert!(new, "Data component {ty} of {id} was marked as created twice");
    }

    /// Checks whether the data component `ty` is live on `id`.
    pub fn has_data_component_of_type(&self, id: ComponentIdentifier, ty: ComponentTypeIdentifier) -> bool {
        self.live_mask(id).map_or(false, |mask| mask.is_set(ty))
    }

    /// Checks whether `id` has any live data component.
    pub fn has_data_components(&self, id: ComponentIdentifier) -> bool {
        self.live_mask(id).map_or(false, |mask| mask.load().any())
    }

    /// The number of live data components on `id`.
    pub fn data_component_count(&self, id: ComponentIdentifier) -> usize {
        self.live_mask(id).map_or(0, |mask| mask.load().count())
    }

    /// A snapshot of the live data components on `id`.
    pub fn data_component_mask(&self, id: ComponentIdentifier) -> TypeMask {
        self.live_mask(id).map_or_else(TypeMask::default, AtomicTypeMask::load)
    }

    /// Clears the live bit of the data component `ty` on `id`.
    ///
    /// This is the first of the two removal steps;
    /// queries stop seeing the component from here on.
    /// Returns false if it was not live.
    pub fn on_data_component_removed(&self, id: ComponentIdentifier, ty: ComponentTypeIdentifier) -> bool {
        self.live_mask(id).map_or(false, |mask| mask.clear(ty))
    }

    /// Clears all live bits of `id` at once, returning the data components that were live.
    ///
    /// Each returned type must then be destroyed, which releases its reservation.
    pub fn start_batch_component_removal(&self, id: ComponentIdentifier) -> TypeMask {
        self.live_mask(id).map_or_else(TypeMask::default, AtomicTypeMask::fetch_clear)
    }

    /// Clears the reservation of the data component `ty` on `id`.
    ///
    /// This is the second of the two removal steps.
    ///
    /// # Panics
    /// Panics if the live bit is still set.
    pub fn on_data_component_destroyed(&self, id: ComponentIdentifier, ty: ComponentTypeIdentifier) {
        assert!(
            !self.has_data_component_of_type(id, ty),
            "Data component {ty} of {id} must be removed before it is destroyed"
        );
        if let Some(mask) = self.reserved_mask(id) {
            mask.clear(ty);
        }
    }

    /// Requests an edit to the frame graph.
    ///
    /// The edit is never applied immediately.
    /// It is queued and applied in submission order at the start of the next frame,
    /// when no stage is running.
    pub fn modify_frame_graph(&self, callback: impl FnOnce(&mut StageGraph) + Send + 'static) {
        self.frame_graph.modify(Box::new(callback));
    }

    /// The number of frame graph edits waiting for the next frame.
    pub fn pending_frame_graph_modifications(&self) -> usize { self.frame_graph.pending() }

    /// Reads the current frame graph.
    ///
    /// Queued edits are not visible until they are flushed.
    pub fn inspect_frame_graph<R>(&self, f: impl FnOnce(&StageGraph) -> R) -> R { self.frame_graph.inspect(f) }

    pub(crate) fn frame_graph(&self) -> &FrameGraph { &self.frame_graph }
}

fn downcast<T: Component>(data: &dyn AnySceneData) -> &ComponentTypeSceneData<T> {
    match data.as_any().downcast_ref() {
        Some(data) => data,
        None => panic!("Scene data of {} does not store {}", data.type_name(), T::NAME),
    }
}

#[cfg(test)]
mod tests;
