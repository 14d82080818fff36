//! Per-type scene data: the dense storage of one component type in one scene.

use std::any::Any;

use bitvec::prelude::BitVec;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::component::{Component, ComponentTypeIdentifier};
use crate::error::{Error, Result};
use crate::frame_graph::{Anchor, StageId};
use crate::hierarchy::{Spawn, SpawnOptions};
use crate::storage::VecStorage;
use crate::{ComponentIdentifier, Scene};

/// A stored value together with the identifier that owns it.
///
/// Lookups compare the owner against the requested identifier,
/// so a stale identifier never resolves to a newer instance at the same index.
/// `value` is `None` while the instance is checked out by its own update.
struct Instance<T> {
    owner: ComponentIdentifier,
    value: Option<T>,
}

#[derive(Default)]
struct UpdateRegistration {
    members: BitVec,
    count:   usize,
}

impl UpdateRegistration {
    fn contains(&self, index: usize) -> bool { self.members.get(index).map_or(false, |bit| *bit) }

    /// Returns true if `index` was not a member.
    fn insert(&mut self, index: usize) -> bool {
        if self.contains(index) {
            return false;
        }
        if self.members.len() <= index {
            self.members.resize(index + 1, false);
        }
        self.members.set(index, true);
        self.count += 1;
        true
    }

    /// Returns true if `index` was a member.
    fn remove(&mut self, index: usize) -> bool {
        if !self.contains(index) {
            return false;
        }
        self.members.set(index, false);
        self.count -= 1;
        true
    }
}

/// Dense storage and update bookkeeping for all instances of `T` in a scene.
pub struct ComponentTypeSceneData<T: Component> {
    ty:      ComponentTypeIdentifier,
    storage: RwLock<VecStorage<Instance<T>>>,
    updates: Mutex<UpdateRegistration>,
}

impl<T: Component> ComponentTypeSceneData<T> {
    pub(crate) fn new(ty: ComponentTypeIdentifier) -> Self {
        Self {
            ty,
            storage: RwLock::new(VecStorage::default()),
            updates: Mutex::new(UpdateRegistration::default()),
        }
    }

    /// The type identifier this storage was created for.
    pub fn type_identifier(&self) -> ComponentTypeIdentifier { self.ty }

    /// Stores `value` as the instance of `id`.
    ///
    /// For data components this runs the reserve, construct, mark-created protocol
    /// and returns false without storing anything if `id` already reserved this type.
    ///
    /// # Panics
    /// Panics if a hierarchy component instance already exists for `id`.
    pub fn create_instance(
        &self,
        scene: &Scene,
        id: ComponentIdentifier,
        parent: Option<ComponentIdentifier>,
        value: T,
    ) -> bool {
        if T::IS_DATA_COMPONENT && !scene.registry().reserve_data_component(id, self.ty) {
            log::debug!("{id} already has a {} reserved", T::NAME);
            return false;
        }

        {
            let mut storage = self.storage.write();
            let old = storage.set(id.to_usize(), Some(Instance { owner: id, value: Some(value) }));
            assert!(old.is_none(), "{id} already has an instance of {}", T::NAME);
        }

        if T::IS_DATA_COMPONENT {
            scene.registry().on_data_component_created(id, self.ty);
        }
        scene.tracer().create_instance(self.ty, T::NAME, id);

        T::on_created(scene, id, parent);
        true
    }

    /// Returns a read guard to the instance of `id`, if present.
    ///
    /// Returns `None` while the instance is running its own [`Component::update`].
    pub fn get_component_implementation(
        &self,
        id: ComponentIdentifier,
    ) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.storage.read(), |storage| match storage.get(id.to_usize()) {
            Some(instance) if instance.owner == id => instance.value.as_ref(),
            _ => None,
        })
        .ok()
    }

    /// Returns a read guard to the instance of `id`.
    ///
    /// # Panics
    /// Panics if `id` has no instance of this type.
    pub fn get_component_implementation_unchecked(
        &self,
        id: ComponentIdentifier,
    ) -> MappedRwLockReadGuard<'_, T> {
        match self.get_component_implementation(id) {
            Some(guard) => guard,
            None => panic!("{id} has no instance of {}", T::NAME),
        }
    }

    /// Returns a write guard to the instance of `id`, if present.
    pub fn get_mut(&self, id: ComponentIdentifier) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.storage.write(), |storage| {
            match storage.get_mut(id.to_usize()) {
                Some(instance) if instance.owner == id => instance.value.as_mut(),
                _ => None,
            }
        })
        .ok()
    }

    /// Runs `f` on the instance of `id` under a read lock.
    pub fn with<R>(&self, id: ComponentIdentifier, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.get_component_implementation(id).map(|guard| f(&guard))
    }

    /// Runs `f` on the instance of `id` under a write lock.
    pub fn with_mut<R>(&self, id: ComponentIdentifier, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.get_mut(id).map(|mut guard| f(&mut guard))
    }

    /// Checks whether `id` has an instance of this type.
    pub fn contains(&self, id: ComponentIdentifier) -> bool {
        matches!(self.storage.read().get(id.to_usize()), Some(instance) if instance.owner == id)
    }

    /// The number of stored instances.
    pub fn len(&self) -> usize { self.storage.read().cardinality() }

    /// Whether no instances are stored.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns the owners of all stored instances in index order.
    pub fn iter_identifiers(&self) -> Vec<ComponentIdentifier> {
        self.storage.read().iter().map(|(_, instance)| instance.owner).collect()
    }

    /// Notifies `T` that the instance of `id` is about to be removed.
    pub fn on_before_remove_instance(&self, scene: &Scene, id: ComponentIdentifier) {
        T::on_destroying(scene, id);
    }

    /// Removes the instance of `id` and returns it.
    ///
    /// Must be called after [`on_before_remove_instance`](Self::on_before_remove_instance).
    /// For data components, the live bit must already be cleared
    /// through [`SceneRegistry::on_data_component_removed`](crate::registry::SceneRegistry::on_data_component_removed)
    /// or a batch removal; the reservation is released here.
    ///
    /// An instance removed from within its own [`Component::update`] is released immediately,
    /// but its value is only dropped when the update returns, so `None` is returned.
    pub fn remove_instance(&self, scene: &Scene, id: ComponentIdentifier) -> Option<T> {
        self.remove_slot(scene, id).and_then(|instance| instance.value)
    }

    fn remove_slot(&self, scene: &Scene, id: ComponentIdentifier) -> Option<Instance<T>> {
        let removed = {
            let mut storage = self.storage.write();
            let owned = matches!(storage.get(id.to_usize()), Some(instance) if instance.owner == id);
            if owned {
                storage.set(id.to_usize(), None)
            } else {
                None
            }
        };

        if removed.is_some() {
            self.disable_update(scene, id);
            if T::IS_DATA_COMPONENT {
                scene.registry().on_data_component_destroyed(id, self.ty);
            }
            scene.tracer().remove_instance(self.ty, T::NAME, id);
        }

        removed
    }

    /// Registers the instance of `id` for the per-frame [`Component::update`].
    ///
    /// Returns false if it was already registered or does not exist.
    /// The first registration adds the update stage of this type to the frame graph.
    pub fn enable_update(&self, scene: &Scene, id: ComponentIdentifier) -> bool {
        if !self.contains(id) {
            return false;
        }

        let mut updates = self.updates.lock();
        if !updates.insert(id.to_usize()) {
            return false;
        }

        if updates.count == 1 {
            // enqueued under the registration lock so that add and remove commands keep their order
            let ty = self.ty;
            scene.registry().modify_frame_graph(move |graph| {
                let stage = StageId::ComponentUpdate(ty);
                graph.add_stage(stage, None);
                graph.add_subsequent_stage(StageId::Anchor(Anchor::DynamicUpdatesStart), stage);
                graph.add_subsequent_stage(
                    stage,
                    StageId::Anchor(Anchor::DynamicRenderUpdatesFinished),
                );
                graph.add_subsequent_stage(
                    stage,
                    StageId::Anchor(Anchor::DynamicLateUpdatesFinished),
                );
            });
        }
        true
    }

    /// Deregisters the instance of `id` from per-frame updates.
    ///
    /// Returns false if it was not registered.
    /// The last deregistration removes the update stage of this type from the frame graph.
    pub fn disable_update(&self, scene: &Scene, id: ComponentIdentifier) -> bool {
        let mut updates = self.updates.lock();
        if !updates.remove(id.to_usize()) {
            return false;
        }

        if updates.count == 0 {
            let ty = self.ty;
            scene.registry().modify_frame_graph(move |graph| {
                graph.remove_stage(StageId::ComponentUpdate(ty));
            });
        }
        true
    }

    /// Checks whether the instance of `id` is registered for updates.
    pub fn is_update_enabled(&self, id: ComponentIdentifier) -> bool {
        self.updates.lock().contains(id.to_usize())
    }

    /// The number of instances registered for updates.
    pub fn update_count(&self) -> usize { self.updates.lock().count }

    /// Runs [`Component::update`] on every registered instance.
    ///
    /// No lock is held while an update runs,
    /// so updates may destroy components or change registrations of any type, including their own.
    fn run_updates(&self, scene: &Scene) {
        let members: Vec<usize> = self.updates.lock().members.iter_ones().collect();
        for index in members {
            let checked_out = match self.storage.write().get_mut(index) {
                Some(instance) => instance.value.take().map(|value| (instance.owner, value)),
                None => None,
            };
            let (owner, mut value) = match checked_out {
                Some(checked_out) => checked_out,
                None => continue,
            };

            value.update(scene, owner);

            let mut storage = self.storage.write();
            match storage.get_mut(index) {
                Some(instance) if instance.owner == owner && instance.value.is_none() => {
                    instance.value = Some(value)
                }
                _ => log::trace!("{owner} was removed during its {} update", T::NAME),
            }
        }
    }
}

/// A structural event delivered to the instance of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// See [`Component::on_enable`].
    Enable,
    /// See [`Component::on_disable`].
    Disable,
    /// See [`Component::on_attached_to_tree`].
    AttachedToTree {
        /// The parent of the component, if any.
        parent: Option<ComponentIdentifier>,
    },
    /// See [`Component::on_detached_from_tree`].
    DetachedFromTree,
    /// See [`Component::on_child_attached`].
    ChildAttached {
        /// The attached child.
        child: ComponentIdentifier,
        /// The position of the child in the child list.
        index: usize,
    },
    /// See [`Component::on_child_detached`].
    ChildDetached {
        /// The detached child.
        child: ComponentIdentifier,
    },
    /// See [`Component::on_attached_to_new_parent`].
    AttachedToNewParent,
    /// See [`Component::on_before_detach_from_parent`].
    BeforeDetachFromParent,
    /// See [`Component::on_simulation_paused`].
    SimulationPaused,
    /// See [`Component::on_simulation_resumed`].
    SimulationResumed,
}

/// The object-safe interface of [`ComponentTypeSceneData`],
/// used where the component type is only known by its identifier.
pub trait AnySceneData: Send + Sync + 'static {
    /// The identifier of the stored type.
    fn type_identifier(&self) -> ComponentTypeIdentifier;

    /// The [`Component::NAME`] of the stored type.
    fn type_name(&self) -> &'static str;

    /// The [`Component::IS_DATA_COMPONENT`] of the stored type.
    fn is_data_component(&self) -> bool;

    /// Checks whether `id` has an instance of this type.
    fn contains(&self, id: ComponentIdentifier) -> bool;

    /// The number of stored instances.
    fn len(&self) -> usize;

    /// Whether no instances are stored.
    fn is_empty(&self) -> bool { self.len() == 0 }

    /// See [`ComponentTypeSceneData::on_before_remove_instance`].
    fn on_before_remove_instance(&self, scene: &Scene, id: ComponentIdentifier);

    /// Removes and drops the instance of `id`, returning whether it existed.
    fn remove_instance(&self, scene: &Scene, id: ComponentIdentifier) -> bool;

    /// Delivers `notification` to the instance of `id`.
    fn notify(&self, scene: &Scene, id: ComponentIdentifier, notification: Notification);

    /// Serializes the instance of `id` if it exists and its type is persisted.
    fn serialize_instance(&self, id: ComponentIdentifier) -> Option<serde_json::Value>;

    /// Deserializes `value` and stores it as the data component of `id`,
    /// replacing any existing instance.
    fn deserialize_data_component(
        &self,
        scene: &Scene,
        id: ComponentIdentifier,
        value: &serde_json::Value,
    ) -> Result<()>;

    /// Deserializes `value` and spawns it as a hierarchy component under `parent`.
    fn spawn_deserialized(
        &self,
        scene: &Scene,
        parent: ComponentIdentifier,
        options: SpawnOptions,
        value: &serde_json::Value,
    ) -> Result<ComponentIdentifier>;

    /// Runs [`Component::update`] on every registered instance.
    fn run_updates(&self, scene: &Scene);

    /// Casts to [`Any`] for downcasting to the concrete storage.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Component> AnySceneData for ComponentTypeSceneData<T> {
    fn type_identifier(&self) -> ComponentTypeIdentifier { self.ty }

    fn type_name(&self) -> &'static str { T::NAME }

    fn is_data_component(&self) -> bool { T::IS_DATA_COMPONENT }

    fn contains(&self, id: ComponentIdentifier) -> bool { ComponentTypeSceneData::contains(self, id) }

    fn len(&self) -> usize { ComponentTypeSceneData::len(self) }

    fn on_before_remove_instance(&self, scene: &Scene, id: ComponentIdentifier) {
        ComponentTypeSceneData::on_before_remove_instance(self, scene, id)
    }

    fn remove_instance(&self, scene: &Scene, id: ComponentIdentifier) -> bool {
        self.remove_slot(scene, id).is_some()
    }

    fn notify(&self, scene: &Scene, id: ComponentIdentifier, notification: Notification) {
        match notification {
            Notification::Enable => T::on_enable(scene, id),
            Notification::Disable => T::on_disable(scene, id),
            Notification::AttachedToTree { parent } => T::on_attached_to_tree(scene, id, parent),
            Notification::DetachedFromTree => T::on_detached_from_tree(scene, id),
            Notification::ChildAttached { child, index } => {
                T::on_child_attached(scene, id, child, index)
            }
            Notification::ChildDetached { child } => T::on_child_detached(scene, id, child),
            Notification::AttachedToNewParent => T::on_attached_to_new_parent(scene, id),
            Notification::BeforeDetachFromParent => T::on_before_detach_from_parent(scene, id),
            Notification::SimulationPaused => T::on_simulation_paused(scene, id),
            Notification::SimulationResumed => T::on_simulation_resumed(scene, id),
        }
    }

    fn serialize_instance(&self, id: ComponentIdentifier) -> Option<serde_json::Value> {
        self.with(id, T::serialize).flatten()
    }

    fn deserialize_data_component(
        &self,
        scene: &Scene,
        id: ComponentIdentifier,
        value: &serde_json::Value,
    ) -> Result<()> {
        if !T::IS_DATA_COMPONENT {
            return Err(Error::Malformed(format!("{} is not a data component", T::NAME)));
        }

        let value = T::deserialize(value)?;
        match self.get_mut(id) {
            Some(mut existing) => *existing = value,
            None if self.contains(id) => {
                return Err(Error::Malformed(format!("{id} is running its {} update", T::NAME)))
            }
            None => {
                let created = self.create_instance(scene, id, None, value);
                assert!(created, "{id} reserved {} without storing an instance", T::NAME);
            }
        }
        Ok(())
    }

    fn spawn_deserialized(
        &self,
        scene: &Scene,
        parent: ComponentIdentifier,
        options: SpawnOptions,
        value: &serde_json::Value,
    ) -> Result<ComponentIdentifier> {
        if T::IS_DATA_COMPONENT {
            return Err(Error::Malformed(format!(
                "{} is a data component and cannot be spawned",
                T::NAME
            )));
        }

        let value = T::deserialize(value)?;
        scene.spawn(Spawn::new(value).with_parent(parent).with_options(options))
    }

    fn run_updates(&self, scene: &Scene) { ComponentTypeSceneData::run_updates(self, scene) }

    fn as_any(&self) -> &dyn Any { self }
}
