//! The scene tree.
//!
//! Every hierarchy component except the scene root has a parent
//! and an ordered position in the child list of that parent.
//! A [`HierarchyComponent`] is a borrowed handle to one node of the tree,
//! exposing the structural operations:
//! construction through [`Scene::spawn`], destruction, reparenting,
//! the cascading enable and detach states, tags and transforms.
//!
//! # Cascading flags
//! Disabling and detaching from the spatial tree both have cascading variants
//! that also affect all descendants.
//! Descendants record this in an inherited flag
//! (see [`ComponentFlags::WAS_DISABLED_BY_PARENT`]
//! and [`ComponentFlags::WAS_DETACHED_FROM_OCTREE_BY_PARENT`]),
//! which is kept consistent across reparenting and construction.
//! Hooks such as [`Component::on_disable`](crate::Component::on_disable)
//! only fire when the effective state of a component changes.

use uuid::Uuid;

use crate::data::{
    Aabb, BoundingBox, ComponentFlags, Flags, InstanceGuid, LocalTransform3D, Parent, Tags,
    Transform, TypeIndex, WorldTransform,
};
use crate::error::{Error, Result};
use crate::octree::RootSceneComponent;
use crate::scene_data::Notification;
use crate::{Component, ComponentIdentifier, Scene};

mod cascade;
use cascade::Family;
mod children;
pub(crate) use children::ChildTable;
mod spawn;
pub(crate) use spawn::construct;
pub use spawn::{Spawn, SpawnOptions};

/// A borrowed handle to a live hierarchy component.
#[derive(Clone, Copy)]
pub struct HierarchyComponent<'scene> {
    scene: &'scene Scene,
    id:    ComponentIdentifier,
}

impl<'scene> HierarchyComponent<'scene> {
    pub(crate) fn new(scene: &'scene Scene, id: ComponentIdentifier) -> Self { Self { scene, id } }

    /// The identifier of this component.
    pub fn id(&self) -> ComponentIdentifier { self.id }

    /// The scene owning this component.
    pub fn scene(&self) -> &'scene Scene { self.scene }

    /// The component type of this component.
    pub fn type_identifier(&self) -> Option<crate::component::ComponentTypeIdentifier> {
        self.scene.registry().cached::<TypeIndex>().with(self.id, |ty| ty.0)
    }

    /// The current flags, or `IS_DISABLED | IS_DESTROYING` if the component is gone.
    pub fn flags(&self) -> ComponentFlags { self.scene.flags(self.id) }

    /// Whether no source disables this component.
    pub fn is_enabled(&self) -> bool { !self.flags().intersects(ComponentFlags::DISABLED_FROM_ANY_SOURCE) }

    /// Whether any source disables this component.
    pub fn is_disabled(&self) -> bool { !self.is_enabled() }

    /// Whether this component or an ancestor is detached from the spatial tree.
    pub fn is_detached_from_tree(&self) -> bool {
        self.flags().intersects(ComponentFlags::DETACHED_FROM_ANY_SOURCE)
    }

    /// Whether destruction of this component has started.
    pub fn is_destroying(&self) -> bool { self.flags().contains(ComponentFlags::IS_DESTROYING) }

    /// Whether this component is the root of its scene.
    pub fn is_root_scene(&self) -> bool { self.flags().contains(ComponentFlags::IS_ROOT_SCENE) }

    /// Whether simulation of this component is paused.
    pub fn is_simulation_paused(&self) -> bool { self.flags().contains(ComponentFlags::IS_SIMULATION_PAUSED) }

    /// Whether this component is referenced from outside the scene.
    pub fn is_referenced(&self) -> bool { self.flags().contains(ComponentFlags::IS_REFERENCED) }

    /// Whether this component is written by [`Scene::serialize_component`].
    pub fn is_save_to_disk_enabled(&self) -> bool {
        !self.flags().contains(ComponentFlags::DISABLE_SAVE_TO_DISK)
    }

    /// Whether this component must not be cloned.
    pub fn is_cloning_disabled(&self) -> bool { self.flags().contains(ComponentFlags::DISABLE_CLONING) }

    /// Whether this component is the root of a mesh scene.
    pub fn is_mesh_scene(&self) -> bool { self.flags().contains(ComponentFlags::IS_MESH_SCENE) }

    /// The parent of this component, or `None` for the scene root.
    pub fn parent(&self) -> Option<HierarchyComponent<'scene>> {
        parent_of(self.scene, self.id).map(|parent| Self::new(self.scene, parent))
    }

    /// A snapshot of the children in order.
    pub fn children(&self) -> Vec<ComponentIdentifier> { self.scene.children().snapshot(self.id) }

    /// The number of children.
    pub fn child_count(&self) -> usize { self.scene.children().len(self.id) }

    /// The persistent GUID of this component.
    pub fn guid(&self) -> Option<Uuid> { self.scene.registry().cached::<InstanceGuid>().with(self.id, |guid| guid.0) }

    /// Clears the local disable flag. Returns false if it was not set.
    pub fn enable(&self) -> bool {
        cascade::change(self.scene, self.id, Family::DISABLE, ComponentFlags::IS_DISABLED, false)
    }

    /// Disables only this component. Returns false if it was already disabled locally.
    pub fn disable(&self) -> bool {
        cascade::change(self.scene, self.id, Family::DISABLE, ComponentFlags::IS_DISABLED, true)
    }

    /// Clears the cascading disable flag. Returns false if it was not set.
    pub fn enable_with_children(&self) -> bool {
        cascade::change(self.scene, self.id, Family::DISABLE, ComponentFlags::IS_DISABLED_WITH_CHILDREN, false)
    }

    /// Disables this component and all its descendants.
    /// Returns false if it was already disabled with children.
    pub fn disable_with_children(&self) -> bool {
        cascade::change(self.scene, self.id, Family::DISABLE, ComponentFlags::IS_DISABLED_WITH_CHILDREN, true)
    }

    /// Reattaches this subtree to the spatial tree. Returns false if it was not detached explicitly.
    pub fn attach_to_octree(&self) -> bool {
        cascade::change(self.scene, self.id, Family::DETACH, ComponentFlags::IS_DETACHED_FROM_TREE, false)
    }

    /// Removes this subtree from the spatial tree. Returns false if it was already detached explicitly.
    ///
    /// The scene root cannot be detached.
    pub fn detach_from_octree(&self) -> bool {
        if self.is_root_scene() {
            log::debug!("Refusing to detach the scene root {} from the octree", self.id);
            return false;
        }
        cascade::change(self.scene, self.id, Family::DETACH, ComponentFlags::IS_DETACHED_FROM_TREE, true)
    }

    /// Moves `child` under this component at `index`. See [`attach_to_new_parent`](Self::attach_to_new_parent).
    pub fn attach_child(&self, child: ComponentIdentifier, index: Option<usize>) -> Result<usize> {
        match self.scene.component(child) {
            Some(child) => child.attach_to_new_parent(self.id, index),
            None => Err(Error::StaleIdentifier(child)),
        }
    }

    /// Moves this component under `new_parent`.
    ///
    /// The component is inserted at `index`,
    /// or according to its preferred index if `index` is `None`.
    /// Its world transform is kept and its local transform is recomputed.
    /// Returns the position in the new child list.
    ///
    /// Fails with [`Error::CyclicHierarchy`] if `new_parent` is this component or a descendant,
    /// and with [`Error::StaleIdentifier`] if either component is not live.
    pub fn attach_to_new_parent(&self, new_parent: ComponentIdentifier, index: Option<usize>) -> Result<usize> {
        let scene = self.scene;
        for id in [self.id, new_parent] {
            if scene.component(id).is_none() || scene.flags(id).contains(ComponentFlags::IS_DESTROYING) {
                return Err(Error::StaleIdentifier(id));
            }
        }

        let mut ancestor = Some(new_parent);
        while let Some(id) = ancestor {
            if id == self.id {
                return Err(Error::CyclicHierarchy { child: self.id, parent: new_parent });
            }
            ancestor = parent_of(scene, id);
        }

        if let Some(old_parent) = parent_of(scene, self.id) {
            notify(scene, self.id, Notification::BeforeDetachFromParent);
            scene.children().remove(old_parent, self.id);
            notify(scene, old_parent, Notification::ChildDetached { child: self.id });
        }

        let registry = scene.registry();
        if registry.cached::<Parent>().with_mut(self.id, |parent| parent.0 = new_parent).is_none() {
            scene.create_data_component(self.id, Parent(new_parent));
        }

        let position = match index {
            Some(index) => scene.children().insert(new_parent, self.id, Some(index)),
            None => {
                let preferred = registry.cached::<crate::data::PreferredIndex>().with(self.id, |index| index.0);
                spawn::insert_child(scene, new_parent, self.id, preferred)
            }
        };

        refresh_inherited(scene, self.id);
        if let Some(world) = self.world_transform() {
            let parent_world = world_transform_of(scene, new_parent).unwrap_or_default();
            registry.cached::<LocalTransform3D>().with_mut(self.id, |local| local.0 = world.relative_to(&parent_world));
        }

        notify(scene, self.id, Notification::AttachedToNewParent);
        notify(scene, new_parent, Notification::ChildAttached { child: self.id, index: position });
        log::trace!("Moved {} under {new_parent} at {position}", self.id);
        Ok(position)
    }

    /// Rotates the child list to the right by `n` positions.
    pub fn rotate_children(&self, n: usize) { self.scene.children().rotate_right(self.id, n) }

    /// The tags of this component.
    pub fn tags(&self) -> Tags { self.scene.registry().cached::<Tags>().with(self.id, |tags| *tags).unwrap_or_default() }

    /// Checks whether this component has `tag`.
    pub fn has_tag(&self, tag: u8) -> bool { self.tags().contains(tag) }

    /// Adds `tag`. Returns false if it was already present.
    pub fn add_tag(&self, tag: u8) -> bool {
        let registry = self.scene.registry();
        let added = match registry.cached::<Tags>().with_mut(self.id, |tags| {
            let added = !tags.contains(tag);
            *tags = tags.with(tag);
            added
        }) {
            Some(added) => added,
            None => self.scene.create_data_component(self.id, Tags::default().with(tag)),
        };

        if added {
            self.scene.octree().on_component_tags_changed(self.scene, self.id);
        }
        added
    }

    /// Removes `tag`. Returns false if it was not present.
    ///
    /// Octree nodes keep the tag in their masks until they are destroyed.
    pub fn remove_tag(&self, tag: u8) -> bool {
        self.scene
            .registry()
            .cached::<Tags>()
            .with_mut(self.id, |tags| {
                let removed = tags.contains(tag);
                *tags = tags.without(tag);
                removed
            })
            .unwrap_or(false)
    }

    /// Pauses simulation of this component. Returns false if it was already paused.
    pub fn pause_simulation(&self) -> bool {
        let changed = self.set_flag(ComponentFlags::IS_SIMULATION_PAUSED, true);
        if changed {
            notify_with_data_components(self.scene, self.id, Notification::SimulationPaused);
        }
        changed
    }

    /// Resumes simulation of this component. Returns false if it was not paused.
    pub fn resume_simulation(&self) -> bool {
        let changed = self.set_flag(ComponentFlags::IS_SIMULATION_PAUSED, false);
        if changed {
            notify_with_data_components(self.scene, self.id, Notification::SimulationResumed);
        }
        changed
    }

    /// Marks this component as referenced from outside the scene.
    pub fn set_is_referenced(&self) -> bool { self.set_flag(ComponentFlags::IS_REFERENCED, true) }

    /// Clears the referenced mark.
    pub fn clear_is_referenced(&self) -> bool { self.set_flag(ComponentFlags::IS_REFERENCED, false) }

    /// Includes this subtree in serialization.
    pub fn enable_save_to_disk(&self) -> bool { self.set_flag(ComponentFlags::DISABLE_SAVE_TO_DISK, false) }

    /// Excludes this subtree from serialization.
    pub fn disable_save_to_disk(&self) -> bool { self.set_flag(ComponentFlags::DISABLE_SAVE_TO_DISK, true) }

    /// Forbids cloning this component. This cannot be undone.
    pub fn disable_cloning(&self) -> bool { self.set_flag(ComponentFlags::DISABLE_CLONING, true) }

    /// Marks this component as the root of a mesh scene.
    pub fn set_is_mesh_scene(&self) -> bool { self.set_flag(ComponentFlags::IS_MESH_SCENE, true) }

    /// Clears the mesh scene mark.
    pub fn clear_is_mesh_scene(&self) -> bool { self.set_flag(ComponentFlags::IS_MESH_SCENE, false) }

    /// Flips the mesh scene mark, returning the new value.
    pub fn toggle_is_mesh_scene(&self) -> bool {
        match self.scene.registry().cached::<Flags>().get_component_implementation(self.id) {
            Some(flags) => {
                let before = flags
                    .0
                    .fetch_update(|flags| Some(flags ^ ComponentFlags::IS_MESH_SCENE))
                    .expect("closure always returns Some");
                !before.contains(ComponentFlags::IS_MESH_SCENE)
            }
            None => false,
        }
    }

    /// The octree of the scene this component belongs to.
    pub fn root_scene_component(&self) -> &'scene RootSceneComponent { self.scene.octree() }

    /// The world transform, if this component is spatial.
    pub fn world_transform(&self) -> Option<Transform> { world_transform_of(self.scene, self.id) }

    /// The local transform relative to the parent, if this component is spatial.
    pub fn local_transform(&self) -> Option<Transform> {
        self.scene.registry().cached::<LocalTransform3D>().with(self.id, |local| local.0)
    }

    /// Moves this component to `transform` in world space.
    ///
    /// A non-spatial component becomes spatial and joins the octree unless it is detached.
    /// Spatial descendants keep their local transforms and move along.
    pub fn set_world_transform(&self, transform: Transform) {
        let parent_world =
            parent_of(self.scene, self.id).and_then(|parent| world_transform_of(self.scene, parent)).unwrap_or_default();
        let local = transform.relative_to(&parent_world);

        let registry = self.scene.registry();
        if registry.cached::<LocalTransform3D>().with_mut(self.id, |value| value.0 = local).is_none() {
            self.scene.create_data_component(self.id, LocalTransform3D(local));
        }
        self.update_world_transform(transform);
    }

    /// Moves this component to `location` in world space, keeping rotation and scale.
    pub fn set_world_location(&self, location: glam::Vec3) {
        let transform = self.world_transform().unwrap_or_default();
        self.set_world_transform(Transform { location, ..transform });
    }

    /// Replaces the local bounds and reinserts the component into the octree.
    pub fn set_local_bounds(&self, bounds: Aabb) {
        let registry = self.scene.registry();
        if registry.cached::<BoundingBox>().with_mut(self.id, |value| value.0 = bounds).is_none() {
            self.scene.create_data_component(self.id, BoundingBox(bounds));
        }

        let octree = self.scene.octree();
        if octree.remove_component(self.scene, self.id) {
            octree.add_component(self.scene, self.id);
        }
    }

    fn update_world_transform(&self, transform: Transform) {
        let scene = self.scene;
        let registry = scene.registry();

        let existed = registry.cached::<WorldTransform>().with_mut(self.id, |value| value.0 = transform).is_some();
        if existed {
            scene.octree().on_component_world_location_or_bounds_changed(scene, self.id);
        } else {
            scene.create_data_component(self.id, WorldTransform(transform));
            let flags = self.flags();
            if !flags.intersects(
                ComponentFlags::DETACHED_FROM_ANY_SOURCE
                    | ComponentFlags::IS_ROOT_SCENE
                    | ComponentFlags::IS_CONSTRUCTING
                    | ComponentFlags::IS_DESTROYING,
            ) {
                scene.octree().add_component(scene, self.id);
            }
        }

        for child in scene.children().snapshot(self.id) {
            if let Some(local) = registry.cached::<LocalTransform3D>().with(child, |local| local.0) {
                Self::new(scene, child).update_world_transform(transform.combine(&local));
            }
        }
    }

    /// Destroys this component and its subtree.
    ///
    /// The whole subtree is disabled first.
    /// The component is then detached from the spatial tree and unlinked from its parent
    /// before its children are destroyed, always taking the first remaining child.
    /// Returns false if destruction had already started or the component is gone;
    /// the scene root cannot be destroyed.
    pub fn destroy(&self) -> bool {
        let scene = self.scene;
        let gate = scene.registry().cached::<Flags>().with(self.id, |flags| {
            !flags.0.load().contains(ComponentFlags::IS_ROOT_SCENE)
                && flags.0.try_set(ComponentFlags::IS_DESTROYING)
        });
        if gate != Some(true) {
            return false;
        }
        log::trace!("Destroying {}", self.id);

        cascade::change(scene, self.id, Family::DISABLE, ComponentFlags::IS_DISABLED_WITH_CHILDREN, true);
        cascade::change(scene, self.id, Family::DETACH, ComponentFlags::IS_DETACHED_FROM_TREE, true);

        if let Some(parent) = parent_of(scene, self.id) {
            notify(scene, self.id, Notification::BeforeDetachFromParent);
            scene.children().remove(parent, self.id);
            scene.remove_data_component::<Parent>(self.id);
            notify(scene, parent, Notification::ChildDetached { child: self.id });
        }

        while let Some(child) = scene.children().first(self.id) {
            if !Self::new(scene, child).destroy() {
                // another thread owns the destruction of this child
                scene.children().remove(self.id, child);
            }
        }

        destroy_internal(scene, self.id);
        true
    }

    fn set_flag(&self, flag: ComponentFlags, value: bool) -> bool {
        cascade::update_flags(self.scene, self.id, |flags| if value { flags | flag } else { flags - flag })
            .map_or(false, |(before, after)| before != after)
    }
}

/// Removes the instance and all data components of `id` and releases the identifier.
fn destroy_internal(scene: &Scene, id: ComponentIdentifier) {
    let registry = scene.registry();

    let ty = registry.cached::<TypeIndex>().with(id, |ty| ty.0).expect("hierarchy components have a TypeIndex");
    let type_data = registry.find_component_type_data_dyn(ty).expect("the type of a live component has scene data");
    type_data.on_before_remove_instance(scene, id);
    type_data.remove_instance(scene, id);

    let data_components = registry.start_batch_component_removal(id);
    for ty in data_components.iter() {
        let data = registry.find_component_type_data_dyn(ty).expect("live data components have scene data");
        data.on_before_remove_instance(scene, id);
        data.remove_instance(scene, id);
    }

    scene.children().clear(id);
    registry.on_component_removed(id);
    log::trace!("Destroyed {id}");
}

/// Recomputes the inherited bits of `id` from its current parent.
fn refresh_inherited(scene: &Scene, id: ComponentIdentifier) {
    let parent_flags = parent_of(scene, id).map_or(ComponentFlags::empty(), |parent| scene.flags(parent));
    for family in Family::ALL {
        let inherited = !family.inherited_from(parent_flags).is_empty();
        cascade::change(scene, id, family, family.inherited, inherited);
    }
}

fn parent_of(scene: &Scene, id: ComponentIdentifier) -> Option<ComponentIdentifier> {
    scene.registry().cached::<Parent>().with(id, |parent| parent.0)
}

fn world_transform_of(scene: &Scene, id: ComponentIdentifier) -> Option<Transform> {
    scene.registry().cached::<WorldTransform>().with(id, |world| world.0)
}

fn is_spatial(scene: &Scene, id: ComponentIdentifier) -> bool {
    scene.registry().cached::<WorldTransform>().contains(id)
}

/// Delivers `notification` to the hierarchy component type of `id`.
fn notify(scene: &Scene, id: ComponentIdentifier, notification: Notification) {
    let registry = scene.registry();
    let ty = match registry.cached::<TypeIndex>().with(id, |ty| ty.0) {
        Some(ty) => ty,
        None => return,
    };
    if let Some(data) = registry.find_component_type_data_dyn(ty) {
        data.notify(scene, id, notification);
    }
}

/// Delivers `notification` to every live data component of `id`, then to its type.
fn notify_with_data_components(scene: &Scene, id: ComponentIdentifier, notification: Notification) {
    let registry = scene.registry();
    for ty in registry.data_component_mask(id).iter() {
        if let Some(data) = registry.find_component_type_data_dyn(ty) {
            data.notify(scene, id, notification);
        }
    }
    notify(scene, id, notification);
}

/// The hierarchy component at the root of every scene.
///
/// Enabling and disabling the root toggles the octree cleanup stage.
#[derive(Debug, Default)]
pub struct SceneRoot;

impl Component for SceneRoot {
    const NAME: &'static str = "SceneRoot";

    fn on_enable(scene: &Scene, _id: ComponentIdentifier) { scene.octree().enable(scene.registry()) }

    fn on_disable(scene: &Scene, _id: ComponentIdentifier) { scene.octree().disable(scene.registry()) }

    fn serialize(&self) -> Option<serde_json::Value> { Some(serde_json::Value::Null) }

    fn deserialize(_value: &serde_json::Value) -> Result<Self> { Ok(Self) }
}
