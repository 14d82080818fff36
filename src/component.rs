//! A component is a value owned by a scene and addressed by a [`ComponentIdentifier`].
//!
//! There are two kinds of components:
//! hierarchy components are the nodes of the scene tree,
//! while data components are small values attached to a hierarchy component
//! and stored in their own dense table.
//! Both kinds implement [`Component`] and live in a
//! [`ComponentTypeSceneData`](crate::scene_data::ComponentTypeSceneData).

use std::fmt;

use indexmap::IndexMap;
use parking_lot::RwLock;
use xias::Xias;

use crate::error::{Error, Result};
use crate::scene_data::{AnySceneData, ComponentTypeSceneData};
use crate::util::DbgTypeId;
use crate::{ComponentIdentifier, Scene};

/// The maximum number of component types in a [`ComponentTypeRegistry`].
pub const MAX_COMPONENT_TYPES: usize = 256;

/// Identifies a component type within a [`ComponentTypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeIdentifier(u16);

impl ComponentTypeIdentifier {
    /// Converts a raw index into an identifier.
    ///
    /// # Panics
    /// Panics if `index` is not below [`MAX_COMPONENT_TYPES`].
    pub fn from_usize(index: usize) -> Self {
        assert!(index < MAX_COMPONENT_TYPES, "Component type index {index} is out of range");
        Self(index.small_int())
    }

    /// The raw index of this identifier.
    pub fn to_usize(self) -> usize { self.0.small_int() }
}

impl fmt::Display for ComponentTypeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "type#{}", self.0) }
}

/// A type that can be stored in a scene.
///
/// Lifecycle hooks are associated functions instead of methods
/// so that no storage lock is held while they run.
/// A hook may freely read or write any component, including the one it is notified about.
pub trait Component: Sized + Send + Sync + 'static {
    /// The unique name of this type, used in serialized data.
    const NAME: &'static str;

    /// Whether this type is a data component.
    ///
    /// Data components go through the reservation protocol of the scene registry
    /// and are tracked in the per-component type masks.
    const IS_DATA_COMPONENT: bool = false;

    /// Called after the instance for `id` has been stored.
    fn on_created(_scene: &Scene, _id: ComponentIdentifier, _parent: Option<ComponentIdentifier>) {}

    /// Called before the instance for `id` is removed.
    fn on_destroying(_scene: &Scene, _id: ComponentIdentifier) {}

    /// Called when `id` becomes enabled from all sources.
    fn on_enable(_scene: &Scene, _id: ComponentIdentifier) {}

    /// Called when `id` becomes disabled from any source.
    fn on_disable(_scene: &Scene, _id: ComponentIdentifier) {}

    /// Called when `id` joins the spatial tree.
    fn on_attached_to_tree(
        _scene: &Scene,
        _id: ComponentIdentifier,
        _parent: Option<ComponentIdentifier>,
    ) {
    }

    /// Called when `id` leaves the spatial tree.
    fn on_detached_from_tree(_scene: &Scene, _id: ComponentIdentifier) {}

    /// Called on the parent after `child` has been inserted at `index`.
    fn on_child_attached(
        _scene: &Scene,
        _id: ComponentIdentifier,
        _child: ComponentIdentifier,
        _index: usize,
    ) {
    }

    /// Called on the parent after `child` has been removed from its child list.
    fn on_child_detached(_scene: &Scene, _id: ComponentIdentifier, _child: ComponentIdentifier) {}

    /// Called on the child after it has been moved under a new parent.
    fn on_attached_to_new_parent(_scene: &Scene, _id: ComponentIdentifier) {}

    /// Called on the child before it is removed from its parent.
    fn on_before_detach_from_parent(_scene: &Scene, _id: ComponentIdentifier) {}

    /// Called when simulation of `id` is paused.
    fn on_simulation_paused(_scene: &Scene, _id: ComponentIdentifier) {}

    /// Called when simulation of `id` is resumed.
    fn on_simulation_resumed(_scene: &Scene, _id: ComponentIdentifier) {}

    /// Runs once per frame for instances with updates enabled.
    ///
    /// The storage of `Self` is locked for writing during this call,
    /// so the implementation must not access other instances of `Self` through `scene`.
    fn update(&mut self, _scene: &Scene, _id: ComponentIdentifier) {}

    /// Serializes the instance, or returns `None` if this type is not persisted.
    fn serialize(&self) -> Option<serde_json::Value> { None }

    /// Restores an instance from the output of [`serialize`](Self::serialize).
    fn deserialize(_value: &serde_json::Value) -> Result<Self> {
        Err(Error::NotDeserializable(Self::NAME))
    }
}

/// The external registry of component types shared by all scenes.
///
/// Assigns each Rust type a stable [`ComponentTypeIdentifier`]
/// and knows how to construct the per-scene storage of each type.
pub struct ComponentTypeRegistry {
    entries: RwLock<IndexMap<DbgTypeId, TypeEntry>>,
}

struct TypeEntry {
    name:              &'static str,
    is_data_component: bool,
    factory:           fn(ComponentTypeIdentifier) -> Box<dyn AnySceneData>,
}

fn new_scene_data<T: Component>(ty: ComponentTypeIdentifier) -> Box<dyn AnySceneData> {
    Box::new(ComponentTypeSceneData::<T>::new(ty))
}

impl ComponentTypeRegistry {
    /// Creates a registry with the cached data component types preregistered.
    pub fn new() -> Self {
        let this = Self { entries: RwLock::new(IndexMap::new()) };
        crate::registry::register_cached_types(&this);
        this
    }

    /// Registers `T` if it is not registered yet, returning its identifier.
    ///
    /// # Panics
    /// Panics if another type with the same name is registered,
    /// or if the registry is full.
    pub fn register<T: Component>(&self) -> ComponentTypeIdentifier {
        if let Some(ty) = self.find::<T>() {
            return ty;
        }

        let mut entries = self.entries.write();
        let key = DbgTypeId::of::<T>();
        if let Some(index) = entries.get_index_of(&key) {
            return ComponentTypeIdentifier::from_usize(index);
        }

        if let Some((other, _)) = entries.iter().find(|(_, entry)| entry.name == T::NAME) {
            panic!("Component type name {:?} is used by both {other:?} and {key:?}", T::NAME);
        }
        assert!(
            entries.len() < MAX_COMPONENT_TYPES,
            "Cannot register more than {MAX_COMPONENT_TYPES} component types"
        );

        let (index, _) = entries.insert_full(
            key,
            TypeEntry {
                name:              T::NAME,
                is_data_component: T::IS_DATA_COMPONENT,
                factory:           new_scene_data::<T>,
            },
        );
        let ty = ComponentTypeIdentifier::from_usize(index);
        log::debug!("Registered component type {} as {ty}", T::NAME);
        ty
    }

    /// Looks up the identifier of `T`.
    pub fn find<T: Component>(&self) -> Option<ComponentTypeIdentifier> {
        self.entries.read().get_index_of(&DbgTypeId::of::<T>()).map(ComponentTypeIdentifier::from_usize)
    }

    /// Looks up a type by its [`Component::NAME`].
    pub fn find_by_name(&self, name: &str) -> Option<ComponentTypeIdentifier> {
        self.entries
            .read()
            .values()
            .position(|entry| entry.name == name)
            .map(ComponentTypeIdentifier::from_usize)
    }

    /// Returns the name of a registered type.
    pub fn name(&self, ty: ComponentTypeIdentifier) -> Option<&'static str> {
        self.entries.read().get_index(ty.to_usize()).map(|(_, entry)| entry.name)
    }

    /// Checks whether a registered type is a data component.
    pub fn is_data_component(&self, ty: ComponentTypeIdentifier) -> Option<bool> {
        self.entries.read().get_index(ty.to_usize()).map(|(_, entry)| entry.is_data_component)
    }

    /// The number of registered types.
    pub fn len(&self) -> usize { self.entries.read().len() }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub(crate) fn create_scene_data(
        &self,
        ty: ComponentTypeIdentifier,
    ) -> Option<Box<dyn AnySceneData>> {
        let factory = self.entries.read().get_index(ty.to_usize())?.1.factory;
        Some(factory(ty))
    }
}

impl Default for ComponentTypeRegistry {
    fn default() -> Self { Self::new() }
}
