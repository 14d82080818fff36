use uuid::Uuid;

use super::cascade::Family;
use crate::data::{
    Aabb, AtomicFlags, BoundingBox, ComponentFlags, Flags, InstanceGuid, LocalTransform3D, Parent,
    PreferredIndex, Tags, Transform, TypeIndex, WorldTransform,
};
use crate::error::{Error, Result};
use crate::scene_data::Notification;
use crate::{Component, ComponentIdentifier, Scene};

/// The construction options of a hierarchy component that are known before its instance,
/// such as those restored by [`Scene::deserialize_component`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// See [`Spawn::with_flags`].
    pub flags:           ComponentFlags,
    /// See [`Spawn::with_preferred_index`].
    pub preferred_index: Option<u16>,
    /// See [`Spawn::with_guid`].
    pub guid:            Option<Uuid>,
}

/// Describes a hierarchy component to be constructed by [`Scene::spawn`].
#[must_use = "a spawn request does nothing until passed to Scene::spawn"]
pub struct Spawn<T> {
    value:           T,
    parent:          Option<ComponentIdentifier>,
    flags:           ComponentFlags,
    preferred_index: Option<u16>,
    world_transform: Option<Transform>,
    bounds:          Option<Aabb>,
    guid:            Option<Uuid>,
    tags:            Tags,
}

impl<T: Component> Spawn<T> {
    /// Requests a component with the instance `value` under the scene root.
    pub fn new(value: T) -> Self {
        Self {
            value,
            parent: None,
            flags: ComponentFlags::empty(),
            preferred_index: None,
            world_transform: None,
            bounds: None,
            guid: None,
            tags: Tags::default(),
        }
    }

    /// Places the component under `parent` instead of the scene root.
    pub fn with_parent(mut self, parent: ComponentIdentifier) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Seeds the flags of the component.
    ///
    /// Inherited and internal lifecycle bits are ignored;
    /// they are derived during construction.
    pub fn with_flags(mut self, flags: ComponentFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Requests a position in the child list of the parent.
    pub fn with_preferred_index(mut self, index: u16) -> Self {
        self.preferred_index = Some(index);
        self
    }

    /// Makes the component spatial, placing it at `transform` in world space.
    pub fn with_world_transform(mut self, transform: Transform) -> Self {
        self.world_transform = Some(transform);
        self
    }

    /// Sets the bounds of the component in its local space.
    pub fn with_bounds(mut self, bounds: Aabb) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Uses `guid` instead of a random instance GUID.
    pub fn with_guid(mut self, guid: Uuid) -> Self {
        self.guid = Some(guid);
        self
    }

    /// Applies `options`, replacing the flags, preferred index and GUID.
    pub fn with_options(self, options: SpawnOptions) -> Self {
        Self { flags: options.flags, preferred_index: options.preferred_index, guid: options.guid, ..self }
    }

    /// Sets the initial tags of the component.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

impl Scene {
    /// Constructs a hierarchy component and attaches it to its parent.
    ///
    /// Returns [`Error::StaleIdentifier`] if the requested parent is not live or is being destroyed.
    pub fn spawn<T: Component>(&self, spawn: Spawn<T>) -> Result<ComponentIdentifier> {
        let parent = spawn.parent.unwrap_or_else(|| self.root_id());
        if self.component(parent).is_none() || self.flags(parent).contains(ComponentFlags::IS_DESTROYING) {
            return Err(Error::StaleIdentifier(parent));
        }
        Ok(construct(self, Spawn { parent: Some(parent), ..spawn }))
    }
}

/// Runs both construction phases of a hierarchy component.
///
/// A request without parent constructs a scene root.
pub(crate) fn construct<T: Component>(scene: &Scene, spawn: Spawn<T>) -> ComponentIdentifier {
    assert!(!T::IS_DATA_COMPONENT, "{} is a data component and cannot be spawned", T::NAME);

    let registry = scene.registry();
    let type_data = registry.get_or_create_component_type_data::<T>();
    let id = registry.acquire_identifier();

    let parent = spawn.parent;
    let parent_flags = parent.map_or(ComponentFlags::empty(), |parent| scene.flags(parent));
    let inherited =
        Family::ALL.iter().fold(ComponentFlags::empty(), |flags, family| flags | family.inherited_from(parent_flags));
    let flags = (spawn.flags
        - ComponentFlags::INHERITED
        - ComponentFlags::IS_DESTROYING)
        | inherited
        | ComponentFlags::IS_CONSTRUCTING;

    scene.create_data_component(id, TypeIndex(type_data.type_identifier()));
    if let Some(parent) = parent {
        scene.create_data_component(id, Parent(parent));
    }
    scene.create_data_component(id, Flags(AtomicFlags::new(flags)));
    scene.create_data_component(id, InstanceGuid(spawn.guid.unwrap_or_else(Uuid::new_v4)));
    if let Some(index) = spawn.preferred_index {
        scene.create_data_component(id, PreferredIndex(index));
    }
    if !spawn.tags.is_empty() {
        scene.create_data_component(id, spawn.tags);
    }
    if let Some(world) = spawn.world_transform {
        let parent_world = parent.and_then(|parent| super::world_transform_of(scene, parent)).unwrap_or_default();
        scene.create_data_component(id, WorldTransform(world));
        scene.create_data_component(id, LocalTransform3D(world.relative_to(&parent_world)));
    }
    if let Some(bounds) = spawn.bounds {
        scene.create_data_component(id, BoundingBox(bounds));
    }

    let created = type_data.create_instance(scene, id, parent, spawn.value);
    assert!(created, "{id} was handed out twice");

    on_constructed(scene, id, parent, spawn.preferred_index);
    log::trace!("Spawned {id} as {}", T::NAME);
    id
}

fn on_constructed(
    scene: &Scene,
    id: ComponentIdentifier,
    parent: Option<ComponentIdentifier>,
    preferred_index: Option<u16>,
) {
    let index = parent.map(|parent| insert_child(scene, parent, id, preferred_index));

    // the parent may have changed between reading its flags and linking the child
    super::refresh_inherited(scene, id);

    let flags = scene.flags(id);
    if !flags.intersects(ComponentFlags::DETACHED_FROM_ANY_SOURCE | ComponentFlags::IS_ROOT_SCENE)
        && super::is_spatial(scene, id)
    {
        scene.octree().add_component(scene, id);
    }

    if let Some(flags) = scene.registry().cached::<Flags>().get_component_implementation(id) {
        flags.0.fetch_remove(ComponentFlags::IS_CONSTRUCTING);
    }

    if let (Some(parent), Some(index)) = (parent, index) {
        super::notify(scene, parent, Notification::ChildAttached { child: id, index });
    }

    if parent.is_some() && !flags.intersects(ComponentFlags::DETACHED_FROM_ANY_SOURCE) {
        super::notify_with_data_components(scene, id, Notification::AttachedToTree { parent });
    }
}

/// Links `child` into the child list of `parent`.
///
/// A child with a preferred index goes before the first sibling with a larger one,
/// where siblings without a preference count as `u16::MAX`.
/// A child without a preference is appended.
pub(crate) fn insert_child(
    scene: &Scene,
    parent: ComponentIdentifier,
    child: ComponentIdentifier,
    preferred_index: Option<u16>,
) -> usize {
    let preferred = match preferred_index {
        Some(preferred) => preferred,
        None => return scene.children().insert(parent, child, None),
    };

    let preferred_indices = scene.registry().cached::<PreferredIndex>();
    scene.children().insert_with(parent, child, |siblings| {
        siblings
            .iter()
            .position(|&sibling| preferred_indices.with(sibling, |index| index.0).unwrap_or(u16::MAX) > preferred)
            .unwrap_or(siblings.len())
    })
}

