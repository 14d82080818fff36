//! Data components attached to hierarchy components.
//!
//! Each type here is stored in its own dense table
//! and addressed by the identifier of the owning hierarchy component.
//! The types in this module are the cached types of the scene registry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::component::{Component, ComponentTypeIdentifier};
use crate::error::Result;
use crate::octree::NodeIndex;
use crate::ComponentIdentifier;

mod flags;
pub use flags::{AtomicFlags, ComponentFlags};
mod transform;
pub use transform::{Aabb, Transform};

/// Implements [`Component`] for a data component type.
///
/// Types declared with `persisted` are serialized through serde.
macro_rules! data_component {
    ($ty:ty, $name:literal) => {
        impl Component for $ty {
            const NAME: &'static str = $name;
            const IS_DATA_COMPONENT: bool = true;
        }
    };
    ($ty:ty, $name:literal, persisted) => {
        impl Component for $ty {
            const NAME: &'static str = $name;
            const IS_DATA_COMPONENT: bool = true;

            fn serialize(&self) -> Option<serde_json::Value> { serde_json::to_value(self).ok() }

            fn deserialize(value: &serde_json::Value) -> Result<Self> {
                Ok(<$ty as Deserialize>::deserialize(value)?)
            }
        }
    };
}

/// The component type of a hierarchy component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeIndex(pub ComponentTypeIdentifier);
data_component!(TypeIndex, "TypeIndex");

/// The parent of a hierarchy component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub ComponentIdentifier);
data_component!(Parent, "Parent");

/// A globally unique identifier that persists across serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceGuid(pub Uuid);
data_component!(InstanceGuid, "InstanceGuid");

/// A set of up to 64 gameplay tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(pub u64);
data_component!(Tags, "Tags", persisted);

impl Tags {
    /// Checks whether `tag` is in the set.
    pub fn contains(self, tag: u8) -> bool { self.0 & bit(tag) != 0 }

    /// Returns the set with `tag` added.
    pub fn with(self, tag: u8) -> Self { Self(self.0 | bit(tag)) }

    /// Returns the set with `tag` removed.
    pub fn without(self, tag: u8) -> Self { Self(self.0 & !bit(tag)) }

    /// Checks whether the set is empty.
    pub fn is_empty(self) -> bool { self.0 == 0 }
}

fn bit(tag: u8) -> u64 {
    assert!(tag < 64, "Tag index {tag} is out of range");
    1 << tag
}

/// The lifecycle flags of a hierarchy component.
#[derive(Debug, Default)]
pub struct Flags(pub AtomicFlags);
data_component!(Flags, "Flags");

/// The requested position of a hierarchy component in its parent's child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferredIndex(pub u16);
data_component!(PreferredIndex, "PreferredIndex", persisted);

/// The identifier of the render item of a hierarchy component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderItemIdentifier(pub u32);
data_component!(RenderItemIdentifier, "RenderItemIdentifier");

/// The render stages a render item participates in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderItemStageMask(pub u64);
data_component!(RenderItemStageMask, "RenderItemStageMask");

/// The transform of a component relative to the scene origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldTransform(pub Transform);
data_component!(WorldTransform, "WorldTransform", persisted);

/// The transform of a component relative to its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalTransform3D(pub Transform);
data_component!(LocalTransform3D, "LocalTransform3D");

/// The bounds of a component in its own local space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundingBox(pub Aabb);
data_component!(BoundingBox, "BoundingBox", persisted);

/// The octree node currently containing a component.
///
/// This is only a back-reference; the node is owned by the octree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OctreeNode(pub NodeIndex);
data_component!(OctreeNode, "OctreeNode");

#[cfg(test)]
mod tests;
