//! The hot data component types, resolved without any lookup.

use crate::component::{ComponentTypeIdentifier, ComponentTypeRegistry};
use crate::data::{
    BoundingBox, Flags, InstanceGuid, LocalTransform3D, OctreeNode, Parent, PreferredIndex,
    RenderItemIdentifier, RenderItemStageMask, Tags, TypeIndex, WorldTransform,
};
use crate::scene_data::{AnySceneData, ComponentTypeSceneData};
use crate::Component;

macro_rules! cached_types {
    ($($variant:ident => $field:ident: $ty:ty,)*) => {
        /// The data component types stored directly in the scene registry.
        ///
        /// The discriminant of each variant is also its [`ComponentTypeIdentifier`]
        /// in every [`ComponentTypeRegistry`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::EnumCount)]
        pub enum CachedType {
            $(
                #[doc = concat!("See [`", stringify!($ty), "`].")]
                $variant,
            )*
        }

        /// The storages of all [`CachedType`]s.
        pub struct CachedSceneData {
            $($field: ComponentTypeSceneData<$ty>,)*
        }

        impl CachedSceneData {
            pub(crate) fn new() -> Self {
                Self {
                    $($field: ComponentTypeSceneData::new(CachedType::$variant.type_identifier()),)*
                }
            }

            pub(crate) fn get_dyn(&self, ty: CachedType) -> &dyn AnySceneData {
                match ty {
                    $(CachedType::$variant => &self.$field,)*
                }
            }
        }

        /// Registers the cached types in declaration order.
        pub(crate) fn register_cached_types(types: &ComponentTypeRegistry) {
            $(
                let ty = types.register::<$ty>();
                assert_eq!(
                    ty,
                    CachedType::$variant.type_identifier(),
                    "Cached types must be registered before any other type",
                );
            )*
        }

        $(
            impl Cached for $ty {
                const CACHED_TYPE: CachedType = CachedType::$variant;

                fn select(data: &CachedSceneData) -> &ComponentTypeSceneData<Self> { &data.$field }
            }
        )*
    };
}

cached_types! {
    TypeIndex => type_index: TypeIndex,
    Parent => parent: Parent,
    InstanceGuid => instance_guid: InstanceGuid,
    Tags => tags: Tags,
    Flags => flags: Flags,
    PreferredIndex => preferred_index: PreferredIndex,
    RenderItemIdentifier => render_item_identifier: RenderItemIdentifier,
    RenderItemStageMask => render_item_stage_mask: RenderItemStageMask,
    WorldTransform => world_transform: WorldTransform,
    LocalTransform3D => local_transform: LocalTransform3D,
    BoundingBox => bounding_box: BoundingBox,
    OctreeNode => octree_node: OctreeNode,
}

impl CachedType {
    /// The type identifier reserved for this cached type.
    pub fn type_identifier(self) -> ComponentTypeIdentifier {
        ComponentTypeIdentifier::from_usize(self as usize)
    }

    /// Returns the cached type with the identifier `ty`, if any.
    pub fn from_type_identifier(ty: ComponentTypeIdentifier) -> Option<Self> {
        use strum::IntoEnumIterator;

        Self::iter().nth(ty.to_usize())
    }
}

/// A data component type with a dedicated field in [`CachedSceneData`].
pub trait Cached: Component {
    /// The variant of this type.
    const CACHED_TYPE: CachedType;

    /// Selects the storage of this type.
    fn select(data: &CachedSceneData) -> &ComponentTypeSceneData<Self>;
}
