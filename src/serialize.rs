//! JSON persistence of component subtrees.
//!
//! A serialized hierarchy component is an object of the form
//! ```json
//! {
//!     "type": "Light",
//!     "guid": "67e55044-10b1-426f-9247-bb680e5fe0c8",
//!     "disabled": true,
//!     "value": { "intensity": 3.0 },
//!     "data_components": [{ "type": "Tags", "value": 5 }],
//!     "children": []
//! }
//! ```
//! The flag keys `disabled_with_children`, `disabled`, `detached_from_octree` and `referenced`
//! are only written when set and default to false.
//! `value` is omitted for types that are not persisted,
//! and children with save-to-disk disabled are skipped.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::data::{BoundingBox, ComponentFlags, PreferredIndex, Tags, WorldTransform};
use crate::error::{Error, Result};
use crate::hierarchy::SpawnOptions;
use crate::registry::CachedType;
use crate::{Component, ComponentIdentifier, Scene};

const FLAG_KEYS: [(&str, ComponentFlags); 4] = [
    ("disabled_with_children", ComponentFlags::IS_DISABLED_WITH_CHILDREN),
    ("disabled", ComponentFlags::IS_DISABLED),
    ("detached_from_octree", ComponentFlags::IS_DETACHED_FROM_TREE),
    ("referenced", ComponentFlags::IS_REFERENCED),
];

impl Scene {
    /// Serializes the hierarchy component `id` and its subtree.
    pub fn serialize_component(&self, id: ComponentIdentifier) -> Result<Value> {
        let component = self.component(id).ok_or(Error::StaleIdentifier(id))?;
        let registry = self.registry();

        let ty = component.type_identifier().ok_or(Error::StaleIdentifier(id))?;
        let type_data = registry.find_component_type_data_dyn(ty).ok_or(Error::StaleIdentifier(id))?;

        let mut object = Map::new();
        object.insert("type".into(), Value::String(type_data.type_name().into()));
        if let Some(guid) = component.guid() {
            object.insert("guid".into(), Value::String(guid.to_string()));
        }

        let flags = component.flags();
        for (key, flag) in FLAG_KEYS {
            if flags.contains(flag) {
                object.insert(key.into(), Value::Bool(true));
            }
        }

        if let Some(value) = type_data.serialize_instance(id) {
            object.insert("value".into(), value);
        }

        let data_components: Vec<Value> = registry
            .data_component_mask(id)
            .iter()
            .filter_map(|ty| registry.find_component_type_data_dyn(ty))
            .filter_map(|data| {
                let value = data.serialize_instance(id)?;
                Some(serde_json::json!({ "type": data.type_name(), "value": value }))
            })
            .collect();
        if !data_components.is_empty() {
            object.insert("data_components".into(), Value::Array(data_components));
        }

        let mut children = Vec::new();
        for child in component.children() {
            if self.flags(child).contains(ComponentFlags::DISABLE_SAVE_TO_DISK) {
                continue;
            }
            children.push(self.serialize_component(child)?);
        }
        if !children.is_empty() {
            object.insert("children".into(), Value::Array(children));
        }

        Ok(Value::Object(object))
    }

    /// Spawns the subtree serialized in `value` under `parent`.
    ///
    /// Returns the identifier of the subtree root.
    /// Components spawned before a failure are kept.
    pub fn deserialize_component(&self, parent: ComponentIdentifier, value: &Value) -> Result<ComponentIdentifier> {
        let object = value.as_object().ok_or_else(|| Error::Malformed("component is not an object".into()))?;
        let registry = self.registry();

        let type_name = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Malformed("missing component type".into()))?;
        let ty = registry.types().find_by_name(type_name).ok_or_else(|| Error::UnknownType(type_name.into()))?;
        let type_data = registry.get_or_create_component_type_data_dyn(ty);

        let mut options = SpawnOptions::default();
        for (key, flag) in FLAG_KEYS {
            if object.get(key).and_then(Value::as_bool).unwrap_or(false) {
                options.flags |= flag;
            }
        }

        if let Some(guid) = object.get("guid") {
            let parsed = guid.as_str().and_then(|guid| Uuid::parse_str(guid).ok());
            options.guid = Some(parsed.ok_or_else(|| Error::Malformed(format!("invalid guid {guid}")))?);
        }

        let data_components = match object.get("data_components") {
            Some(data_components) => data_components
                .as_array()
                .ok_or_else(|| Error::Malformed("data_components is not an array".into()))?
                .as_slice(),
            None => &[],
        };

        // the child list position is decided on spawn
        let is_preferred_index =
            |entry: &&Value| entry.get("type").and_then(Value::as_str) == Some(<PreferredIndex as Component>::NAME);
        if let Some(entry) = data_components.iter().find(is_preferred_index) {
            let value = entry.get("value").unwrap_or(&Value::Null);
            options.preferred_index = Some(<PreferredIndex as Component>::deserialize(value)?.0);
        }

        let id = type_data.spawn_deserialized(self, parent, options, object.get("value").unwrap_or(&Value::Null))?;

        for entry in data_components.iter().filter(|entry| !is_preferred_index(entry)) {
            self.deserialize_data_component(id, entry)?;
        }

        if let Some(children) = object.get("children") {
            let children = children.as_array().ok_or_else(|| Error::Malformed("children is not an array".into()))?;
            for child in children {
                self.deserialize_component(id, child)?;
            }
        }

        Ok(id)
    }

    /// Restores the children of a serialized scene root under the root of this scene.
    pub fn deserialize_scene(&self, value: &Value) -> Result<Vec<ComponentIdentifier>> {
        let root = self.root_id();
        let children = match value.get("children") {
            Some(children) => {
                children.as_array().ok_or_else(|| Error::Malformed("children is not an array".into()))?
            }
            None => return Ok(Vec::new()),
        };
        children.iter().map(|child| self.deserialize_component(root, child)).collect()
    }

    fn deserialize_data_component(&self, id: ComponentIdentifier, entry: &Value) -> Result<()> {
        let registry = self.registry();
        let type_name = entry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Malformed("missing data component type".into()))?;
        let value = entry.get("value").unwrap_or(&Value::Null);
        let ty = registry.types().find_by_name(type_name).ok_or_else(|| Error::UnknownType(type_name.into()))?;
        let component = self.component(id).ok_or(Error::StaleIdentifier(id))?;

        match CachedType::from_type_identifier(ty) {
            Some(CachedType::WorldTransform) => {
                component.set_world_transform(<WorldTransform as Component>::deserialize(value)?.0)
            }
            Some(CachedType::BoundingBox) => {
                component.set_local_bounds(<BoundingBox as Component>::deserialize(value)?.0)
            }
            Some(CachedType::Tags) => {
                let tags = <Tags as Component>::deserialize(value)?;
                if registry.cached::<Tags>().with_mut(id, |value| *value = tags).is_none() {
                    self.create_data_component(id, tags);
                }
                self.octree().on_component_tags_changed(self, id);
            }
            _ => registry.get_or_create_component_type_data_dyn(ty).deserialize_data_component(self, id, value)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
