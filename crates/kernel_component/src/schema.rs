//! Component schemas and the type descriptors built from them.
//!
//! A [`ComponentSchema`] is the declaration content authors write: a name, a
//! flat map of field defaults, and the `unique` / `transient` flags. The
//! registry turns it, once, into a [`ComponentType`]: the validated field
//! manifest plus the flags. Every component instance of that type reads its
//! accessor table and serialization layout from the same manifest.
//!
//! Tag and data types differ only in whether the manifest is empty; unique
//! and transient are independent [`TypeFlags`]. All combinations come out of
//! those two pieces.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::behavior::ComponentBehavior;
use crate::error::ComponentError;

/// Field names every component answers to already.
pub const RESERVED_FIELDS: &[&str] = &["id", "type", "entity"];

/// Declaration of a component type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSchema {
    /// Globally unique type name.
    pub name: String,
    /// Field names and their defaults, in declaration order. Empty for tags.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// At most one live instance per entity.
    #[serde(default)]
    pub unique: bool,
    /// Never persisted.
    #[serde(default)]
    pub transient: bool,
    /// Fields holding entity references, persisted as indirections.
    #[serde(default)]
    pub obj_refs: Vec<String>,
}

impl ComponentSchema {
    /// A data-free marker type.
    #[must_use]
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
            unique: false,
            transient: false,
            obj_refs: Vec::new(),
        }
    }

    /// A type with the given fields and defaults.
    #[must_use]
    pub fn data<K, I>(name: impl Into<String>, fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Self::tag(name)
        }
    }

    /// Allow at most one instance per entity.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Leave instances out of snapshots.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Mark `field` as an entity reference.
    #[must_use]
    pub fn with_obj_ref(mut self, field: impl Into<String>) -> Self {
        self.obj_refs.push(field.into());
        self
    }
}

/// The two type-level switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeFlags {
    /// At most one instance per entity; attaching another replaces it.
    pub unique: bool,
    /// Left out of snapshots.
    pub transient: bool,
}

/// Ordered field names and defaults, with name lookup.
#[derive(Debug, Clone, Default)]
pub struct FieldManifest {
    names: Vec<String>,
    defaults: Vec<Value>,
    refs: Vec<bool>,
    index: HashMap<String, usize>,
}

impl FieldManifest {
    /// Returns the slot of `name`, if declared.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the field name at `slot`.
    #[must_use]
    pub fn name(&self, slot: usize) -> &str {
        &self.names[slot]
    }

    /// Returns the declared default at `slot`.
    #[must_use]
    pub fn default_value(&self, slot: usize) -> &Value {
        &self.defaults[slot]
    }

    /// Returns `true` if the field at `slot` holds an entity reference.
    #[must_use]
    pub fn is_ref(&self, slot: usize) -> bool {
        self.refs[slot]
    }

    /// Iterate over `(name, default)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.defaults.iter())
    }

    /// Fresh per-instance values; composite defaults are deep copies.
    #[must_use]
    pub fn instantiate(&self) -> Vec<Value> {
        self.defaults.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A declared component type.
pub struct ComponentType {
    name: String,
    manifest: FieldManifest,
    flags: TypeFlags,
    behavior: Option<Rc<dyn ComponentBehavior>>,
}

impl ComponentType {
    /// Validate `schema` and build the type descriptor.
    ///
    /// # Errors
    ///
    /// [`ComponentError::MalformedSchema`] for an empty name, or an `obj_refs`
    /// entry that names no field or whose default is not `null`;
    /// [`ComponentError::ReservedField`] for a field shadowing a base accessor.
    pub fn build(
        schema: ComponentSchema,
        behavior: Option<Rc<dyn ComponentBehavior>>,
    ) -> Result<Self, ComponentError> {
        let ComponentSchema {
            name,
            fields,
            unique,
            transient,
            obj_refs,
        } = schema;

        if name.trim().is_empty() {
            return Err(ComponentError::MalformedSchema {
                component: name,
                reason: "type name is empty".to_string(),
            });
        }

        let mut manifest = FieldManifest::default();
        for (field, default) in fields {
            if RESERVED_FIELDS.contains(&field.as_str()) {
                return Err(ComponentError::ReservedField {
                    component: name,
                    field,
                });
            }
            if field.is_empty() {
                return Err(ComponentError::MalformedSchema {
                    component: name,
                    reason: "field name is empty".to_string(),
                });
            }
            manifest.index.insert(field.clone(), manifest.names.len());
            manifest.names.push(field);
            manifest.defaults.push(default);
            manifest.refs.push(false);
        }

        for field in obj_refs {
            let Some(slot) = manifest.index_of(&field) else {
                return Err(ComponentError::MalformedSchema {
                    component: name,
                    reason: format!("obj_refs names undeclared field '{field}'"),
                });
            };
            // A reference field starts out pointing at nothing.
            if !manifest.defaults[slot].is_null() {
                return Err(ComponentError::MalformedSchema {
                    component: name,
                    reason: format!("obj_ref field '{field}' must default to null"),
                });
            }
            manifest.refs[slot] = true;
        }

        Ok(Self {
            name,
            manifest,
            flags: TypeFlags { unique, transient },
            behavior,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn manifest(&self) -> &FieldManifest {
        &self.manifest
    }

    #[must_use]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.flags.unique
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.flags.transient
    }

    /// A tag carries no fields.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.manifest.is_empty()
    }

    #[must_use]
    pub fn behavior(&self) -> Option<&Rc<dyn ComponentBehavior>> {
        self.behavior.as_ref()
    }

    /// Check `value` against the default declared for `slot`.
    ///
    /// Reference fields take `null` or an entity id. Otherwise a `null`
    /// default accepts anything and any other default fixes the JSON kind.
    pub(crate) fn check_value(&self, slot: usize, value: &Value) -> Result<(), ComponentError> {
        let default = self.manifest.default_value(slot);
        let (ok, expected) = if self.manifest.is_ref(slot) {
            (value.is_null() || value.is_u64(), "entity id")
        } else {
            (
                default.is_null() || kind_of(default) == kind_of(value),
                kind_of(default),
            )
        };
        if ok {
            return Ok(());
        }
        Err(ComponentError::FieldKind {
            component: self.name.clone(),
            field: self.manifest.name(slot).to_string(),
            expected,
            found: kind_of(value),
        })
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("fields", &self.manifest.names)
            .field("flags", &self.flags)
            .field("behavior", &self.behavior)
            .finish()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_build_data_type() {
        let schema = ComponentSchema::data("health", [("hp", json!(10)), ("max", json!(10))]);
        let ty = ComponentType::build(schema, None).unwrap();
        assert_eq!(ty.name(), "health");
        assert!(!ty.is_tag());
        assert_eq!(ty.manifest().index_of("max"), Some(1));
        let names: Vec<&str> = ty.manifest().iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["hp", "max"]);
    }

    #[test]
    fn test_flags_compose_independently() {
        let tag = ComponentType::build(ComponentSchema::tag("player").unique(), None).unwrap();
        assert!(tag.is_tag());
        assert!(tag.is_unique());
        assert!(!tag.is_transient());

        let data = ComponentType::build(
            ComponentSchema::data("fov", [("cells", json!([]))]).transient(),
            None,
        )
        .unwrap();
        assert!(!data.is_tag());
        assert!(!data.is_unique());
        assert!(data.is_transient());
    }

    #[test]
    fn test_reserved_field_rejected() {
        for field in RESERVED_FIELDS {
            let schema = ComponentSchema::data("bad", [(*field, json!(0))]);
            assert!(matches!(
                ComponentType::build(schema, None),
                Err(ComponentError::ReservedField { .. })
            ));
        }
    }

    #[test]
    fn test_malformed_schemas_rejected() {
        assert!(matches!(
            ComponentType::build(ComponentSchema::tag(" "), None),
            Err(ComponentError::MalformedSchema { .. })
        ));
        let dangling = ComponentSchema::data("target", [("who", Value::Null)]).with_obj_ref("whom");
        assert!(matches!(
            ComponentType::build(dangling, None),
            Err(ComponentError::MalformedSchema { .. })
        ));
    }

    #[test]
    fn test_obj_refs_marked_in_manifest() {
        let schema = ComponentSchema::data("target", [("who", Value::Null), ("range", json!(3))])
            .with_obj_ref("who");
        let ty = ComponentType::build(schema, None).unwrap();
        assert!(ty.manifest().is_ref(0));
        assert!(!ty.manifest().is_ref(1));
    }

    #[test]
    fn test_obj_ref_with_non_null_default_rejected() {
        for default in [json!(0), json!(7), json!("nobody"), json!({"$entity": 3})] {
            let schema = ComponentSchema::data("target", [("who", default)]).with_obj_ref("who");
            let Err(ComponentError::MalformedSchema { reason, .. }) = ComponentType::build(schema, None)
            else {
                panic!("non-null reference default accepted");
            };
            assert!(reason.contains("who"));
        }
    }

    #[test]
    fn test_check_value_on_reference_field() {
        let schema = ComponentSchema::data("target", [("who", Value::Null)]).with_obj_ref("who");
        let ty = ComponentType::build(schema, None).unwrap();
        assert!(ty.check_value(0, &Value::Null).is_ok());
        assert!(ty.check_value(0, &json!(12)).is_ok());
        for bad in [json!(-1), json!("12"), json!({"$entity": 12})] {
            assert!(matches!(
                ty.check_value(0, &bad),
                Err(ComponentError::FieldKind { expected: "entity id", .. })
            ));
        }
    }

    #[test]
    fn test_check_value_kinds() {
        let schema = ComponentSchema::data("stats", [("str", json!(5)), ("note", Value::Null)]);
        let ty = ComponentType::build(schema, None).unwrap();
        assert!(ty.check_value(0, &json!(7)).is_ok());
        assert!(ty.check_value(0, &json!(7.5)).is_ok());
        assert!(matches!(
            ty.check_value(0, &json!("seven")),
            Err(ComponentError::FieldKind { .. })
        ));
        assert!(ty.check_value(1, &json!({"any": "thing"})).is_ok());
    }

    #[test]
    fn test_schema_from_json() {
        let schema: ComponentSchema = serde_json::from_str(
            r#"{ "name": "poisoned", "fields": { "damage": 2 }, "unique": true }"#,
        )
        .unwrap();
        assert!(schema.unique);
        assert!(!schema.transient);
        assert_eq!(schema.fields["damage"], json!(2));
    }
}
