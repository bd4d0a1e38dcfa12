//! Component type registry — declares types and constructs instances.
//!
//! Content declares every component type once at startup, before the first
//! simulation tick. After that the registry is only read, except for hot
//! reloads, which are an [`ComponentRegistry::undeclare`] immediately
//! followed by a new declaration.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::behavior::ComponentBehavior;
use crate::component::Component;
use crate::error::ComponentError;
use crate::schema::{ComponentSchema, ComponentType};

/// All declared component types, keyed by name.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    types: HashMap<String, Rc<ComponentType>>,
}

impl ComponentRegistry {
    /// An empty registry; nothing is declared.
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Declare a plain data or tag type.
    ///
    /// # Errors
    ///
    /// [`ComponentError::DuplicateType`] if the name is taken, plus any
    /// schema validation error from [`ComponentType::build`].
    pub fn declare(&mut self, schema: ComponentSchema) -> Result<Rc<ComponentType>, ComponentError> {
        self.insert(schema, None)
    }

    /// Declare a type with behavior overrides.
    ///
    /// # Errors
    ///
    /// As [`ComponentRegistry::declare`].
    pub fn declare_with(
        &mut self,
        schema: ComponentSchema,
        behavior: Rc<dyn ComponentBehavior>,
    ) -> Result<Rc<ComponentType>, ComponentError> {
        self.insert(schema, Some(behavior))
    }

    /// Declare every schema in a JSON array. Returns how many were declared.
    ///
    /// Stops at the first failing declaration; the ones before it stay
    /// declared.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Parse`] for invalid JSON, or the first declaration
    /// error.
    pub fn declare_json(&mut self, source: &str) -> Result<usize, ComponentError> {
        let schemas: Vec<ComponentSchema> = serde_json::from_str(source)?;
        let count = schemas.len();
        for schema in schemas {
            self.declare(schema)?;
        }
        info!(count, total = self.types.len(), "component schemas loaded");
        Ok(count)
    }

    fn insert(
        &mut self,
        schema: ComponentSchema,
        behavior: Option<Rc<dyn ComponentBehavior>>,
    ) -> Result<Rc<ComponentType>, ComponentError> {
        if self.types.contains_key(&schema.name) {
            return Err(ComponentError::DuplicateType(schema.name));
        }
        let ty = Rc::new(ComponentType::build(schema, behavior)?);
        debug!(
            name = ty.name(),
            fields = ty.manifest().len(),
            unique = ty.is_unique(),
            transient = ty.is_transient(),
            "component type declared"
        );
        self.types.insert(ty.name().to_string(), Rc::clone(&ty));
        Ok(ty)
    }

    /// Remove a type. Live instances keep working; new ones cannot be made.
    ///
    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`] if nothing is declared under `name`.
    pub fn undeclare(&mut self, name: &str) -> Result<Rc<ComponentType>, ComponentError> {
        let ty = self
            .types
            .remove(name)
            .ok_or_else(|| ComponentError::TypeNotFound(name.to_string()))?;
        debug!(name, "component type undeclared");
        Ok(ty)
    }

    /// Look up a type.
    ///
    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`].
    pub fn get(&self, name: &str) -> Result<&Rc<ComponentType>, ComponentError> {
        self.types
            .get(name)
            .ok_or_else(|| ComponentError::TypeNotFound(name.to_string()))
    }

    /// Returns `true` if a type called `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`].
    pub fn is_unique(&self, name: &str) -> Result<bool, ComponentError> {
        Ok(self.get(name)?.is_unique())
    }

    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`].
    pub fn is_transient(&self, name: &str) -> Result<bool, ComponentError> {
        Ok(self.get(name)?.is_transient())
    }

    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`].
    pub fn is_tag(&self, name: &str) -> Result<bool, ComponentError> {
        Ok(self.get(name)?.is_tag())
    }

    /// Declared type names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of declared types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no type is declared yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Construct an instance with every field at its default.
    ///
    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`].
    pub fn create(&self, name: &str) -> Result<Component, ComponentError> {
        Ok(Component::new(Rc::clone(self.get(name)?)))
    }

    /// Construct an instance from positional arguments, assigned to fields in
    /// declaration order. Fields past the last argument keep their defaults.
    ///
    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`], [`ComponentError::TooManyArguments`]
    /// or a field kind mismatch.
    pub fn create_with<I>(&self, name: &str, args: I) -> Result<Component, ComponentError>
    where
        I: IntoIterator<Item = Value>,
    {
        let ty = self.get(name)?;
        let args: Vec<Value> = args.into_iter().collect();
        if args.len() > ty.manifest().len() {
            return Err(ComponentError::TooManyArguments {
                component: name.to_string(),
                expected: ty.manifest().len(),
                given: args.len(),
            });
        }

        let mut component = Component::new(Rc::clone(ty));
        for (slot, value) in args.into_iter().enumerate() {
            let field = ty.manifest().name(slot);
            component.set(field, value)?;
        }
        Ok(component)
    }

    /// Rebuild an instance by replaying one setter call per persisted field.
    ///
    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`], [`ComponentError::UnknownField`] or
    /// a field kind mismatch.
    pub fn create_from_fields(
        &self,
        name: &str,
        fields: &Map<String, Value>,
    ) -> Result<Component, ComponentError> {
        let mut component = self.create(name)?;
        for (field, value) in fields {
            component.set(field, value.clone())?;
        }
        Ok(component)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry
            .declare(ComponentSchema::data(
                "health",
                [("hp", json!(10)), ("max", json!(10))],
            ))
            .unwrap();
        registry
            .declare(ComponentSchema::tag("player").unique())
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_declaration_fails() {
        let mut registry = registry();
        assert!(matches!(
            registry.declare(ComponentSchema::tag("health")),
            Err(ComponentError::DuplicateType(name)) if name == "health"
        ));
    }

    #[test]
    fn test_unknown_type_is_typed_error() {
        let registry = registry();
        assert!(matches!(
            registry.create("mana"),
            Err(ComponentError::TypeNotFound(name)) if name == "mana"
        ));
        assert!(registry.is_unique("mana").is_err());
    }

    #[test]
    fn test_unique_tag_flag() {
        let registry = registry();
        assert!(registry.is_unique("player").unwrap());
        assert!(registry.is_tag("player").unwrap());
        assert!(!registry.is_unique("health").unwrap());
        assert!(registry.create("player").unwrap().is_unique());
    }

    #[test]
    fn test_create_with_positional_args() {
        let registry = registry();
        let c = registry.create_with("health", [json!(3)]).unwrap();
        assert_eq!(c.get("hp").unwrap(), &json!(3));
        assert_eq!(c.get("max").unwrap(), &json!(10));

        assert!(matches!(
            registry.create_with("health", [json!(1), json!(2), json!(3)]),
            Err(ComponentError::TooManyArguments { expected: 2, given: 3, .. })
        ));
    }

    #[test]
    fn test_serialized_fields_round_trip() {
        let registry = registry();
        let mut original = registry.create("health").unwrap();
        original.set("hp", json!(7)).unwrap();

        let fields = original.to_fields().unwrap();
        let rebuilt = registry.create_from_fields("health", &fields).unwrap();
        assert_ne!(rebuilt.id(), original.id());
        let a: Vec<_> = original.fields().collect();
        let b: Vec<_> = rebuilt.fields().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_create_from_unknown_field_fails() {
        let registry = registry();
        let mut fields = Map::new();
        fields.insert("armor".to_string(), json!(1));
        assert!(matches!(
            registry.create_from_fields("health", &fields),
            Err(ComponentError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_undeclare_and_redeclare() {
        let mut registry = registry();
        let old = registry.create("health").unwrap();
        registry.undeclare("health").unwrap();
        assert!(registry.create("health").is_err());
        assert!(registry.undeclare("health").is_err());

        registry
            .declare(ComponentSchema::data("health", [("hp", json!(20))]))
            .unwrap();
        assert_eq!(registry.create("health").unwrap().get("hp").unwrap(), &json!(20));
        // The old instance keeps its original type.
        assert_eq!(old.get("max").unwrap(), &json!(10));
    }

    #[test]
    fn test_declare_json() {
        let mut registry = ComponentRegistry::new();
        let count = registry
            .declare_json(
                r#"[
                    { "name": "burning", "fields": { "damage": 1 }, "unique": true },
                    { "name": "hidden" },
                    { "name": "fov", "fields": { "cells": [] }, "transient": true }
                ]"#,
            )
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(registry.names(), vec!["burning", "fov", "hidden"]);
        assert!(registry.is_transient("fov").unwrap());
        assert!(matches!(
            registry.declare_json("[{ \"fields\": {} }]"),
            Err(ComponentError::Parse(_))
        ));
    }
}
