//! Component instances.
//!
//! A [`Component`] is an instance of a declared [`ComponentType`]: one value
//! per manifest field, a process-wide [`ComponentId`], an optional
//! back-reference to the entity it is bound to, and ordered `on_add` /
//! `on_remove` hook lists.
//!
//! Instances are created through the
//! [`ComponentRegistry`](crate::ComponentRegistry) and bound or unbound by the
//! [`World`], which is also what fires the hooks.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::Entity;
use crate::error::ComponentError;
use crate::schema::ComponentType;
use crate::world::World;

/// Key of the indirection record written for entity-reference fields.
pub const ENTITY_REF_KEY: &str = "$entity";

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide component identity. Ids are never reused, so persisted
/// references to a removed component can never resolve to a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u64);

impl ComponentId {
    fn allocate() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.0)
    }
}

/// What a hook wants done with itself after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Fire again on the next attach/detach.
    Keep,
    /// Drop this hook.
    Remove,
    /// Drop every hook of this kind, including ones that have not run yet in
    /// the current round.
    RemoveAll,
}

/// An `on_add` / `on_remove` callback.
///
/// Receives the world, the entity the component is being bound to or
/// unbound from, and the component's id. Hooks are shared so a round can
/// run them while the list stays on the component.
pub type Hook = Rc<RefCell<dyn FnMut(&mut World, Entity, ComponentId) -> HookAction>>;

/// An instance of a declared component type.
pub struct Component {
    id: ComponentId,
    ty: Rc<ComponentType>,
    values: Vec<Value>,
    entity: Option<Entity>,
    on_add: Vec<Hook>,
    on_remove: Vec<Hook>,
}

impl Component {
    pub(crate) fn new(ty: Rc<ComponentType>) -> Self {
        Self {
            id: ComponentId::allocate(),
            values: ty.manifest().instantiate(),
            ty,
            entity: None,
            on_add: Vec::new(),
            on_remove: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[must_use]
    pub fn component_type(&self) -> &Rc<ComponentType> {
        &self.ty
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.ty.is_unique()
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.ty.is_transient()
    }

    /// The entity this component is bound to.
    #[must_use]
    pub fn entity(&self) -> Option<Entity> {
        self.entity
    }

    /// Bind to `entity`, or unbind with `None`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::AlreadyBound`] when binding a component that is
    /// still bound; it has to be unbound first.
    pub fn set_entity(&mut self, entity: Option<Entity>) -> Result<(), ComponentError> {
        match (self.entity, entity) {
            (Some(owner), Some(_)) => Err(ComponentError::AlreadyBound {
                component: self.id,
                entity: owner,
            }),
            _ => {
                self.entity = entity;
                Ok(())
            }
        }
    }

    /// Read a field.
    ///
    /// # Errors
    ///
    /// [`ComponentError::UnknownField`] if the type does not declare `field`.
    pub fn get(&self, field: &str) -> Result<&Value, ComponentError> {
        let slot = self.slot(field)?;
        Ok(&self.values[slot])
    }

    /// Write a field.
    ///
    /// # Errors
    ///
    /// [`ComponentError::UnknownField`] for undeclared fields and
    /// [`ComponentError::FieldKind`] when `value` does not match the kind of
    /// the field's default.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), ComponentError> {
        let slot = self.slot(field)?;
        self.ty.check_value(slot, &value)?;
        self.values[slot] = value;
        Ok(())
    }

    /// Read a field, converting it through serde.
    ///
    /// # Errors
    ///
    /// [`ComponentError::UnknownField`] or [`ComponentError::Convert`].
    pub fn field_as<T: DeserializeOwned>(&self, field: &str) -> Result<T, ComponentError> {
        let value = self.get(field)?.clone();
        serde_json::from_value(value).map_err(|source| self.convert_error(field, source))
    }

    /// Write a field from any serializable value.
    ///
    /// # Errors
    ///
    /// As [`Component::set`], plus [`ComponentError::Convert`].
    pub fn set_field_as<T: Serialize>(&mut self, field: &str, value: &T) -> Result<(), ComponentError> {
        let value = serde_json::to_value(value).map_err(|source| self.convert_error(field, source))?;
        self.set(field, value)
    }

    /// Iterate over `(field, value)` in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ty
            .manifest()
            .iter()
            .map(|(name, _)| name)
            .zip(self.values.iter())
    }

    /// Register a hook fired each time this component is bound to an entity.
    pub fn on_add<F>(&mut self, hook: F)
    where
        F: FnMut(&mut World, Entity, ComponentId) -> HookAction + 'static,
    {
        self.on_add.push(Rc::new(RefCell::new(hook)));
    }

    /// Register a hook fired each time this component is unbound.
    pub fn on_remove<F>(&mut self, hook: F)
    where
        F: FnMut(&mut World, Entity, ComponentId) -> HookAction + 'static,
    {
        self.on_remove.push(Rc::new(RefCell::new(hook)));
    }

    /// Number of on-add hooks still registered.
    #[must_use]
    pub fn on_add_count(&self) -> usize {
        self.on_add.len()
    }

    /// Number of on-remove hooks still registered.
    #[must_use]
    pub fn on_remove_count(&self) -> usize {
        self.on_remove.len()
    }

    pub(crate) fn hooks(&self, kind: HookKind) -> &[Hook] {
        match kind {
            HookKind::Add => &self.on_add,
            HookKind::Remove => &self.on_remove,
        }
    }

    pub(crate) fn hooks_mut(&mut self, kind: HookKind) -> &mut Vec<Hook> {
        match kind {
            HookKind::Add => &mut self.on_add,
            HookKind::Remove => &mut self.on_remove,
        }
    }

    /// The persisted form: `field -> value` for every declared field.
    ///
    /// Entity-reference fields become `{"$entity": id}` records, or `null`
    /// when they point at nothing or at [`Entity::INVALID`]. A type
    /// behavior may supply its own mapping. Transient types persist nothing
    /// and return `None`.
    #[must_use]
    pub fn to_fields(&self) -> Option<Map<String, Value>> {
        if self.ty.is_transient() {
            return None;
        }
        if let Some(fields) = self
            .ty
            .behavior()
            .and_then(|behavior| behavior.to_fields(self))
        {
            return Some(fields);
        }

        let manifest = self.ty.manifest();
        let fields = self
            .values
            .iter()
            .enumerate()
            .map(|(slot, value)| {
                let value = if manifest.is_ref(slot) {
                    entity_ref(value)
                } else {
                    value.clone()
                };
                (manifest.name(slot).to_string(), value)
            })
            .collect();
        Some(fields)
    }

    /// A new, unbound instance of the same type with the same field values.
    ///
    /// Values are deep copies; hooks are not carried over.
    #[must_use]
    pub fn copy(&self) -> Component {
        let mut copy = Component::new(Rc::clone(&self.ty));
        copy.values = self.values.clone();
        if let Some(behavior) = self.ty.behavior() {
            behavior.copy_into(self, &mut copy);
        }
        copy
    }

    /// Equality as defined by the type; "same type" unless overridden.
    #[must_use]
    pub fn same_as(&self, other: &Component) -> bool {
        match self.ty.behavior() {
            Some(behavior) => behavior.same(self, other),
            None => self.type_name() == other.type_name(),
        }
    }

    fn slot(&self, field: &str) -> Result<usize, ComponentError> {
        self.ty
            .manifest()
            .index_of(field)
            .ok_or_else(|| ComponentError::UnknownField {
                component: self.type_name().to_string(),
                field: field.to_string(),
            })
    }

    fn convert_error(&self, field: &str, source: serde_json::Error) -> ComponentError {
        ComponentError::Convert {
            component: self.type_name().to_string(),
            field: field.to_string(),
            source,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("type", &self.ty.name())
            .field("values", &self.values)
            .field("entity", &self.entity)
            .field("on_add", &self.on_add.len())
            .field("on_remove", &self.on_remove.len())
            .finish()
    }
}

/// Which hook list to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookKind {
    Add,
    Remove,
}

/// `{"$entity": id}` for a live reference, `null` for none.
fn entity_ref(value: &Value) -> Value {
    match value.as_u64().map(Entity).filter(|entity| entity.is_valid()) {
        Some(entity) => {
            let mut record = Map::new();
            record.insert(ENTITY_REF_KEY.to_string(), Value::from(entity.id()));
            Value::Object(record)
        }
        None => Value::Null,
    }
}
