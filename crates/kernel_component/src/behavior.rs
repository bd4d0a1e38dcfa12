//! Per-type overrides of the generic component contract.
//!
//! Most types are plain data and never need this. Types holding state the
//! field manifest cannot describe on its own (links to other components, live
//! structures, lifecycle side effects) declare a [`ComponentBehavior`]
//! alongside their schema.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::component::{Component, ComponentId};
use crate::entity::Entity;
use crate::world::World;

/// Type-level hooks. Every method has the generic default.
pub trait ComponentBehavior: fmt::Debug {
    /// Custom serialized form. Keys must be declared field names so that
    /// `create_from_fields` can replay them. `None` uses the manifest.
    fn to_fields(&self, _component: &Component) -> Option<Map<String, Value>> {
        None
    }

    /// Fix up a generic copy. `copy` already holds `source`'s values.
    fn copy_into(&self, _source: &Component, _copy: &mut Component) {}

    /// Equality. The default only compares types.
    fn same(&self, a: &Component, b: &Component) -> bool {
        a.type_name() == b.type_name()
    }

    /// Runs when an instance is detached from `entity`, before its own
    /// `on_remove` hooks.
    fn on_detach(&self, _world: &mut World, _entity: Entity, _component: &Component) {}

    /// Rewrite component ids held in fields after a restore.
    fn relink(&self, _component: &mut Component, _relinks: &Relinks) {}

    /// Runs once the whole world has been restored, with the instance
    /// attached to `entity`.
    fn after_restore(&self, _world: &mut World, _entity: Entity, _id: ComponentId) {}
}

/// Old-to-new identity mapping produced while restoring a snapshot.
#[derive(Debug, Clone, Default)]
pub struct Relinks {
    entities: HashMap<u64, Entity>,
    components: HashMap<ComponentId, ComponentId>,
}

impl Relinks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the persisted handle `old` came back as `new`.
    pub fn insert_entity(&mut self, old: u64, new: Entity) {
        self.entities.insert(old, new);
    }

    pub fn insert_component(&mut self, old: ComponentId, new: ComponentId) {
        self.components.insert(old, new);
    }

    /// The entity restored in place of the persisted handle `old`.
    #[must_use]
    pub fn entity(&self, old: u64) -> Option<Entity> {
        self.entities.get(&old).copied()
    }

    /// The component restored in place of the persisted id `old`.
    #[must_use]
    pub fn component(&self, old: ComponentId) -> Option<ComponentId> {
        self.components.get(&old).copied()
    }
}
