//! Persisted world state.
//!
//! A [`WorldSnapshot`] lists every entity with the serialized fields of its
//! non-transient components. [`World::restore`] rebuilds a world from it in
//! two passes: all entities first, then the components, so entity
//! references inside component fields always have something to resolve to.
//! Restored entities and components get fresh identities; the returned
//! [`Relinks`] maps the persisted ones to the new ones.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::behavior::Relinks;
use crate::component::{Component, ComponentId, ENTITY_REF_KEY};
use crate::entity::Entity;
use crate::error::WorldError;
use crate::registry::ComponentRegistry;
use crate::schema::ComponentType;
use crate::world::World;

/// The persisted form of a [`World`]: entities in spawn order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub entities: Vec<EntitySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Handle in the saved world. Restore hands out new ones.
    pub entity: Entity,
    /// Persisted components in attach order. Transient ones are absent.
    pub components: Vec<ComponentRecord>,
}

/// One persisted component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: ComponentId,
    #[serde(rename = "type")]
    pub type_name: String,
    pub fields: Map<String, Value>,
}

impl World {
    /// Capture every entity and its persistable components.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        let entities = self
            .entities()
            .into_iter()
            .map(|entity| EntitySnapshot {
                entity,
                components: self
                    .components_of(entity)
                    .iter()
                    .filter_map(|component| {
                        component.to_fields().map(|fields| ComponentRecord {
                            id: component.id(),
                            type_name: component.type_name().to_string(),
                            fields,
                        })
                    })
                    .collect(),
            })
            .collect();
        WorldSnapshot { entities }
    }

    /// Rebuild a world from `snapshot`, declaring types through `registry`.
    ///
    /// # Errors
    ///
    /// Any error from reconstructing a component (unknown type, unknown
    /// field, kind mismatch) aborts the restore.
    pub fn restore(
        registry: ComponentRegistry,
        snapshot: &WorldSnapshot,
    ) -> Result<(World, Relinks), WorldError> {
        let mut world = World::new(registry);
        let mut relinks = Relinks::new();

        for saved in &snapshot.entities {
            let entity = world.spawn();
            relinks.insert_entity(saved.entity.id(), entity);
        }

        let mut pending: Vec<(Entity, Component)> = Vec::new();
        for saved in &snapshot.entities {
            let Some(entity) = relinks.entity(saved.entity.id()) else {
                continue;
            };
            for record in &saved.components {
                let ty = world.registry().get(&record.type_name)?;
                let fields = resolve_entity_refs(ty, &record.fields, &relinks);
                let component = world
                    .registry()
                    .create_from_fields(&record.type_name, &fields)?;
                relinks.insert_component(record.id, component.id());
                pending.push((entity, component));
            }
        }

        for (_, component) in &mut pending {
            if let Some(behavior) = component.component_type().behavior().map(Rc::clone) {
                behavior.relink(component, &relinks);
            }
        }

        let mut attached = Vec::with_capacity(pending.len());
        for (entity, component) in pending {
            let behavior = component.component_type().behavior().map(Rc::clone);
            let id = world.attach(entity, component)?;
            if let Some(behavior) = behavior {
                attached.push((entity, id, behavior));
            }
        }
        for (entity, id, behavior) in attached {
            behavior.after_restore(&mut world, entity, id);
        }

        debug!(entities = world.entity_count(), "world restored");
        Ok((world, relinks))
    }
}

/// Replace `{"$entity": old}` records in reference fields with the restored
/// entity handle. References to entities that were not persisted become
/// `null`.
fn resolve_entity_refs(
    ty: &ComponentType,
    fields: &Map<String, Value>,
    relinks: &Relinks,
) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| {
            let is_ref = ty
                .manifest()
                .index_of(name)
                .is_some_and(|slot| ty.manifest().is_ref(slot));
            let old = value.get(ENTITY_REF_KEY).and_then(Value::as_u64);
            let value = match (is_ref, old) {
                (true, Some(old)) => match relinks.entity(old) {
                    Some(entity) => Value::from(entity.id()),
                    None => {
                        warn!(component = ty.name(), field = %name, old, "dangling entity reference");
                        Value::Null
                    }
                },
                _ => value.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ComponentError;
    use crate::schema::ComponentSchema;

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry
            .declare(ComponentSchema::data("health", [("hp", json!(10))]))
            .unwrap();
        registry
            .declare(
                ComponentSchema::data("target", [("who", Value::Null)]).with_obj_ref("who"),
            )
            .unwrap();
        registry
            .declare(ComponentSchema::data("path", [("steps", json!([]))]).transient())
            .unwrap();
        registry
    }

    #[test]
    fn test_snapshot_skips_transient_components() {
        let mut world = World::new(registry());
        let e = world.spawn();
        world.attach(e, world.create("health").unwrap()).unwrap();
        world.attach(e, world.create("path").unwrap()).unwrap();

        let snapshot = world.snapshot();
        assert_eq!(snapshot.entities.len(), 1);
        let types: Vec<&str> = snapshot.entities[0]
            .components
            .iter()
            .map(|record| record.type_name.as_str())
            .collect();
        assert_eq!(types, vec!["health"]);
    }

    #[test]
    fn test_restore_resolves_entity_references() {
        let mut world = World::new(registry());
        let hunter = world.spawn();
        let prey = world.spawn();

        let mut target = world.create("target").unwrap();
        target.set("who", json!(prey.id())).unwrap();
        world.attach(hunter, target).unwrap();
        let mut health = world.create("health").unwrap();
        health.set("hp", json!(3)).unwrap();
        world.attach(prey, health).unwrap();

        let snapshot = world.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let snapshot: WorldSnapshot = serde_json::from_str(&json).unwrap();

        let (restored, relinks) = World::restore(registry(), &snapshot).unwrap();
        let new_hunter = relinks.entity(hunter.id()).unwrap();
        let new_prey = relinks.entity(prey.id()).unwrap();

        let target = restored.find_by_type(new_hunter, "target").unwrap();
        assert_eq!(target.get("who").unwrap(), &json!(new_prey.id()));
        let health = restored.find_by_type(new_prey, "health").unwrap();
        assert_eq!(health.get("hp").unwrap(), &json!(3));
    }

    #[test]
    fn test_restore_assigns_fresh_component_ids() {
        let mut world = World::new(registry());
        let e = world.spawn();
        let id = world.attach(e, world.create("health").unwrap()).unwrap();

        let (restored, relinks) = World::restore(registry(), &world.snapshot()).unwrap();
        let new_id = relinks.component(id).unwrap();
        assert!(new_id > id);
        let new_e = relinks.entity(e.id()).unwrap();
        assert!(restored.component(new_e, new_id).is_some());
    }

    #[test]
    fn test_dangling_reference_becomes_null() {
        let snapshot = WorldSnapshot {
            entities: vec![EntitySnapshot {
                entity: Entity(1),
                components: vec![ComponentRecord {
                    id: ComponentId(1),
                    type_name: "target".to_string(),
                    fields: json!({ "who": { ENTITY_REF_KEY: 77 } })
                        .as_object()
                        .cloned()
                        .unwrap(),
                }],
            }],
        };
        let (world, relinks) = World::restore(registry(), &snapshot).unwrap();
        let e = relinks.entity(1).unwrap();
        assert_eq!(
            world.find_by_type(e, "target").unwrap().get("who").unwrap(),
            &Value::Null
        );
    }

    #[test]
    fn test_unset_references_restore_as_null() {
        let mut world = World::new(registry());
        let fresh = world.spawn();
        world.attach(fresh, world.create("target").unwrap()).unwrap();
        let cleared = world.spawn();
        let mut target = world.create("target").unwrap();
        target.set("who", json!(Entity::INVALID.id())).unwrap();
        world.attach(cleared, target).unwrap();

        let (restored, relinks) = World::restore(registry(), &world.snapshot()).unwrap();
        for old in [fresh, cleared] {
            let e = relinks.entity(old.id()).unwrap();
            let target = restored.find_by_type(e, "target").unwrap();
            assert_eq!(target.get("who").unwrap(), &Value::Null);
        }
    }

    #[test]
    fn test_restore_rejects_malformed_reference() {
        let snapshot = WorldSnapshot {
            entities: vec![EntitySnapshot {
                entity: Entity(1),
                components: vec![ComponentRecord {
                    id: ComponentId(1),
                    type_name: "target".to_string(),
                    fields: json!({ "who": "nobody" }).as_object().cloned().unwrap(),
                }],
            }],
        };
        assert!(matches!(
            World::restore(registry(), &snapshot),
            Err(WorldError::Component(ComponentError::FieldKind { .. }))
        ));
    }

    #[test]
    fn test_restore_unknown_type_fails() {
        let snapshot = WorldSnapshot {
            entities: vec![EntitySnapshot {
                entity: Entity(1),
                components: vec![ComponentRecord {
                    id: ComponentId(1),
                    type_name: "mana".to_string(),
                    fields: Map::new(),
                }],
            }],
        };
        assert!(World::restore(registry(), &snapshot).is_err());
    }
}
