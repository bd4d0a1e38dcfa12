//! Entity store — binds component instances to entities.
//!
//! The [`World`] owns the component registry, allocates entities and holds
//! every bound component. Binding and unbinding go through
//! [`World::attach`] and [`World::detach`], which maintain the component's
//! back-reference, enforce uniqueness and fire the lifecycle hooks.

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::component::{Component, ComponentId, Hook, HookAction, HookKind};
use crate::entity::{Entity, EntityAllocator};
use crate::error::WorldError;
use crate::registry::ComponentRegistry;

/// The components bound to one entity, in attach order.
#[derive(Debug, Default)]
struct EntityData {
    components: Vec<Component>,
}

/// Entities, their components, and the registry that declares the types.
#[derive(Debug)]
pub struct World {
    registry: ComponentRegistry,
    allocator: EntityAllocator,
    entities: BTreeMap<Entity, EntityData>,
}

impl World {
    #[must_use]
    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            allocator: EntityAllocator::new(),
            entities: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Construct an unbound component through the registry.
    ///
    /// # Errors
    ///
    /// [`ComponentError::TypeNotFound`](crate::ComponentError::TypeNotFound).
    pub fn create(&self, type_name: &str) -> Result<Component, WorldError> {
        Ok(self.registry.create(type_name)?)
    }

    // -- Entity lifecycle --

    /// Allocate a new entity with no components.
    pub fn spawn(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        self.entities.insert(entity, EntityData::default());
        trace!(%entity, "spawned");
        entity
    }

    /// Detach every component (newest first, firing hooks) and drop the
    /// entity. Returns the detached components.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`].
    pub fn despawn(&mut self, entity: Entity) -> Result<Vec<Component>, WorldError> {
        self.ensure_exists(entity)?;
        let mut detached = Vec::new();
        while let Some(id) = self
            .entities
            .get(&entity)
            .and_then(|data| data.components.last())
            .map(Component::id)
        {
            detached.push(self.detach(entity, id)?);
        }
        self.entities.remove(&entity);
        debug!(%entity, components = detached.len(), "despawned");
        Ok(detached)
    }

    #[must_use]
    pub fn exists(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// All live entities, in allocation order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.keys().copied().collect()
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // -- Binding --

    /// Bind `component` to `entity` and fire its `on_add` hooks.
    ///
    /// If the type is unique and the entity already holds an instance of it,
    /// the old instance is detached first (its `on_remove` hooks fire) and
    /// the new one takes its place.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`], or
    /// [`ComponentError::AlreadyBound`](crate::ComponentError::AlreadyBound)
    /// if the component still has an owner.
    pub fn attach(&mut self, entity: Entity, mut component: Component) -> Result<ComponentId, WorldError> {
        self.ensure_exists(entity)?;
        component.set_entity(Some(entity))?;

        if component.is_unique()
            && let Some(previous) = self.find_id_by_type(entity, component.type_name())
        {
            debug!(
                %entity,
                component = component.type_name(),
                %previous,
                "replacing unique component"
            );
            self.detach(entity, previous)?;
        }

        let id = component.id();
        debug!(%entity, %id, component = component.type_name(), "attached");
        self.entity_data_mut(entity)?.components.push(component);
        self.fire_hooks(HookKind::Add, entity, id, None);
        Ok(id)
    }

    /// Unbind a component: run its type's `on_detach`, fire its `on_remove`
    /// hooks and clear its back-reference. The component is handed back.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] or [`WorldError::ComponentNotFound`].
    pub fn detach(&mut self, entity: Entity, id: ComponentId) -> Result<Component, WorldError> {
        let data = self.entity_data_mut(entity)?;
        let index = data
            .components
            .iter()
            .position(|component| component.id() == id)
            .ok_or(WorldError::ComponentNotFound(id, entity))?;
        let mut component = data.components.remove(index);
        debug!(%entity, %id, component = component.type_name(), "detaching");

        if let Some(behavior) = component.component_type().behavior().map(Rc::clone) {
            behavior.on_detach(self, entity, &component);
        }
        self.fire_hooks(HookKind::Remove, entity, id, Some(&mut component));
        component.set_entity(None)?;
        Ok(component)
    }

    /// Detach `id` if it is still bound to `entity`; otherwise do nothing.
    pub fn remove_if_present(&mut self, entity: Entity, id: ComponentId) -> Option<Component> {
        if self.component(entity, id).is_none() {
            trace!(%entity, %id, "already gone");
            return None;
        }
        self.detach(entity, id).ok()
    }

    /// Run the hooks of one kind over the list as it stood when the round
    /// began. Hooks registered while firing run next time.
    ///
    /// `detached` is the component for `on_remove`, which is no longer in
    /// the store at that point. For `on_add` the component is looked up
    /// again after each hook; once a hook has detached it, the component
    /// keeps the list it left with.
    fn fire_hooks(
        &mut self,
        kind: HookKind,
        entity: Entity,
        id: ComponentId,
        mut detached: Option<&mut Component>,
    ) {
        let round: Vec<Hook> = match detached.as_deref() {
            Some(component) => component.hooks(kind).to_vec(),
            None => match self.component(entity, id) {
                Some(component) => component.hooks(kind).to_vec(),
                None => return,
            },
        };

        for hook in &round {
            // Already running further up the stack.
            let Ok(mut call) = hook.try_borrow_mut() else {
                continue;
            };
            let action = (&mut *call)(self, entity, id);
            drop(call);
            if action == HookAction::Keep {
                continue;
            }

            let list = match detached.as_deref_mut() {
                Some(component) => Some(component.hooks_mut(kind)),
                None => self
                    .component_mut(entity, id)
                    .map(|component| component.hooks_mut(kind)),
            };
            match (action, list) {
                (HookAction::Remove, Some(list)) => list.retain(|kept| !Rc::ptr_eq(kept, hook)),
                (HookAction::RemoveAll, list) => {
                    if let Some(list) = list {
                        list.clear();
                    }
                    break;
                }
                _ => {}
            }
        }
    }

    // -- Access --

    #[must_use]
    pub fn component(&self, entity: Entity, id: ComponentId) -> Option<&Component> {
        self.entities
            .get(&entity)?
            .components
            .iter()
            .find(|component| component.id() == id)
    }

    pub fn component_mut(&mut self, entity: Entity, id: ComponentId) -> Option<&mut Component> {
        self.entities
            .get_mut(&entity)?
            .components
            .iter_mut()
            .find(|component| component.id() == id)
    }

    /// The first component of `type_name` on `entity`.
    #[must_use]
    pub fn find_by_type(&self, entity: Entity, type_name: &str) -> Option<&Component> {
        self.components_of(entity)
            .iter()
            .find(|component| component.type_name() == type_name)
    }

    pub fn find_by_type_mut(&mut self, entity: Entity, type_name: &str) -> Option<&mut Component> {
        self.entities
            .get_mut(&entity)?
            .components
            .iter_mut()
            .find(|component| component.type_name() == type_name)
    }

    #[must_use]
    pub fn find_id_by_type(&self, entity: Entity, type_name: &str) -> Option<ComponentId> {
        self.find_by_type(entity, type_name).map(Component::id)
    }

    #[must_use]
    pub fn has_type(&self, entity: Entity, type_name: &str) -> bool {
        self.find_by_type(entity, type_name).is_some()
    }

    /// Components bound to `entity`, in attach order. Empty for unknown
    /// entities.
    #[must_use]
    pub fn components_of(&self, entity: Entity) -> &[Component] {
        self.entities
            .get(&entity)
            .map(|data| data.components.as_slice())
            .unwrap_or_default()
    }

    /// Entities holding at least one component of every type in `with`.
    #[must_use]
    pub fn query(&self, with: &[&str]) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|(_, data)| {
                with.iter().all(|name| {
                    data.components
                        .iter()
                        .any(|component| component.type_name() == *name)
                })
            })
            .map(|(entity, _)| *entity)
            .collect()
    }

    fn ensure_exists(&self, entity: Entity) -> Result<(), WorldError> {
        if self.exists(entity) {
            Ok(())
        } else {
            Err(WorldError::EntityNotFound(entity))
        }
    }

    fn entity_data_mut(&mut self, entity: Entity) -> Result<&mut EntityData, WorldError> {
        self.entities
            .get_mut(&entity)
            .ok_or(WorldError::EntityNotFound(entity))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::error::ComponentError;
    use crate::schema::ComponentSchema;

    fn make_test_world() -> World {
        let mut registry = ComponentRegistry::new();
        registry
            .declare(ComponentSchema::data("health", [("hp", json!(10))]))
            .unwrap();
        registry
            .declare(ComponentSchema::data("armor", [("ac", json!(0))]).unique())
            .unwrap();
        registry.declare(ComponentSchema::tag("frozen")).unwrap();
        World::new(registry)
    }

    #[test]
    fn test_attach_sets_back_reference() {
        let mut world = make_test_world();
        let e = world.spawn();
        let id = world.attach(e, world.create("health").unwrap()).unwrap();
        assert_eq!(world.component(e, id).unwrap().entity(), Some(e));
        assert!(world.has_type(e, "health"));
    }

    #[test]
    fn test_attach_to_missing_entity() {
        let mut world = make_test_world();
        let c = world.create("frozen").unwrap();
        assert!(matches!(
            world.attach(Entity(99), c),
            Err(WorldError::EntityNotFound(Entity(99)))
        ));
    }

    #[test]
    fn test_attach_bound_component_is_error() {
        let mut world = make_test_world();
        let e = world.spawn();
        let mut c = world.create("frozen").unwrap();
        c.set_entity(Some(Entity(5))).unwrap();
        assert!(matches!(
            world.attach(e, c),
            Err(WorldError::Component(ComponentError::AlreadyBound { .. }))
        ));
    }

    #[test]
    fn test_detach_clears_back_reference() {
        let mut world = make_test_world();
        let e = world.spawn();
        let id = world.attach(e, world.create("health").unwrap()).unwrap();
        let c = world.detach(e, id).unwrap();
        assert_eq!(c.entity(), None);
        assert!(world.component(e, id).is_none());
        assert!(matches!(
            world.detach(e, id),
            Err(WorldError::ComponentNotFound(..))
        ));
        assert!(world.remove_if_present(e, id).is_none());
    }

    #[test]
    fn test_unique_components_are_replaced() {
        let mut world = make_test_world();
        let e = world.spawn();
        let removed = Rc::new(RefCell::new(Vec::new()));

        let mut first = world.create("armor").unwrap();
        let log = Rc::clone(&removed);
        first.on_remove(move |_, _, id| {
            log.borrow_mut().push(id);
            HookAction::Remove
        });
        let first_id = world.attach(e, first).unwrap();

        let mut second = world.create("armor").unwrap();
        second.set("ac", json!(4)).unwrap();
        let second_id = world.attach(e, second).unwrap();

        assert_eq!(*removed.borrow(), vec![first_id]);
        let armors: Vec<_> = world
            .components_of(e)
            .iter()
            .filter(|c| c.type_name() == "armor")
            .collect();
        assert_eq!(armors.len(), 1);
        assert_eq!(armors[0].id(), second_id);
    }

    #[test]
    fn test_non_unique_components_stack() {
        let mut world = make_test_world();
        let e = world.spawn();
        world.attach(e, world.create("health").unwrap()).unwrap();
        world.attach(e, world.create("health").unwrap()).unwrap();
        assert_eq!(world.components_of(e).len(), 2);
    }

    #[test]
    fn test_hooks_fire_once_per_attach_and_detach() {
        let mut world = make_test_world();
        let e = world.spawn();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let mut c = world.create("frozen").unwrap();
        let log = Rc::clone(&calls);
        c.on_add(move |_, entity, _| {
            log.borrow_mut().push(("add", entity));
            HookAction::Keep
        });
        let log = Rc::clone(&calls);
        c.on_remove(move |_, entity, _| {
            log.borrow_mut().push(("remove", entity));
            HookAction::Keep
        });

        let id = world.attach(e, c).unwrap();
        let c = world.detach(e, id).unwrap();
        assert_eq!(c.on_add_count(), 1);
        assert_eq!(c.on_remove_count(), 1);

        let other = world.spawn();
        world.attach(other, c).unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![("add", e), ("remove", e), ("add", other)]
        );
    }

    #[test]
    fn test_hook_can_remove_itself() {
        let mut world = make_test_world();
        let e = world.spawn();
        let count = Rc::new(RefCell::new(0));

        let mut c = world.create("frozen").unwrap();
        let counter = Rc::clone(&count);
        c.on_add(move |_, _, _| {
            *counter.borrow_mut() += 1;
            HookAction::Remove
        });
        c.on_add(|_, _, _| HookAction::Keep);

        let id = world.attach(e, c).unwrap();
        let c = world.detach(e, id).unwrap();
        assert_eq!(*count.borrow(), 1);
        assert_eq!(c.on_add_count(), 1);
    }

    #[test]
    fn test_hook_can_remove_all_of_its_kind() {
        let mut world = make_test_world();
        let e = world.spawn();
        let ran = Rc::new(RefCell::new(0));

        let mut c = world.create("frozen").unwrap();
        c.on_remove(|_, _, _| HookAction::RemoveAll);
        let counter = Rc::clone(&ran);
        c.on_remove(move |_, _, _| {
            *counter.borrow_mut() += 1;
            HookAction::Keep
        });

        let id = world.attach(e, c).unwrap();
        let c = world.detach(e, id).unwrap();
        assert_eq!(c.on_remove_count(), 0);
        assert_eq!(*ran.borrow(), 0);
    }

    #[test]
    fn test_component_detached_by_own_hook_keeps_its_hooks() {
        let mut world = make_test_world();
        let e = world.spawn();
        let parked: Rc<RefCell<Option<Component>>> = Rc::new(RefCell::new(None));
        let runs = Rc::new(RefCell::new(0));

        let mut c = world.create("frozen").unwrap();
        c.on_add(|_, _, _| HookAction::Remove);
        let slot = Rc::clone(&parked);
        c.on_add(move |world, entity, id| {
            if let Ok(component) = world.detach(entity, id) {
                *slot.borrow_mut() = Some(component);
            }
            HookAction::Keep
        });
        let counter = Rc::clone(&runs);
        c.on_add(move |_, _, _| {
            *counter.borrow_mut() += 1;
            HookAction::Keep
        });

        world.attach(e, c).unwrap();
        assert!(!world.has_type(e, "frozen"));
        let c = parked.borrow_mut().take().unwrap();
        assert_eq!(c.entity(), None);
        assert_eq!(c.on_add_count(), 2);
        assert_eq!(*runs.borrow(), 1);

        let other = world.spawn();
        world.attach(other, c).unwrap();
        assert_eq!(*runs.borrow(), 2);
        let c = parked.borrow_mut().take().unwrap();
        assert_eq!(c.on_add_count(), 2);
    }

    #[test]
    fn test_hook_sees_world() {
        let mut world = make_test_world();
        let e = world.spawn();
        let mut c = world.create("frozen").unwrap();
        c.on_add(|world, entity, _| {
            if let Ok(health) = world.create("health") {
                let _ = world.attach(entity, health);
            }
            HookAction::Remove
        });
        world.attach(e, c).unwrap();
        assert!(world.has_type(e, "health"));
    }

    #[test]
    fn test_despawn_detaches_everything() {
        let mut world = make_test_world();
        let e = world.spawn();
        world.attach(e, world.create("health").unwrap()).unwrap();
        world.attach(e, world.create("frozen").unwrap()).unwrap();

        let detached = world.despawn(e).unwrap();
        assert_eq!(detached.len(), 2);
        assert!(detached.iter().all(|c| c.entity().is_none()));
        assert!(!world.exists(e));
        assert!(world.despawn(e).is_err());
    }

    #[test]
    fn test_query() {
        let mut world = make_test_world();
        let e1 = world.spawn();
        world.attach(e1, world.create("health").unwrap()).unwrap();
        world.attach(e1, world.create("frozen").unwrap()).unwrap();
        let e2 = world.spawn();
        world.attach(e2, world.create("health").unwrap()).unwrap();

        assert_eq!(world.query(&["health"]), vec![e1, e2]);
        assert_eq!(world.query(&["health", "frozen"]), vec![e1]);
        assert!(world.query(&["armor"]).is_empty());
    }
}
