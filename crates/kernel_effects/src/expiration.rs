//! Expiration — per-entity countdowns that remove components when they run
//! out.
//!
//! Every entity with time-limited components carries one unique `Expiration`
//! component listing the tracked component ids and their remaining ticks.
//! The turn loop calls [`Expiration::decr_duration`] once per turn of the
//! owning entity; a countdown that reaches zero detaches its component and
//! yields an [`ExpiryNotice`].
//!
//! Tracked components get an `on_remove` hook, so a component removed early
//! (cured, dispelled, destroyed) drops out of the table by itself.

use std::rc::Rc;

use kernel_component::{
    Component, ComponentBehavior, ComponentError, ComponentId, ComponentRegistry, ComponentSchema,
    Entity, HookAction, Relinks, World, WorldError,
};
use kernel_time::Ticks;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::EffectError;

const EFFECTS_FIELD: &str = "effects";

/// One tracked countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEffect {
    pub component: ComponentId,
    /// Owner turns left before removal.
    pub ticks: Ticks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Emitted when a countdown runs out and its component is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryNotice {
    pub entity: Entity,
    pub component: ComponentId,
    pub type_name: String,
    /// The configured message, or a generic one naming the type.
    pub message: String,
}

/// The `Expiration` component type and its operations.
#[derive(Debug)]
pub struct Expiration;

impl Expiration {
    pub const TYPE_NAME: &'static str = "Expiration";

    /// Declare the `Expiration` type: unique, one `effects` list.
    ///
    /// # Errors
    ///
    /// [`ComponentError::DuplicateType`] if already declared.
    pub fn declare(registry: &mut ComponentRegistry) -> Result<(), ComponentError> {
        registry.declare_with(
            ComponentSchema::data(Self::TYPE_NAME, [(EFFECTS_FIELD, json!([]))]).unique(),
            Rc::new(ExpirationBehavior),
        )?;
        Ok(())
    }

    /// Give `component` (bound to `entity`) a lifetime of `ticks` turns.
    ///
    /// An untracked component starts counting from `ticks`. A tracked one has
    /// `ticks` added to what it has left; a new `message` replaces the old
    /// one. The entity gets an `Expiration` component if it has none.
    /// Returns the ticks now remaining.
    ///
    /// # Errors
    ///
    /// [`EffectError::NotAttached`] if `component` is not bound to `entity`.
    pub fn add_effect(
        world: &mut World,
        entity: Entity,
        component: ComponentId,
        ticks: Ticks,
        message: Option<String>,
    ) -> Result<Ticks, EffectError> {
        if world.component(entity, component).is_none() {
            return Err(EffectError::NotAttached { component, entity });
        }
        if !world.has_type(entity, Self::TYPE_NAME) {
            let expiration = world.create(Self::TYPE_NAME)?;
            world.attach(entity, expiration)?;
        }

        let mut effects = Self::effects(world, entity)?;
        if let Some(existing) = effects.iter_mut().find(|effect| effect.component == component) {
            existing.ticks += ticks;
            if message.is_some() {
                existing.message = message;
            }
            let remaining = existing.ticks;
            Self::store(world, entity, &effects)?;
            debug!(%entity, %component, added = ticks, remaining, "effect extended");
            return Ok(remaining);
        }

        effects.push(TrackedEffect {
            component,
            ticks,
            message,
        });
        Self::store(world, entity, &effects)?;
        Self::hook(world, entity, component);
        debug!(%entity, %component, ticks, "effect tracked");
        Ok(ticks)
    }

    /// Count every tracked effect on `entity` down by one tick and remove
    /// the components whose countdown reached zero.
    ///
    /// Entities without an `Expiration` component have nothing to do.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] for unknown entities.
    pub fn decr_duration(world: &mut World, entity: Entity) -> Result<Vec<ExpiryNotice>, EffectError> {
        if !world.exists(entity) {
            return Err(WorldError::EntityNotFound(entity).into());
        }
        if !world.has_type(entity, Self::TYPE_NAME) {
            return Ok(Vec::new());
        }

        let mut effects = Self::effects(world, entity)?;
        let mut expired = Vec::new();
        effects.retain_mut(|effect| {
            effect.ticks = effect.ticks.saturating_sub(1);
            if effect.ticks == 0 {
                expired.push(effect.clone());
                false
            } else {
                true
            }
        });
        // Stop tracking before detaching so the removal hook finds nothing.
        Self::store(world, entity, &effects)?;

        let mut notices = Vec::with_capacity(expired.len());
        for effect in expired {
            let Some(removed) = world.remove_if_present(entity, effect.component) else {
                debug!(%entity, component = %effect.component, "expired effect already gone");
                continue;
            };
            let type_name = removed.type_name().to_string();
            let message = effect
                .message
                .unwrap_or_else(|| format!("{type_name} wears off"));
            info!(%entity, component = %effect.component, %type_name, %message, "effect expired");
            notices.push(ExpiryNotice {
                entity,
                component: effect.component,
                type_name,
                message,
            });
        }
        Ok(notices)
    }

    /// Ticks left on `component`, if it is tracked.
    #[must_use]
    pub fn remaining(world: &World, entity: Entity, component: ComponentId) -> Option<Ticks> {
        let expiration = world.find_by_type(entity, Self::TYPE_NAME)?;
        expiration
            .field_as::<Vec<TrackedEffect>>(EFFECTS_FIELD)
            .ok()?
            .into_iter()
            .find(|effect| effect.component == component)
            .map(|effect| effect.ticks)
    }

    /// Returns `true` while `component` has a countdown running.
    #[must_use]
    pub fn is_tracked(world: &World, entity: Entity, component: ComponentId) -> bool {
        Self::remaining(world, entity, component).is_some()
    }

    /// Drop the entry for `component`. A no-op if it is not tracked or the
    /// entity has no `Expiration`.
    fn forget(world: &mut World, entity: Entity, component: ComponentId) {
        let Some(expiration) = world.find_by_type_mut(entity, Self::TYPE_NAME) else {
            return;
        };
        let mut effects = match expiration.field_as::<Vec<TrackedEffect>>(EFFECTS_FIELD) {
            Ok(effects) => effects,
            Err(err) => {
                warn!(%entity, %err, "unreadable expiration table");
                return;
            }
        };
        let before = effects.len();
        effects.retain(|effect| effect.component != component);
        if effects.len() == before {
            return;
        }
        if let Err(err) = expiration.set_field_as(EFFECTS_FIELD, &effects) {
            warn!(%entity, %err, "failed to update expiration table");
            return;
        }
        debug!(%entity, %component, "effect removed early, untracked");
    }

    /// Install the early-removal hook on a tracked component.
    fn hook(world: &mut World, entity: Entity, component: ComponentId) {
        if let Some(tracked) = world.component_mut(entity, component) {
            tracked.on_remove(|world, entity, id| {
                Expiration::forget(world, entity, id);
                HookAction::Remove
            });
        }
    }

    fn effects(world: &World, entity: Entity) -> Result<Vec<TrackedEffect>, EffectError> {
        let expiration = world
            .find_by_type(entity, Self::TYPE_NAME)
            .ok_or_else(|| ComponentError::TypeNotFound(Self::TYPE_NAME.to_string()))?;
        Ok(expiration.field_as(EFFECTS_FIELD)?)
    }

    fn store(world: &mut World, entity: Entity, effects: &[TrackedEffect]) -> Result<(), EffectError> {
        let expiration = world
            .find_by_type_mut(entity, Self::TYPE_NAME)
            .ok_or_else(|| ComponentError::TypeNotFound(Self::TYPE_NAME.to_string()))?;
        expiration.set_field_as(EFFECTS_FIELD, &effects)?;
        Ok(())
    }
}

/// Keeps the `effects` table consistent across copies and restores.
#[derive(Debug)]
struct ExpirationBehavior;

impl ComponentBehavior for ExpirationBehavior {
    fn copy_into(&self, _source: &Component, copy: &mut Component) {
        // Countdowns belong to the components of the source's entity.
        if let Err(err) = copy.set(EFFECTS_FIELD, json!([])) {
            warn!(%err, "failed to reset copied expiration table");
        }
    }

    fn relink(&self, component: &mut Component, relinks: &Relinks) {
        let Ok(effects) = component.field_as::<Vec<TrackedEffect>>(EFFECTS_FIELD) else {
            warn!(id = %component.id(), "unreadable expiration table on restore");
            return;
        };
        let effects: Vec<TrackedEffect> = effects
            .into_iter()
            .filter_map(|effect| {
                let component = relinks.component(effect.component)?;
                Some(TrackedEffect { component, ..effect })
            })
            .collect();
        if let Err(err) = component.set_field_as(EFFECTS_FIELD, &effects) {
            warn!(%err, "failed to relink expiration table");
        }
    }

    fn after_restore(&self, world: &mut World, entity: Entity, _id: ComponentId) {
        let Ok(effects) = Expiration::effects(world, entity) else {
            return;
        };
        let (live, gone): (Vec<TrackedEffect>, Vec<TrackedEffect>) = effects
            .into_iter()
            .partition(|effect| world.component(entity, effect.component).is_some());
        if !gone.is_empty() {
            debug!(%entity, dropped = gone.len(), "untracking effects whose components were not restored");
            if let Err(err) = Expiration::store(world, entity, &live) {
                warn!(%entity, %err, "failed to prune expiration table");
            }
        }
        for effect in &live {
            Expiration::hook(world, entity, effect.component);
        }
    }
}
