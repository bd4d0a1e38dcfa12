//! Duration wrapper: makes any component time-limited without that
//! component knowing about time.
//!
//! [`Duration::wrap`] takes ownership of an unbound payload. When the
//! wrapper is attached it moves the payload onto the same entity (systems
//! query the payload directly), keeps only the payload's id and registers
//! itself with the entity's [`Expiration`]. When the wrapper goes, by expiry
//! or otherwise, it takes the payload with it.

use std::rc::Rc;

use kernel_component::{
    Component, ComponentBehavior, ComponentError, ComponentId, ComponentRegistry, ComponentSchema,
    Entity, HookAction, Relinks, World,
};
use kernel_time::Ticks;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::EffectError;
use crate::expiration::Expiration;

const PAYLOAD_FIELD: &str = "payload";
const TICKS_FIELD: &str = "ticks";
const MESSAGE_FIELD: &str = "message";

/// The `Duration` component type.
#[derive(Debug)]
pub struct Duration;

impl Duration {
    pub const TYPE_NAME: &'static str = "Duration";

    /// # Errors
    ///
    /// [`ComponentError::DuplicateType`] if already declared.
    pub fn declare(registry: &mut ComponentRegistry) -> Result<(), ComponentError> {
        registry.declare_with(
            ComponentSchema::data(
                Self::TYPE_NAME,
                [
                    (PAYLOAD_FIELD, Value::Null),
                    (TICKS_FIELD, json!(0)),
                    (MESSAGE_FIELD, Value::Null),
                ],
            ),
            Rc::new(DurationBehavior),
        )?;
        Ok(())
    }

    /// Wrap `payload` so that it lasts `ticks` turns once the returned
    /// wrapper is attached to an entity.
    ///
    /// Without a `message` the expiry notice names the payload's type.
    ///
    /// # Errors
    ///
    /// [`EffectError::PayloadBound`] if `payload` is bound to an entity, or
    /// [`ComponentError::TypeNotFound`] if `Duration` is not declared.
    pub fn wrap(
        registry: &ComponentRegistry,
        payload: Component,
        ticks: Ticks,
        message: Option<String>,
    ) -> Result<Component, EffectError> {
        if payload.entity().is_some() {
            return Err(EffectError::PayloadBound(payload.id()));
        }
        let message = message.unwrap_or_else(|| format!("{} wears off", payload.type_name()));

        let mut wrapper = registry.create(Self::TYPE_NAME)?;
        wrapper.set(TICKS_FIELD, json!(ticks))?;
        wrapper.set(MESSAGE_FIELD, json!(message))?;

        let mut payload = Some(payload);
        wrapper.on_add(move |world, entity, wrapper_id| {
            let Some(payload) = payload.take() else {
                return HookAction::Remove;
            };
            let payload_id = match world.attach(entity, payload) {
                Ok(id) => id,
                Err(err) => {
                    warn!(%entity, %wrapper_id, %err, "failed to attach wrapped payload");
                    return HookAction::Remove;
                }
            };
            if let Some(wrapper) = world.component_mut(entity, wrapper_id)
                && let Err(err) = wrapper.set(PAYLOAD_FIELD, json!(payload_id))
            {
                warn!(%entity, %wrapper_id, %err, "failed to record payload id");
            }
            debug!(%entity, %wrapper_id, %payload_id, ticks, "duration attached");
            if let Err(err) =
                Expiration::add_effect(world, entity, wrapper_id, ticks, Some(message.clone()))
            {
                warn!(%entity, %wrapper_id, %err, "failed to start duration countdown");
            }
            HookAction::Remove
        });
        Ok(wrapper)
    }

    /// The id of the payload a bound wrapper put on its entity.
    #[must_use]
    pub fn payload(wrapper: &Component) -> Option<ComponentId> {
        wrapper.field_as::<Option<ComponentId>>(PAYLOAD_FIELD).ok().flatten()
    }
}

#[derive(Debug)]
struct DurationBehavior;

impl ComponentBehavior for DurationBehavior {
    fn copy_into(&self, _source: &Component, copy: &mut Component) {
        // The payload has exactly one owner.
        if let Err(err) = copy.set(PAYLOAD_FIELD, Value::Null) {
            warn!(%err, "failed to clear copied payload link");
        }
    }

    fn on_detach(&self, world: &mut World, entity: Entity, component: &Component) {
        let Some(payload) = Duration::payload(component) else {
            return;
        };
        if world.remove_if_present(entity, payload).is_some() {
            debug!(%entity, wrapper = %component.id(), %payload, "duration ended, payload removed");
        }
    }

    fn relink(&self, component: &mut Component, relinks: &Relinks) {
        let Some(old) = Duration::payload(component) else {
            return;
        };
        let payload = match relinks.component(old) {
            Some(new) => json!(new),
            None => {
                debug!(%old, "wrapped payload was not persisted");
                Value::Null
            }
        };
        if let Err(err) = component.set(PAYLOAD_FIELD, payload) {
            warn!(%err, "failed to relink payload");
        }
    }
}
