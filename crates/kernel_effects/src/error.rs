//! Effect subsystem errors.

use kernel_component::{ComponentError, ComponentId, Entity, WorldError};

/// Errors from the `Expiration` and `Duration` operations.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    /// Only components bound to the entity can be given a lifetime.
    #[error("component {component} is not attached to {entity}")]
    NotAttached { component: ComponentId, entity: Entity },

    /// A duration wrapper must own its payload, so the payload has to be
    /// unbound when wrapped.
    #[error("payload {0} is already bound to an entity")]
    PayloadBound(ComponentId),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Component(#[from] ComponentError),
}
