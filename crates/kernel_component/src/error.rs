//! Error types for component declaration, construction and binding.

use crate::component::ComponentId;
use crate::entity::Entity;

/// Errors raised by the component registry and component instances.
///
/// Every variant is a programming or content bug; none is retried.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// A type with this name is already declared.
    #[error("component type '{0}' is already declared")]
    DuplicateType(String),

    /// No type with this name is declared.
    #[error("component type '{0}' not found")]
    TypeNotFound(String),

    /// A field shadows one of the base accessors every component has.
    #[error("component type '{component}' declares reserved field '{field}'")]
    ReservedField { component: String, field: String },

    /// The schema itself is inconsistent.
    #[error("malformed schema for '{component}': {reason}")]
    MalformedSchema { component: String, reason: String },

    /// A setter was called for a field the type does not declare.
    #[error("component type '{component}' has no field '{field}'")]
    UnknownField { component: String, field: String },

    /// A value does not match the kind of the field's declared default.
    #[error("field '{component}.{field}': expected {expected}, got {found}")]
    FieldKind {
        component: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// More positional constructor arguments than declared fields.
    #[error("component type '{component}' takes {expected} arguments, got {given}")]
    TooManyArguments {
        component: String,
        expected: usize,
        given: usize,
    },

    /// The component already has an owner; it must be unbound first.
    #[error("component {component} is already bound to {entity}")]
    AlreadyBound { component: ComponentId, entity: Entity },

    /// A typed field read or write failed to convert.
    #[error("field '{component}.{field}' conversion failed: {source}")]
    Convert {
        component: String,
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// Schema content could not be parsed.
    #[error("failed to parse component schemas: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised by [`World`](crate::World) operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("{0} not found")]
    EntityNotFound(Entity),

    #[error("component {0} not found on {1}")]
    ComponentNotFound(ComponentId, Entity),

    #[error(transparent)]
    Component(#[from] ComponentError),
}

/// Errors raised when encoding or decoding snapshots.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a value to MessagePack.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a value from MessagePack.
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
