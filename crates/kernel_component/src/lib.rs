//! # kernel_component
//!
//! The component half of the simulation kernel.
//!
//! - [`ComponentSchema`] / [`ComponentType`] — declarative component types:
//!   a field manifest with defaults plus the unique / transient flags.
//! - [`ComponentRegistry`] — declares types and constructs instances.
//! - [`Component`] — an instance: process-wide [`ComponentId`], entity
//!   back-reference, lifecycle hooks, schema-driven serialization and copy.
//! - [`ComponentBehavior`] — per-type overrides of that contract.
//! - [`World`] — entity store that binds components and fires their hooks.
//! - [`WorldSnapshot`] and [`codec`] — persistence.

pub mod behavior;
pub mod codec;
pub mod component;
pub mod entity;
pub mod error;
pub mod registry;
pub mod schema;
pub mod snapshot;
pub mod world;

pub use behavior::{ComponentBehavior, Relinks};
pub use component::{Component, ComponentId, ENTITY_REF_KEY, Hook, HookAction};
pub use entity::{Entity, EntityAllocator};
pub use error::{CodecError, ComponentError, WorldError};
pub use registry::ComponentRegistry;
pub use schema::{ComponentSchema, ComponentType, FieldManifest, RESERVED_FIELDS, TypeFlags};
pub use snapshot::{ComponentRecord, EntitySnapshot, WorldSnapshot};
pub use world::World;
