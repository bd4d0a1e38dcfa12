//! # kernel_effects
//!
//! Turn-limited components.
//!
//! - [`Expiration`] — unique per-entity countdown table; stacking extends,
//!   early removal untracks, expiry detaches the component.
//! - [`Duration`] — wrapper that moves a payload onto its entity and takes
//!   it away again when the wrapper expires.

pub mod duration;
pub mod error;
pub mod expiration;

pub use duration::Duration;
pub use error::EffectError;
pub use expiration::{Expiration, ExpiryNotice, TrackedEffect};

use kernel_component::{ComponentError, ComponentRegistry};

/// Declare `Expiration` and `Duration` on `registry`.
///
/// # Errors
///
/// [`ComponentError::DuplicateType`] if either is already declared.
pub fn declare_effect_types(registry: &mut ComponentRegistry) -> Result<(), ComponentError> {
    Expiration::declare(registry)?;
    Duration::declare(registry)?;
    Ok(())
}
