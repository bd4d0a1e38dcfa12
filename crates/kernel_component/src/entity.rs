//! Entity identity.
//!
//! Entities hold no data; an [`Entity`] is only the number the
//! [`World`](crate::World) files components under. Id `0` means "no entity":
//! the world never spawns it, and a reference field pointing at it is
//! persisted as `null`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle of an entity in one [`World`](crate::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(pub u64);

impl Entity {
    /// The "no entity" value.
    pub const INVALID: Entity = Entity(0);

    /// The number stored in entity-reference fields.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity #{}", self.0)
    }
}

/// Spawn counter of a single world. Ids are not reused after a despawn, so a
/// stale reference never lands on a newer entity.
#[derive(Debug)]
pub struct EntityAllocator {
    last: u64,
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Entity::INVALID.0,
        }
    }

    /// The next unused id.
    pub fn allocate(&mut self) -> Entity {
        self.last += 1;
        Entity(self.last)
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
