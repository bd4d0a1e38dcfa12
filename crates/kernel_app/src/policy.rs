//! Actor policies: what an actor does with its turn.
//!
//! The kernel only cares how long an action took. Deciding the action
//! (player input, AI) happens behind [`ActorPolicy`].

use kernel_component::{Entity, World};
use kernel_time::Ticks;
use tracing::{debug, warn};

/// Result of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The actor acted; its next turn comes this many ticks from now.
    Acted(Ticks),
    /// The actor died during its turn.
    Died,
}

/// Decides what an actor does on its turn.
pub trait ActorPolicy {
    /// Take `actor`'s turn and report how long it took, or that it died.
    fn act(&mut self, world: &mut World, actor: Entity) -> Outcome;
}

/// Every action takes the same time.
#[derive(Debug, Clone, Copy)]
pub struct FixedDuration(pub Ticks);

impl ActorPolicy for FixedDuration {
    fn act(&mut self, _world: &mut World, _actor: Entity) -> Outcome {
        Outcome::Acted(self.0)
    }
}

/// Headless demo rules over the bundled content.
///
/// - `poisoned` components deal their `damage` to `health.hp` every turn;
///   `regenerating` ones heal their `amount`, up to `health.max`.
/// - An actor whose `hp` drops to zero dies.
/// - `hasted` actors act in half the time.
#[derive(Debug, Clone, Copy)]
pub struct Skirmish {
    /// Ticks a normal action takes.
    pub base_duration: Ticks,
}

impl Skirmish {
    #[must_use]
    pub fn new(base_duration: Ticks) -> Self {
        Self { base_duration }
    }

    fn sum_field(world: &World, actor: Entity, type_name: &str, field: &str) -> i64 {
        world
            .components_of(actor)
            .iter()
            .filter(|component| component.type_name() == type_name)
            .filter_map(|component| component.field_as::<i64>(field).ok())
            .sum()
    }
}

impl ActorPolicy for Skirmish {
    fn act(&mut self, world: &mut World, actor: Entity) -> Outcome {
        let change = Self::sum_field(world, actor, "regenerating", "amount")
            - Self::sum_field(world, actor, "poisoned", "damage");

        if change != 0
            && let Some(health) = world.find_by_type_mut(actor, "health")
        {
            let hp = health.field_as::<i64>("hp").unwrap_or_default();
            let max = health.field_as::<i64>("max").unwrap_or(hp);
            let hp = (hp + change).min(max);
            if let Err(err) = health.set_field_as("hp", &hp) {
                warn!(%actor, %err, "failed to update health");
            }
            debug!(%actor, change, hp, "health changed");
            if hp <= 0 {
                return Outcome::Died;
            }
        }

        let duration = if world.has_type(actor, "hasted") {
            self.base_duration / 2
        } else {
            self.base_duration
        };
        Outcome::Acted(duration)
    }
}
