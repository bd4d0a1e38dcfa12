//! The turn loop: scheduler, world and effects driven together.
//!
//! Each turn:
//!
//! 1. Ask the scheduler for the next due entity (kill notices are applied
//!    first).
//! 2. Count down that entity's effects; expired components are removed.
//! 3. Let the [`ActorPolicy`] act and report how long it took.
//! 4. Hand the duration back to the scheduler, which re-arms actors.

use std::sync::mpsc;

use kernel_component::{Component, Entity, World};
use kernel_effects::{Expiration, ExpiryNotice};
use kernel_time::{KillNotifier, Scheduler, Ticks};
use tracing::{debug, info, trace};

use crate::config::TurnConfig;
use crate::error::TurnError;
use crate::policy::{ActorPolicy, Outcome};

/// What happened during one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub turn: u64,
    /// Simulated time at which the turn was taken.
    pub time: Ticks,
    pub actor: Entity,
    pub outcome: Outcome,
    pub expired: Vec<ExpiryNotice>,
}

/// Totals of a [`TurnLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub turns: u64,
    pub time: Ticks,
    pub expired: usize,
    pub deaths: usize,
}

/// Drives a [`World`] from a [`Scheduler`] of entities, one turn at a time.
#[derive(Debug)]
pub struct TurnLoop {
    config: TurnConfig,
    world: World,
    scheduler: Scheduler<Entity>,
    kills: KillNotifier<Entity>,
    /// Turns handed out so far.
    turn: u64,
    /// Actors added so far, for staggering first turns.
    actors_added: u64,
}

impl TurnLoop {
    /// An empty schedule over `world`, with its own kill feed.
    #[must_use]
    pub fn new(world: World, config: TurnConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self::from_parts(
            config,
            world,
            Scheduler::with_kill_feed(receiver),
            KillNotifier::new(sender),
            0,
        )
    }

    pub(crate) fn from_parts(
        config: TurnConfig,
        world: World,
        scheduler: Scheduler<Entity>,
        kills: KillNotifier<Entity>,
        turn: u64,
    ) -> Self {
        let actors_added = scheduler.len() as u64;
        Self {
            config,
            world,
            scheduler,
            kills,
            turn,
            actors_added,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<Entity> {
        &self.scheduler
    }

    pub(crate) fn scheduler_mut(&mut self) -> &mut Scheduler<Entity> {
        &mut self.scheduler
    }

    #[must_use]
    pub fn turn(&self) -> u64 {
        self.turn
    }

    #[must_use]
    pub fn time(&self) -> Ticks {
        self.scheduler.time()
    }

    /// A sender for the kill feed, for systems that decide deaths outside
    /// the loop.
    #[must_use]
    pub fn notifier(&self) -> KillNotifier<Entity> {
        self.kills.clone()
    }

    /// Spawn a new entity and register it as an actor.
    pub fn spawn_actor(&mut self) -> Entity {
        let entity = self.world.spawn();
        self.add_actor(entity);
        entity
    }

    /// Register an existing entity as an actor. First turns of successive
    /// actors are staggered by `config.stagger`.
    pub fn add_actor(&mut self, entity: Entity) {
        let offset = self.config.stagger * self.actors_added;
        self.actors_added += 1;
        self.scheduler.add(entity, true, offset);
    }

    /// Schedule a one-shot turn for `entity`, `offset` ticks from now.
    /// A pending event for the same entity is replaced.
    ///
    /// # Errors
    ///
    /// [`TurnError::AlreadyActor`] if `entity` is registered as an actor;
    /// its repeating turn is left untouched.
    pub fn schedule_event(&mut self, entity: Entity, offset: Ticks) -> Result<(), TurnError> {
        if self.scheduler.is_actor(&entity) {
            return Err(TurnError::AlreadyActor(entity));
        }
        self.scheduler.add(entity, false, offset);
        Ok(())
    }

    /// Despawn `entity` and cancel its schedule through the kill feed.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`](kernel_component::WorldError) if it
    /// does not exist.
    pub fn kill(&mut self, entity: Entity) -> Result<Vec<Component>, TurnError> {
        let components = self.world.despawn(entity)?;
        self.kills.notify(entity);
        info!(%entity, time = self.time(), "killed");
        Ok(components)
    }

    /// Play the next turn. Returns `None` once nothing is scheduled.
    ///
    /// Entities despawned without going through [`TurnLoop::kill`] are
    /// dropped from the schedule when their slot comes up.
    ///
    /// # Errors
    ///
    /// Scheduler protocol errors, or an unknown entity in the effect
    /// countdown.
    pub fn step<P>(&mut self, policy: &mut P) -> Result<Option<TurnReport>, TurnError>
    where
        P: ActorPolicy + ?Sized,
    {
        loop {
            let Some(actor) = self.scheduler.next()? else {
                return Ok(None);
            };
            if !self.world.exists(actor) {
                debug!(%actor, "dropping slot of despawned entity");
                self.scheduler.remove(&actor);
                self.scheduler.set_action(0)?;
                continue;
            }

            self.turn += 1;
            let time = self.scheduler.time();
            let expired = Expiration::decr_duration(&mut self.world, actor)?;
            let outcome = policy.act(&mut self.world, actor);
            match outcome {
                Outcome::Acted(duration) => self.scheduler.set_action(duration)?,
                Outcome::Died => {
                    self.scheduler.set_action(0)?;
                    self.kill(actor)?;
                }
            }
            trace!(turn = self.turn, time, %actor, ?outcome, "turn played");

            return Ok(Some(TurnReport {
                turn: self.turn,
                time,
                actor,
                outcome,
                expired,
            }));
        }
    }

    /// Play turns until `config.max_turns` is reached or the schedule runs
    /// dry.
    ///
    /// # Errors
    ///
    /// As [`TurnLoop::step`].
    pub fn run<P>(&mut self, policy: &mut P) -> Result<RunSummary, TurnError>
    where
        P: ActorPolicy + ?Sized,
    {
        let max_turns = self.config.max_turns;
        let mut summary = RunSummary::default();

        info!(max_turns, time = self.time(), "starting turn loop");
        while max_turns == 0 || summary.turns < max_turns {
            let Some(report) = self.step(policy)? else {
                info!("schedule is empty");
                break;
            };
            summary.turns += 1;
            summary.expired += report.expired.len();
            if report.outcome == Outcome::Died {
                summary.deaths += 1;
            }
        }
        summary.time = self.time();

        info!(
            turns = summary.turns,
            time = summary.time,
            expired = summary.expired,
            deaths = summary.deaths,
            "turn loop complete"
        );
        Ok(summary)
    }
}
