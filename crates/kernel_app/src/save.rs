//! Save games: world and schedule persisted together.
//!
//! Restoring a world hands out fresh entity handles, so the schedule is
//! remapped through the restore's [`Relinks`] before the scheduler is rebuilt.

use std::sync::mpsc;

use kernel_component::{ComponentRegistry, Entity, Relinks, World, WorldSnapshot, codec};
use kernel_time::{AwaitingEntry, KillNotifier, ScheduledEntry, Scheduler, SchedulerSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TurnConfig;
use crate::error::TurnError;
use crate::turn::TurnLoop;

/// Everything needed to resume a [`TurnLoop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveGame {
    /// Turns played before the save.
    pub turn: u64,
    pub world: WorldSnapshot,
    /// Payloads are entity handles of the saved world, remapped on load.
    pub schedule: SchedulerSnapshot<Entity>,
}

impl TurnLoop {
    /// Capture the loop state. Kill notices received so far are applied
    /// first.
    pub fn save_game(&mut self) -> SaveGame {
        SaveGame {
            turn: self.turn(),
            schedule: self.scheduler_mut().snapshot(),
            world: self.world().snapshot(),
        }
    }

    /// Encode the loop state as MessagePack.
    ///
    /// # Errors
    ///
    /// [`TurnError::Codec`] if encoding fails.
    pub fn save(&mut self) -> Result<Vec<u8>, TurnError> {
        let save = self.save_game();
        let bytes = codec::encode(&save)?;
        info!(
            turn = save.turn,
            time = save.schedule.time,
            entities = save.world.entities.len(),
            bytes = bytes.len(),
            "game saved"
        );
        Ok(bytes)
    }

    /// Decode a MessagePack save and rebuild the loop around it.
    ///
    /// # Errors
    ///
    /// [`TurnError::Codec`] for undecodable bytes, otherwise as
    /// [`TurnLoop::from_save`].
    pub fn load(registry: ComponentRegistry, config: TurnConfig, bytes: &[u8]) -> Result<Self, TurnError> {
        let save: SaveGame = codec::decode(bytes)?;
        Self::from_save(registry, config, save)
    }

    /// Rebuild the loop from a save.
    ///
    /// # Errors
    ///
    /// Any error from restoring the world (unknown type, unknown field).
    pub fn from_save(registry: ComponentRegistry, config: TurnConfig, save: SaveGame) -> Result<Self, TurnError> {
        let (world, relinks) = World::restore(registry, &save.world)?;
        let schedule = remap_schedule(save.schedule, &relinks);

        let (sender, receiver) = mpsc::channel();
        let scheduler = Scheduler::restore_with_kill_feed(schedule, receiver);
        info!(
            turn = save.turn,
            time = scheduler.time(),
            entities = world.entity_count(),
            pending = scheduler.len(),
            "game loaded"
        );
        Ok(Self::from_parts(
            config,
            world,
            scheduler,
            KillNotifier::new(sender),
            save.turn,
        ))
    }
}

/// Point every schedule entry at the restored entity. Entries for entities
/// that were not saved are dropped.
fn remap_schedule(schedule: SchedulerSnapshot<Entity>, relinks: &Relinks) -> SchedulerSnapshot<Entity> {
    let remap = |entity: Entity| {
        let restored = relinks.entity(entity.id());
        if restored.is_none() {
            warn!(%entity, "scheduled entity missing from save, dropping its slot");
        }
        restored
    };

    SchedulerSnapshot {
        time: schedule.time,
        entries: schedule
            .entries
            .into_iter()
            .filter_map(|entry| {
                Some(ScheduledEntry {
                    payload: remap(entry.payload)?,
                    ..entry
                })
            })
            .collect(),
        awaiting: schedule.awaiting.and_then(|awaiting| {
            Some(AwaitingEntry {
                payload: remap(awaiting.payload)?,
                ..awaiting
            })
        }),
    }
}
