//! Turn loop errors.

use std::path::PathBuf;

use kernel_component::{CodecError, ComponentError, Entity, WorldError};
use kernel_effects::EffectError;
use kernel_time::SchedulerError;

/// Anything that can stop the turn loop, a save or a load.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// One-shot events may not be queued for an entity that takes turns.
    #[error("{0} is scheduled as an actor")]
    AlreadyActor(Entity),

    /// A content file could not be read.
    #[error("failed to read content file {}: {source}", path.display())]
    Content {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
