//! # kernel_app
//!
//! Headless driver for the simulation kernel: loads content, runs the
//! scheduler / effects / policy turn loop, and saves or resumes games.

pub mod config;
pub mod content;
pub mod error;
pub mod policy;
pub mod save;
pub mod turn;

pub use config::TurnConfig;
pub use content::{load_registry, registry_from_str};
pub use error::TurnError;
pub use policy::{ActorPolicy, FixedDuration, Outcome, Skirmish};
pub use save::SaveGame;
pub use turn::{RunSummary, TurnLoop, TurnReport};
