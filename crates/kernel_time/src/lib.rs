//! # kernel_time
//!
//! Turn ordering for the simulation kernel.
//!
//! - [`DeltaQueue`] — payloads ordered by relative firing time, with a clock
//!   that only moves when something is popped.
//! - [`Scheduler`] — the `next()` / `set_action()` turn protocol for actors
//!   and one-shot events, built directly on the delta queue.
//! - [`KillNotifier`] — channel through which dead actors are cancelled.

pub mod delta_queue;
pub mod error;
pub mod scheduler;

pub use delta_queue::DeltaQueue;
pub use error::SchedulerError;
pub use scheduler::{AwaitingEntry, KillNotifier, ScheduledEntry, Scheduler, SchedulerSnapshot};

/// Simulated time, in ticks. Unsigned, so a re-armed slot can never land in
/// the past.
pub type Ticks = u64;
