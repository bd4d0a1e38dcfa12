//! Scheduler error types.

/// Protocol violations of the `next()` / `set_action()` pairing.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// `next()` was called while a payload still awaits its action.
    #[error("payload {0} is still awaiting set_action()")]
    ActionPending(String),

    /// `set_action()` was called without a preceding `next()`.
    #[error("set_action() called with no payload awaiting its action")]
    NoActionPending,
}
