//! Turn loop configuration.

use kernel_time::Ticks;

/// Parameters of a [`TurnLoop`](crate::TurnLoop) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnConfig {
    /// Maximum number of turns per run (0 = until the schedule runs dry).
    pub max_turns: u64,
    /// Ticks an action takes when the policy has nothing better to say.
    pub default_duration: Ticks,
    /// Offset between the first turns of successively added actors.
    pub stagger: Ticks,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_turns: 100,
            default_duration: 100,
            stagger: 10,
        }
    }
}

impl TurnConfig {
    /// `0` runs until the schedule is empty.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: u64) -> Self {
        self.max_turns = max_turns;
        self
    }

    #[must_use]
    pub fn with_default_duration(mut self, duration: Ticks) -> Self {
        self.default_duration = duration;
        self
    }

    #[must_use]
    pub fn with_stagger(mut self, stagger: Ticks) -> Self {
        self.stagger = stagger;
        self
    }
}
