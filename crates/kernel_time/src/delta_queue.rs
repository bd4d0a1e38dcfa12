//! Relative-time ordered queue.
//!
//! A [`DeltaQueue`] keeps payloads ordered by arrival while storing only the
//! time remaining until each one fires, measured from the queue's current
//! clock. The clock advances lazily: only [`DeltaQueue::get`] moves it, by
//! the delta of the entry it pops.

use tracing::trace;

use crate::Ticks;

/// A queue of payloads ordered by relative firing time.
///
/// Payloads and their deltas live in two parallel vectors. Entries with the
/// same delta keep their insertion order.
#[derive(Debug, Clone)]
pub struct DeltaQueue<T> {
    /// Current clock; the sum of all deltas consumed by `get`.
    time: Ticks,
    /// Payloads in firing order.
    events: Vec<T>,
    /// Time remaining for the payload at the same index, relative to `time`.
    deltas: Vec<Ticks>,
}

impl<T> DeltaQueue<T> {
    /// Create an empty queue with the clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time(0)
    }

    /// Create an empty queue whose clock starts at `time`.
    ///
    /// Used when rebuilding a queue from a snapshot.
    #[must_use]
    pub fn with_time(time: Ticks) -> Self {
        Self {
            time,
            events: Vec::new(),
            deltas: Vec::new(),
        }
    }

    /// Returns the current clock.
    #[must_use]
    pub fn time(&self) -> Ticks {
        self.time
    }

    /// Insert `payload` to fire `time` ticks from now.
    ///
    /// The payload lands before the first entry whose delta is strictly
    /// greater, so equal deltas come out first-in, first-out. The clock is
    /// left untouched.
    pub fn add(&mut self, payload: T, time: Ticks) {
        let index = self
            .deltas
            .iter()
            .position(|&delta| delta > time)
            .unwrap_or(self.deltas.len());
        self.events.insert(index, payload);
        self.deltas.insert(index, time);
        trace!(index, delta = time, len = self.events.len(), "queued payload");
    }

    /// Pop the earliest payload, advancing the clock to its firing time.
    ///
    /// Every remaining delta is reduced by the popped entry's delta so the
    /// queue stays relative to the new clock. Returns `None` when empty.
    pub fn get(&mut self) -> Option<T> {
        if self.events.is_empty() {
            return None;
        }

        let delta = self.deltas.remove(0);
        if delta > 0 {
            self.time += delta;
            for remaining in &mut self.deltas {
                *remaining -= delta;
            }
        }

        trace!(time = self.time, elapsed = delta, "popped payload");
        Some(self.events.remove(0))
    }

    /// Returns the delta of the next payload without popping it.
    #[must_use]
    pub fn peek_time(&self) -> Option<Ticks> {
        self.deltas.first().copied()
    }

    /// Drop every pending entry. The clock keeps its value.
    pub fn clear(&mut self) {
        self.events.clear();
        self.deltas.clear();
    }

    /// Returns the number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over `(payload, delta)` pairs in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, Ticks)> {
        self.events.iter().zip(self.deltas.iter().copied())
    }
}

impl<T: PartialEq> DeltaQueue<T> {
    /// Remove the first entry equal to `payload`.
    ///
    /// Other deltas are not touched: they are relative to the clock, not to
    /// their neighbours. Returns `false` and leaves the queue unchanged if the
    /// payload is not queued.
    pub fn remove(&mut self, payload: &T) -> bool {
        match self.events.iter().position(|event| event == payload) {
            Some(index) => {
                self.events.remove(index);
                self.deltas.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `payload` has a pending entry.
    #[must_use]
    pub fn contains(&self, payload: &T) -> bool {
        self.events.contains(payload)
    }
}

impl<T> Default for DeltaQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
