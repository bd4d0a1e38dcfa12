//! Turn scheduler — decides which actor or event acts next.
//!
//! The scheduler is a thin protocol layer over [`DeltaQueue`]:
//!
//! 1. [`Scheduler::next`] pops the next due payload. The payload is now
//!    *awaiting its action*.
//! 2. The caller lets the payload act and reports how long that took with
//!    [`Scheduler::set_action`]. Repeating payloads (actors) are re-armed that
//!    many ticks from now; one-shot payloads (events) are dropped.
//!
//! Every `next()` that returns a payload must be paired with exactly one
//! `set_action()` before the following `next()`. Breaking the pairing is a
//! [`SchedulerError`].
//!
//! Killed actors are removed through a channel: anything sent on a
//! [`KillNotifier`] is purged before the next turn is handed out.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::mpsc::{self, Receiver, Sender};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::Ticks;
use crate::delta_queue::DeltaQueue;
use crate::error::SchedulerError;

/// Sending half of the scheduler's kill feed.
///
/// Whoever decides that an actor died sends it here; the scheduler cancels
/// the actor's pending slot before handing out the next turn.
#[derive(Debug, Clone)]
pub struct KillNotifier<T> {
    sender: Sender<T>,
}

impl<T: Debug> KillNotifier<T> {
    /// Wrap the sending end of a kill channel.
    #[must_use]
    pub fn new(sender: Sender<T>) -> Self {
        Self { sender }
    }

    /// Report that `payload` was killed.
    ///
    /// A notice sent after the scheduler is gone has nobody left to cancel
    /// and is dropped.
    pub fn notify(&self, payload: T) {
        if let Err(err) = self.sender.send(payload) {
            debug!(payload = ?err.0, "kill notice dropped, scheduler is gone");
        }
    }
}

/// The payload handed out by the last `next()`.
#[derive(Debug, Clone)]
struct Current<T> {
    payload: T,
    /// Whether `set_action` should re-queue the payload.
    rearm: bool,
}

/// Relative-time turn scheduler for actors and events.
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: DeltaQueue<T>,
    /// Repeating payloads, re-armed after each action.
    actors: HashSet<T>,
    /// One-shot payloads that have not fired yet.
    events: HashSet<T>,
    /// The payload awaiting `set_action`, if any.
    current: Option<Current<T>>,
    kills: Receiver<T>,
    /// Kept so [`Scheduler::notifier`] can hand out senders.
    kill_sender: Option<Sender<T>>,
}

impl<T> Scheduler<T>
where
    T: Clone + Eq + Hash + Debug,
{
    /// Create an empty scheduler that owns its kill channel.
    ///
    /// Use [`Scheduler::notifier`] to obtain senders.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        let mut scheduler = Self::with_kill_feed(receiver);
        scheduler.kill_sender = Some(sender);
        scheduler
    }

    /// Create an empty scheduler listening on an externally created kill
    /// channel.
    #[must_use]
    pub fn with_kill_feed(kills: Receiver<T>) -> Self {
        Self {
            queue: DeltaQueue::new(),
            actors: HashSet::new(),
            events: HashSet::new(),
            current: None,
            kills,
            kill_sender: None,
        }
    }

    /// Returns a notifier feeding this scheduler's kill channel.
    ///
    /// Returns `None` for schedulers built with [`Scheduler::with_kill_feed`];
    /// the caller already owns the sending end there.
    #[must_use]
    pub fn notifier(&self) -> Option<KillNotifier<T>> {
        self.kill_sender.clone().map(KillNotifier::new)
    }

    /// Register `payload` to fire `offset` ticks from now.
    ///
    /// With `repeat` the payload is an actor and is re-armed after every
    /// action; otherwise it is a one-shot event. A payload that already has a
    /// pending slot is moved to the new one.
    pub fn add(&mut self, payload: T, repeat: bool, offset: Ticks) {
        if self.queue.remove(&payload) {
            debug!(?payload, "replacing pending slot");
        }
        self.actors.remove(&payload);
        self.events.remove(&payload);
        if let Some(current) = self.current.as_mut()
            && current.payload == payload
        {
            // The new slot supersedes the re-arm of the running turn.
            current.rearm = false;
        }

        if repeat {
            self.actors.insert(payload.clone());
        } else {
            self.events.insert(payload.clone());
        }
        debug!(?payload, repeat, offset, now = self.time(), "scheduled");
        self.queue.add(payload, offset);
    }

    /// Pop the next due payload.
    ///
    /// Pending kill notices are processed first, so a killed actor is never
    /// returned. Returns `Ok(None)` when nothing is scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ActionPending`] if the previous payload has
    /// not had its `set_action` yet.
    pub fn next(&mut self) -> Result<Option<T>, SchedulerError> {
        if let Some(current) = &self.current {
            return Err(SchedulerError::ActionPending(format!(
                "{:?}",
                current.payload
            )));
        }
        self.process_kills();

        let Some(payload) = self.queue.get() else {
            return Ok(None);
        };

        let rearm = self.actors.contains(&payload);
        if !rearm {
            self.events.remove(&payload);
        }
        trace!(?payload, rearm, now = self.time(), "turn handed out");
        self.current = Some(Current {
            payload: payload.clone(),
            rearm,
        });
        Ok(Some(payload))
    }

    /// Report how long the current payload's action took.
    ///
    /// A repeating payload is re-armed `duration` ticks from now. One-shot
    /// payloads, and payloads removed during their own turn, are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoActionPending`] if no `next()` call is
    /// waiting for its action.
    pub fn set_action(&mut self, duration: Ticks) -> Result<(), SchedulerError> {
        let current = self
            .current
            .take()
            .ok_or(SchedulerError::NoActionPending)?;

        if current.rearm && self.actors.contains(&current.payload) {
            trace!(payload = ?current.payload, duration, "re-armed");
            self.queue.add(current.payload, duration);
        }
        Ok(())
    }

    /// Cancel `payload`: drop its pending slot and classification.
    ///
    /// If the payload is mid-turn, its `set_action` will not re-arm it.
    /// Returns `true` if there was anything to cancel.
    pub fn remove(&mut self, payload: &T) -> bool {
        let mut removed = self.queue.remove(payload);
        removed |= self.actors.remove(payload);
        removed |= self.events.remove(payload);
        if let Some(current) = self.current.as_mut()
            && &current.payload == payload
            && current.rearm
        {
            current.rearm = false;
            removed = true;
        }
        if removed {
            debug!(?payload, "removed from schedule");
        }
        removed
    }

    /// Apply every kill notice received so far. Returns how many payloads
    /// were actually cancelled.
    pub fn process_kills(&mut self) -> usize {
        let killed: Vec<T> = self.kills.try_iter().collect();
        killed
            .into_iter()
            .filter(|payload| self.remove(payload))
            .count()
    }

    /// Drop every pending slot and classification. The clock is kept.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.actors.clear();
        self.events.clear();
        self.current = None;
    }

    /// Returns the cumulative simulated time.
    #[must_use]
    pub fn time(&self) -> Ticks {
        self.queue.time()
    }

    /// Returns `true` if `payload` is registered as a repeating actor.
    #[must_use]
    pub fn is_actor(&self, payload: &T) -> bool {
        self.actors.contains(payload)
    }

    /// Returns `true` if `payload` is a one-shot event that has not fired.
    #[must_use]
    pub fn is_event(&self, payload: &T) -> bool {
        self.events.contains(payload)
    }

    /// Returns the payload awaiting `set_action`, if any.
    #[must_use]
    pub fn awaiting_action(&self) -> Option<&T> {
        self.current.as_ref().map(|current| &current.payload)
    }

    /// Returns the number of pending slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if no slot is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Capture the schedule so it can be persisted.
    ///
    /// Kill notices received so far are applied first.
    pub fn snapshot(&mut self) -> SchedulerSnapshot<T> {
        self.process_kills();
        SchedulerSnapshot {
            time: self.queue.time(),
            entries: self
                .queue
                .iter()
                .map(|(payload, delta)| ScheduledEntry {
                    payload: payload.clone(),
                    delta,
                    repeat: self.actors.contains(payload),
                })
                .collect(),
            awaiting: self.current.as_ref().map(|current| AwaitingEntry {
                payload: current.payload.clone(),
                repeat: current.rearm,
            }),
        }
    }

    /// Rebuild a scheduler from a snapshot, listening on a fresh kill channel.
    #[must_use]
    pub fn restore(snapshot: SchedulerSnapshot<T>) -> Self {
        Self::new().load(snapshot)
    }

    /// Rebuild a scheduler from a snapshot, listening on `kills`.
    #[must_use]
    pub fn restore_with_kill_feed(snapshot: SchedulerSnapshot<T>, kills: Receiver<T>) -> Self {
        Self::with_kill_feed(kills).load(snapshot)
    }

    fn load(mut self, snapshot: SchedulerSnapshot<T>) -> Self {
        self.queue = DeltaQueue::with_time(snapshot.time);
        for entry in snapshot.entries {
            if entry.repeat {
                self.actors.insert(entry.payload.clone());
            } else {
                self.events.insert(entry.payload.clone());
            }
            self.queue.add(entry.payload, entry.delta);
        }
        if let Some(awaiting) = snapshot.awaiting {
            if awaiting.repeat {
                self.actors.insert(awaiting.payload.clone());
            }
            self.current = Some(Current {
                payload: awaiting.payload,
                rearm: awaiting.repeat,
            });
        }
        debug!(
            time = self.time(),
            pending = self.len(),
            "scheduler restored"
        );
        self
    }
}

impl<T> Default for Scheduler<T>
where
    T: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable form of a [`Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot<T> {
    /// Clock at the time of the snapshot.
    pub time: Ticks,
    /// Pending slots in firing order.
    pub entries: Vec<ScheduledEntry<T>>,
    /// The payload that was mid-turn, if any.
    pub awaiting: Option<AwaitingEntry<T>>,
}

/// A pending slot in a [`SchedulerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry<T> {
    /// What the slot hands out when it fires.
    pub payload: T,
    /// Ticks until the slot fires, relative to the snapshot clock.
    pub delta: Ticks,
    /// Actor slot, re-armed after each action.
    pub repeat: bool,
}

/// The mid-turn payload in a [`SchedulerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitingEntry<T> {
    /// The payload whose action duration is still outstanding.
    pub payload: T,
    /// Whether it goes back into the queue once the duration is set.
    pub repeat: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct Actor(u32);

    const A: Actor = Actor(1);
    const B: Actor = Actor(2);
    const C: Actor = Actor(3);

    fn take_turn(scheduler: &mut Scheduler<Actor>, duration: Ticks) -> Option<(Actor, Ticks)> {
        let payload = scheduler.next().unwrap()?;
        let at = scheduler.time();
        scheduler.set_action(duration).unwrap();
        Some((payload, at))
    }

    #[test]
    fn test_empty_scheduler_returns_none() {
        let mut scheduler: Scheduler<Actor> = Scheduler::new();
        assert_eq!(scheduler.next().unwrap(), None);
        assert_eq!(scheduler.time(), 0);
    }

    #[test]
    fn test_late_joiner_interleaves_by_time() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 0);
        assert_eq!(scheduler.next().unwrap(), Some(A));
        scheduler.set_action(100).unwrap();

        scheduler.add(B, true, 50);
        assert_eq!(scheduler.next().unwrap(), Some(B));
        assert_eq!(scheduler.time(), 50);
        scheduler.set_action(100).unwrap();

        assert_eq!(scheduler.next().unwrap(), Some(A));
        assert_eq!(scheduler.time(), 100);
    }

    #[test]
    fn test_actors_repeat_and_speed_matters() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 0);
        scheduler.add(B, true, 0);

        // A acts every 50 ticks, B every 100.
        let mut turns = Vec::new();
        for _ in 0..5 {
            let payload = scheduler.next().unwrap().unwrap();
            turns.push((payload, scheduler.time()));
            let duration = if payload == A { 50 } else { 100 };
            scheduler.set_action(duration).unwrap();
        }
        // B was queued for 100 before A re-armed for 100, so B goes first.
        assert_eq!(turns, vec![(A, 0), (B, 0), (A, 50), (B, 100), (A, 100)]);
    }

    #[test]
    fn test_events_fire_once() {
        let mut scheduler = Scheduler::new();
        scheduler.add(C, false, 10);
        assert!(scheduler.is_event(&C));
        assert_eq!(take_turn(&mut scheduler, 10), Some((C, 10)));
        assert!(!scheduler.is_event(&C));
        assert_eq!(scheduler.next().unwrap(), None);
    }

    #[test]
    fn test_classification() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 0);
        scheduler.add(C, false, 5);
        assert!(scheduler.is_actor(&A));
        assert!(!scheduler.is_event(&A));
        assert!(scheduler.is_event(&C));
        assert!(!scheduler.is_actor(&C));
    }

    #[test]
    fn test_next_without_set_action_is_error() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 0);
        scheduler.next().unwrap();
        assert_eq!(scheduler.awaiting_action(), Some(&A));
        assert!(matches!(
            scheduler.next(),
            Err(SchedulerError::ActionPending(_))
        ));
    }

    #[test]
    fn test_set_action_without_next_is_error() {
        let mut scheduler: Scheduler<Actor> = Scheduler::new();
        assert!(matches!(
            scheduler.set_action(10),
            Err(SchedulerError::NoActionPending)
        ));
    }

    #[test]
    fn test_remove_cancels_pending_slot() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 10);
        scheduler.add(B, true, 20);
        assert!(scheduler.remove(&A));
        assert!(!scheduler.is_actor(&A));
        assert_eq!(take_turn(&mut scheduler, 100), Some((B, 20)));
        assert_eq!(take_turn(&mut scheduler, 100), Some((B, 120)));
    }

    #[test]
    fn test_remove_mid_turn_prevents_rearm() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 0);
        scheduler.add(B, true, 10);
        assert_eq!(scheduler.next().unwrap(), Some(A));
        assert!(scheduler.remove(&A));
        scheduler.set_action(5).unwrap();

        assert_eq!(take_turn(&mut scheduler, 100), Some((B, 10)));
        assert_eq!(take_turn(&mut scheduler, 100), Some((B, 110)));
    }

    #[test]
    fn test_remove_unknown_payload() {
        let mut scheduler: Scheduler<Actor> = Scheduler::new();
        assert!(!scheduler.remove(&A));
    }

    #[test]
    fn test_re_adding_replaces_slot() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 100);
        scheduler.add(A, true, 5);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(take_turn(&mut scheduler, 10), Some((A, 5)));
    }

    #[test]
    fn test_kill_notice_cancels_actor() {
        let mut scheduler = Scheduler::new();
        let notifier = scheduler.notifier().unwrap();
        scheduler.add(A, true, 0);
        scheduler.add(B, true, 10);

        notifier.notify(A);
        assert_eq!(take_turn(&mut scheduler, 10), Some((B, 10)));
        assert_eq!(take_turn(&mut scheduler, 10), Some((B, 20)));
        assert!(!scheduler.is_actor(&A));
    }

    #[test]
    fn test_kill_during_own_turn() {
        let mut scheduler = Scheduler::new();
        let notifier = scheduler.notifier().unwrap();
        scheduler.add(A, true, 0);
        scheduler.add(B, true, 1);

        assert_eq!(scheduler.next().unwrap(), Some(A));
        notifier.notify(A);
        scheduler.set_action(1).unwrap();

        // A was re-armed before the notice was processed; next() purges it.
        assert_eq!(take_turn(&mut scheduler, 10), Some((B, 1)));
        assert_eq!(take_turn(&mut scheduler, 10), Some((B, 11)));
    }

    #[test]
    fn test_injected_kill_feed() {
        let (sender, receiver) = mpsc::channel();
        let mut scheduler = Scheduler::with_kill_feed(receiver);
        assert!(scheduler.notifier().is_none());
        scheduler.add(A, true, 0);
        KillNotifier::new(sender).notify(A);
        assert_eq!(scheduler.next().unwrap(), None);
    }

    #[test]
    fn test_snapshot_restore_keeps_order() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 0);
        scheduler.add(B, true, 30);
        scheduler.add(C, false, 30);
        take_turn(&mut scheduler, 30);

        let snapshot = scheduler.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: SchedulerSnapshot<Actor> = serde_json::from_str(&json).unwrap();
        let mut restored = Scheduler::restore(restored);

        assert_eq!(restored.time(), scheduler.time());
        for _ in 0..4 {
            assert_eq!(
                take_turn(&mut restored, 40),
                take_turn(&mut scheduler, 40)
            );
        }
    }

    #[test]
    fn test_snapshot_keeps_awaiting_payload() {
        let mut scheduler = Scheduler::new();
        scheduler.add(A, true, 0);
        scheduler.next().unwrap();

        let mut restored = Scheduler::restore(scheduler.snapshot());
        assert_eq!(restored.awaiting_action(), Some(&A));
        restored.set_action(25).unwrap();
        assert_eq!(take_turn(&mut restored, 25), Some((A, 25)));
    }
}
