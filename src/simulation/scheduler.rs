//! Virtual clock and time-ordered event queue.
//!
//! The queue is keyed by `(fire time, insertion sequence)`, so events that
//! fire at the same simulated time run in the order they were scheduled.
//! Zero-delay events scheduled from inside a handler therefore run after the
//! same-time events that were already queued.
//!
//! Misuse (scheduling in the past, scheduling after shutdown) is a logic
//! defect in the caller and panics immediately.

use std::collections::{BTreeMap, HashMap};

use super::time::{SimDuration, SimTime};

/// Handle to a scheduled event, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

pub struct Scheduler<E> {
    now: SimTime,
    next_sequence: u64,
    // (fire time, sequence) -> payload
    queue: BTreeMap<(SimTime, u64), E>,
    // sequence -> fire time, for O(log n) cancellation
    index: HashMap<u64, SimTime>,
    halted: bool,
    shut_down: bool,
    events_processed: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_sequence: 0,
            queue: BTreeMap::new(),
            index: HashMap::new(),
            halted: false,
            shut_down: false,
            events_processed: 0,
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `payload` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: SimDuration, payload: E) -> EventId {
        self.schedule_at(self.now + delay, payload)
    }

    /// Schedule `payload` at an absolute time, which must not be in the past.
    pub fn schedule_at(&mut self, time: SimTime, payload: E) -> EventId {
        assert!(!self.shut_down, "event scheduled after scheduler shutdown");
        assert!(time >= self.now, "event scheduled in the past: {} < {}", time, self.now);

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.insert((time, sequence), payload);
        self.index.insert(sequence, time);
        EventId(sequence)
    }

    /// Cancel a pending event. Returns `false` if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, id: EventId) -> bool {
        match self.index.remove(&id.0) {
            Some(time) => self.queue.remove(&(time, id.0)).is_some(),
            None => false,
        }
    }

    /// Whether the event is still waiting to fire.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.index.contains_key(&id.0)
    }

    /// Fire time of the earliest pending event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.keys().next().map(|(time, _)| *time)
    }

    /// Remove the earliest event and advance the clock to its fire time.
    pub fn pop_next(&mut self) -> Option<(SimTime, E)> {
        let ((time, sequence), payload) = self.queue.pop_first()?;
        self.index.remove(&sequence);
        debug_assert!(time >= self.now);
        self.now = time;
        self.events_processed += 1;
        Some((time, payload))
    }

    /// Run events until the queue is empty, `halt` is called from a handler,
    /// or the next event would fire after `stop`.
    ///
    /// Events at exactly `stop` still run. When the run ends because of
    /// `stop`, the clock is left at `stop`.
    pub fn run<F>(&mut self, stop: Option<SimTime>, mut handler: F)
    where
        F: FnMut(&mut Self, SimTime, E),
    {
        self.halted = false;
        while !self.halted {
            match (self.peek_time(), stop) {
                (None, _) => break,
                (Some(next), Some(stop)) if next > stop => {
                    self.now = stop;
                    break;
                }
                _ => {}
            }
            if let Some((time, payload)) = self.pop_next() {
                handler(self, time, payload);
            }
        }
    }

    /// Ask a running `run` loop to return after the current event.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Tear the queue down. Remaining events are discarded; any later
    /// attempt to schedule panics.
    pub fn shutdown(&mut self) {
        self.queue.clear();
        self.index.clear();
        self.shut_down = true;
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Pending events in firing order, for inspection.
    pub fn iter_pending(&self) -> impl Iterator<Item = (SimTime, &E)> {
        self.queue.iter().map(|((time, _), payload)| (*time, payload))
    }
}
