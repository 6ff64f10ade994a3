//! Cooperative event scheduler
//!
//! A single-threaded queue of timed events on a virtual clock. Nothing here
//! sleeps: the owner pops due events and handles them, either as fast as
//! possible (tests, static layouts) or paced by a wall clock (`runtime`).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use serde::Serialize;

use crate::simulation::RunId;

/// Tags every piece of state derived from one rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

/// Handle to a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Messages delivered by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The map dwell is over
    DwellElapsed { generation: Generation },
    /// Time for the next simulation tick of a run
    Tick { generation: Generation, run: RunId },
}

impl Event {
    pub fn generation(&self) -> Generation {
        match self {
            Event::DwellElapsed { generation } | Event::Tick { generation, .. } => *generation,
        }
    }
}

/// Virtual-time event queue
#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    next_seq: u64,
    // (due, seq) ordered so equal due times fire in scheduling order
    queue: BinaryHeap<Reverse<(Duration, u64)>>,
    events: HashMap<u64, Event>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule an event `delay` after now
    pub fn schedule(&mut self, delay: Duration, event: Event) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse((self.now + delay, seq)));
        self.events.insert(seq, event);
        TimerId(seq)
    }

    /// Cancel a pending event. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.events.remove(&id.0).is_some()
    }

    /// Whether an event is still pending
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.events.contains_key(&id.0)
    }

    /// Drop every pending event
    pub fn clear(&mut self) {
        self.queue.clear();
        self.events.clear();
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Due time of the next pending event
    pub fn next_due(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.queue.peek().map(|Reverse((due, _))| *due)
    }

    /// Pop the next event due at or before `until`, moving the clock to its due time
    pub fn pop_due(&mut self, until: Duration) -> Option<(Duration, Event)> {
        self.discard_cancelled();
        let Reverse((due, seq)) = *self.queue.peek()?;
        if due > until {
            return None;
        }
        self.queue.pop();
        let event = self.events.remove(&seq)?;
        self.now = self.now.max(due);
        Some((due, event))
    }

    /// Move the clock forward without firing anything
    pub fn advance_clock(&mut self, to: Duration) {
        self.now = self.now.max(to);
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, seq))) = self.queue.peek() {
            if self.events.contains_key(seq) {
                break;
            }
            self.queue.pop();
        }
    }
}
