//! Simulation time: scaled-unit timeline driven by a heap of scheduled events.
//!
//! All timestamps are in **scaled units** (seconds times [TIME_RESOLUTION]).
//! The timeline advances by popping the next scheduled event; events sharing
//! a timestamp are ordered by [EventKind] (agent kinds run before request
//! kinds) and then by scheduling sequence, so the order is total.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use bevy_ecs::prelude::{Entity, Resource};

/// Scaled time units per real second.
pub const TIME_RESOLUTION: u64 = 1_000_000;

/// One second in scaled units.
pub const ONE_SEC: u64 = TIME_RESOLUTION;
/// One minute in scaled units.
pub const ONE_MIN: u64 = 60 * ONE_SEC;
/// One hour in scaled units.
pub const ONE_HOUR: u64 = 60 * ONE_MIN;

/// Convert a scaled timestamp to seconds.
pub fn to_seconds(scaled: u64) -> f64 {
    scaled as f64 / TIME_RESOLUTION as f64
}

/// Convert whole seconds to scaled units.
pub fn to_scaled(seconds: u64) -> u64 {
    seconds * TIME_RESOLUTION
}

/// Convert a speed in meters per second to meters per scaled unit, so that
/// dividing a length by it yields a scaled travel time.
pub fn to_scaled_speed(meters_per_second: f64) -> f64 {
    meters_per_second / TIME_RESOLUTION as f64
}

/// What a scheduled event does when it fires. Declaration order matters:
/// agent kinds come before request kinds, so the derived ordering gives
/// agents priority on timestamp ties (an agent dropping off must not miss a
/// request appearing at the very same tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    /// First trigger of a freshly deployed agent.
    AgentIntroduced,
    /// An agent arrives at the end intersection of its current road.
    IntersectionReached,
    /// An agent arrives at the pickup location of its assigned request.
    PickupArrival,
    /// An agent arrives at the dropoff location of the request it carries.
    DropoffArrival,
    /// A trip request enters the system.
    RequestAvailable,
    /// A trip request reaches the end of its life without being picked up.
    RequestExpired,
}

impl EventKind {
    pub fn is_agent(self) -> bool {
        matches!(
            self,
            EventKind::AgentIntroduced
                | EventKind::IntersectionReached
                | EventKind::PickupArrival
                | EventKind::DropoffArrival
        )
    }
}

/// The entity a scheduled event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    Agent(Entity),
    Request(Entity),
}

/// Handle to one scheduled event, used to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventToken(pub(crate) u64);

/// One entry on the simulation timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: u64,
    pub kind: EventKind,
    pub subject: EventSubject,
    /// Scheduling sequence number; unique, monotonically increasing.
    pub seq: u64,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on every field: BinaryHeap is a max-heap and we want the
        // smallest (time, kind, seq) triple popped first.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.kind.cmp(&self.kind))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being dispatched; inserted by the runner before each
/// schedule execution.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

/// Simulation clock: the event heap plus the current time.
///
/// Cancellation is lazy: cancelled sequence numbers are remembered in a set
/// and the matching heap entries are skipped on pop. State transitions are
/// the only callers of [SimulationClock::cancel]; the hot path never removes.
#[derive(Debug, Resource)]
pub struct SimulationClock {
    now: u64,
    next_seq: u64,
    events: BinaryHeap<Event>,
    cancelled: HashSet<u64>,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self {
            now: 0,
            next_seq: 0,
            events: BinaryHeap::new(),
            cancelled: HashSet::new(),
        }
    }
}

impl SimulationClock {
    /// Current simulation time in scaled units (updated when an event is
    /// popped).
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule an event. `time` must not lie in the past; time travel is an
    /// invariant violation, not an error to recover from.
    pub fn schedule_at(&mut self, time: u64, kind: EventKind, subject: EventSubject) -> EventToken {
        assert!(
            time >= self.now,
            "event {kind:?} scheduled at {time} which is before now {}",
            self.now
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Event {
            time,
            kind,
            subject,
            seq,
        });
        EventToken(seq)
    }

    /// Cancel a previously scheduled event. Cancelling an event that already
    /// fired is a no-op.
    pub fn cancel(&mut self, token: EventToken) {
        self.cancelled.insert(token.0);
    }

    /// Whether the event behind `token` is still pending. O(n); for asserts.
    pub fn has(&self, token: EventToken) -> bool {
        !self.cancelled.contains(&token.0) && self.events.iter().any(|e| e.seq == token.0)
    }

    /// Timestamp of the next live event, if any.
    pub fn next_event_time(&mut self) -> Option<u64> {
        self.purge_cancelled();
        self.events.peek().map(|e| e.time)
    }

    /// Pop the next live event and advance the clock to its time.
    pub fn pop_next(&mut self) -> Option<Event> {
        self.purge_cancelled();
        let event = self.events.pop()?;
        debug_assert!(event.time >= self.now, "time went backwards");
        self.now = event.time;
        Some(event)
    }

    /// Number of live events still scheduled.
    pub fn pending_len(&self) -> usize {
        self.events
            .iter()
            .filter(|e| !self.cancelled.contains(&e.seq))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.events
            .iter()
            .all(|e| self.cancelled.contains(&e.seq))
    }

    fn purge_cancelled(&mut self) {
        while let Some(e) = self.events.peek() {
            if self.cancelled.remove(&e.seq) {
                self.events.pop();
            } else {
                break;
            }
        }
    }
}
