//! Components and bookkeeping resources for agents and trip requests.
//!
//! Agents and requests are entities; the engine's per-event systems mutate
//! their components. Each entity keeps the handle of its single scheduled
//! event so state transitions can cancel and re-queue it.

use std::collections::BTreeSet;

use bevy_ecs::prelude::{Component, Entity, Resource};

use crate::clock::{EventKind, EventToken};
use crate::map::LocationOnRoad;

/// The one event an entity currently has on the timeline.
#[derive(Debug, Clone, Copy)]
pub struct PendingEvent {
    pub token: EventToken,
    pub kind: EventKind,
    pub time: u64,
}

/// A vehicle cruising the map. Between events its true position is
/// interpolated from the last-appearance snapshot via the traffic pattern.
#[derive(Debug, Clone, Component)]
pub struct Agent {
    /// Where the agent will be when its pending event fires.
    pub loc: LocationOnRoad,
    /// True while a picked-up request is on board.
    pub is_pickup: bool,
    /// The request this agent is assigned to, if any.
    pub assigned: Option<Entity>,
    /// When the current search (cruising without a request) began.
    pub start_search_time: u64,
    /// When the current assignment was made.
    pub assign_time: u64,
    /// Interpolated position at assignment time.
    pub assign_location: LocationOnRoad,
    /// Snapshot used to interpolate the position between events.
    pub last_appear_time: u64,
    pub last_appear_location: LocationOnRoad,
    pub pending: Option<PendingEvent>,
}

impl Agent {
    pub fn new(loc: LocationOnRoad, deploy_time: u64) -> Self {
        Self {
            loc,
            is_pickup: false,
            assigned: None,
            start_search_time: deploy_time,
            assign_time: 0,
            assign_location: loc,
            last_appear_time: deploy_time,
            last_appear_location: loc,
            pending: None,
        }
    }
}

/// One passenger trip waiting to be served.
#[derive(Debug, Clone, Component)]
pub struct Request {
    pub pickup: LocationOnRoad,
    pub dropoff: LocationOnRoad,
    pub available_time: u64,
    /// `available_time` plus the configured maximum life.
    pub expiration_time: u64,
    /// Static shortest travel time from pickup to dropoff.
    pub static_trip_time: u64,
    /// Set when an agent picks the request up; unset requests expire.
    pub pickup_time: Option<u64>,
    pub assigned_agent: Option<Entity>,
    pub pending: Option<PendingEvent>,
}

impl Request {
    pub fn new(
        pickup: LocationOnRoad,
        dropoff: LocationOnRoad,
        available_time: u64,
        static_trip_time: u64,
        maximum_life_time: u64,
    ) -> Self {
        Self {
            pickup,
            dropoff,
            available_time,
            expiration_time: available_time + maximum_life_time,
            static_trip_time,
            pickup_time: None,
            assigned_agent: None,
            pending: None,
        }
    }

    pub fn is_picked_up(&self) -> bool {
        self.pickup_time.is_some()
    }
}

/// Which agents are empty (searching) and which are serving a request.
/// Ordered sets so end-of-run accounting iterates deterministically.
#[derive(Debug, Default, Resource)]
pub struct FleetState {
    pub empty: BTreeSet<Entity>,
    pub serving: BTreeSet<Entity>,
}

impl FleetState {
    pub fn mark_empty(&mut self, agent: Entity) {
        self.serving.remove(&agent);
        self.empty.insert(agent);
    }

    pub fn mark_serving(&mut self, agent: Entity) {
        self.empty.remove(&agent);
        self.serving.insert(agent);
    }

    pub fn serving_count(&self) -> usize {
        self.serving.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::World;
    use crate::map::RoadId;

    fn loc() -> LocationOnRoad {
        LocationOnRoad {
            road: RoadId(0),
            distance_from_start: 0.0,
        }
    }

    #[test]
    fn agent_starts_empty_and_searching() {
        let agent = Agent::new(loc(), 42);
        assert!(!agent.is_pickup);
        assert!(agent.assigned.is_none());
        assert_eq!(agent.start_search_time, 42);
        assert_eq!(agent.last_appear_time, 42);
    }

    #[test]
    fn request_expiration_is_offset_by_life_time() {
        let request = Request::new(loc(), loc(), 100, 25, 50);
        assert_eq!(request.expiration_time, 150);
        assert!(!request.is_picked_up());
    }

    #[test]
    fn fleet_state_moves_agents_between_sets() {
        let mut world = World::new();
        let a = world.spawn(()).id();
        let mut fleet = FleetState::default();

        fleet.mark_empty(a);
        assert_eq!(fleet.empty.len(), 1);
        fleet.mark_serving(a);
        assert_eq!(fleet.empty.len(), 0);
        assert_eq!(fleet.serving_count(), 1);
        fleet.mark_empty(a);
        assert_eq!(fleet.serving_count(), 0);
    }
}
