//! The stock dispatch policy: assign the nearest available agent by
//! expected arrival, and cruise empty agents toward random destinations
//! along shortest paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use bevy_ecs::prelude::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::fleet::{AgentAction, FleetManager, RequestInfo, RequestState};
use crate::map::{CityMap, IntersectionId, LocationOnRoad};
use crate::traffic::TrafficPattern;

/// Retries when a randomly drawn cruising destination is unreachable.
const MAX_DESTINATION_ATTEMPTS: usize = 16;

pub struct RandomDestinationManager {
    map: CityMap,
    pattern: Arc<TrafficPattern>,
    last_appear_time: HashMap<Entity, u64>,
    last_location: HashMap<Entity, LocationOnRoad>,
    /// Requests assigned per agent.
    assignment: HashMap<Entity, RequestInfo>,
    /// Requests no agent could reach in time, keyed by request id.
    waiting: BTreeMap<Entity, RequestInfo>,
    available: BTreeSet<Entity>,
    routes: HashMap<Entity, VecDeque<IntersectionId>>,
    rngs: HashMap<Entity, StdRng>,
}

impl RandomDestinationManager {
    pub fn new(map: CityMap, pattern: Arc<TrafficPattern>) -> Self {
        Self {
            map,
            pattern,
            last_appear_time: HashMap::new(),
            last_location: HashMap::new(),
            assignment: HashMap::new(),
            waiting: BTreeMap::new(),
            available: BTreeSet::new(),
            routes: HashMap::new(),
            rngs: HashMap::new(),
        }
    }

    /// Interpolate an agent's position between callbacks.
    fn current_location(&self, last_time: u64, last_loc: LocationOnRoad, now: u64) -> LocationOnRoad {
        let road = self.map.road(last_loc.road);
        self.pattern
            .travel_road_for_time(last_time, road, &last_loc, now - last_time)
    }

    /// The available agent with the earliest expected arrival at the
    /// request's pickup, if any arrives before expiration.
    fn nearest_available_agent(&self, request: &RequestInfo, now: u64) -> Option<Entity> {
        let mut earliest_arrival = u64::MAX;
        let mut best_agent = None;

        for &agent in &self.available {
            let (Some(&last_time), Some(&last_loc)) = (
                self.last_appear_time.get(&agent),
                self.last_location.get(&agent),
            ) else {
                continue;
            };
            let current = self.current_location(last_time, last_loc, now);
            let Some(travel_time) = self.map.travel_time_between(&current, &request.pickup) else {
                continue;
            };
            let arrival = now + travel_time;
            if arrival < earliest_arrival {
                earliest_arrival = arrival;
                best_agent = Some(agent);
            }
        }

        if earliest_arrival <= request.expiration_time {
            best_agent
        } else {
            None
        }
    }

    fn plan_route(&mut self, agent: Entity, loc: LocationOnRoad) -> VecDeque<IntersectionId> {
        if let Some(assigned) = self.assignment.get(&agent) {
            let source = self.map.road(loc.road).to;
            let destination = self.map.road(assigned.pickup.road).from;
            self.path_between(source, destination)
        } else {
            self.random_route(agent, loc)
        }
    }

    fn plan_route_to_target(
        &self,
        source_loc: LocationOnRoad,
        destination_loc: LocationOnRoad,
    ) -> VecDeque<IntersectionId> {
        let source = self.map.road(source_loc.road).to;
        let destination = self.map.road(destination_loc.road).from;
        self.path_between(source, destination)
    }

    fn path_between(
        &self,
        source: IntersectionId,
        destination: IntersectionId,
    ) -> VecDeque<IntersectionId> {
        match self.map.shortest_travel_time_path(source, destination) {
            Ok(path) => {
                let mut route: VecDeque<IntersectionId> = path.into();
                route.pop_front(); // drop the source itself
                route
            }
            Err(_) => VecDeque::new(),
        }
    }

    fn random_route(&mut self, agent: Entity, loc: LocationOnRoad) -> VecDeque<IntersectionId> {
        let n = self.map.num_intersections() as u32;
        let source = self.map.road(loc.road).to;

        let rng = self
            .rngs
            .entry(agent)
            .or_insert_with(|| StdRng::seed_from_u64(agent.to_bits()));
        let candidates: Vec<IntersectionId> = (0..MAX_DESTINATION_ATTEMPTS)
            .map(|_| IntersectionId(rng.gen_range(0..n)))
            .collect();

        for destination in candidates {
            if destination == source {
                continue;
            }
            if let Ok(path) = self.map.shortest_travel_time_path(source, destination) {
                let mut route: VecDeque<IntersectionId> = path.into();
                route.pop_front();
                if !route.is_empty() {
                    return route;
                }
            }
        }
        VecDeque::new()
    }

    /// Next hop when no planned route is usable: the first outgoing
    /// neighbor, so the agent at least keeps moving.
    fn fallback_neighbor(&self, at: IntersectionId) -> IntersectionId {
        self.map
            .intersection(at)
            .roads_from
            .keys()
            .next()
            .copied()
            .expect("intersection has no outgoing road")
    }

    fn next_hop(&mut self, agent: Entity, time: u64, loc: LocationOnRoad, route: VecDeque<IntersectionId>) -> IntersectionId {
        self.last_appear_time.insert(agent, time);
        let mut route = route;
        let next = route
            .pop_front()
            .unwrap_or_else(|| self.fallback_neighbor(self.map.road(loc.road).to));
        self.routes.insert(agent, route);

        // Mirror the engine: the agent re-appears at the start of the road
        // it turns onto.
        if let Ok(next_road) = self.map.intersection(self.map.road(loc.road).to).road_to(next) {
            self.last_location
                .insert(agent, LocationOnRoad::at_start(self.map.road(next_road)));
        }
        next
    }
}

impl FleetManager for RandomDestinationManager {
    fn on_agent_introduced(&mut self, agent: Entity, loc: LocationOnRoad, time: u64) {
        self.last_appear_time.insert(agent, time);
        self.last_location.insert(agent, loc);
        self.available.insert(agent);
    }

    fn on_request_availability_change(
        &mut self,
        request: RequestInfo,
        state: RequestState,
        loc: LocationOnRoad,
        time: u64,
    ) -> AgentAction {
        match state {
            RequestState::Available => {
                if let Some(agent) = self.nearest_available_agent(&request, time) {
                    self.assignment.insert(agent, request);
                    self.routes.insert(agent, VecDeque::new());
                    self.available.remove(&agent);
                    AgentAction::assign(agent, request.id)
                } else {
                    self.waiting.insert(request.id, request);
                    AgentAction::DoNothing
                }
            }
            RequestState::DroppedOff => {
                let agent = request
                    .assigned_agent
                    .expect("dropped-off request has an agent");

                let mut best: Option<RequestInfo> = None;
                let mut earliest_arrival = u64::MAX;
                for waiting in self.waiting.values() {
                    let Some(travel_time) = self.map.travel_time_between(&loc, &waiting.pickup)
                    else {
                        continue;
                    };
                    let arrival = time + travel_time;
                    if arrival <= waiting.expiration_time && arrival < earliest_arrival {
                        earliest_arrival = arrival;
                        best = Some(*waiting);
                    }
                }

                self.last_location.insert(agent, loc);
                self.last_appear_time.insert(agent, time);

                if let Some(best) = best {
                    self.waiting.remove(&best.id);
                    self.assignment.insert(agent, best);
                    AgentAction::assign(agent, best.id)
                } else {
                    self.assignment.remove(&agent);
                    self.available.insert(agent);
                    AgentAction::DoNothing
                }
            }
            RequestState::Expired => {
                self.waiting.remove(&request.id);
                if let Some(agent) = request.assigned_agent {
                    self.routes.insert(agent, VecDeque::new());
                    self.available.insert(agent);
                    self.assignment.remove(&agent);
                }
                AgentAction::DoNothing
            }
            RequestState::PickedUp => {
                if let Some(agent) = request.assigned_agent {
                    self.routes.insert(agent, VecDeque::new());
                }
                AgentAction::DoNothing
            }
        }
    }

    fn on_reach_intersection(
        &mut self,
        agent: Entity,
        time: u64,
        loc: LocationOnRoad,
    ) -> IntersectionId {
        let mut route = self.routes.remove(&agent).unwrap_or_default();
        if route.is_empty() {
            route = self.plan_route(agent, loc);
        }
        self.next_hop(agent, time, loc, route)
    }

    fn on_reach_intersection_with_request(
        &mut self,
        agent: Entity,
        time: u64,
        loc: LocationOnRoad,
        request: RequestInfo,
    ) -> IntersectionId {
        let mut route = self.routes.remove(&agent).unwrap_or_default();
        if route.is_empty() {
            route = self.plan_route_to_target(request.pickup, request.dropoff);
        }
        self.next_hop(agent, time, loc, route)
    }
}
