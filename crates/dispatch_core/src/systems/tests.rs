//! End-to-end scenarios on toy maps, driving the full event loop through
//! the runner.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use bevy_ecs::prelude::{Entity, World};

use crate::clock::CurrentEvent;
use crate::ecs::FleetState;
use crate::fleet::{
    AgentAction, FleetManager, RandomDestinationManager, RequestInfo, RequestState,
};
use crate::map::{CityMap, CityMapBuilder, IntersectionId, LocationOnRoad};
use crate::runner::{run, run_next_event, simulation_schedule};
use crate::scenario::{build_world, SimulationParams, TripRecord};
use crate::telemetry::ScoreTelemetry;
use crate::test_helpers::{
    grid_map, round_trip_map, secs, set_end_time, spawn_agent, spawn_request, test_world,
};
use crate::traffic::TrafficPattern;

/// Greedy-nearest test policy: assigns by expected arrival with no in-time
/// filter, re-tasks a freed agent as soon as its request expires, and
/// routes along shortest paths.
struct GreedyManager {
    map: CityMap,
    pattern: Arc<TrafficPattern>,
    last: HashMap<Entity, (u64, LocationOnRoad)>,
    available: BTreeSet<Entity>,
    waiting: BTreeMap<Entity, RequestInfo>,
    assignment: HashMap<Entity, RequestInfo>,
}

impl GreedyManager {
    fn new(map: CityMap, pattern: Arc<TrafficPattern>) -> Self {
        Self {
            map,
            pattern,
            last: HashMap::new(),
            available: BTreeSet::new(),
            waiting: BTreeMap::new(),
            assignment: HashMap::new(),
        }
    }

    fn current(&self, agent: Entity, now: u64) -> LocationOnRoad {
        let (last_time, last_loc) = self.last[&agent];
        let road = self.map.road(last_loc.road);
        self.pattern
            .travel_road_for_time(last_time, road, &last_loc, now.saturating_sub(last_time))
    }

    fn nearest_agent(&self, request: &RequestInfo, now: u64) -> Option<Entity> {
        self.available
            .iter()
            .filter_map(|&agent| {
                let current = self.current(agent, now);
                self.map
                    .travel_time_between(&current, &request.pickup)
                    .map(|tt| (now + tt, agent))
            })
            .min_by_key(|&(arrival, agent)| (arrival, agent))
            .map(|(_, agent)| agent)
    }

    fn best_waiting(&self, from: LocationOnRoad, now: u64) -> Option<RequestInfo> {
        self.waiting
            .values()
            .filter_map(|request| {
                self.map
                    .travel_time_between(&from, &request.pickup)
                    .map(|tt| (now + tt, *request))
            })
            .filter(|&(arrival, request)| arrival <= request.expiration_time)
            .min_by_key(|&(arrival, request)| (arrival, request.id))
            .map(|(_, request)| request)
    }

    fn take_waiting(&mut self, agent: Entity, now: u64) -> Option<RequestInfo> {
        let from = self.current(agent, now);
        let best = self.best_waiting(from, now)?;
        self.waiting.remove(&best.id);
        self.assignment.insert(agent, best);
        self.available.remove(&agent);
        Some(best)
    }

    fn hop_toward(&mut self, agent: Entity, now: u64, loc: LocationOnRoad, target: LocationOnRoad) -> IntersectionId {
        let here = self.map.road(loc.road).to;
        let destination = self.map.road(target.road).from;
        let next = match self.map.shortest_travel_time_path(here, destination) {
            Ok(path) if path.len() > 1 => path[1],
            _ => self
                .map
                .intersection(here)
                .roads_from
                .keys()
                .next()
                .copied()
                .expect("dead-end intersection"),
        };
        if let Ok(road) = self.map.intersection(here).road_to(next) {
            self.last
                .insert(agent, (now, LocationOnRoad::at_start(self.map.road(road))));
        }
        next
    }
}

impl FleetManager for GreedyManager {
    fn on_agent_introduced(&mut self, agent: Entity, loc: LocationOnRoad, time: u64) {
        self.last.insert(agent, (time, loc));
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
                if let Some(agent) = self.nearest_agent(&request, time) {
                    self.assignment.insert(agent, request);
                    self.available.remove(&agent);
                    AgentAction::assign(agent, request.id)
                } else {
                    self.waiting.insert(request.id, request);
                    AgentAction::DoNothing
                }
            }
            RequestState::DroppedOff => {
                let agent = request.assigned_agent.expect("dropped-off has an agent");
                self.last.insert(agent, (time, loc));
                self.assignment.remove(&agent);
                self.available.insert(agent);
                if let Some(next) = self.take_waiting(agent, time) {
                    AgentAction::assign(agent, next.id)
                } else {
                    AgentAction::DoNothing
                }
            }
            RequestState::Expired => {
                self.waiting.remove(&request.id);
                if let Some(agent) = request.assigned_agent {
                    self.assignment.remove(&agent);
                    self.available.insert(agent);
                    if let Some(next) = self.take_waiting(agent, time) {
                        return AgentAction::assign(agent, next.id);
                    }
                }
                AgentAction::DoNothing
            }
            RequestState::PickedUp => AgentAction::DoNothing,
        }
    }

    fn on_reach_intersection(
        &mut self,
        agent: Entity,
        time: u64,
        loc: LocationOnRoad,
    ) -> IntersectionId {
        match self.assignment.get(&agent).copied() {
            Some(request) => self.hop_toward(agent, time, loc, request.pickup),
            None => {
                // Idle: just keep moving through the first neighbor.
                let here = self.map.road(loc.road).to;
                let next = self
                    .map
                    .intersection(here)
                    .roads_from
                    .keys()
                    .next()
                    .copied()
                    .expect("dead-end intersection");
                if let Ok(road) = self.map.intersection(here).road_to(next) {
                    self.last
                        .insert(agent, (time, LocationOnRoad::at_start(self.map.road(road))));
                }
                next
            }
        }
    }

    fn on_reach_intersection_with_request(
        &mut self,
        agent: Entity,
        time: u64,
        loc: LocationOnRoad,
        request: RequestInfo,
    ) -> IntersectionId {
        self.hop_toward(agent, time, loc, request.dropoff)
    }
}

fn random_destination_world(map: CityMap, maximum_life: u64) -> World {
    let pattern = TrafficPattern::constant(1.0);
    let manager = RandomDestinationManager::new(map.fleet_copy(), Arc::new(pattern.clone()));
    test_world(map, pattern, Box::new(manager), maximum_life)
}

fn greedy_world(map: CityMap, maximum_life: u64) -> World {
    let pattern = TrafficPattern::constant(1.0);
    let manager = GreedyManager::new(map.fleet_copy(), Arc::new(pattern.clone()));
    test_world(map, pattern, Box::new(manager), maximum_life)
}

/// A colocated agent serves a whole-road trip with zero search, approach,
/// and wait time.
#[test]
fn colocated_trip_is_served_immediately() {
    let map = round_trip_map(1000.0, 10.0);
    let ab = &map.roads()[0];
    let start = LocationOnRoad::at_start(ab);
    let dropoff = LocationOnRoad::at_end(ab);

    let mut world = random_destination_world(map, secs(200));
    spawn_agent(&mut world, start, 0);
    spawn_request(&mut world, start, dropoff, 0, secs(200));
    set_end_time(&mut world, secs(300));

    let mut schedule = simulation_schedule();
    run(&mut world, &mut schedule, 10_000);

    let score = world.resource::<ScoreTelemetry>();
    assert_eq!(score.total_requests, 1);
    assert_eq!(score.total_assignments, 1);
    assert_eq!(score.expired_requests, 0);
    assert_eq!(score.total_abortions, 0);
    assert_eq!(score.total_search_time, 0);
    assert_eq!(score.total_approach_time, 0);
    assert_eq!(score.total_wait_time, 0);
    assert_eq!(score.total_trip_time, secs(100));
    assert_eq!(score.completed_trips[0].time, 0);
    assert_eq!(score.completed_trips[0].interval, secs(100));
}

/// An unreachable request expires exactly once and nothing else happens.
#[test]
fn unreachable_request_expires_once() {
    // Two disconnected pieces: a round-trip pair for the agent to cruise,
    // and a far-away one-way road carrying the request.
    let mut builder = CityMapBuilder::new();
    let a = builder.add_vertex(1, 40.0, -74.0);
    let b = builder.add_vertex(2, 40.0, -73.99);
    let c = builder.add_vertex(3, 41.0, -74.0);
    let d = builder.add_vertex(4, 41.0, -73.99);
    let ab = builder.add_link(a, b, 1000.0, 10.0).unwrap();
    let ba = builder.add_link(b, a, 1000.0, 10.0).unwrap();
    let cd = builder.add_link(c, d, 1000.0, 10.0).unwrap();
    builder.add_road(vec![ab]).unwrap();
    builder.add_road(vec![ba]).unwrap();
    let far = builder.add_road(vec![cd]).unwrap();
    let map = builder.build().unwrap();

    let cruise_start = LocationOnRoad::at_start(&map.roads()[0]);
    let pickup = LocationOnRoad::new(map.road(far), 500.0);
    let far_end = LocationOnRoad::at_end(map.road(far));

    let mut world = random_destination_world(map, secs(50));
    spawn_agent(&mut world, cruise_start, 0);
    spawn_request(&mut world, pickup, far_end, 0, secs(50));
    set_end_time(&mut world, secs(300));

    let mut schedule = simulation_schedule();
    run(&mut world, &mut schedule, 10_000);

    let score = world.resource::<ScoreTelemetry>();
    assert_eq!(score.total_requests, 1);
    assert_eq!(score.expired_requests, 1);
    assert_eq!(score.total_assignments, 0);
    assert_eq!(score.total_abortions, 0);
    assert_eq!(score.total_wait_time, secs(50));
}

/// A doomed assignment is aborted at expiration and the freed agent is
/// immediately re-tasked toward a waiting request.
#[test]
fn abort_and_reassign_after_expiration() {
    let map = round_trip_map(1000.0, 10.0);
    let ab = &map.roads()[0];
    let ba = &map.roads()[1];
    let agent_start = LocationOnRoad::at_start(ab);
    let r1_pickup = LocationOnRoad::new(ba, 500.0);
    let r1_dropoff = LocationOnRoad::new(ba, 900.0);
    let r2_pickup = LocationOnRoad::new(ab, 100.0);
    let r2_dropoff = LocationOnRoad::new(ab, 800.0);

    let mut world = greedy_world(map, secs(40));
    spawn_agent(&mut world, agent_start, 0);
    spawn_request(&mut world, r1_pickup, r1_dropoff, 0, secs(40));
    spawn_request(&mut world, r2_pickup, r2_dropoff, secs(30), secs(200));
    set_end_time(&mut world, secs(500));

    let mut schedule = simulation_schedule();
    run(&mut world, &mut schedule, 10_000);

    let score = world.resource::<ScoreTelemetry>();
    assert_eq!(score.total_requests, 2);
    assert_eq!(score.expired_requests, 1);
    assert_eq!(score.total_abortions, 1);
    assert_eq!(score.total_assignments, 1);

    // The surviving trip: assigned at the expiration tick (40 s), picked up
    // after cruising to the far intersection and back (210 s), 70 s ride.
    assert_eq!(score.approach_records[0].time, secs(40));
    assert_eq!(score.approach_records[0].interval, secs(170));
    assert_eq!(score.completed_trips[0].time, secs(210));
    assert_eq!(score.completed_trips[0].interval, secs(70));
}

/// A dropoff and an availability at the very same tick: the agent event
/// runs first, so the freed agent can take the new request immediately.
#[test]
fn same_tick_dropoff_then_availability() {
    let map = round_trip_map(1000.0, 10.0);
    let ab = &map.roads()[0];
    let start = LocationOnRoad::at_start(ab);
    let ra_dropoff = LocationOnRoad::new(ab, 500.0);
    let rb_pickup = LocationOnRoad::new(ab, 700.0);
    let rb_dropoff = LocationOnRoad::new(ab, 900.0);

    let mut world = random_destination_world(map, secs(200));
    spawn_agent(&mut world, start, 0);
    spawn_request(&mut world, start, ra_dropoff, 0, secs(200));
    // Appears exactly when the first dropoff happens, a little upstream.
    spawn_request(&mut world, rb_pickup, rb_dropoff, secs(50), secs(200));
    set_end_time(&mut world, secs(400));

    let mut schedule = simulation_schedule();
    run(&mut world, &mut schedule, 10_000);

    let score = world.resource::<ScoreTelemetry>();
    assert_eq!(score.total_assignments, 2);
    assert_eq!(score.expired_requests, 0);
    assert_eq!(score.total_abortions, 0);
    // The second trip was picked up 20 s after its same-tick assignment.
    assert_eq!(score.approach_records[1].time, secs(50));
    assert_eq!(score.approach_records[1].interval, secs(20));
    assert_eq!(score.completed_trips[1].time, secs(70));
}

/// Trigger times never go backwards, and the (time, kind, seq) triples are
/// strictly increasing.
#[test]
fn trigger_order_is_total_and_monotone() {
    let map = round_trip_map(1000.0, 10.0);
    let ab = &map.roads()[0];
    let start = LocationOnRoad::at_start(ab);
    let pickup_1 = LocationOnRoad::new(ab, 200.0);
    let dropoff_1 = LocationOnRoad::new(ab, 600.0);
    let pickup_2 = LocationOnRoad::new(ab, 300.0);
    let dropoff_2 = LocationOnRoad::new(ab, 800.0);

    let mut world = random_destination_world(map, secs(60));
    spawn_agent(&mut world, start, 0);
    spawn_request(&mut world, pickup_1, dropoff_1, 0, secs(60));
    spawn_request(&mut world, pickup_2, dropoff_2, secs(10), secs(60));
    set_end_time(&mut world, secs(400));

    let mut schedule = simulation_schedule();
    let mut seen: Vec<(u64, crate::clock::EventKind, u64)> = Vec::new();
    while run_next_event(&mut world, &mut schedule) {
        let event = world.resource::<CurrentEvent>().0;
        seen.push((event.time, event.kind, event.seq));
        assert!(seen.len() < 10_000, "runaway simulation");
    }

    assert!(!seen.is_empty());
    for pair in seen.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "time went backwards");
        assert!(pair[0] < pair[1], "trigger order must be strictly increasing");
    }
}

/// Agents never hold more than one request and requests never have more
/// than one agent, at every step of a busy run.
#[test]
fn at_most_one_assignment_each_way() {
    use crate::ecs::{Agent, Request};

    let map = grid_map(3, 3, 200.0, 10.0);
    let roads: Vec<_> = map.roads().iter().map(|r| r.id).collect();
    // Every grid road has the same length, so locations can be spelled out
    // without consulting the map.
    let at = |road, distance| LocationOnRoad {
        road,
        distance_from_start: distance,
    };

    let mut world = greedy_world(map, secs(120));
    spawn_agent(&mut world, at(roads[0], 100.0), 0);
    spawn_agent(&mut world, at(roads[5], 10.0), 0);
    for (from, to, available) in [
        (roads[1], roads[8], 0),
        (roads[2], roads[7], 5),
        (roads[3], roads[6], 10),
        (roads[4], roads[9], 40),
    ] {
        spawn_request(
            &mut world,
            at(from, 50.0),
            at(to, 70.0),
            secs(available),
            secs(120),
        );
    }
    set_end_time(&mut world, secs(600));

    let mut schedule = simulation_schedule();
    let mut steps = 0;
    while run_next_event(&mut world, &mut schedule) {
        steps += 1;
        assert!(steps < 10_000, "runaway simulation");

        let mut agent_query = world.query::<&Agent>();
        let assigned_requests: Vec<_> = agent_query
            .iter(&world)
            .filter_map(|a| a.assigned)
            .collect();
        let mut deduped = assigned_requests.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(
            deduped.len(),
            assigned_requests.len(),
            "request assigned twice"
        );

        let mut request_query = world.query::<&Request>();
        let assigned_agents: Vec<_> = request_query
            .iter(&world)
            .filter_map(|r| r.assigned_agent)
            .collect();
        let mut deduped = assigned_agents.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), assigned_agents.len(), "agent assigned twice");
    }

    // Serving set is consistent with components at the end.
    let serving = world.resource::<FleetState>().serving_count();
    let mut agent_query = world.query::<&Agent>();
    let assigned = agent_query
        .iter(&world)
        .filter(|a| a.assigned.is_some())
        .count();
    assert_eq!(serving, assigned);
}

/// Two runs from the same seed and inputs produce identical counters and
/// per-trip records.
#[test]
fn runs_are_deterministic_for_a_seed() {
    fn one_run(seed: u64) -> (u64, u64, u64, u64, Vec<(u64, u64, u64)>) {
        let map = grid_map(4, 4, 150.0, 10.0);
        let n = map.roads().len();
        let trips: Vec<TripRecord> = (0..24)
            .map(|i| {
                let pickup_road = map.road(map.roads()[(i * 5) % n].id);
                let dropoff_road = map.road(map.roads()[(i * 11 + 3) % n].id);
                TripRecord {
                    pickup: LocationOnRoad::new(pickup_road, pickup_road.length / 3.0),
                    dropoff: LocationOnRoad::new(dropoff_road, dropoff_road.length / 2.0),
                    pickup_time: secs(10 * i as u64),
                    dropoff_time: secs(10 * i as u64 + 90),
                }
            })
            .collect();

        let params = SimulationParams::default()
            .with_number_of_agents(4)
            .with_seed(seed)
            .with_maximum_life_secs(180);
        let mut world = World::new();
        build_world(&mut world, map, trips, &params);

        let mut schedule = simulation_schedule();
        run(&mut world, &mut schedule, 200_000);

        let score = world.resource::<ScoreTelemetry>();
        (
            score.total_requests,
            score.total_assignments,
            score.expired_requests,
            score.total_abortions,
            score
                .completed_trips
                .iter()
                .map(|r| (r.time, r.interval, r.expected_interval))
                .collect(),
        )
    }

    assert_eq!(one_run(1234), one_run(1234));
}
