//! World assembly: resources, request entities, and randomly placed agents.

use std::sync::Arc;

use bevy_ecs::prelude::World;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::ecs::{Agent, FleetState, PendingEvent, Request};
use crate::fleet::build_fleet_manager;
use crate::map::{CityMap, LocationOnRoad};
use crate::scenario::{SimulationEndTime, SimulationParams, TripRecord};
use crate::telemetry::{EventMetrics, ScoreTelemetry};
use crate::traffic::build_sliding_pattern;

/// Build the world for one run: calibrate the traffic pattern, create one
/// request entity (and its availability event) per trip record, place the
/// agents uniformly at random on the map, and install every engine
/// resource. The fleet manager receives its own map copy.
pub fn build_world(
    world: &mut World,
    map: CityMap,
    mut trips: Vec<TripRecord>,
    params: &SimulationParams,
) {
    let pattern = build_sliding_pattern(
        &map,
        &mut trips,
        params.traffic_pattern_epoch,
        params.traffic_pattern_step,
        params.dynamic_traffic,
    );

    let mut clock = SimulationClock::default();
    let mut fleet = FleetState::default();
    let fleet_manager = build_fleet_manager(
        params.fleet_manager,
        map.fleet_copy(),
        Arc::new(pattern.clone()),
    );

    let mut earliest_request_time = u64::MAX;
    let mut latest_request_time = 0;
    let mut unroutable = 0usize;
    for trip in &trips {
        let Some(static_trip_time) = map.travel_time_between(&trip.pickup, &trip.dropoff) else {
            unroutable += 1;
            continue;
        };
        let mut request = Request::new(
            trip.pickup,
            trip.dropoff,
            trip.pickup_time,
            static_trip_time,
            params.request_maximum_life_time,
        );

        let entity = world.spawn_empty().id();
        let token = clock.schedule_at(
            trip.pickup_time,
            EventKind::RequestAvailable,
            EventSubject::Request(entity),
        );
        request.pending = Some(PendingEvent {
            token,
            kind: EventKind::RequestAvailable,
            time: trip.pickup_time,
        });
        world.entity_mut(entity).insert(request);

        earliest_request_time = earliest_request_time.min(trip.pickup_time);
        latest_request_time = latest_request_time
            .max(trip.pickup_time + params.request_maximum_life_time + static_trip_time);
    }
    if unroutable > 0 {
        log::warn!("dropped {unroutable} trips with no path from pickup to dropoff");
    }

    // Agents deploy one tick before the first request appears.
    let deploy_time = if earliest_request_time == u64::MAX {
        0
    } else {
        earliest_request_time.saturating_sub(1)
    };
    let mut rng = StdRng::seed_from_u64(params.agent_placement_seed);
    for _ in 0..params.number_of_agents {
        let road = &map.roads()[rng.gen_range(0..map.roads().len())];
        let loc = LocationOnRoad::new(road, rng.gen_range(0.0..=road.length));

        let mut agent = Agent::new(loc, deploy_time);
        let entity = world.spawn_empty().id();
        let token = clock.schedule_at(
            deploy_time,
            EventKind::AgentIntroduced,
            EventSubject::Agent(entity),
        );
        agent.pending = Some(PendingEvent {
            token,
            kind: EventKind::AgentIntroduced,
            time: deploy_time,
        });
        world.entity_mut(entity).insert(agent);
        fleet.mark_empty(entity);
    }

    world.insert_resource(ScoreTelemetry::new(params.request_maximum_life_time));
    world.insert_resource(EventMetrics::default());
    world.insert_resource(SimulationEndTime(latest_request_time));
    world.insert_resource(pattern);
    world.insert_resource(map);
    world.insert_resource(clock);
    world.insert_resource(fleet);
    world.insert_resource(fleet_manager);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TIME_RESOLUTION;
    use crate::ecs::Agent;
    use crate::test_helpers::single_road_map;

    const SEC: u64 = TIME_RESOLUTION;

    fn trips(map: &CityMap) -> Vec<TripRecord> {
        let road = &map.roads()[0];
        vec![TripRecord {
            pickup: LocationOnRoad::at_start(road),
            dropoff: LocationOnRoad::at_end(road),
            pickup_time: 100 * SEC,
            dropoff_time: 200 * SEC,
        }]
    }

    #[test]
    fn placement_is_reproducible_for_a_seed() {
        let positions = |seed: u64| -> Vec<(u32, u64)> {
            let map = single_road_map(1000.0, 10.0);
            let mut world = World::new();
            let records = trips(&map);
            let params = SimulationParams::default()
                .with_number_of_agents(5)
                .with_seed(seed);
            build_world(&mut world, map, records, &params);
            let mut query = world.query::<&Agent>();
            let mut out: Vec<(u32, u64)> = query
                .iter(&world)
                .map(|a| (a.loc.road.0, a.loc.distance_from_start.to_bits()))
                .collect();
            out.sort();
            out
        };

        assert_eq!(positions(7), positions(7));
        assert_ne!(positions(7), positions(8));
    }

    #[test]
    fn end_time_covers_life_and_trip() {
        let map = single_road_map(1000.0, 10.0);
        let mut world = World::new();
        let records = trips(&map);
        let params = SimulationParams::default().with_maximum_life_secs(600);
        build_world(&mut world, map, records, &params);

        // available + life + static trip (100 s at 10 m/s over 1000 m).
        let end = world.resource::<SimulationEndTime>().0;
        assert_eq!(end, (100 + 600 + 100) * SEC);
    }

    #[test]
    fn agents_deploy_one_tick_before_first_request() {
        let map = single_road_map(1000.0, 10.0);
        let mut world = World::new();
        let records = trips(&map);
        let params = SimulationParams::default().with_number_of_agents(1);
        build_world(&mut world, map, records, &params);

        let mut clock = world.resource_mut::<SimulationClock>();
        assert_eq!(clock.next_event_time(), Some(100 * SEC - 1));
    }
}
