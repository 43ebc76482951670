//! Test fixtures: tiny canonical maps and world assembly shared across
//! test modules.

use bevy_ecs::prelude::{Entity, World};

use crate::clock::{EventKind, EventSubject, SimulationClock, TIME_RESOLUTION};
use crate::ecs::{Agent, FleetState, PendingEvent, Request};
use crate::fleet::{FleetManager, FleetManagerResource};
use crate::geom::GeoProjector;
use crate::map::{CityMap, CityMapBuilder, LocationOnRoad};
use crate::scenario::SimulationEndTime;
use crate::telemetry::{EventMetrics, ScoreTelemetry};
use crate::traffic::TrafficPattern;

/// Reference corner for all fixture maps.
const REF_LAT: f64 = 40.0;
const REF_LON: f64 = -74.0;

/// One road from A to B: a single link of the given length (meters) and
/// speed limit (m/s).
pub fn single_road_map(length: f64, speed: f64) -> CityMap {
    let projector = GeoProjector::new(REF_LAT, REF_LON);
    let mut builder = CityMapBuilder::new();
    let a = builder.add_vertex(1, REF_LAT, REF_LON);
    let b = builder.add_vertex(
        2,
        REF_LAT,
        REF_LON + length / projector.meters_per_lon_degree(),
    );
    let ab = builder.add_link(a, b, length, speed).unwrap();
    builder.add_road(vec![ab]).unwrap();
    builder.build().unwrap()
}

/// Two roads, A to B and B to A, with identical parameters.
pub fn round_trip_map(length: f64, speed: f64) -> CityMap {
    let projector = GeoProjector::new(REF_LAT, REF_LON);
    let mut builder = CityMapBuilder::new();
    let a = builder.add_vertex(1, REF_LAT, REF_LON);
    let b = builder.add_vertex(
        2,
        REF_LAT,
        REF_LON + length / projector.meters_per_lon_degree(),
    );
    let ab = builder.add_link(a, b, length, speed).unwrap();
    let ba = builder.add_link(b, a, length, speed).unwrap();
    builder.add_road(vec![ab]).unwrap();
    builder.add_road(vec![ba]).unwrap();
    builder.build().unwrap()
}

/// A rows-by-cols grid with bidirectional single-link roads between
/// orthogonal neighbors. Strongly connected.
pub fn grid_map(rows: usize, cols: usize, edge_length: f64, speed: f64) -> CityMap {
    let projector = GeoProjector::new(REF_LAT, REF_LON);
    let dlat = edge_length / projector.meters_per_lat_degree();
    let dlon = edge_length / projector.meters_per_lon_degree();

    let mut builder = CityMapBuilder::new();
    let mut vertex = vec![Vec::with_capacity(cols); rows];
    for (r, row) in vertex.iter_mut().enumerate() {
        for c in 0..cols {
            let id = (r * cols + c + 1) as u64;
            row.push(builder.add_vertex(id, REF_LAT + r as f64 * dlat, REF_LON + c as f64 * dlon));
        }
    }

    let mut connect = |from, to| {
        let link = builder.add_link(from, to, edge_length, speed).unwrap();
        builder.add_road(vec![link]).unwrap();
    };
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                connect(vertex[r][c], vertex[r][c + 1]);
                connect(vertex[r][c + 1], vertex[r][c]);
            }
            if r + 1 < rows {
                connect(vertex[r][c], vertex[r + 1][c]);
                connect(vertex[r + 1][c], vertex[r][c]);
            }
        }
    }
    builder.build().unwrap()
}

/// A world with every engine resource installed, a manually supplied
/// policy, and an empty timeline. Entities are spawned by the helpers
/// below.
pub fn test_world(
    map: CityMap,
    pattern: TrafficPattern,
    manager: Box<dyn FleetManager>,
    request_maximum_life_time: u64,
) -> World {
    let mut world = World::new();
    world.insert_resource(SimulationClock::default());
    world.insert_resource(FleetState::default());
    world.insert_resource(ScoreTelemetry::new(request_maximum_life_time));
    world.insert_resource(EventMetrics::default());
    world.insert_resource(SimulationEndTime(u64::MAX));
    world.insert_resource(pattern);
    world.insert_resource(map);
    world.insert_resource(FleetManagerResource::new(manager));
    world
}

pub fn set_end_time(world: &mut World, end_time: u64) {
    world.insert_resource(SimulationEndTime(end_time));
}

/// Spawn an agent at `loc` with its introduction event on the timeline.
pub fn spawn_agent(world: &mut World, loc: LocationOnRoad, deploy_time: u64) -> Entity {
    let entity = world.spawn_empty().id();
    let mut agent = Agent::new(loc, deploy_time);
    {
        let mut clock = world.resource_mut::<SimulationClock>();
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
    }
    world.entity_mut(entity).insert(agent);
    world.resource_mut::<FleetState>().mark_empty(entity);
    entity
}

/// Spawn a request with its availability event on the timeline. The static
/// trip time comes from the world's map; an unroutable pair gets zero.
pub fn spawn_request(
    world: &mut World,
    pickup: LocationOnRoad,
    dropoff: LocationOnRoad,
    available_time: u64,
    maximum_life_time: u64,
) -> Entity {
    let static_trip_time = world
        .resource::<CityMap>()
        .travel_time_between(&pickup, &dropoff)
        .unwrap_or(0);
    let mut request = Request::new(
        pickup,
        dropoff,
        available_time,
        static_trip_time,
        maximum_life_time,
    );

    let entity = world.spawn_empty().id();
    {
        let mut clock = world.resource_mut::<SimulationClock>();
        let token = clock.schedule_at(
            available_time,
            EventKind::RequestAvailable,
            EventSubject::Request(entity),
        );
        request.pending = Some(PendingEvent {
            token,
            kind: EventKind::RequestAvailable,
            time: available_time,
        });
    }
    world.entity_mut(entity).insert(request);
    entity
}

/// Seconds in scaled units, for readable test literals.
pub const fn secs(seconds: u64) -> u64 {
    seconds * TIME_RESOLUTION
}
