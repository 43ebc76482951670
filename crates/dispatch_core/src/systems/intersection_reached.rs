//! An agent arrived at an intersection: turn toward a pending pickup or
//! dropoff on an adjacent road, or ask the policy where to cruise next.

use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{Agent, Request};
use crate::fleet::FleetManagerResource;
use crate::map::{CityMap, LocationOnRoad};
use crate::systems::assignment::{request_info, update_and_schedule};
use crate::traffic::TrafficPattern;

pub fn intersection_reached_system(
    event: Res<CurrentEvent>,
    map: Res<CityMap>,
    traffic: Res<TrafficPattern>,
    mut clock: ResMut<SimulationClock>,
    mut fleet_manager: ResMut<FleetManagerResource>,
    mut agents: Query<&mut Agent>,
    requests: Query<&Request>,
) {
    if event.0.kind != EventKind::IntersectionReached {
        return;
    }
    let EventSubject::Agent(entity) = event.0.subject else {
        return;
    };
    let now = event.0.time;

    let (loc, is_pickup, assigned) = {
        let agent = agents.get(entity).expect("arrival event for unknown agent");
        (agent.loc, agent.is_pickup, agent.assigned)
    };
    let road = map.road(loc.road);
    assert!(
        loc.at_end_intersection(road),
        "agent {entity:?} triggered an intersection arrival away from an intersection"
    );
    let here = road.to;

    // An assigned agent turns onto the pickup road as soon as it starts at
    // this intersection; a carrying agent does the same for the dropoff.
    if let Some(request_entity) = assigned {
        let request = requests
            .get(request_entity)
            .expect("assigned request disappeared");
        let target = if is_pickup {
            request.dropoff
        } else {
            request.pickup
        };
        if map.road(target.road).from == here {
            let target_road = map.road(target.road);
            let travel_time = traffic.road_travel_time_from_start(now, target_road, &target);
            let kind = if is_pickup {
                EventKind::DropoffArrival
            } else {
                EventKind::PickupArrival
            };
            let mut agent = agents.get_mut(entity).expect("agent vanished mid-event");
            update_and_schedule(
                &mut clock,
                entity,
                &mut agent,
                now + travel_time,
                target,
                kind,
                now,
                loc,
            );
            return;
        }
    }

    let next = if is_pickup {
        let request_entity = assigned.expect("carrying agent has a request");
        let request = requests
            .get(request_entity)
            .expect("assigned request disappeared");
        fleet_manager.on_reach_intersection_with_request(
            entity,
            now,
            loc,
            request_info(request_entity, request),
        )
    } else {
        fleet_manager.on_reach_intersection(entity, now, loc)
    };

    if !map.intersection(here).is_adjacent(next) {
        panic!(
            "protocol violation: fleet manager moved agent {entity:?} from {here:?} to non-adjacent intersection {next:?}"
        );
    }
    let next_road_id = map.intersection(here).road_to(next).unwrap_or_else(|_| {
        panic!(
            "protocol violation: no outgoing road from {here:?} to {next:?} for agent {entity:?}"
        )
    });
    let next_road = map.road(next_road_id);

    let next_loc = LocationOnRoad::at_end(next_road);
    let travel_time = traffic.road_travel_time_from_start(now, next_road, &next_loc);
    let mut agent = agents.get_mut(entity).expect("agent vanished mid-event");
    update_and_schedule(
        &mut clock,
        entity,
        &mut agent,
        now + travel_time,
        next_loc,
        EventKind::IntersectionReached,
        now,
        LocationOnRoad::at_start(next_road),
    );
}
