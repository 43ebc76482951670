//! An agent reached the pickup location of its assigned request: the
//! passenger boards, the score closes the approach interval, and the agent
//! continues toward the dropoff.

use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{Agent, FleetState, Request};
use crate::fleet::{FleetManagerResource, RequestState};
use crate::map::CityMap;
use crate::systems::assignment::{
    move_to_end_intersection, process_action, request_info, update_and_schedule,
};
use crate::telemetry::ScoreTelemetry;
use crate::traffic::TrafficPattern;

#[allow(clippy::too_many_arguments)]
pub fn pickup_arrival_system(
    event: Res<CurrentEvent>,
    map: Res<CityMap>,
    traffic: Res<TrafficPattern>,
    mut clock: ResMut<SimulationClock>,
    mut fleet_manager: ResMut<FleetManagerResource>,
    mut score: ResMut<ScoreTelemetry>,
    mut fleet: ResMut<FleetState>,
    mut agents: Query<&mut Agent>,
    mut requests: Query<&mut Request>,
) {
    if event.0.kind != EventKind::PickupArrival {
        return;
    }
    let EventSubject::Agent(entity) = event.0.subject else {
        return;
    };
    let now = event.0.time;

    // The passenger boards.
    let (request_entity, agent_loc, assign_location, assign_time, start_search_time) = {
        let mut agent = agents.get_mut(entity).expect("pickup event for unknown agent");
        let Some(request_entity) = agent.assigned else {
            // The assignment fell through after this arrival was scheduled;
            // just keep driving.
            move_to_end_intersection(&map, &traffic, &mut clock, entity, &mut agent, now);
            return;
        };
        agent.is_pickup = true;
        (
            request_entity,
            agent.loc,
            agent.assign_location,
            agent.assign_time,
            agent.start_search_time,
        )
    };

    let (info, available_time) = {
        let mut request = requests
            .get_mut(request_entity)
            .expect("picked-up request disappeared");
        request.pickup_time = Some(now);
        // The request is served; it will no longer expire.
        if let Some(pending) = request.pending.take() {
            clock.cancel(pending.token);
        }
        (request_info(request_entity, &request), request.available_time)
    };

    let static_approach_time = map
        .travel_time_between(&assign_location, &agent_loc)
        .expect("driven approach leg must be routable");
    score.record_approach_time(
        now,
        start_search_time,
        assign_time,
        available_time,
        static_approach_time,
    );
    log::debug!("agent {entity:?} picked up request {request_entity:?} at {now}");

    let action = fleet_manager.on_request_availability_change(
        info,
        RequestState::PickedUp,
        agent_loc,
        now,
    );
    process_action(
        action,
        &map,
        &traffic,
        &mut clock,
        &mut fleet,
        &mut agents,
        &mut requests,
        now,
    );

    // Head for the dropoff: directly when it lies ahead on this road,
    // otherwise via the next intersection.
    let dropoff = requests
        .get(request_entity)
        .expect("picked-up request disappeared")
        .dropoff;
    let mut agent = agents.get_mut(entity).expect("agent vanished mid-event");
    let loc = agent.loc;
    if loc.upstream_to(&dropoff) {
        let road = map.road(loc.road);
        let travel_time = traffic.road_forward_travel_time(now, road, &loc, &dropoff);
        update_and_schedule(
            &mut clock,
            entity,
            &mut agent,
            now + travel_time,
            dropoff,
            EventKind::DropoffArrival,
            now,
            loc,
        );
    } else {
        move_to_end_intersection(&map, &traffic, &mut clock, entity, &mut agent, now);
    }
}
