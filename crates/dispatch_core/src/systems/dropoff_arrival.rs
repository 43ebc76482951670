//! An agent reached the dropoff of the request it carries: the trip
//! completes, and the policy may immediately hand the agent (or another)
//! its next request.

use bevy_ecs::prelude::{Commands, Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{Agent, FleetState, Request};
use crate::fleet::{AgentAction, FleetManagerResource, RequestState};
use crate::map::CityMap;
use crate::systems::assignment::{
    move_to_end_intersection, process_action, request_info, validate_assignable, wire_assignment,
};
use crate::telemetry::ScoreTelemetry;
use crate::traffic::TrafficPattern;

#[allow(clippy::too_many_arguments)]
pub fn dropoff_arrival_system(
    event: Res<CurrentEvent>,
    map: Res<CityMap>,
    traffic: Res<TrafficPattern>,
    mut clock: ResMut<SimulationClock>,
    mut fleet_manager: ResMut<FleetManagerResource>,
    mut score: ResMut<ScoreTelemetry>,
    mut fleet: ResMut<FleetState>,
    mut agents: Query<&mut Agent>,
    mut requests: Query<&mut Request>,
    mut commands: Commands,
) {
    if event.0.kind != EventKind::DropoffArrival {
        return;
    }
    let EventSubject::Agent(entity) = event.0.subject else {
        return;
    };
    let now = event.0.time;

    let (request_entity, agent_loc) = {
        let mut agent = agents
            .get_mut(entity)
            .expect("dropoff event for unknown agent");
        let request_entity = agent
            .assigned
            .expect("dropping off without an assigned request");
        agent.start_search_time = now;
        agent.is_pickup = false;
        (request_entity, agent.loc)
    };

    let info = {
        let request = requests
            .get(request_entity)
            .expect("carried request disappeared");
        let pickup_time = request
            .pickup_time
            .expect("dropping off a request that was never picked up");
        score.record_completed_trip(now, pickup_time, request.static_trip_time);
        request_info(request_entity, request)
    };
    log::debug!("agent {entity:?} dropped off request {request_entity:?} at {now}");

    let action = fleet_manager.on_request_availability_change(
        info,
        RequestState::DroppedOff,
        agent_loc,
        now,
    );

    // The agent is free again; the completed request leaves the world.
    {
        let mut agent = agents.get_mut(entity).expect("agent vanished mid-event");
        agent.assigned = None;
        fleet.mark_empty(entity);
    }
    commands.entity(request_entity).despawn();

    match action {
        AgentAction::Assign {
            agent: target,
            request,
        } if target == entity => {
            // Back-to-back assignment of this same agent, straight from the
            // dropoff point.
            let Ok(mut request_component) = requests.get_mut(request) else {
                panic!("protocol violation: fleet manager referenced unknown request {request:?}");
            };
            let mut agent = agents.get_mut(entity).expect("agent vanished mid-event");
            validate_assignable(entity, &agent, request, &request_component);
            let rescheduled = wire_assignment(
                &map,
                &traffic,
                &mut clock,
                &mut fleet,
                entity,
                &mut agent,
                request,
                &mut request_component,
                now,
            );
            if !rescheduled {
                move_to_end_intersection(&map, &traffic, &mut clock, entity, &mut agent, now);
            }
        }
        AgentAction::Assign { .. } => {
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
            let mut agent = agents.get_mut(entity).expect("agent vanished mid-event");
            move_to_end_intersection(&map, &traffic, &mut clock, entity, &mut agent, now);
        }
        _ => {
            let mut agent = agents.get_mut(entity).expect("agent vanished mid-event");
            move_to_end_intersection(&map, &traffic, &mut clock, entity, &mut agent, now);
        }
    }
}
