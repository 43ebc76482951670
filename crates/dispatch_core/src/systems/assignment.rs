//! Shared assignment plumbing used by several event systems: validating a
//! policy's [AgentAction], wiring an agent and a request together, and
//! tearing an assignment down on abort.
//!
//! Policy responses referencing unknown ids, carrying agents, or taken
//! requests violate the engine contract; those paths panic with the
//! offending id rather than limp on.

use bevy_ecs::prelude::{Entity, Query};

use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::ecs::{Agent, FleetState, PendingEvent, Request};
use crate::fleet::{AgentAction, RequestInfo};
use crate::map::{CityMap, LocationOnRoad};
use crate::traffic::TrafficPattern;

/// Value snapshot of a request for a policy callback.
pub(crate) fn request_info(entity: Entity, request: &Request) -> RequestInfo {
    RequestInfo {
        id: entity,
        pickup: request.pickup,
        dropoff: request.dropoff,
        available_time: request.available_time,
        expiration_time: request.expiration_time,
        assigned_agent: request.assigned_agent,
    }
}

/// Point the agent at its next waypoint and put its one event back on the
/// timeline.
#[allow(clippy::too_many_arguments)]
pub(crate) fn update_and_schedule(
    clock: &mut SimulationClock,
    entity: Entity,
    agent: &mut Agent,
    time: u64,
    loc: LocationOnRoad,
    kind: EventKind,
    last_appear_time: u64,
    last_appear_location: LocationOnRoad,
) {
    agent.loc = loc;
    agent.last_appear_time = last_appear_time;
    agent.last_appear_location = last_appear_location;
    let token = clock.schedule_at(time, kind, EventSubject::Agent(entity));
    agent.pending = Some(PendingEvent { token, kind, time });
}

/// Send the agent to the end intersection of its current road.
pub(crate) fn move_to_end_intersection(
    map: &CityMap,
    traffic: &TrafficPattern,
    clock: &mut SimulationClock,
    entity: Entity,
    agent: &mut Agent,
    now: u64,
) {
    let loc = agent.loc;
    let road = map.road(loc.road);
    let travel_time = traffic.road_travel_time_to_end(now, road, &loc);
    update_and_schedule(
        clock,
        entity,
        agent,
        now + travel_time,
        LocationOnRoad::at_end(road),
        EventKind::IntersectionReached,
        now,
        loc,
    );
}

/// The engine-side guard on an `Assign` action. The ids were already
/// resolved by the caller; this checks availability on both sides.
pub(crate) fn validate_assignable(
    agent_entity: Entity,
    agent: &Agent,
    request_entity: Entity,
    request: &Request,
) {
    if agent.is_pickup {
        panic!("protocol violation: agent {agent_entity:?} is already carrying a request");
    }
    if agent.assigned.is_some() {
        panic!("protocol violation: agent {agent_entity:?} is already assigned");
    }
    if request.assigned_agent.is_some() || request.is_picked_up() {
        panic!("protocol violation: request {request_entity:?} is already taken");
    }
}

/// Wire both sides of an assignment. If the agent's interpolated position is
/// on the pickup's road and upstream of it, the agent is re-routed straight
/// to the pickup point: its queued arrival is cancelled and replaced.
/// Returns whether that reschedule happened; otherwise the agent keeps its
/// current waypoint and plans at the next intersection.
#[allow(clippy::too_many_arguments)]
pub(crate) fn wire_assignment(
    map: &CityMap,
    traffic: &TrafficPattern,
    clock: &mut SimulationClock,
    fleet: &mut FleetState,
    agent_entity: Entity,
    agent: &mut Agent,
    request_entity: Entity,
    request: &mut Request,
    now: u64,
) -> bool {
    // An agent aborted mid-approach re-appears at a future waypoint; until
    // then its best-known position is that waypoint and its queued event
    // stays untouched.
    let appears_later = agent.last_appear_time > now;
    let current = if appears_later {
        agent.last_appear_location
    } else {
        let last_road = map.road(agent.last_appear_location.road);
        traffic.travel_road_for_time(
            agent.last_appear_time,
            last_road,
            &agent.last_appear_location,
            now - agent.last_appear_time,
        )
    };

    debug_assert!(agent.assigned.is_none(), "double assignment");
    agent.assign_location = current;
    agent.assign_time = now;
    agent.assigned = Some(request_entity);
    fleet.mark_serving(agent_entity);
    request.assigned_agent = Some(agent_entity);

    log::debug!(
        "agent {agent_entity:?} assigned to request {request_entity:?} at {now}"
    );

    if !appears_later && current.upstream_to(&request.pickup) {
        if let Some(pending) = agent.pending.take() {
            clock.cancel(pending.token);
        }
        let road = map.road(current.road);
        let travel_time = traffic.road_forward_travel_time(now, road, &current, &request.pickup);
        update_and_schedule(
            clock,
            agent_entity,
            agent,
            now + travel_time,
            request.pickup,
            EventKind::PickupArrival,
            now,
            current,
        );
        true
    } else {
        false
    }
}

/// Undo an assignment after its request expired. The queued arrival is
/// cancelled; an agent that was heading straight for the pickup continues
/// from there to the end of that road, anyone else keeps their waypoint.
pub(crate) fn abort_assignment(
    map: &CityMap,
    traffic: &TrafficPattern,
    clock: &mut SimulationClock,
    fleet: &mut FleetState,
    entity: Entity,
    agent: &mut Agent,
) {
    let pending = agent
        .pending
        .take()
        .expect("aborted agent has a scheduled event");
    clock.cancel(pending.token);

    agent.assigned = None;
    agent.is_pickup = false;
    fleet.mark_empty(entity);

    if pending.kind == EventKind::PickupArrival {
        move_to_end_intersection(map, traffic, clock, entity, agent, pending.time);
    } else {
        let token = clock.schedule_at(pending.time, pending.kind, EventSubject::Agent(entity));
        agent.pending = Some(PendingEvent {
            token,
            kind: pending.kind,
            time: pending.time,
        });
    }
}

/// Act on a policy response that may assign some agent to some request.
#[allow(clippy::too_many_arguments)]
pub(crate) fn process_action(
    action: AgentAction,
    map: &CityMap,
    traffic: &TrafficPattern,
    clock: &mut SimulationClock,
    fleet: &mut FleetState,
    agents: &mut Query<&mut Agent>,
    requests: &mut Query<&mut Request>,
    now: u64,
) {
    let AgentAction::Assign { agent, request } = action else {
        return;
    };
    let Ok(mut agent_component) = agents.get_mut(agent) else {
        panic!("protocol violation: fleet manager referenced unknown agent {agent:?}");
    };
    let Ok(mut request_component) = requests.get_mut(request) else {
        panic!("protocol violation: fleet manager referenced unknown request {request:?}");
    };
    validate_assignable(agent, &agent_component, request, &request_component);
    wire_assignment(
        map,
        traffic,
        clock,
        fleet,
        agent,
        &mut agent_component,
        request,
        &mut request_component,
        now,
    );
}
