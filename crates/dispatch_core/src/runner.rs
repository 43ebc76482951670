//! Simulation runner: advances the clock and routes events into the ECS.
//!
//! Each step pops the next event from [SimulationClock], inserts it as
//! [CurrentEvent], then runs the schedule; `run_if` conditions make sure
//! only the system for that event kind does any work. The run stops when
//! the timeline is empty, or when the configured end time has passed and no
//! agent is still serving a request (the overrun tail is consumed first).

use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::FleetState;
use crate::scenario::SimulationEndTime;
use crate::telemetry::EventMetrics;
use crate::systems::{
    agent_introduced::agent_introduced_system, dropoff_arrival::dropoff_arrival_system,
    intersection_reached::intersection_reached_system, pickup_arrival::pickup_arrival_system,
    request_available::request_available_system, request_expired::request_expired_system,
};

fn is_agent_introduced(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::AgentIntroduced)
        .unwrap_or(false)
}

fn is_intersection_reached(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::IntersectionReached)
        .unwrap_or(false)
}

fn is_pickup_arrival(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::PickupArrival)
        .unwrap_or(false)
}

fn is_dropoff_arrival(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DropoffArrival)
        .unwrap_or(false)
}

fn is_request_available(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RequestAvailable)
        .unwrap_or(false)
}

fn is_request_expired(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RequestExpired)
        .unwrap_or(false)
}

/// Builds the simulation schedule: one event-reacting system per kind, plus
/// [apply_deferred] so despawned requests are gone before the next step.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((
        agent_introduced_system.run_if(is_agent_introduced),
        intersection_reached_system.run_if(is_intersection_reached),
        pickup_arrival_system.run_if(is_pickup_arrival),
        dropoff_arrival_system.run_if(is_dropoff_arrival),
        request_available_system.run_if(is_request_available),
        request_expired_system.run_if(is_request_expired),
        apply_deferred,
    ));
    schedule
}

/// Runs one step. Returns `false` when the timeline is exhausted or the run
/// is past its end time with no agent serving.
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    let end_time = world.get_resource::<SimulationEndTime>().map(|e| e.0);
    let next_time = world.resource_mut::<SimulationClock>().next_event_time();
    let Some(next_time) = next_time else {
        return false;
    };
    if let Some(end_time) = end_time {
        let serving = world
            .get_resource::<FleetState>()
            .map(|f| f.serving_count())
            .unwrap_or(0);
        if next_time > end_time && serving == 0 {
            return false;
        }
    }

    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(event) => event,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));

    if let Some(mut metrics) = world.get_resource_mut::<EventMetrics>() {
        metrics.record_event(event.kind);
    }

    schedule.run(world);
    true
}

/// Runs steps until the stop condition fires or `max_steps` is reached.
/// Returns the number of steps executed.
pub fn run(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world, schedule) {
        steps += 1;
    }
    steps
}
