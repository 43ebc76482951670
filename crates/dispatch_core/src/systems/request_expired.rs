//! A request ran out its life without a pickup: notify the policy, abort
//! any agent still en route to it, and count the expiration.

use bevy_ecs::prelude::{Commands, Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{Agent, FleetState, Request};
use crate::fleet::{FleetManagerResource, RequestState};
use crate::map::CityMap;
use crate::systems::assignment::{abort_assignment, process_action, request_info};
use crate::telemetry::ScoreTelemetry;
use crate::traffic::TrafficPattern;

#[allow(clippy::too_many_arguments)]
pub fn request_expired_system(
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
    if event.0.kind != EventKind::RequestExpired {
        return;
    }
    let EventSubject::Request(entity) = event.0.subject else {
        return;
    };
    let now = event.0.time;

    let (info, pickup) = {
        let request = requests
            .get(entity)
            .expect("expiration event for unknown request");
        assert!(
            request.pickup_time.is_none(),
            "request {entity:?} expiring after having been picked up"
        );
        (request_info(entity, request), request.pickup)
    };
    log::debug!("request {entity:?} expired at {now}");

    let action =
        fleet_manager.on_request_availability_change(info, RequestState::Expired, pickup, now);

    // An agent still approaching this request turns back into a searcher
    // first, so the policy's response may immediately re-task it.
    if let Some(agent_entity) = info.assigned_agent {
        let mut agent = agents
            .get_mut(agent_entity)
            .expect("assigned agent disappeared");
        abort_assignment(&map, &traffic, &mut clock, &mut fleet, agent_entity, &mut agent);
        score.record_abortion();
    }

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

    score.record_expiration();
    commands.entity(entity).despawn();
}
