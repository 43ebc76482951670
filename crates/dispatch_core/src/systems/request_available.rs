//! A trip request enters the system: offer it to the policy, then schedule
//! its own expiration. The expiration event is the retry mechanism; no
//! external timer exists.

use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{Agent, FleetState, PendingEvent, Request};
use crate::fleet::{FleetManagerResource, RequestState};
use crate::map::CityMap;
use crate::systems::assignment::{process_action, request_info};
use crate::telemetry::ScoreTelemetry;
use crate::traffic::TrafficPattern;

#[allow(clippy::too_many_arguments)]
pub fn request_available_system(
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
    if event.0.kind != EventKind::RequestAvailable {
        return;
    }
    let EventSubject::Request(entity) = event.0.subject else {
        return;
    };
    let now = event.0.time;

    score.total_requests += 1;

    let (info, pickup) = {
        let request = requests
            .get(entity)
            .expect("availability event for unknown request");
        (request_info(entity, request), request.pickup)
    };
    log::debug!("request {entity:?} available at {now}");

    let action =
        fleet_manager.on_request_availability_change(info, RequestState::Available, pickup, now);
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

    // Assigned or not, the request keeps its expiration appointment; only a
    // pickup cancels it.
    let mut request = requests.get_mut(entity).expect("request vanished mid-event");
    let expiration_time = request.expiration_time;
    let token = clock.schedule_at(
        expiration_time,
        EventKind::RequestExpired,
        EventSubject::Request(entity),
    );
    request.pending = Some(PendingEvent {
        token,
        kind: EventKind::RequestExpired,
        time: expiration_time,
    });
}
