//! First trigger of a freshly deployed agent: hand it to the policy and
//! start it cruising toward the end of its road.

use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::Agent;
use crate::fleet::FleetManagerResource;
use crate::map::CityMap;
use crate::systems::assignment::move_to_end_intersection;
use crate::traffic::TrafficPattern;

pub fn agent_introduced_system(
    event: Res<CurrentEvent>,
    map: Res<CityMap>,
    traffic: Res<TrafficPattern>,
    mut clock: ResMut<SimulationClock>,
    mut fleet_manager: ResMut<FleetManagerResource>,
    mut agents: Query<&mut Agent>,
) {
    if event.0.kind != EventKind::AgentIntroduced {
        return;
    }
    let EventSubject::Agent(entity) = event.0.subject else {
        return;
    };
    let now = event.0.time;

    let mut agent = agents
        .get_mut(entity)
        .expect("introduction event for unknown agent");
    agent.start_search_time = now;

    log::debug!("agent {entity:?} introduced at {:?}", agent.loc);
    fleet_manager.on_agent_introduced(entity, agent.loc, now);

    move_to_end_intersection(&map, &traffic, &mut clock, entity, &mut agent, now);
}
