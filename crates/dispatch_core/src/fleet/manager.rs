//! The contract between the engine and a dispatch policy.
//!
//! The engine drives a policy through four callbacks and acts on the
//! [AgentAction] it returns. Policies only ever see value snapshots
//! ([RequestInfo], [LocationOnRoad]) and opaque entity ids; they hold their
//! own copy of the map and can never reach into engine state.

use bevy_ecs::prelude::Entity;

use crate::map::{IntersectionId, LocationOnRoad};

/// Lifecycle stage reported through
/// [FleetManager::on_request_availability_change].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Available,
    PickedUp,
    DroppedOff,
    Expired,
}

/// Value snapshot of a request, safe to retain inside a policy.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo {
    pub id: Entity,
    pub pickup: LocationOnRoad,
    pub dropoff: LocationOnRoad,
    pub available_time: u64,
    pub expiration_time: u64,
    /// The agent currently assigned, if any.
    pub assigned_agent: Option<Entity>,
}

/// What the policy wants the engine to do after an availability callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentAction {
    /// Leave everything as is.
    #[default]
    DoNothing,
    /// Assign `agent` to `request`. The engine validates both ids and the
    /// agent's availability before wiring the two together.
    Assign { agent: Entity, request: Entity },
    /// Abort `agent`'s current assignment.
    Abort { agent: Entity },
}

impl AgentAction {
    pub fn assign(agent: Entity, request: Entity) -> Self {
        AgentAction::Assign { agent, request }
    }
}

/// A dispatch policy: decides assignments and cruising routes.
///
/// Implementations are constructed with their own copy of the city map (see
/// [crate::map::CityMap::fleet_copy]) and the run's traffic pattern, and are
/// plugged into the engine as a boxed trait object.
pub trait FleetManager: Send + Sync {
    /// A new agent entered the system at `loc`.
    fn on_agent_introduced(&mut self, agent: Entity, loc: LocationOnRoad, time: u64);

    /// A request changed lifecycle stage. For [RequestState::Available] and
    /// [RequestState::Expired] `loc` is the request's pickup location; for
    /// the other stages it is the reporting agent's current location.
    fn on_request_availability_change(
        &mut self,
        request: RequestInfo,
        state: RequestState,
        loc: LocationOnRoad,
        time: u64,
    ) -> AgentAction;

    /// An empty agent reached an intersection and needs a direction. The
    /// returned intersection must be adjacent to the agent's current one.
    fn on_reach_intersection(
        &mut self,
        agent: Entity,
        time: u64,
        loc: LocationOnRoad,
    ) -> IntersectionId;

    /// Like [FleetManager::on_reach_intersection], for an agent carrying
    /// `request`.
    fn on_reach_intersection_with_request(
        &mut self,
        agent: Entity,
        time: u64,
        loc: LocationOnRoad,
        request: RequestInfo,
    ) -> IntersectionId;
}
