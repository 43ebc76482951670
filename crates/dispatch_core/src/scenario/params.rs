use bevy_ecs::prelude::Resource;

use crate::clock::{to_scaled, ONE_MIN};
use crate::fleet::FleetManagerKind;
use crate::map::LocationOnRoad;

/// Default request life: ten minutes.
const DEFAULT_MAXIMUM_LIFE: u64 = 10 * ONE_MIN;
/// Default calibration window: fifteen minutes.
const DEFAULT_PATTERN_EPOCH: u64 = 15 * ONE_MIN;
/// Default calibration resolution: one minute.
const DEFAULT_PATTERN_STEP: u64 = ONE_MIN;

/// When the run is allowed to stop: the latest expiration-plus-trip time
/// over all requests. Agents still serving past this point finish first.
#[derive(Debug, Clone, Copy, Resource)]
pub struct SimulationEndTime(pub u64);

/// One parsed, map-matched trip record from the dataset.
#[derive(Debug, Clone, Copy)]
pub struct TripRecord {
    pub pickup: LocationOnRoad,
    pub dropoff: LocationOnRoad,
    /// When the passenger appeared, in scaled units.
    pub pickup_time: u64,
    /// When the recorded trip ended, in scaled units.
    pub dropoff_time: u64,
}

/// Parameters for assembling a simulation world.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub number_of_agents: usize,
    /// How long a request waits before expiring, in scaled units.
    pub request_maximum_life_time: u64,
    pub agent_placement_seed: u64,
    pub fleet_manager: FleetManagerKind,
    /// When false, every traffic epoch gets speed factor 1.0.
    pub dynamic_traffic: bool,
    /// Calibration window for the traffic pattern, in scaled units.
    pub traffic_pattern_epoch: u64,
    /// Calibration step for the traffic pattern, in scaled units.
    pub traffic_pattern_step: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            number_of_agents: 10,
            request_maximum_life_time: DEFAULT_MAXIMUM_LIFE,
            agent_placement_seed: 0,
            fleet_manager: FleetManagerKind::default(),
            dynamic_traffic: false,
            traffic_pattern_epoch: DEFAULT_PATTERN_EPOCH,
            traffic_pattern_step: DEFAULT_PATTERN_STEP,
        }
    }
}

impl SimulationParams {
    pub fn with_number_of_agents(mut self, number_of_agents: usize) -> Self {
        self.number_of_agents = number_of_agents;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.agent_placement_seed = seed;
        self
    }

    /// Set the request life in whole seconds.
    pub fn with_maximum_life_secs(mut self, seconds: u64) -> Self {
        self.request_maximum_life_time = to_scaled(seconds);
        self
    }

    pub fn with_fleet_manager(mut self, kind: FleetManagerKind) -> Self {
        self.fleet_manager = kind;
        self
    }

    pub fn with_dynamic_traffic(mut self, enabled: bool) -> Self {
        self.dynamic_traffic = enabled;
        self
    }

    /// Set the traffic calibration window and step in whole seconds.
    pub fn with_pattern_windows_secs(mut self, epoch: u64, step: u64) -> Self {
        self.traffic_pattern_epoch = to_scaled(epoch);
        self.traffic_pattern_step = to_scaled(step);
        self
    }
}
