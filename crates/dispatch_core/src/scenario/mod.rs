//! Scenario assembly: run parameters and world construction.

mod build;
mod params;

pub use build::build_world;
pub use params::{SimulationEndTime, SimulationParams, TripRecord};
