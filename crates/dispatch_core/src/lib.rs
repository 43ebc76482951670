//! # Fleet Dispatch Simulation Core
//!
//! A discrete-event simulator for a ride-hailing fleet on a real urban
//! street network. Given a road map, a day of recorded passenger trips,
//! and a pluggable dispatch policy, it replays the day: agents cruise the
//! map, the policy assigns them to trip requests, and the score measures
//! how well the policy did (search, wait, approach and trip times,
//! expiration rate).
//!
//! ## Overview
//!
//! - **Road graph**: intersections connected by multi-link roads, with a
//!   frozen all-pairs shortest-travel-time table built in parallel
//! - **Map matching**: raw lat/lon coordinates snapped to on-road locations
//!   via a segment k-d tree
//! - **Traffic model**: a piecewise-constant speed factor over the day,
//!   integrated epoch by epoch for on-road motion
//! - **Event scheduling**: one min-heap timeline; agent events outrank
//!   request events on timestamp ties, so ordering is total
//! - **ECS**: agents and requests are entities; one system per event kind
//! - **Deterministic**: seeded placement and a totally ordered timeline
//!   make runs reproducible
//!
//! ## Example
//!
//! ```rust,no_run
//! use bevy_ecs::prelude::World;
//! use dispatch_core::runner::{run, simulation_schedule};
//! use dispatch_core::scenario::{build_world, SimulationParams};
//! use dispatch_core::telemetry::finalize_score;
//!
//! # fn load_map() -> dispatch_core::map::CityMap { unimplemented!() }
//! # fn load_trips() -> Vec<dispatch_core::scenario::TripRecord> { unimplemented!() }
//! let mut world = World::new();
//! let params = SimulationParams::default().with_number_of_agents(100).with_seed(42);
//! build_world(&mut world, load_map(), load_trips(), &params);
//!
//! let mut schedule = simulation_schedule();
//! run(&mut world, &mut schedule, usize::MAX);
//! let summary = finalize_score(&mut world);
//! ```

pub mod clock;
pub mod ecs;
pub mod error;
pub mod fleet;
pub mod geom;
pub mod map;
pub mod matching;
pub mod runner;
pub mod scenario;
pub mod spatial;
pub mod systems;
pub mod telemetry;
pub mod telemetry_export;
pub mod traffic;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
