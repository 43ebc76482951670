//! Dispatch policies: the fleet-manager trait, its engine-side wrapper, and
//! the policy registry.
//!
//! A policy is stored as a boxed trait object in [FleetManagerResource] and
//! can be swapped at world-build time; the config names which registered
//! policy to construct.

pub mod manager;
mod random_destination;

use std::sync::Arc;

use bevy_ecs::prelude::Resource;

pub use manager::{AgentAction, FleetManager, RequestInfo, RequestState};
pub use random_destination::RandomDestinationManager;

use crate::map::CityMap;
use crate::traffic::TrafficPattern;

/// Resource wrapper for the fleet-manager trait object.
#[derive(Resource)]
pub struct FleetManagerResource(pub Box<dyn FleetManager>);

impl FleetManagerResource {
    pub fn new(manager: Box<dyn FleetManager>) -> Self {
        Self(manager)
    }
}

impl std::ops::Deref for FleetManagerResource {
    type Target = dyn FleetManager;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::ops::DerefMut for FleetManagerResource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

/// Registered policies, selectable by name through the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FleetManagerKind {
    #[default]
    RandomDestination,
}

impl FleetManagerKind {
    /// Resolve a policy name from the config. Accepts the class-style name
    /// the original datasets use as well as a short form.
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.rsplit('.').next().unwrap_or(name);
        match short {
            "RandomDestinationFleetManager" | "random_destination" => {
                Some(FleetManagerKind::RandomDestination)
            }
            _ => None,
        }
    }
}

/// Construct the policy named by `kind`. The map handed over here should be
/// a [CityMap::fleet_copy] so the policy cannot touch engine state.
pub fn build_fleet_manager(
    kind: FleetManagerKind,
    map: CityMap,
    pattern: Arc<TrafficPattern>,
) -> FleetManagerResource {
    match kind {
        FleetManagerKind::RandomDestination => {
            FleetManagerResource::new(Box::new(RandomDestinationManager::new(map, pattern)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_class_style_names() {
        assert_eq!(
            FleetManagerKind::from_name("UserExamples.RandomDestinationFleetManager"),
            Some(FleetManagerKind::RandomDestination)
        );
        assert_eq!(
            FleetManagerKind::from_name("random_destination"),
            Some(FleetManagerKind::RandomDestination)
        );
        assert_eq!(FleetManagerKind::from_name("NoSuchPolicy"), None);
    }
}
