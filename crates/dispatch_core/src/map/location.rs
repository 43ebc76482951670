//! A point on a road, expressed as distance from the start intersection.

use serde::{Deserialize, Serialize};

use crate::map::{Road, RoadId};

/// Immutable position on a road. The distance is measured from the road's
/// start intersection and always lies in `[0, road.length]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationOnRoad {
    pub road: RoadId,
    pub distance_from_start: f64,
}

impl LocationOnRoad {
    pub fn new(road: &Road, distance_from_start: f64) -> Self {
        assert!(
            (0.0..=road.length).contains(&distance_from_start),
            "distance {distance_from_start} outside road {:?} of length {}",
            road.id,
            road.length
        );
        Self {
            road: road.id,
            distance_from_start,
        }
    }

    pub fn at_start(road: &Road) -> Self {
        Self {
            road: road.id,
            distance_from_start: 0.0,
        }
    }

    pub fn at_end(road: &Road) -> Self {
        Self {
            road: road.id,
            distance_from_start: road.length,
        }
    }

    /// True if `destination` lies on the same road at or beyond this
    /// location.
    pub fn upstream_to(&self, destination: &LocationOnRoad) -> bool {
        self.road == destination.road
            && destination.distance_from_start >= self.distance_from_start
    }

    /// Signed distance to `destination`, which must be on the same road.
    pub fn displacement_to(&self, destination: &LocationOnRoad) -> f64 {
        assert_eq!(
            self.road, destination.road,
            "displacement requires locations on the same road"
        );
        destination.distance_from_start - self.distance_from_start
    }

    /// Static travel time in scaled units from the start intersection to this
    /// location, at the road's average speed.
    pub fn static_travel_time_on_road(&self, road: &Road) -> u64 {
        (self.distance_from_start / road.speed).round() as u64
    }

    pub fn at_end_intersection(&self, road: &Road) -> bool {
        self.distance_from_start == road.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{IntersectionId, RoadId};

    fn road(length: f64) -> Road {
        Road {
            id: RoadId(0),
            from: IntersectionId(0),
            to: IntersectionId(1),
            links: Vec::new(),
            length,
            travel_time: length, // speed 1.0 for the test
            speed: 1.0,
        }
    }

    #[test]
    fn upstream_only_on_same_road_and_forward() {
        let r = road(100.0);
        let near = LocationOnRoad::new(&r, 10.0);
        let far = LocationOnRoad::new(&r, 90.0);
        assert!(near.upstream_to(&far));
        assert!(!far.upstream_to(&near));

        let elsewhere = LocationOnRoad {
            road: RoadId(1),
            distance_from_start: 95.0,
        };
        assert!(!near.upstream_to(&elsewhere));
    }

    #[test]
    fn endpoints() {
        let r = road(100.0);
        assert_eq!(LocationOnRoad::at_start(&r).distance_from_start, 0.0);
        assert!(LocationOnRoad::at_end(&r).at_end_intersection(&r));
        assert!(!LocationOnRoad::at_start(&r).at_end_intersection(&r));
    }

    #[test]
    #[should_panic(expected = "outside road")]
    fn rejects_out_of_range_distance() {
        let r = road(100.0);
        LocationOnRoad::new(&r, 100.5);
    }
}
