//! Map matching: snap raw lat/lon coordinates to a location on a road.
//!
//! Pipeline: project the coordinate, find the nearest link in the k-d tree,
//! snap onto that segment, then express the snapped point as a distance from
//! the owning road's start. Trip datasets repeat coordinates heavily, so
//! results are memoized in a per-map LRU keyed by the raw coordinate bits.

use crate::map::{CityMap, LinkId, LocationOnRoad};

impl CityMap {
    /// The link closest to the given geographic coordinate.
    pub fn nearest_link(&self, longitude: f64, latitude: f64) -> LinkId {
        let p = self.projector.from_lat_lon(latitude, longitude);
        self.kd_tree
            .nearest(p)
            .expect("map has at least one link after build")
    }

    /// Snap a raw lat/lon coordinate to the nearest on-road location.
    pub fn map_match(&self, longitude: f64, latitude: f64) -> LocationOnRoad {
        let key = (longitude.to_bits(), latitude.to_bits());
        let mut cache = self.match_cache.lock().unwrap();
        *cache.get_or_insert(key, || self.map_match_uncached(longitude, latitude))
    }

    fn map_match_uncached(&self, longitude: f64, latitude: f64) -> LocationOnRoad {
        let link = self.link(self.nearest_link(longitude, latitude));
        let p = self.projector.from_lat_lon(latitude, longitude);
        let (snapped, _) = crate::geom::snap_to_segment(
            self.vertex(link.from).xy,
            self.vertex(link.to).xy,
            p,
        );

        // Distance from the road start: the full length of every link before
        // the matched one, plus the matched link measured from its end
        // inward (links are appended end-first during road assembly).
        let road = self.road(link.road_id());
        let mut distance_from_start = 0.0;
        for &link_id in &road.links {
            if link_id == link.id {
                distance_from_start += snapped.distance(self.vertex(link.to).xy);
                break;
            }
            distance_from_start += self.link(link_id).length;
        }

        LocationOnRoad {
            road: road.id,
            distance_from_start: distance_from_start.clamp(0.0, road.length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{grid_map, single_road_map};

    #[test]
    fn matches_onto_the_only_road() {
        let map = single_road_map(1000.0, 10.0);
        let road = &map.roads()[0];
        let from = map.intersection(road.from);
        let to = map.intersection(road.to);

        // The distance is accumulated up to the matched link's end vertex: a
        // point snapping next to that vertex contributes nearly zero, one
        // snapping at the link's far side contributes the full link length.
        let near_end_vertex = map.map_match(to.longitude, to.latitude + 0.00001);
        assert_eq!(near_end_vertex.road, road.id);
        assert!(near_end_vertex.distance_from_start < 2.0);

        let near_from_vertex = map.map_match(from.longitude, from.latitude + 0.00001);
        assert!((near_from_vertex.distance_from_start - road.length).abs() < 2.0);
    }

    #[test]
    fn result_is_clamped_to_the_road() {
        let map = grid_map(3, 3, 100.0, 10.0);
        for vertex in map.vertices() {
            let loc = map.map_match(vertex.longitude + 0.002, vertex.latitude - 0.002);
            let road = map.road(loc.road);
            assert!(loc.distance_from_start >= 0.0);
            assert!(loc.distance_from_start <= road.length);
        }
    }

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let map = grid_map(2, 2, 100.0, 10.0);
        let a = map.map_match(-73.99, 40.01);
        let b = map.map_match(-73.99, 40.01);
        assert_eq!(a, b);
    }
}
