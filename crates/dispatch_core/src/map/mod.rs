//! The city map: a directed graph of intersections connected by roads, with
//! pre-computed all-pairs shortest travel times.
//!
//! A [CityMap] is built once by [CityMapBuilder] and immutable afterwards.
//! The fleet manager receives its own copy via [CityMap::fleet_copy], which
//! duplicates the graph arrays but shares the frozen path table (and the
//! k-d tree) by reference, so a policy can never mutate engine state.

mod build;
mod graph;
mod location;
mod paths;

use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::Resource;
use lru::LruCache;

pub use build::CityMapBuilder;
pub use graph::{Intersection, IntersectionId, Link, LinkId, Road, RoadId, Vertex, VertexId};
pub use location::LocationOnRoad;
pub use paths::{build_path_table, build_path_table_sequential, PathEntry, PathTable};

use crate::error::PathError;
use crate::geom::GeoProjector;
use crate::spatial::KdTree;

/// Map-match results cached per map (trip datasets repeat coordinates
/// heavily).
pub(crate) const MATCH_CACHE_SIZE: usize = 10_000;

/// The road network plus everything derived from it.
#[derive(Resource)]
pub struct CityMap {
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) links: Vec<Link>,
    pub(crate) roads: Vec<Road>,
    pub(crate) intersections: Vec<Intersection>,
    pub(crate) projector: GeoProjector,
    pub(crate) kd_tree: Arc<KdTree>,
    pub(crate) path_table: Arc<PathTable>,
    pub(crate) match_cache: Mutex<LruCache<(u64, u64), LocationOnRoad>>,
}

impl CityMap {
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.index()]
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }

    pub fn road(&self, id: RoadId) -> &Road {
        &self.roads[id.index()]
    }

    pub fn intersection(&self, id: IntersectionId) -> &Intersection {
        &self.intersections[id.index()]
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    pub fn num_intersections(&self) -> usize {
        self.intersections.len()
    }

    pub fn projector(&self) -> &GeoProjector {
        &self.projector
    }

    pub fn path_table(&self) -> &PathTable {
        &self.path_table
    }

    /// The shared handle to the frozen table; copies hold the same one.
    pub fn path_table_handle(&self) -> &Arc<PathTable> {
        &self.path_table
    }

    /// Shortest static travel time between two intersections, in scaled
    /// units as a float. `None` when unreachable.
    pub fn travel_time_between_intersections(
        &self,
        from: IntersectionId,
        to: IntersectionId,
    ) -> Option<f64> {
        self.path_table.entry(from, to).map(|e| e.travel_time)
    }

    /// Shortest static travel time between two on-road locations, rounded to
    /// scaled units. Assumes traversal at road speed limits; the dynamic
    /// travel time may differ. `None` when the destination is unreachable.
    pub fn travel_time_between(
        &self,
        source: &LocationOnRoad,
        destination: &LocationOnRoad,
    ) -> Option<u64> {
        let travel_time = if source.upstream_to(destination) {
            let road = self.road(source.road);
            source.displacement_to(destination) / road.speed
        } else {
            let source_road = self.road(source.road);
            let destination_road = self.road(destination.road);
            let time_to_end =
                (source_road.length - source.distance_from_start) / source_road.speed;
            let time_between =
                self.travel_time_between_intersections(source_road.to, destination_road.from)?;
            let time_from_start = destination.distance_from_start / destination_road.speed;
            time_to_end + time_between + time_from_start
        };
        Some(travel_time.round() as u64)
    }

    /// Reconstruct the shortest path between two intersections by following
    /// predecessor pointers back from the destination.
    pub fn shortest_travel_time_path(
        &self,
        source: IntersectionId,
        destination: IntersectionId,
    ) -> Result<Vec<IntersectionId>, PathError> {
        let mut path = vec![destination];
        let mut current = destination;
        while current != source {
            let entry = self
                .path_table
                .entry(source, current)
                .ok_or(PathError::NoPath {
                    from: source,
                    to: destination,
                })?;
            current = entry.predecessor;
            path.push(current);
        }
        path.reverse();
        Ok(path)
    }

    /// Deep copy handed to the fleet manager: fresh graph arrays, shared
    /// frozen path table and spatial index.
    pub fn fleet_copy(&self) -> CityMap {
        CityMap {
            vertices: self.vertices.clone(),
            links: self.links.clone(),
            roads: self.roads.clone(),
            intersections: self.intersections.clone(),
            projector: self.projector.clone(),
            kd_tree: Arc::clone(&self.kd_tree),
            path_table: Arc::clone(&self.path_table),
            match_cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(MATCH_CACHE_SIZE).expect("cache size must be non-zero"),
            )),
        }
    }

    /// Test-only mutation hook so isolation of [CityMap::fleet_copy] can be
    /// verified.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn remove_last_road_for_test(&mut self) {
        if let Some(road) = self.roads.pop() {
            self.intersections[road.from.index()]
                .roads_from
                .remove(&road.to);
            self.intersections[road.to.index()]
                .roads_to
                .remove(&road.from);
        }
    }
}
