//! Map assembly: vertices, links, and roads in; a frozen [CityMap] out.
//!
//! The loader (or a test fixture) feeds raw records into [CityMapBuilder];
//! `build` derives intersections from road endpoints, populates the k-d
//! tree, and runs the parallel all-pairs build. The resulting map is
//! immutable.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::clock::to_scaled_speed;
use crate::error::MapBuildError;
use crate::geom::GeoProjector;
use crate::map::paths::build_path_table;
use crate::map::{
    CityMap, Intersection, IntersectionId, Link, LinkId, Road, RoadId, Vertex, VertexId,
    MATCH_CACHE_SIZE,
};
use crate::spatial::KdTree;

struct StagedRoad {
    links: Vec<LinkId>,
    from_vertex: VertexId,
    to_vertex: VertexId,
    length: f64,
    travel_time: f64,
}

/// Incremental [CityMap] construction.
pub struct CityMapBuilder {
    projector: Option<GeoProjector>,
    vertices: Vec<Vertex>,
    source_ids: HashMap<u64, VertexId>,
    links: Vec<Link>,
    roads: Vec<StagedRoad>,
}

impl Default for CityMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CityMapBuilder {
    pub fn new() -> Self {
        Self {
            projector: None,
            vertices: Vec::new(),
            source_ids: HashMap::new(),
            links: Vec::new(),
            roads: Vec::new(),
        }
    }

    /// Add a vertex. The first vertex becomes the projection reference point.
    /// Re-adding a known `source_id` returns the existing vertex.
    pub fn add_vertex(&mut self, source_id: u64, latitude: f64, longitude: f64) -> VertexId {
        if let Some(&id) = self.source_ids.get(&source_id) {
            return id;
        }
        let projector = self
            .projector
            .get_or_insert_with(|| GeoProjector::new(latitude, longitude));
        let id = VertexId(self.vertices.len() as u32);
        self.vertices.push(Vertex {
            id,
            source_id,
            latitude,
            longitude,
            xy: projector.from_lat_lon(latitude, longitude),
            links_from: Default::default(),
            links_to: Default::default(),
        });
        self.source_ids.insert(source_id, id);
        id
    }

    /// Add a directed link. `length` is in meters, `speed_limit` in meters
    /// per second; a non-positive speed is a build fault.
    pub fn add_link(
        &mut self,
        from: VertexId,
        to: VertexId,
        length: f64,
        speed_limit: f64,
    ) -> Result<LinkId, MapBuildError> {
        let id = LinkId(self.links.len() as u32);
        if speed_limit <= 0.0 {
            return Err(MapBuildError::ZeroSpeedLink(id));
        }
        let (from_xy, to_xy) = {
            let from = self
                .vertices
                .get(from.index())
                .ok_or(MapBuildError::UnknownVertex(from))?;
            let to = self
                .vertices
                .get(to.index())
                .ok_or(MapBuildError::UnknownVertex(to))?;
            (from.xy, to.xy)
        };

        let speed = to_scaled_speed(speed_limit);
        self.links.push(Link {
            id,
            from,
            to,
            length,
            speed,
            travel_time: length / speed,
            begin_time: 0.0,
            road: None,
            min_x: from_xy.x.min(to_xy.x),
            min_y: from_xy.y.min(to_xy.y),
            max_x: from_xy.x.max(to_xy.x),
            max_y: from_xy.y.max(to_xy.y),
        });
        self.vertices[from.index()].links_from.insert(to, id);
        self.vertices[to.index()].links_to.insert(from, id);
        Ok(id)
    }

    /// Assemble an ordered chain of links into a road. Each link records the
    /// cumulative travel time of its predecessors as its `begin_time`.
    pub fn add_road(&mut self, link_ids: Vec<LinkId>) -> Result<RoadId, MapBuildError> {
        let road_id = RoadId(self.roads.len() as u32);
        let first = *link_ids.first().ok_or(MapBuildError::EmptyRoad(road_id))?;

        let mut length = 0.0;
        let mut travel_time = 0.0;
        let mut previous_end = self.links[first.index()].from;
        for &link_id in &link_ids {
            let link = &mut self.links[link_id.index()];
            if link.from != previous_end {
                return Err(MapBuildError::BrokenChain {
                    road: road_id,
                    link: link_id,
                });
            }
            link.road = Some(road_id);
            link.begin_time = travel_time;
            length += link.length;
            travel_time += link.travel_time;
            previous_end = link.to;
        }

        self.roads.push(StagedRoad {
            from_vertex: self.links[first.index()].from,
            to_vertex: previous_end,
            links: link_ids,
            length,
            travel_time,
        });
        Ok(road_id)
    }

    /// Derive intersections, index the links, pre-compute all-pairs travel
    /// times, and freeze the map.
    pub fn build(self) -> Result<CityMap, MapBuildError> {
        let CityMapBuilder {
            projector,
            vertices,
            links,
            roads: staged,
            ..
        } = self;

        if staged.is_empty() {
            return Err(MapBuildError::EmptyMap);
        }
        for link in &links {
            if link.road.is_none() {
                return Err(MapBuildError::OrphanLink(link.id));
            }
        }

        // Road endpoints become intersections, indexed densely in vertex
        // order so the assignment is stable across runs.
        let endpoint_vertices: BTreeSet<VertexId> = staged
            .iter()
            .flat_map(|r| [r.from_vertex, r.to_vertex])
            .collect();
        let mut intersection_of: HashMap<VertexId, IntersectionId> = HashMap::new();
        let mut intersections: Vec<Intersection> = Vec::with_capacity(endpoint_vertices.len());
        for (index, vertex_id) in endpoint_vertices.into_iter().enumerate() {
            let vertex = &vertices[vertex_id.index()];
            let id = IntersectionId(index as u32);
            intersection_of.insert(vertex_id, id);
            intersections.push(Intersection {
                id,
                vertex: vertex_id,
                latitude: vertex.latitude,
                longitude: vertex.longitude,
                xy: vertex.xy,
                roads_from: Default::default(),
                roads_to: Default::default(),
            });
        }

        let mut roads: Vec<Road> = Vec::with_capacity(staged.len());
        for (index, road) in staged.into_iter().enumerate() {
            let id = RoadId(index as u32);
            let from = intersection_of[&road.from_vertex];
            let to = intersection_of[&road.to_vertex];
            intersections[from.index()].roads_from.insert(to, id);
            intersections[to.index()].roads_to.insert(from, id);
            roads.push(Road {
                id,
                from,
                to,
                links: road.links,
                length: road.length,
                travel_time: road.travel_time,
                speed: road.length / road.travel_time,
            });
        }

        let mut kd_tree = KdTree::new();
        for link in &links {
            kd_tree.insert(
                link.id,
                vertices[link.from.index()].xy,
                vertices[link.to.index()].xy,
            );
        }

        let path_table = build_path_table(&intersections, &roads);

        Ok(CityMap {
            vertices,
            links,
            roads,
            intersections,
            projector: projector.expect("roads imply vertices"),
            kd_tree: Arc::new(kd_tree),
            path_table: Arc::new(path_table),
            match_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(MATCH_CACHE_SIZE).expect("cache size must be non-zero"),
            )),
        })
    }
}
