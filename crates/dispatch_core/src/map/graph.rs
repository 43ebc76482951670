//! Road-graph building blocks: vertices, links, roads, intersections.
//!
//! Everything is stored in flat arrays owned by [crate::map::CityMap] and
//! addressed by dense index newtypes, so the graph has no owning-pointer
//! cycles and copies are plain `Vec` clones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PathError;
use crate::geom::Point2D;

macro_rules! index_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

index_id!(
    /// Dense index of a [Vertex] within its map.
    VertexId
);
index_id!(
    /// Dense index of a [Link] within its map.
    LinkId
);
index_id!(
    /// Dense index of a [Road] within its map.
    RoadId
);
index_id!(
    /// Dense index of an [Intersection]; doubles as the path-table index.
    IntersectionId
);

/// A node of the raw street geometry, corresponding to one "node" element of
/// the map input.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: VertexId,
    /// Identifier carried over from the map source, for diagnostics.
    pub source_id: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub xy: Point2D,
    /// Outgoing links keyed by the neighbor vertex.
    pub links_from: BTreeMap<VertexId, LinkId>,
    /// Incoming links keyed by the neighbor vertex.
    pub links_to: BTreeMap<VertexId, LinkId>,
}

/// A directed straight segment between two vertices.
#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub from: VertexId,
    pub to: VertexId,
    /// Length in meters.
    pub length: f64,
    /// Speed limit in meters per scaled time unit.
    pub speed: f64,
    /// Static traversal time in scaled units (`length / speed`).
    pub travel_time: f64,
    /// Cumulative travel time of the preceding links on the owning road.
    pub begin_time: f64,
    /// Owning road; set during road assembly.
    pub road: Option<RoadId>,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Link {
    /// The owning road. Every link belongs to exactly one road once the map
    /// is built; the builder rejects orphans.
    pub fn road_id(&self) -> RoadId {
        self.road.expect("link not attached to a road")
    }
}

/// A directed chain of one or more links between two intersections.
#[derive(Debug, Clone)]
pub struct Road {
    pub id: RoadId,
    pub from: IntersectionId,
    pub to: IntersectionId,
    /// Links in traversal order.
    pub links: Vec<LinkId>,
    /// Total length in meters (sum of link lengths).
    pub length: f64,
    /// Total static travel time in scaled units (sum of link times).
    pub travel_time: f64,
    /// Average speed in meters per scaled unit (`length / travel_time`).
    pub speed: f64,
}

/// A street junction: the graph node the dispatch logic works with.
#[derive(Debug, Clone)]
pub struct Intersection {
    /// Dense index, assigned once at build time; also indexes the path table.
    pub id: IntersectionId,
    pub vertex: VertexId,
    pub latitude: f64,
    pub longitude: f64,
    pub xy: Point2D,
    /// Outgoing roads keyed by the neighbor intersection.
    pub roads_from: BTreeMap<IntersectionId, RoadId>,
    /// Incoming roads keyed by the neighbor intersection.
    pub roads_to: BTreeMap<IntersectionId, RoadId>,
}

impl Intersection {
    /// True if a road exists between the two intersections in either
    /// direction.
    pub fn is_adjacent(&self, other: IntersectionId) -> bool {
        self.roads_from.contains_key(&other) || self.roads_to.contains_key(&other)
    }

    /// The outgoing road to `other`.
    pub fn road_to(&self, other: IntersectionId) -> Result<RoadId, PathError> {
        self.roads_from
            .get(&other)
            .copied()
            .ok_or(PathError::NoSuchNeighbor {
                from: self.id,
                to: other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intersection(id: u32) -> Intersection {
        Intersection {
            id: IntersectionId(id),
            vertex: VertexId(id),
            latitude: 0.0,
            longitude: 0.0,
            xy: Point2D::new(0.0, 0.0),
            roads_from: BTreeMap::new(),
            roads_to: BTreeMap::new(),
        }
    }

    #[test]
    fn adjacency_covers_both_directions() {
        let mut a = intersection(0);
        a.roads_from.insert(IntersectionId(1), RoadId(0));
        a.roads_to.insert(IntersectionId(2), RoadId(1));

        assert!(a.is_adjacent(IntersectionId(1)));
        assert!(a.is_adjacent(IntersectionId(2)));
        assert!(!a.is_adjacent(IntersectionId(3)));
    }

    #[test]
    fn road_to_requires_outgoing_road() {
        let mut a = intersection(0);
        a.roads_to.insert(IntersectionId(2), RoadId(1));

        assert!(matches!(
            a.road_to(IntersectionId(2)),
            Err(PathError::NoSuchNeighbor { .. })
        ));
    }
}
