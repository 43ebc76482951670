//! Error types for map construction and path queries.
//!
//! Build-time problems are recoverable `Result`s so the harness can report
//! them and exit. Run-time contract violations (a policy returning a
//! non-adjacent intersection, time going backwards) are not represented
//! here: the engine treats those as fatal and panics with a diagnostic.

use thiserror::Error;

use crate::map::{IntersectionId, LinkId, RoadId, VertexId};

/// Faults detected while assembling a [crate::map::CityMap].
#[derive(Debug, Error)]
pub enum MapBuildError {
    #[error("link {0:?} has speed limit <= 0")]
    ZeroSpeedLink(LinkId),

    #[error("link references unknown vertex {0:?}")]
    UnknownVertex(VertexId),

    #[error("road {0:?} has no links")]
    EmptyRoad(RoadId),

    #[error("road {road:?} is not a chain: link {link:?} does not start where the previous link ends")]
    BrokenChain { road: RoadId, link: LinkId },

    #[error("link {0:?} is not part of any road")]
    OrphanLink(LinkId),

    #[error("map has no roads")]
    EmptyMap,
}

/// Faults raised by shortest-path and adjacency queries.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("no path from intersection {from:?} to {to:?}")]
    NoPath {
        from: IntersectionId,
        to: IntersectionId,
    },

    #[error("no road from intersection {from:?} to {to:?}")]
    NoSuchNeighbor {
        from: IntersectionId,
        to: IntersectionId,
    },
}
