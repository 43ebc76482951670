//! All-pairs shortest travel times over the road graph.
//!
//! One single-source Dijkstra per intersection, using static road travel
//! times as weights. Sources are independent, so the build fans out over a
//! rayon thread pool; the merged table is frozen afterwards and shared by
//! reference between the engine and fleet-manager map copies.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::map::{Intersection, IntersectionId, Road};

/// One cell of the path table: the shortest travel time from the row's
/// source, and the predecessor on that path for route reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Shortest static travel time in scaled units.
    pub travel_time: f64,
    pub predecessor: IntersectionId,
}

/// The frozen all-pairs table. `rows[i][j]` is `None` when `j` is not
/// reachable from `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathTable {
    rows: Vec<Vec<Option<PathEntry>>>,
}

impl PathTable {
    pub fn entry(&self, from: IntersectionId, to: IntersectionId) -> Option<PathEntry> {
        self.rows[from.index()][to.index()]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(feature = "precomputed")]
impl PathTable {
    /// Persist the table so later runs on the same map can skip the build.
    pub fn save(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        let file = std::fs::File::create(path)?;
        bincode::serialize_into(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let file = std::fs::File::open(path)?;
        Ok(bincode::deserialize_from(std::io::BufReader::new(file))?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    cost: f64,
    node: IntersectionId,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; equal costs settle on the smaller index.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outgoing adjacency in (neighbor, weight) form, sorted by neighbor index.
fn adjacency(intersections: &[Intersection], roads: &[Road]) -> Vec<Vec<(IntersectionId, f64)>> {
    intersections
        .iter()
        .map(|i| {
            i.roads_from
                .iter()
                .map(|(&to, &road)| (to, roads[road.index()].travel_time))
                .collect()
        })
        .collect()
}

fn single_source(
    source: IntersectionId,
    adjacency: &[Vec<(IntersectionId, f64)>],
) -> Vec<Option<PathEntry>> {
    let n = adjacency.len();
    let mut row: Vec<Option<PathEntry>> = vec![None; n];
    let mut dist = vec![f64::INFINITY; n];

    row[source.index()] = Some(PathEntry {
        travel_time: 0.0,
        predecessor: source,
    });
    dist[source.index()] = 0.0;

    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry {
        cost: 0.0,
        node: source,
    });

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if cost > dist[node.index()] {
            continue; // stale entry
        }
        for &(neighbor, weight) in &adjacency[node.index()] {
            let candidate = cost + weight;
            let current = dist[neighbor.index()];
            if candidate < current {
                dist[neighbor.index()] = candidate;
                row[neighbor.index()] = Some(PathEntry {
                    travel_time: candidate,
                    predecessor: node,
                });
                heap.push(HeapEntry {
                    cost: candidate,
                    node: neighbor,
                });
            } else if candidate == current {
                // Equal-cost alternative: keep the predecessor with the
                // smaller intersection index so reconstruction is
                // deterministic regardless of relaxation order.
                if let Some(entry) = row[neighbor.index()].as_mut() {
                    if node < entry.predecessor {
                        entry.predecessor = node;
                    }
                }
            }
        }
    }

    row
}

/// Build the all-pairs table, one Dijkstra per source, in parallel.
pub fn build_path_table(intersections: &[Intersection], roads: &[Road]) -> PathTable {
    let adjacency = adjacency(intersections, roads);
    let rows = (0..intersections.len())
        .into_par_iter()
        .map(|source| single_source(IntersectionId(source as u32), &adjacency))
        .collect();
    PathTable { rows }
}

/// Single-threaded build, for comparing against the parallel one.
pub fn build_path_table_sequential(intersections: &[Intersection], roads: &[Road]) -> PathTable {
    let adjacency = adjacency(intersections, roads);
    let rows = (0..intersections.len())
        .map(|source| single_source(IntersectionId(source as u32), &adjacency))
        .collect();
    PathTable { rows }
}
