//! Prepared-graph loader: a JSON document of vertices, links, and roads
//! feeds the core map builder, which derives intersections and pre-computes
//! the travel-time table.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use dispatch_core::map::{CityMap, CityMapBuilder};

#[derive(Debug, Deserialize)]
struct RawMap {
    vertices: Vec<RawVertex>,
    links: Vec<RawLink>,
    /// Ordered link-id chains, one per road.
    roads: Vec<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
struct RawVertex {
    id: u64,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    id: u64,
    from: u64,
    to: u64,
    /// Meters.
    length: f64,
    /// Meters per second.
    speed: f64,
}

pub fn load_map(path: &Path) -> anyhow::Result<CityMap> {
    let file =
        File::open(path).with_context(|| format!("cannot open map file {}", path.display()))?;
    let raw: RawMap = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("malformed map JSON in {}", path.display()))?;
    build(raw)
}

fn build(raw: RawMap) -> anyhow::Result<CityMap> {
    let mut builder = CityMapBuilder::new();

    let mut vertices = HashMap::new();
    for vertex in &raw.vertices {
        vertices.insert(vertex.id, builder.add_vertex(vertex.id, vertex.lat, vertex.lon));
    }

    let mut links = HashMap::new();
    for link in &raw.links {
        let Some(&from) = vertices.get(&link.from) else {
            bail!("link {} references unknown vertex {}", link.id, link.from);
        };
        let Some(&to) = vertices.get(&link.to) else {
            bail!("link {} references unknown vertex {}", link.id, link.to);
        };
        let id = builder
            .add_link(from, to, link.length, link.speed)
            .with_context(|| format!("link {} is invalid", link.id))?;
        links.insert(link.id, id);
    }

    for (index, chain) in raw.roads.iter().enumerate() {
        let mut road_links = Vec::with_capacity(chain.len());
        for link_id in chain {
            let Some(&id) = links.get(link_id) else {
                bail!("road {index} references unknown link {link_id}");
            };
            road_links.push(id);
        }
        builder
            .add_road(road_links)
            .with_context(|| format!("road {index} is invalid"))?;
    }

    builder.build().context("map build failed")
}
