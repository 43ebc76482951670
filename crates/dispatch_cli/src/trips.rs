//! Trip dataset loading: parse the TLC-schema CSV, crop to the bounding
//! polygon, and map-match the survivors onto the road network in parallel.

use std::path::Path;

use anyhow::Context;
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use dispatch_core::clock::TIME_RESOLUTION;
use dispatch_core::map::CityMap;
use dispatch_core::scenario::TripRecord;

use crate::kml::BoundingPolygon;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What happened to the rows of the dataset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TripLoadStats {
    pub kept: usize,
    pub outside_polygon: usize,
    pub degenerate: usize,
    pub unparseable: usize,
}

struct RawTrip {
    pickup_time: u64,
    dropoff_time: u64,
    pickup_lon: f64,
    pickup_lat: f64,
    dropoff_lon: f64,
    dropoff_lat: f64,
}

/// Load and map-match the dataset. Rows outside the polygon, with equal
/// endpoints, or that fail to parse are dropped and counted.
pub fn load_trips(
    path: &Path,
    polygon: &BoundingPolygon,
    time_zone_offset: i64,
    map: &CityMap,
) -> anyhow::Result<(Vec<TripRecord>, TripLoadStats)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("cannot open dataset {}", path.display()))?;

    let mut stats = TripLoadStats::default();
    let mut raw_trips = Vec::new();
    for record in reader.records() {
        let record = record.context("unreadable CSV record")?;
        let Some(raw) = parse_row(&record, time_zone_offset) else {
            stats.unparseable += 1;
            continue;
        };
        if !(polygon.contains(raw.pickup_lon, raw.pickup_lat)
            && polygon.contains(raw.dropoff_lon, raw.dropoff_lat))
        {
            stats.outside_polygon += 1;
            continue;
        }
        if raw.pickup_lon == raw.dropoff_lon && raw.pickup_lat == raw.dropoff_lat {
            stats.degenerate += 1;
            continue;
        }
        raw_trips.push(raw);
    }

    let bar = ProgressBar::new(raw_trips.len() as u64).with_style(
        ProgressStyle::with_template("map-matching trips {bar:40} {pos}/{len}")
            .expect("valid progress template"),
    );
    let records: Vec<TripRecord> = raw_trips
        .par_iter()
        .map(|raw| {
            let record = TripRecord {
                pickup: map.map_match(raw.pickup_lon, raw.pickup_lat),
                dropoff: map.map_match(raw.dropoff_lon, raw.dropoff_lat),
                pickup_time: raw.pickup_time,
                dropoff_time: raw.dropoff_time,
            };
            bar.inc(1);
            record
        })
        .collect();
    bar.finish_and_clear();

    stats.kept = records.len();
    Ok((records, stats))
}

/// TLC schema: pickup/dropoff datetime in columns 1 and 2, pickup lon/lat
/// in 5 and 6, dropoff lon/lat in 9 and 10.
fn parse_row(record: &csv::StringRecord, time_zone_offset: i64) -> Option<RawTrip> {
    let pickup_time = to_scaled_epoch(record.get(1)?, time_zone_offset)?;
    let dropoff_time = to_scaled_epoch(record.get(2)?, time_zone_offset)?;
    Some(RawTrip {
        pickup_time,
        dropoff_time,
        pickup_lon: record.get(5)?.trim().parse().ok()?,
        pickup_lat: record.get(6)?.trim().parse().ok()?,
        dropoff_lon: record.get(9)?.trim().parse().ok()?,
        dropoff_lat: record.get(10)?.trim().parse().ok()?,
    })
}

/// A naive timestamp in the map's fixed-offset clock, converted to Unix
/// seconds and then to scaled units.
fn to_scaled_epoch(text: &str, time_zone_offset: i64) -> Option<u64> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), DATETIME_FORMAT).ok()?;
    let unix = naive.and_utc().timestamp() - time_zone_offset;
    if unix < 0 {
        return None;
    }
    Some(unix as u64 * TIME_RESOLUTION)
}
