//! Harness around the dispatch simulation engine: configuration, data
//! loading, and reporting.
//!
//! The binary wires these together: read the properties file, build the map
//! from the prepared-graph JSON, crop and map-match the trip dataset, run
//! the simulation, and print the performance report.

pub mod config;
pub mod kml;
pub mod map_loader;
pub mod report;
pub mod trips;
