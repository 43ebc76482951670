//! Parquet export: write the score's per-trip record series for analysis.
//!
//! Two tables, one per interval series:
//!
//! - Completed trips (pickup time, measured and expected trip time)
//! - Approaches (assignment time, measured and expected approach time)
//!
//! Arrow/Parquet keeps the files compatible with the usual analysis stack
//! (Pandas, Polars, DuckDB).

mod approaches;
mod trips;
mod utils;

pub use approaches::write_approach_records_parquet;
pub use trips::write_completed_trips_parquet;
