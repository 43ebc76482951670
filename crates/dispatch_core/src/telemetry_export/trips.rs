use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt64Array};
use arrow::datatypes::Schema;

use crate::telemetry::ScoreTelemetry;

use super::utils::{u64_field, write_record_batch};

/// One row per completed trip, in scaled time units.
pub fn write_completed_trips_parquet<P: AsRef<Path>>(
    path: P,
    score: &ScoreTelemetry,
) -> Result<(), Box<dyn Error>> {
    let mut pickup_time = Vec::with_capacity(score.completed_trips.len());
    let mut trip_time = Vec::with_capacity(score.completed_trips.len());
    let mut expected_trip_time = Vec::with_capacity(score.completed_trips.len());

    for record in &score.completed_trips {
        pickup_time.push(record.time);
        trip_time.push(record.interval);
        expected_trip_time.push(record.expected_interval);
    }

    let schema = Schema::new(vec![
        u64_field("pickup_time"),
        u64_field("trip_time"),
        u64_field("expected_trip_time"),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(pickup_time)),
        Arc::new(UInt64Array::from(trip_time)),
        Arc::new(UInt64Array::from(expected_trip_time)),
    ];

    write_record_batch(path, schema, arrays)
}
