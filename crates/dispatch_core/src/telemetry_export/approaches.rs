use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt64Array};
use arrow::datatypes::Schema;

use crate::telemetry::ScoreTelemetry;

use super::utils::{u64_field, write_record_batch};

/// One row per pickup approach, in scaled time units.
pub fn write_approach_records_parquet<P: AsRef<Path>>(
    path: P,
    score: &ScoreTelemetry,
) -> Result<(), Box<dyn Error>> {
    let mut assign_time = Vec::with_capacity(score.approach_records.len());
    let mut approach_time = Vec::with_capacity(score.approach_records.len());
    let mut expected_approach_time = Vec::with_capacity(score.approach_records.len());

    for record in &score.approach_records {
        assign_time.push(record.time);
        approach_time.push(record.interval);
        expected_approach_time.push(record.expected_interval);
    }

    let schema = Schema::new(vec![
        u64_field("assign_time"),
        u64_field("approach_time"),
        u64_field("expected_approach_time"),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(assign_time)),
        Arc::new(UInt64Array::from(approach_time)),
        Arc::new(UInt64Array::from(expected_approach_time)),
    ];

    write_record_batch(path, schema, arrays)
}
