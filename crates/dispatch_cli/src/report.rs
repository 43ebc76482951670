//! The end-of-run performance report, printed to stdout.

use dispatch_core::clock::to_seconds;
use dispatch_core::telemetry::{check_intervals, IntervalCheckRecord, ScoreSummary, ScoreTelemetry};
use dispatch_core::traffic::TrafficPattern;

use crate::config::RunConfig;

/// Interval ratios further than this from the reference factor are flagged.
const INTERVAL_CHECK_THRESHOLD: f64 = 0.06;
/// How many flagged records are printed per series.
const INTERVAL_CHECK_PRINT_LIMIT: usize = 10;

/// Run identification echoed at the top of the report.
pub struct ReportEnvironment<'a> {
    pub config: &'a RunConfig,
    pub seed: u64,
    pub simulation_start_time: u64,
    pub simulation_end_time: u64,
    pub final_simulation_time: u64,
}

pub fn print_report(
    environment: &ReportEnvironment<'_>,
    summary: Option<&ScoreSummary>,
    score: &ScoreTelemetry,
    pattern: &TrafficPattern,
) {
    let config = environment.config;
    println!("\n***Simulation environment***");
    println!("JSON map file: {}", config.map_json_file.display());
    println!("Resource dataset file: {}", config.dataset_file.display());
    println!(
        "Bounding polygon KML file: {}",
        config.bounding_polygon_kml_file.display()
    );
    println!("Number of agents: {}", config.number_of_agents);
    println!(
        "Resource maximum life time: {} seconds",
        config.resource_maximum_life_time
    );
    println!("Fleet manager class: {}", config.agent_class);
    println!("Agent placement seed: {}", environment.seed);
    println!(
        "Simulation start time: {:.0} s",
        to_seconds(environment.simulation_start_time)
    );
    println!(
        "Simulation end time: {:.0} s",
        to_seconds(environment.simulation_end_time)
    );
    println!(
        "Final simulation time: {:.0} s",
        to_seconds(environment.final_simulation_time)
    );

    println!("\n***Statistics***");
    match summary {
        None => println!("No requests."),
        Some(summary) => {
            println!("total number of requests: {}", summary.total_requests);
            println!(
                "average agent search time: {:.0} seconds",
                summary.avg_search_time_secs
            );
            println!(
                "average request wait time: {:.0} seconds",
                summary.avg_wait_time_secs
            );
            println!(
                "request expiration percentage: {}%",
                summary.expiration_percentage
            );
            println!(
                "average agent cruise time: {:.0} seconds",
                summary.avg_cruise_time_secs
            );
            println!(
                "average agent approach time: {:.0} seconds",
                summary.avg_approach_time_secs
            );
            println!(
                "average request trip time: {:.0} seconds",
                summary.avg_trip_time_secs
            );
            println!("total number of assignments: {}", summary.total_assignments);
            println!("total number of abortions: {}", summary.total_abortions);
            println!("total number of searches: {}", summary.total_searches);
        }
    }

    println!("\n********** Completed trip time checks");
    print_interval_checks(&score.completed_trips, pattern);
    println!("\n********** Approach time checks");
    print_interval_checks(&score.approach_records, pattern);
}

fn print_interval_checks(records: &[IntervalCheckRecord], pattern: &TrafficPattern) {
    let summary = check_intervals(
        records,
        pattern,
        INTERVAL_CHECK_THRESHOLD,
        INTERVAL_CHECK_PRINT_LIMIT,
    );
    println!("time, simulated_ratio, expected_ratio, difference");
    for (time, ratio, reference, diff) in &summary.outliers {
        println!("{time}, {ratio:.4}, {reference:.4}, {diff:.4}");
    }
    println!(
        "Threshold = {INTERVAL_CHECK_THRESHOLD}; Count = {}",
        summary.above_threshold
    );
    match summary.rms {
        Some(rms) => println!("Ratios RMS = {rms:.4}; Count = {}", summary.count),
        None => println!("Ratios RMS = N/A; Count = 0"),
    }
}
