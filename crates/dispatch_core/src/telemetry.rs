//! Score accumulation: times, counters, and per-trip interval records.
//!
//! The engine reports pickups, dropoffs, expirations, and abortions here;
//! at the end of a run the accumulated totals become a [ScoreSummary] and
//! the two interval series are checked against the traffic pattern for
//! consistency.

use bevy_ecs::prelude::{Entity, Resource, World};

use crate::clock::{to_seconds, EventKind};
use crate::ecs::{Agent, FleetState};
use crate::scenario::SimulationEndTime;
use crate::traffic::TrafficPattern;

/// One measured interval (a completed trip, or an approach) together with
/// the statically expected one, for post-hoc consistency checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalCheckRecord {
    pub time: u64,
    pub interval: u64,
    pub expected_interval: u64,
}

/// Running totals for one simulation run. All times are in scaled units.
#[derive(Debug, Resource)]
pub struct ScoreTelemetry {
    request_maximum_life_time: u64,

    pub total_trip_time: u64,
    pub total_wait_time: u64,
    pub total_search_time: u64,
    pub total_cruise_time: u64,
    pub total_approach_time: u64,

    pub expired_requests: u64,
    pub total_requests: u64,
    pub total_assignments: u64,
    pub total_searches: u64,
    pub total_abortions: u64,

    pub completed_trips: Vec<IntervalCheckRecord>,
    pub approach_records: Vec<IntervalCheckRecord>,
}

impl ScoreTelemetry {
    pub fn new(request_maximum_life_time: u64) -> Self {
        Self {
            request_maximum_life_time,
            total_trip_time: 0,
            total_wait_time: 0,
            total_search_time: 0,
            total_cruise_time: 0,
            total_approach_time: 0,
            expired_requests: 0,
            total_requests: 0,
            total_assignments: 0,
            total_searches: 0,
            total_abortions: 0,
            completed_trips: Vec::new(),
            approach_records: Vec::new(),
        }
    }

    /// An agent reached its pickup: close out the search and approach
    /// intervals that ended here.
    pub fn record_approach_time(
        &mut self,
        now: u64,
        start_search_time: u64,
        assign_time: u64,
        available_time: u64,
        static_approach_time: u64,
    ) {
        self.total_search_time += now - start_search_time;
        self.total_searches += 1;
        self.total_wait_time += now - available_time;
        self.total_cruise_time += assign_time - start_search_time;

        let approach_time = now - assign_time;
        self.total_approach_time += approach_time;
        self.approach_records.push(IntervalCheckRecord {
            time: assign_time,
            interval: approach_time,
            expected_interval: static_approach_time,
        });
    }

    pub fn record_completed_trip(
        &mut self,
        dropoff_time: u64,
        pickup_time: u64,
        static_trip_time: u64,
    ) {
        let trip_time = dropoff_time - pickup_time;
        self.total_trip_time += trip_time;
        self.total_assignments += 1;
        self.completed_trips.push(IntervalCheckRecord {
            time: pickup_time,
            interval: trip_time,
            expected_interval: static_trip_time,
        });
    }

    /// An unserved request timed out; it waited out its whole life.
    pub fn record_expiration(&mut self) {
        self.expired_requests += 1;
        self.total_wait_time += self.request_maximum_life_time;
    }

    pub fn record_abortion(&mut self) {
        self.total_abortions += 1;
    }

    /// Fold in the tail time of agents still searching at the end of the
    /// run and compute the averages. `None` when the run saw no requests.
    pub fn summarize(&self, tail_search_time: u64, empty_agents: u64) -> Option<ScoreSummary> {
        if self.total_requests == 0 {
            return None;
        }
        let searchers = self.total_assignments + empty_agents;
        let div = |total: u64, by: u64| {
            if by == 0 {
                0.0
            } else {
                to_seconds(total) / by as f64
            }
        };
        Some(ScoreSummary {
            total_requests: self.total_requests,
            expired_requests: self.expired_requests,
            total_assignments: self.total_assignments,
            total_abortions: self.total_abortions,
            total_searches: self.total_searches,
            expiration_percentage: self.expired_requests * 100 / self.total_requests,
            avg_search_time_secs: div(self.total_search_time + tail_search_time, searchers),
            avg_wait_time_secs: div(self.total_wait_time, self.total_requests),
            avg_cruise_time_secs: div(self.total_cruise_time, self.total_assignments),
            avg_approach_time_secs: div(self.total_approach_time, self.total_assignments),
            avg_trip_time_secs: div(self.total_trip_time, self.total_assignments),
        })
    }
}

/// The end-of-run report data.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScoreSummary {
    pub total_requests: u64,
    pub expired_requests: u64,
    pub total_assignments: u64,
    pub total_abortions: u64,
    pub total_searches: u64,
    pub expiration_percentage: u64,
    pub avg_search_time_secs: f64,
    pub avg_wait_time_secs: f64,
    pub avg_cruise_time_secs: f64,
    pub avg_approach_time_secs: f64,
    pub avg_trip_time_secs: f64,
}

/// Result of checking one interval series against the traffic pattern.
#[derive(Debug, Clone)]
pub struct IntervalCheckSummary {
    /// Root-mean-square of the expected/measured ratios.
    pub rms: Option<f64>,
    pub count: usize,
    pub above_threshold: usize,
    /// Up to `outlier_limit` records whose ratio deviates from the
    /// reference factor: `(time, ratio, reference, difference)`.
    pub outliers: Vec<(u64, f64, f64, f64)>,
}

/// Compare each record's `expected / measured` ratio against the speed
/// factor in effect at its time. A matching simulation keeps the two close.
pub fn check_intervals(
    records: &[IntervalCheckRecord],
    pattern: &TrafficPattern,
    threshold: f64,
    outlier_limit: usize,
) -> IntervalCheckSummary {
    let mut l2 = 0.0;
    let mut above_threshold = 0;
    let mut outliers = Vec::new();

    for record in records {
        let ratio = if record.interval == 0 && record.expected_interval == 0 {
            // A zero-length match; treat the limit of 0/0 as the reference
            // factor itself.
            pattern.speed_factor(record.time)
        } else {
            record.expected_interval as f64 / record.interval as f64
        };
        let reference = pattern.speed_factor(record.time);
        let diff = ratio - reference;
        if diff.abs() > threshold || diff.is_nan() {
            above_threshold += 1;
            if outliers.len() < outlier_limit {
                outliers.push((record.time, ratio, reference, diff));
            }
        }
        l2 += ratio * ratio;
    }

    IntervalCheckSummary {
        rms: if records.is_empty() {
            None
        } else {
            Some((l2 / records.len() as f64).sqrt())
        },
        count: records.len(),
        above_threshold,
        outliers,
    }
}

/// Close out the score at the end of a run: agents still empty spent the
/// tail of the day searching.
pub fn finalize_score(world: &mut World) -> Option<ScoreSummary> {
    let end_time = world.resource::<SimulationEndTime>().0;
    let empty: Vec<Entity> = world.resource::<FleetState>().empty.iter().copied().collect();

    let mut tail_search_time = 0;
    for entity in &empty {
        if let Some(agent) = world.get::<Agent>(*entity) {
            tail_search_time += end_time.saturating_sub(agent.start_search_time);
        }
    }

    world
        .resource::<ScoreTelemetry>()
        .summarize(tail_search_time, empty.len() as u64)
}

/// Per-kind event counts, maintained by the runner when present.
#[derive(Debug, Default, Resource)]
pub struct EventMetrics {
    counts: [u64; 6],
}

impl EventMetrics {
    fn slot(kind: EventKind) -> usize {
        match kind {
            EventKind::AgentIntroduced => 0,
            EventKind::IntersectionReached => 1,
            EventKind::PickupArrival => 2,
            EventKind::DropoffArrival => 3,
            EventKind::RequestAvailable => 4,
            EventKind::RequestExpired => 5,
        }
    }

    pub fn record_event(&mut self, kind: EventKind) {
        self.counts[Self::slot(kind)] += 1;
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts[Self::slot(kind)]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TIME_RESOLUTION;

    const SEC: u64 = TIME_RESOLUTION;

    #[test]
    fn approach_time_splits_into_cruise_and_approach() {
        let mut score = ScoreTelemetry::new(600 * SEC);
        // Search began at 0, assignment at 30 s, pickup at 50 s; the request
        // appeared at 10 s.
        score.record_approach_time(50 * SEC, 0, 30 * SEC, 10 * SEC, 15 * SEC);

        assert_eq!(score.total_search_time, 50 * SEC);
        assert_eq!(score.total_cruise_time, 30 * SEC);
        assert_eq!(score.total_approach_time, 20 * SEC);
        assert_eq!(score.total_wait_time, 40 * SEC);
        assert_eq!(score.total_searches, 1);
        assert_eq!(score.approach_records.len(), 1);
    }

    #[test]
    fn expiration_counts_full_life_as_wait() {
        let mut score = ScoreTelemetry::new(600 * SEC);
        score.total_requests = 1;
        score.record_expiration();
        assert_eq!(score.expired_requests, 1);
        assert_eq!(score.total_wait_time, 600 * SEC);
    }

    #[test]
    fn summary_averages() {
        let mut score = ScoreTelemetry::new(600 * SEC);
        score.total_requests = 2;
        score.record_completed_trip(300 * SEC, 100 * SEC, 180 * SEC);
        score.record_expiration();

        let summary = score.summarize(0, 0).unwrap();
        assert_eq!(summary.total_assignments, 1);
        assert_eq!(summary.expiration_percentage, 50);
        assert_eq!(summary.avg_trip_time_secs, 200.0);
    }

    #[test]
    fn no_requests_means_no_summary() {
        let score = ScoreTelemetry::new(600 * SEC);
        assert!(score.summarize(0, 0).is_none());
    }

    #[test]
    fn interval_check_flags_deviating_ratios() {
        let pattern = TrafficPattern::constant(1.0);
        let records = vec![
            // Matches the factor exactly.
            IntervalCheckRecord {
                time: 0,
                interval: 100,
                expected_interval: 100,
            },
            // Twice as fast as expected.
            IntervalCheckRecord {
                time: 0,
                interval: 100,
                expected_interval: 200,
            },
        ];

        let summary = check_intervals(&records, &pattern, 0.06, 10);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.above_threshold, 1);
        assert_eq!(summary.outliers.len(), 1);
        let expected_rms = ((1.0_f64 + 4.0) / 2.0).sqrt();
        assert!((summary.rms.unwrap() - expected_rms).abs() < 1e-12);
    }

    #[test]
    fn zero_over_zero_uses_reference_factor() {
        let pattern = TrafficPattern::constant(0.7);
        let records = vec![IntervalCheckRecord {
            time: 0,
            interval: 0,
            expected_interval: 0,
        }];
        let summary = check_intervals(&records, &pattern, 0.06, 10);
        assert_eq!(summary.above_threshold, 0);
    }
}
