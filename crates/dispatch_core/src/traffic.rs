//! Time-of-day traffic model: a piecewise-constant speed factor applied to
//! every road's static speed.
//!
//! The pattern is a sequence of `(epoch_begin_time, speed_factor)` items at
//! a fixed step, extrapolated flat before the first and after the last
//! epoch. On-road motion integrates the factor over time, epoch by epoch:
//! one integral answers "how long to cover this distance starting at t",
//! the symmetric one answers "how far in this much time, capped by the end
//! of the road".

use bevy_ecs::prelude::Resource;

use crate::clock::ONE_MIN;
use crate::map::{CityMap, LocationOnRoad, Road};
use crate::scenario::TripRecord;

/// Speed factor carried through calibration windows that contain no trips.
const DEFAULT_SPEED_FACTOR: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternItem {
    pub epoch_begin_time: u64,
    pub speed_factor: f64,
}

/// How the traffic condition changes over the time of a day.
#[derive(Debug, Clone, Resource)]
pub struct TrafficPattern {
    step: u64,
    items: Vec<PatternItem>,
    first_epoch_begin: u64,
    last_epoch_begin: u64,
    first_factor: f64,
    last_factor: f64,
}

impl TrafficPattern {
    pub fn new(step: u64) -> Self {
        Self {
            step,
            items: Vec::new(),
            first_epoch_begin: 0,
            last_epoch_begin: 0,
            first_factor: 0.0,
            last_factor: 0.0,
        }
    }

    /// A pattern with one item: the same factor at every time.
    pub fn constant(speed_factor: f64) -> Self {
        let mut pattern = Self::new(ONE_MIN);
        pattern.push_item(0, speed_factor);
        pattern
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn items(&self) -> &[PatternItem] {
        &self.items
    }

    /// Append one epoch. Items must arrive in non-decreasing time order.
    pub fn push_item(&mut self, epoch_begin_time: u64, speed_factor: f64) {
        assert!(
            self.items.is_empty() || epoch_begin_time >= self.last_epoch_begin,
            "pattern items must be appended in non-decreasing time order"
        );
        if self.items.is_empty() {
            self.first_epoch_begin = epoch_begin_time;
            self.first_factor = speed_factor;
        }
        self.last_epoch_begin = epoch_begin_time;
        self.last_factor = speed_factor;
        self.items.push(PatternItem {
            epoch_begin_time,
            speed_factor,
        });
    }

    /// The factor in effect at `time`, extrapolating flat at both ends.
    pub fn speed_factor(&self, time: u64) -> f64 {
        if time < self.first_epoch_begin {
            return self.first_factor;
        }
        if time >= self.last_epoch_begin {
            return self.last_factor;
        }
        let index = ((time - self.first_epoch_begin) / self.step) as usize;
        self.items[index].speed_factor
    }

    /// Dynamic time to cover `distance` at `unadjusted_speed`, starting at
    /// `time`. All quantities are in scaled units.
    pub fn dynamic_forward_travel_time(
        &self,
        time: f64,
        unadjusted_speed: f64,
        distance: f64,
    ) -> f64 {
        if time >= self.last_epoch_begin as f64 {
            return distance / (unadjusted_speed * self.last_factor);
        }
        if time < self.first_epoch_begin as f64 {
            return distance / (unadjusted_speed * self.first_factor);
        }

        let mut total_distance = 0.0;
        let mut total_time = 0.0;
        let mut current_time = time;

        while total_distance < distance {
            let index =
                ((current_time - self.first_epoch_begin as f64) / self.step as f64) as usize;
            if index >= self.items.len() {
                // Walked off the end of the pattern: extrapolate.
                let adjusted = unadjusted_speed * self.last_factor;
                total_time += (distance - total_distance) / adjusted;
                break;
            }

            let adjusted = unadjusted_speed * self.items[index].speed_factor;
            let window_end = (self.items[index].epoch_begin_time + self.step) as f64;
            let remaining_distance = distance - total_distance;
            let time_in_window = window_end - current_time;
            let distance_in_window = adjusted * time_in_window;

            if distance_in_window >= remaining_distance {
                total_time += remaining_distance / adjusted;
                break;
            }
            total_distance += distance_in_window;
            total_time += time_in_window;
            current_time = window_end;
        }

        total_time
    }

    /// Dynamic distance covered in `travel_time` at `unadjusted_speed`
    /// starting at `time`, capped at `max_distance`. Returns the distance
    /// and the time actually spent; the latter is smaller than
    /// `travel_time` when the cap fires first.
    pub fn dynamic_travel_distance(
        &self,
        time: f64,
        unadjusted_speed: f64,
        travel_time: f64,
        max_distance: f64,
    ) -> (f64, f64) {
        if time >= self.last_epoch_begin as f64 {
            let adjusted = unadjusted_speed * self.last_factor;
            let distance = (travel_time * adjusted).min(max_distance);
            return (distance, distance / adjusted);
        }
        if time < self.first_epoch_begin as f64 {
            let adjusted = unadjusted_speed * self.first_factor;
            let distance = (travel_time * adjusted).min(max_distance);
            return (distance, distance / adjusted);
        }

        let mut total_distance = 0.0;
        let mut total_time = 0.0;
        let mut current_time = time;

        while total_time < travel_time && total_distance < max_distance {
            let index =
                ((current_time - self.first_epoch_begin as f64) / self.step as f64) as usize;
            let (factor, window_end) = if index < self.items.len() {
                (
                    self.items[index].speed_factor,
                    (self.items[index].epoch_begin_time + self.step) as f64,
                )
            } else {
                (self.last_factor, f64::INFINITY)
            };
            let adjusted = unadjusted_speed * factor;

            let remaining_time = travel_time - total_time;
            let time_to_use = (window_end - current_time).min(remaining_time);
            let distance_in_window = adjusted * time_to_use;

            if total_distance + distance_in_window > max_distance {
                let remaining_distance = max_distance - total_distance;
                total_time += remaining_distance / adjusted;
                total_distance = max_distance;
                break;
            }
            total_distance += distance_in_window;
            total_time += time_to_use;
            current_time += time_to_use;
        }

        (total_distance, total_time)
    }

    /// Dynamic travel time from `from` forward to `to` on the same road,
    /// rounded to scaled units. `from` must be upstream of `to`.
    pub fn road_forward_travel_time(
        &self,
        time: u64,
        road: &Road,
        from: &LocationOnRoad,
        to: &LocationOnRoad,
    ) -> u64 {
        assert!(from.upstream_to(to), "from must be upstream of to");
        self.dynamic_forward_travel_time(time as f64, road.speed, from.displacement_to(to))
            .round() as u64
    }

    /// Dynamic travel time from `loc` to the end intersection of its road.
    pub fn road_travel_time_to_end(&self, time: u64, road: &Road, loc: &LocationOnRoad) -> u64 {
        self.road_forward_travel_time(time, road, loc, &LocationOnRoad::at_end(road))
    }

    /// Dynamic travel time from the start intersection of the road to `loc`.
    pub fn road_travel_time_from_start(&self, time: u64, road: &Road, loc: &LocationOnRoad) -> u64 {
        self.road_forward_travel_time(time, road, &LocationOnRoad::at_start(road), loc)
    }

    /// Where an agent ends up after driving along its road for
    /// `travel_time`, starting at `time`: either further down the same road
    /// or pinned at the end intersection when the road runs out first.
    pub fn travel_road_for_time(
        &self,
        time: u64,
        road: &Road,
        loc: &LocationOnRoad,
        travel_time: u64,
    ) -> LocationOnRoad {
        let remaining = road.length - loc.distance_from_start;
        let (distance, time_spent) =
            self.dynamic_travel_distance(time as f64, road.speed, travel_time as f64, remaining);
        if time_spent < travel_time as f64 {
            LocationOnRoad::at_end(road)
        } else {
            LocationOnRoad {
                road: road.id,
                distance_from_start: (loc.distance_from_start + distance).min(road.length),
            }
        }
    }
}

/// Calibrate a pattern from recorded trips: for every step of the day, the
/// factor is the ratio of the map's static trip durations to the recorded
/// durations of trips falling inside an epoch-long window, capped at 1.0.
/// Windows without usable trips carry the last known factor. With
/// `dynamic_traffic` off every window gets factor 1.0.
pub fn build_sliding_pattern(
    map: &CityMap,
    records: &mut [TripRecord],
    epoch: u64,
    step: u64,
    dynamic_traffic: bool,
) -> TrafficPattern {
    let mut pattern = TrafficPattern::new(step);
    if records.is_empty() {
        pattern.push_item(0, 1.0);
        return pattern;
    }

    records.sort_by_key(|r| r.pickup_time);
    let n = records.len();
    let mut epoch_begin_time = records[0].pickup_time;
    let mut begin_index = 0;
    let mut last_known_factor = DEFAULT_SPEED_FACTOR;

    loop {
        let epoch_end_time = epoch_begin_time + epoch;
        let mut window = Vec::new();
        let mut index = begin_index;
        while index < n && records[index].pickup_time < epoch_end_time {
            if records[index].dropoff_time < epoch_end_time {
                window.push(&records[index]);
            }
            index += 1;
        }

        let speed_factor = if !dynamic_traffic {
            1.0
        } else if window.is_empty() {
            last_known_factor
        } else {
            let factor = window_speed_factor(map, &window);
            if factor >= 0.0 {
                let capped = factor.min(1.0);
                last_known_factor = capped;
                capped
            } else {
                last_known_factor
            }
        };

        pattern.push_item(epoch_begin_time, speed_factor);

        epoch_begin_time += step;
        while begin_index < n && records[begin_index].pickup_time < epoch_begin_time {
            begin_index += 1;
        }
        if index >= n {
            break;
        }
    }

    pattern
}

/// Ratio of static map durations to recorded durations over one window, or
/// -1 when the recorded durations sum to zero.
fn window_speed_factor(map: &CityMap, window: &[&TripRecord]) -> f64 {
    let mut total_actual: u64 = 0;
    let mut total_static: u64 = 0;
    for record in window {
        total_actual += record.dropoff_time - record.pickup_time;
        if let Some(static_time) = map.travel_time_between(&record.pickup, &record.dropoff) {
            total_static += static_time;
        }
    }
    if total_actual == 0 {
        return -1.0;
    }
    total_static as f64 / total_actual as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TIME_RESOLUTION;
    use crate::test_helpers::single_road_map;

    const SEC: u64 = TIME_RESOLUTION;

    fn two_phase_pattern() -> TrafficPattern {
        // Half speed for the first 300 s, full speed afterwards.
        let mut pattern = TrafficPattern::new(300 * SEC);
        pattern.push_item(0, 0.5);
        pattern.push_item(300 * SEC, 1.0);
        pattern
    }

    #[test]
    fn speed_factor_extrapolates_at_both_ends() {
        let mut pattern = TrafficPattern::new(60 * SEC);
        pattern.push_item(100 * SEC, 0.4);
        pattern.push_item(160 * SEC, 0.8);

        assert_eq!(pattern.speed_factor(0), 0.4);
        assert_eq!(pattern.speed_factor(100 * SEC), 0.4);
        assert_eq!(pattern.speed_factor(130 * SEC), 0.4);
        assert_eq!(pattern.speed_factor(160 * SEC), 0.8);
        assert_eq!(pattern.speed_factor(1_000_000 * SEC), 0.8);
    }

    #[test]
    fn whole_road_crossed_inside_first_epoch() {
        // 600 m at 10 m/s with factor 0.5: 5 m/s effective, 120 s, entirely
        // within the first epoch.
        let map = single_road_map(600.0, 10.0);
        let road = &map.roads()[0];
        let pattern = two_phase_pattern();

        let tt = pattern.road_travel_time_to_end(0, road, &LocationOnRoad::at_start(road));
        assert_eq!(tt, 120 * SEC);
    }

    #[test]
    fn travel_time_spans_epoch_boundary() {
        // 2000 m at 10 m/s: 250 s cover 1250 m in the slow epoch, the
        // remaining 750 m take 75 s at full speed.
        let map = single_road_map(2000.0, 10.0);
        let road = &map.roads()[0];
        let pattern = two_phase_pattern();

        let start = 50 * SEC;
        let tt = pattern.road_travel_time_to_end(start, road, &LocationOnRoad::at_start(road));
        assert_eq!(tt, 325 * SEC);
    }

    #[test]
    fn position_after_zero_time_is_identity() {
        let map = single_road_map(1000.0, 10.0);
        let road = &map.roads()[0];
        let pattern = TrafficPattern::constant(1.0);
        let loc = LocationOnRoad::new(road, 123.0);

        assert_eq!(pattern.travel_road_for_time(0, road, &loc, 0), loc);
    }

    #[test]
    fn position_after_full_travel_time_is_road_end() {
        let map = single_road_map(1000.0, 10.0);
        let road = &map.roads()[0];
        let pattern = TrafficPattern::constant(1.0);

        let tt = pattern.road_travel_time_to_end(0, road, &LocationOnRoad::at_start(road));
        let end = pattern.travel_road_for_time(0, road, &LocationOnRoad::at_start(road), tt);
        assert!(end.at_end_intersection(road));
    }

    #[test]
    fn position_is_pinned_when_road_ends_early() {
        let map = single_road_map(1000.0, 10.0);
        let road = &map.roads()[0];
        let pattern = TrafficPattern::constant(1.0);

        let far_too_long = 10_000 * SEC;
        let loc = pattern.travel_road_for_time(
            0,
            road,
            &LocationOnRoad::new(road, 900.0),
            far_too_long,
        );
        assert!(loc.at_end_intersection(road));
    }

    #[test]
    fn forward_travel_time_matches_distance_integral() {
        let map = single_road_map(1000.0, 10.0);
        let road = &map.roads()[0];
        let pattern = two_phase_pattern();
        let from = LocationOnRoad::new(road, 100.0);
        let to = LocationOnRoad::new(road, 700.0);

        let tt = pattern.road_forward_travel_time(0, road, &from, &to);
        let landed = pattern.travel_road_for_time(0, road, &from, tt);
        assert!((landed.distance_from_start - 700.0).abs() < 1e-3);
    }

    #[test]
    fn static_pattern_build_without_dynamic_traffic() {
        let map = single_road_map(1000.0, 10.0);
        let road = &map.roads()[0];
        let mut records = vec![TripRecord {
            pickup: LocationOnRoad::at_start(road),
            dropoff: LocationOnRoad::at_end(road),
            pickup_time: 0,
            dropoff_time: 200 * SEC,
        }];

        let pattern = build_sliding_pattern(&map, &mut records, 900 * SEC, 60 * SEC, false);
        assert!(pattern.items().iter().all(|i| i.speed_factor == 1.0));
    }

    #[test]
    fn dynamic_pattern_ratio_is_static_over_recorded() {
        let map = single_road_map(1000.0, 10.0);
        let road = &map.roads()[0];
        // Static trip time is 100 s; the recorded trip took 200 s, so the
        // calibrated factor is 0.5.
        let mut records = vec![TripRecord {
            pickup: LocationOnRoad::at_start(road),
            dropoff: LocationOnRoad::at_end(road),
            pickup_time: 0,
            dropoff_time: 200 * SEC,
        }];

        let pattern = build_sliding_pattern(&map, &mut records, 900 * SEC, 60 * SEC, true);
        assert!((pattern.speed_factor(0) - 0.5).abs() < 1e-9);
    }
}
