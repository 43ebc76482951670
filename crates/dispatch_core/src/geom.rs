//! Planar geometry: flat-earth projection and point/segment primitives.
//!
//! A city-scale map can be treated as flat, so geographic coordinates are
//! projected once into meters around a reference point and all downstream
//! geometry (k-d tree, snapping, link lengths) works in the projected plane.

use serde::{Deserialize, Serialize};

/// Earth radius in meters, for the great-circle distance used to calibrate
/// the projection.
pub const EARTH_RADIUS_M: f64 = 6_370_000.0;

/// A point in the projected plane, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: Point2D) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: Point2D) -> f64 {
        self.distance_sq(other).sqrt()
    }
}

/// Projects lat/lon locations to a 2D plane in meters around a reference
/// point. Suitable for a small geographic area (a city) which can be
/// considered flat.
#[derive(Debug, Clone)]
pub struct GeoProjector {
    ref_lat: f64,
    ref_lon: f64,
    meters_per_lat_degree: f64,
    meters_per_lon_degree: f64,
}

impl GeoProjector {
    /// The reference location can be any location inside the considered area.
    pub fn new(ref_lat: f64, ref_lon: f64) -> Self {
        let meters_per_lat_degree =
            Self::distance_great_circle(ref_lat, ref_lon, ref_lat + 1.0, ref_lon);
        let meters_per_lon_degree =
            Self::distance_great_circle(ref_lat, ref_lon, ref_lat, ref_lon + 1.0);
        Self {
            ref_lat,
            ref_lon,
            meters_per_lat_degree,
            meters_per_lon_degree,
        }
    }

    pub fn from_lat_lon(&self, lat: f64, lon: f64) -> Point2D {
        Point2D::new(
            (lon - self.ref_lon) * self.meters_per_lon_degree,
            (lat - self.ref_lat) * self.meters_per_lat_degree,
        )
    }

    pub fn to_lat_lon(&self, p: Point2D) -> (f64, f64) {
        (
            self.ref_lat + p.y / self.meters_per_lat_degree,
            self.ref_lon + p.x / self.meters_per_lon_degree,
        )
    }

    pub fn meters_per_lat_degree(&self) -> f64 {
        self.meters_per_lat_degree
    }

    pub fn meters_per_lon_degree(&self) -> f64 {
        self.meters_per_lon_degree
    }

    /// Great-circle distance in meters between two locations on a spherical
    /// earth.
    pub fn distance_great_circle(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let (rad_lat1, rad_lon1) = (lat1.to_radians(), lon1.to_radians());
        let (rad_lat2, rad_lon2) = (lat2.to_radians(), lon2.to_radians());

        let q1 = rad_lat1.cos() * rad_lon1.cos() * rad_lat2.cos() * rad_lon2.cos();
        let q2 = rad_lat1.cos() * rad_lon1.sin() * rad_lat2.cos() * rad_lon2.sin();
        let q3 = rad_lat1.sin() * rad_lat2.sin();
        let q = (q1 + q2 + q3).clamp(-1.0, 1.0);

        q.acos() * EARTH_RADIUS_M
    }
}

/// Orthogonal projection of `p` onto segment `(a, b)`, clamped to the
/// segment endpoints. Returns the snapped point and its distance to `p`.
pub fn snap_to_segment(a: Point2D, b: Point2D, p: Point2D) -> (Point2D, f64) {
    let length_sq = a.distance_sq(b);
    if length_sq == 0.0 {
        return (a, a.distance(p));
    }
    let t = ((p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y)) / length_sq;
    let snapped = if t < 0.0 {
        a
    } else if t > 1.0 {
        b
    } else {
        Point2D::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y))
    };
    (snapped, snapped.distance(p))
}

/// Squared distance from `p` to segment `(a, b)`.
pub fn segment_distance_sq(a: Point2D, b: Point2D, p: Point2D) -> f64 {
    let length_sq = a.distance_sq(b);
    if length_sq == 0.0 {
        return a.distance_sq(p);
    }
    let t = ((p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y)) / length_sq;
    if t < 0.0 {
        a.distance_sq(p)
    } else if t > 1.0 {
        b.distance_sq(p)
    } else {
        Point2D::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)).distance_sq(p)
    }
}
