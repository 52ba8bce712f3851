// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Great-circle distance and bearing helpers.

use crate::models::GeoPoint;
use geo::{Bearing, Distance, Haversine, Point};

/// Mean Earth radius in meters (the radius `geo`'s haversine uses).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude on the mean sphere.
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

fn point(p: GeoPoint) -> Point<f64> {
    Point::new(p.lon, p.lat)
}

/// Haversine distance between two points in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    Haversine.distance(point(a), point(b))
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
pub fn initial_bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    Haversine.bearing(point(a), point(b)).rem_euclid(360.0)
}

/// Smallest absolute difference between two bearings, in [0, 180].
pub fn angle_deviation_deg(bearing_a: f64, bearing_b: f64) -> f64 {
    let diff = (bearing_b - bearing_a).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}
