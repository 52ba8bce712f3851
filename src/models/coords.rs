// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Coordinate types.
//!
//! Everything that is stored or sent over the wire as geometry is
//! longitude-first (`GeoPoint`, GeoJSON, `geo::Coord { x: lon, y: lat }`).
//! `LatLng` exists only for human-facing display and is never fed back
//! into geometry without going through an explicit conversion.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A position in storage order: longitude, then latitude.
///
/// Serializes as a `[lon, lat]` pair, matching GeoJSON positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lon, lat }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(p: GeoPoint) -> Self {
        [p.lon, p.lat]
    }
}

impl From<GeoPoint> for geo::Coord<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Coord { x: p.lon, y: p.lat }
    }
}

impl From<geo::Coord<f64>> for GeoPoint {
    fn from(c: geo::Coord<f64>) -> Self {
        Self { lon: c.x, lat: c.y }
    }
}

/// Display-only position (latitude first), used in API responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<GeoPoint> for LatLng {
    fn from(p: GeoPoint) -> Self {
        Self {
            lat: p.lat,
            lng: p.lon,
        }
    }
}

impl From<LatLng> for GeoPoint {
    fn from(p: LatLng) -> Self {
        Self {
            lon: p.lng,
            lat: p.lat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_serializes_lon_first() {
        let p = GeoPoint::new(-122.08, 37.39);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "[-122.08,37.39]");

        let back: GeoPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_conversions_never_transpose() {
        let p = GeoPoint::new(-122.08, 37.39);

        let coord: geo::Coord<f64> = p.into();
        assert_eq!(coord.x, -122.08);
        assert_eq!(coord.y, 37.39);

        let display = LatLng::from(p);
        assert_eq!(display.lat, 37.39);
        assert_eq!(display.lng, -122.08);
        assert_eq!(GeoPoint::from(display), p);
    }
}
