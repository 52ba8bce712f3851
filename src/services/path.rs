// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Path geometry: true path length and the buffered claim corridor.

use crate::models::{GeoPoint, GpsSample};
use crate::services::geodesy::{haversine_m, METERS_PER_DEGREE};
use geo::{Buffer, Coord, LineString, MapCoords, MultiPolygon, Point, Polygon};
use geojson::GeoJson;

/// Corridor radius around the path, in meters.
pub const CORRIDOR_BUFFER_M: f64 = 50.0;

/// Geometry derived from a run's samples.
#[derive(Debug, Clone)]
pub struct PathGeometry {
    /// Path in sample order, longitude first
    pub line: LineString<f64>,
    /// Sum of consecutive great-circle distances
    pub length_km: f64,
    /// Buffered corridor that determines the territorial claim
    pub corridor: MultiPolygon<f64>,
}

impl PathGeometry {
    /// Encoded polyline (precision 5) of the path.
    pub fn summary_polyline(&self) -> Result<String, PathError> {
        polyline::encode_coordinates(self.line.coords().copied(), 5)
            .map_err(|e| PathError::Polyline(e.to_string()))
    }

    /// Corridor as a GeoJSON geometry string.
    pub fn corridor_geojson(&self) -> Result<String, PathError> {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.corridor));
        serde_json::to_string(&geometry).map_err(|e| PathError::GeoJson(e.to_string()))
    }
}

/// Errors from building path geometry.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("A path needs at least 2 points, got {0}")]
    TooFewPoints(usize),

    #[error("Failed to encode polyline: {0}")]
    Polyline(String),

    #[error("Invalid GeoJSON geometry: {0}")]
    GeoJson(String),

    #[error("Unsupported geometry type (expected Polygon or MultiPolygon)")]
    UnsupportedGeometry,
}

/// Build the path, its length and its corridor from ordered samples.
pub fn build_path(points: &[GpsSample]) -> Result<PathGeometry, PathError> {
    if points.len() < 2 {
        return Err(PathError::TooFewPoints(points.len()));
    }

    let length_m: f64 = points
        .windows(2)
        .map(|w| haversine_m(w[0].geo_point(), w[1].geo_point()))
        .sum();

    let line: LineString<f64> = points
        .iter()
        .map(|p| Coord::from(p.geo_point()))
        .collect();

    let corridor = buffer_corridor(&line, CORRIDOR_BUFFER_M);

    Ok(PathGeometry {
        line,
        length_km: length_m / 1000.0,
        corridor,
    })
}

/// Buffer a lon/lat line by `radius_m` meters.
///
/// The buffer is computed in a local equirectangular projection centered on
/// the line, which is accurate to well under a meter at run-sized extents.
fn buffer_corridor(line: &LineString<f64>, radius_m: f64) -> MultiPolygon<f64> {
    let mut coords: Vec<Coord<f64>> = line.coords().copied().collect();
    coords.dedup();

    let Some(origin) = centroid_of(&coords) else {
        return MultiPolygon::new(vec![]);
    };
    let projection = LocalProjection::new(origin);

    let corridor_m = if coords.len() == 1 {
        Point::from(projection.forward(coords[0])).buffer(radius_m)
    } else {
        LineString::from(coords)
            .map_coords(move |c| projection.forward(c))
            .buffer(radius_m)
    };

    corridor_m.map_coords(move |c| projection.inverse(c))
}

fn centroid_of(coords: &[Coord<f64>]) -> Option<GeoPoint> {
    if coords.is_empty() {
        return None;
    }
    let n = coords.len() as f64;
    let (sx, sy) = coords
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    Some(GeoPoint::new(sx / n, sy / n))
}

/// Equirectangular projection to meters around a fixed origin.
#[derive(Debug, Clone, Copy)]
struct LocalProjection {
    origin: GeoPoint,
    meters_per_lon_degree: f64,
}

impl LocalProjection {
    fn new(origin: GeoPoint) -> Self {
        Self {
            origin,
            meters_per_lon_degree: METERS_PER_DEGREE * origin.lat.to_radians().cos(),
        }
    }

    fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.origin.lon) * self.meters_per_lon_degree,
            y: (c.y - self.origin.lat) * METERS_PER_DEGREE,
        }
    }

    fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.origin.lon + c.x / self.meters_per_lon_degree,
            y: self.origin.lat + c.y / METERS_PER_DEGREE,
        }
    }
}

/// Parse a stored corridor geometry back into a multipolygon.
pub fn parse_corridor(geojson: &str) -> Result<MultiPolygon<f64>, PathError> {
    let parsed: GeoJson = geojson
        .parse()
        .map_err(|e: geojson::Error| PathError::GeoJson(e.to_string()))?;

    let GeoJson::Geometry(geometry) = parsed else {
        return Err(PathError::UnsupportedGeometry);
    };

    if let Ok(multi) = MultiPolygon::<f64>::try_from(geometry.value.clone()) {
        return Ok(multi);
    }
    Polygon::<f64>::try_from(geometry.value)
        .map(|poly| MultiPolygon::new(vec![poly]))
        .map_err(|_| PathError::UnsupportedGeometry)
}
