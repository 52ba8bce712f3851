// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tile grid: fixed-precision geohash cells.
//!
//! A tile id is the precision-7 geohash of any point inside it. Geohash cell
//! edges are dyadic fractions of the coordinate range, so every bound is
//! exact in `f64` and cells tile the plane as half-open rectangles
//! `[min, max)` with no gaps or overlaps.

use crate::models::GeoPoint;
use geo::{Coord, Intersects, Line, LineString, MultiPolygon, Polygon, Rect};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Geohash characters per tile id.
pub const TILE_PRECISION: usize = 7;

const BITS_PER_CHAR: usize = 5;
const LON_BITS: u32 = 18;
const LAT_BITS: u32 = 17;
const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Cell width in degrees of longitude.
pub const TILE_LON_DEGREES: f64 = 360.0 / (1u64 << LON_BITS) as f64;
/// Cell height in degrees of latitude.
pub const TILE_LAT_DEGREES: f64 = 180.0 / (1u64 << LAT_BITS) as f64;

/// Nominal tile edge used for area accounting.
pub const TILE_NOMINAL_SIZE_M: f64 = 150.0;
/// Area credited per owned tile.
pub const TILE_AREA_KM2: f64 = (TILE_NOMINAL_SIZE_M / 1000.0) * (TILE_NOMINAL_SIZE_M / 1000.0);

/// Errors from decoding tile ids.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GridError {
    #[error("Tile id must be {expected} characters, got {found}")]
    InvalidLength { expected: usize, found: usize },

    #[error("Invalid tile id character '{0}'")]
    InvalidCharacter(char),

    #[error("Failed to encode tile geometry: {0}")]
    Encode(String),

    #[error("Shape touches more than {limit} tiles")]
    TooManyTiles { limit: usize },
}

/// Bounding rectangle of a tile, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl TileBounds {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Half-open containment, except on the +90/+180 edges which belong to
    /// the last cell.
    pub fn contains(&self, p: GeoPoint) -> bool {
        let lon_ok = p.lon >= self.min_lon && (p.lon < self.max_lon || self.max_lon == 180.0);
        let lat_ok = p.lat >= self.min_lat && (p.lat < self.max_lat || self.max_lat == 90.0);
        lon_ok && lat_ok
    }

    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }

    /// Closed five-point ring, counter-clockwise, longitude first.
    pub fn polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_lon, self.min_lat),
                (self.max_lon, self.min_lat),
                (self.max_lon, self.max_lat),
                (self.min_lon, self.max_lat),
                (self.min_lon, self.min_lat),
            ]),
            vec![],
        )
    }
}

/// Tile id for a position given latitude first, as GPS fixes are.
pub fn tile_id(lat: f64, lon: f64) -> String {
    encode(lat, lon).0
}

/// Tile id for a storage-order point.
pub fn tile_for(point: GeoPoint) -> String {
    tile_id(point.lat, point.lon)
}

fn encode(lat: f64, lon: f64) -> (String, TileBounds) {
    let lat = lat.clamp(-90.0, 90.0);
    let lon = lon.clamp(-180.0, 180.0);

    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);
    let mut id = String::with_capacity(TILE_PRECISION);
    let mut even = true;

    for _ in 0..TILE_PRECISION {
        let mut idx = 0usize;
        for _ in 0..BITS_PER_CHAR {
            idx <<= 1;
            if even {
                let mid = (lon_lo + lon_hi) / 2.0;
                if lon >= mid {
                    idx |= 1;
                    lon_lo = mid;
                } else {
                    lon_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if lat >= mid {
                    idx |= 1;
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even = !even;
        }
        id.push(BASE32[idx] as char);
    }

    let bounds = TileBounds {
        min_lon: lon_lo,
        min_lat: lat_lo,
        max_lon: lon_hi,
        max_lat: lat_hi,
    };
    (id, bounds)
}

/// Decode a tile id back into its bounding rectangle.
pub fn tile_bounds(tile_id: &str) -> Result<TileBounds, GridError> {
    let found = tile_id.chars().count();
    if found != TILE_PRECISION {
        return Err(GridError::InvalidLength {
            expected: TILE_PRECISION,
            found,
        });
    }

    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);
    let mut even = true;

    for c in tile_id.chars() {
        let idx = BASE32
            .iter()
            .position(|&b| b as char == c)
            .ok_or(GridError::InvalidCharacter(c))?;
        for shift in (0..BITS_PER_CHAR).rev() {
            let bit = (idx >> shift) & 1 == 1;
            if even {
                let mid = (lon_lo + lon_hi) / 2.0;
                if bit {
                    lon_lo = mid;
                } else {
                    lon_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if bit {
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even = !even;
        }
    }

    Ok(TileBounds {
        min_lon: lon_lo,
        min_lat: lat_lo,
        max_lon: lon_hi,
        max_lat: lat_hi,
    })
}

/// Closed polygon of a tile, derived purely from its id.
pub fn polygon_for_tile(tile_id: &str) -> Result<Polygon<f64>, GridError> {
    Ok(tile_bounds(tile_id)?.polygon())
}

/// Tile polygon as a GeoJSON geometry string, for persistence and display.
pub fn tile_geojson(tile_id: &str) -> Result<String, GridError> {
    let polygon = polygon_for_tile(tile_id)?;
    let geometry = geojson::Geometry::new(geojson::Value::from(&polygon));
    serde_json::to_string(&geometry).map_err(|e| GridError::Encode(e.to_string()))
}

/// Grid position of a cell: row counts up from the south pole, column
/// eastward from the antimeridian.
type Cell = (i64, i64);

const ROWS: i64 = 1 << LAT_BITS;
const COLS: i64 = 1 << LON_BITS;

fn cell_of(c: Coord<f64>) -> Cell {
    let row = ((c.y + 90.0) / TILE_LAT_DEGREES).floor() as i64;
    let col = ((c.x + 180.0) / TILE_LON_DEGREES).floor() as i64;
    (row.clamp(0, ROWS - 1), col.clamp(0, COLS - 1))
}

fn row_center(row: i64) -> f64 {
    -90.0 + (row as f64 + 0.5) * TILE_LAT_DEGREES
}

fn cell_bounds((row, col): Cell) -> TileBounds {
    let min_lat = -90.0 + row as f64 * TILE_LAT_DEGREES;
    let min_lon = -180.0 + col as f64 * TILE_LON_DEGREES;
    TileBounds {
        min_lon,
        min_lat,
        max_lon: min_lon + TILE_LON_DEGREES,
        max_lat: min_lat + TILE_LAT_DEGREES,
    }
}

/// Cells touched by one shape, gathered edge by edge.
struct Raster {
    limit: usize,
    cells: HashSet<Cell>,
    /// Longitudes where the boundary crosses each row's center line
    crossings: BTreeMap<i64, Vec<f64>>,
}

impl Raster {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            cells: HashSet::new(),
            crossings: BTreeMap::new(),
        }
    }

    fn insert(&mut self, cell: Cell) -> Result<(), GridError> {
        if self.cells.insert(cell) && self.cells.len() > self.limit {
            return Err(GridError::TooManyTiles { limit: self.limit });
        }
        Ok(())
    }

    /// Keep every cell the edge passes through or touches.
    ///
    /// Samples are at most one cell apart on each axis, so the piece of edge
    /// between two samples stays inside the 3x3 block around the first one.
    fn trace_edge(&mut self, edge: Line<f64>) -> Result<(), GridError> {
        let delta = edge.delta();
        let steps = (delta.x.abs() / TILE_LON_DEGREES)
            .max(delta.y.abs() / TILE_LAT_DEGREES)
            .ceil()
            .max(1.0) as i64;

        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let (row, col) = cell_of(edge.start + delta * t);
            for dr in -1..=1 {
                for dc in -1..=1 {
                    let cell = (row + dr, col + dc);
                    if !(0..ROWS).contains(&cell.0)
                        || !(0..COLS).contains(&cell.1)
                        || self.cells.contains(&cell)
                    {
                        continue;
                    }
                    if cell_bounds(cell).rect().intersects(&edge) {
                        self.insert(cell)?;
                    }
                }
            }
        }

        self.record_crossings(edge);
        Ok(())
    }

    fn record_crossings(&mut self, edge: Line<f64>) {
        let (a, b) = (edge.start, edge.end);
        if a.y == b.y {
            return;
        }
        let lo = cell_of(Coord { x: a.x, y: a.y.min(b.y) }).0;
        let hi = cell_of(Coord { x: a.x, y: a.y.max(b.y) }).0;
        for row in lo..=hi {
            let y = row_center(row);
            if (a.y > y) != (b.y > y) {
                let x = a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
                self.crossings.entry(row).or_default().push(x);
            }
        }
    }

    /// Add cells lying wholly inside the shape.
    ///
    /// A cell no edge touches is either all inside or all outside, and its
    /// center decides which. Inside spans come from even-odd pairing of the
    /// boundary crossings on the row's center line.
    fn fill_interior(&mut self) -> Result<(), GridError> {
        let crossings = std::mem::take(&mut self.crossings);
        for (row, mut xs) in crossings {
            xs.sort_by(f64::total_cmp);
            for span in xs.chunks_exact(2) {
                let first = ((span[0] + 180.0) / TILE_LON_DEGREES - 0.5).ceil() as i64;
                let last = ((span[1] + 180.0) / TILE_LON_DEGREES - 0.5).floor() as i64;
                for col in first.max(0)..=last.min(COLS - 1) {
                    self.insert((row, col))?;
                }
            }
        }
        Ok(())
    }

    fn into_ids(self) -> BTreeSet<String> {
        self.cells
            .into_iter()
            .map(|cell| {
                let c = cell_bounds(cell).center();
                tile_id(c.lat, c.lon)
            })
            .collect()
    }
}

fn scan(shape: &MultiPolygon<f64>, limit: usize) -> Result<BTreeSet<String>, GridError> {
    let mut raster = Raster::new(limit);
    for polygon in shape {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for edge in ring.lines() {
                raster.trace_edge(edge)?;
            }
        }
    }
    raster.fill_interior()?;

    tracing::trace!(touched = raster.cells.len(), "Scanned tiles for shape");
    Ok(raster.into_ids())
}

/// Every tile whose rectangle intersects the given shape.
///
/// Cells touched by a boundary edge are found by walking each edge, and
/// cells wholly inside the shape by filling between boundary crossings row by
/// row, so the work follows the shape's outline instead of its bounding box.
/// The polygons of `shape` must not overlap one another.
pub fn tiles_touched_by(shape: &MultiPolygon<f64>) -> BTreeSet<String> {
    scan(shape, usize::MAX).unwrap_or_default()
}

/// Like [`tiles_touched_by`], but gives up as soon as more than `limit`
/// tiles are found.
pub fn tiles_touched_within(
    shape: &MultiPolygon<f64>,
    limit: usize,
) -> Result<BTreeSet<String>, GridError> {
    scan(shape, limit)
}
