// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Territory ownership records.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Current ownership of one tile.
///
/// Stored at: `territories/{tile_id}`. Created the first time a run touches
/// the tile and never deleted afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Territory {
    /// Grid key (also used as document ID)
    pub tile_id: String,
    pub owner_id: String,
    /// Contest counter, never negative
    pub strength: u32,
    /// Last time any run touched the tile (ISO 8601)
    pub last_claimed_at: String,
    /// Tile polygon as a GeoJSON geometry string (lon/lat ring)
    pub geometry: String,
}

/// A tile a run is about to contest, with its polygon pre-rendered so the
/// commit itself cannot fail on geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct TileClaim {
    pub tile_id: String,
    pub geometry: String,
}

/// One ownership change.
///
/// Stored at: `territory_history/{run_id}_{tile_id}`. Append-only; written
/// only when the owner actually changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TerritoryHistory {
    pub tile_id: String,
    /// None when the tile was previously unclaimed
    pub from_owner: Option<String>,
    pub to_owner: String,
    /// Run that caused the change
    pub run_id: String,
    pub changed_at: String,
}

impl TerritoryHistory {
    /// Deterministic document id, so a retried transaction rewrites the same row.
    pub fn document_id(&self) -> String {
        format!("{}_{}", self.run_id, self.tile_id)
    }
}

/// How a run affected a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum TileTransition {
    /// Unclaimed tile taken
    Claimed,
    /// Own tile strengthened
    Reinforced,
    /// Rival tile weakened but not taken
    Contested,
    /// Rival tile taken
    Flipped,
}

/// Post-run state of one touched tile, returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TileOutcome {
    pub tile_id: String,
    pub owner_id: String,
    pub strength: u32,
    pub previous_owner: Option<String>,
    pub transition: TileTransition,
    /// True when ownership changed hands between two users
    pub flipped: bool,
}

/// Ownership change reported to the notification layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FlipEvent {
    pub tile_id: String,
    pub new_owner: String,
    pub previous_owner: String,
}
