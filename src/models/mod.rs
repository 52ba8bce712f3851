// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod coords;
pub mod run;
pub mod stats;
pub mod territory;
pub mod verdict;

pub use coords::{GeoPoint, LatLng};
pub use run::{derive_run_id, ActivityType, GpsSample, Run, RunSubmission, SpeedProfile};
pub use stats::UserStats;
pub use territory::{FlipEvent, Territory, TerritoryHistory, TileClaim, TileOutcome, TileTransition};
pub use verdict::{Verdict, VerdictStats};
