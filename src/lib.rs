// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Turf-Tracker: claim map tiles by running or cycling through them
//!
//! This crate provides the backend API that validates submitted GPS runs
//! against anti-cheat heuristics, turns each accepted run into a set of grid
//! tiles and applies a strength-based ownership contest to those tiles.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
}
