// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::RunStore;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Run, RunSubmission, TerritoryHistory, UserStats, Verdict};
use crate::services::grid::{tile_bounds, tile_geojson};
use crate::services::{IngestResult, IngestSettings, RunIngestor};
use crate::time_utils::now_rfc3339;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/runs", post(submit_run))
        .route("/api/runs/validate", post(validate_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/territories/{tile_id}", get(get_territory))
        .route("/api/territories/{tile_id}/history", get(get_tile_history))
        .route("/api/me/stats", get(get_my_stats))
        .route("/api/me/stats/rebuild", post(rebuild_my_stats))
}

fn ingestor(state: &AppState) -> RunIngestor<crate::db::Database> {
    RunIngestor::new(state.db.clone(), IngestSettings::from_config(&state.config))
}

/// Malformed JSON is a 400 like every other input error, leaving 422 for
/// runs that parse but fail validation.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

// ─── Runs ────────────────────────────────────────────────────

/// Validate and commit a run.
async fn submit_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<RunSubmission>, JsonRejection>,
) -> Result<Json<IngestResult>> {
    let submission = json_body(payload)?;
    let result = ingestor(&state)
        .ingest(&user.user_id, submission, chrono::Utc::now())
        .await?;
    Ok(Json(result))
}

/// Dry run: verdict only, nothing persisted.
async fn validate_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<RunSubmission>, JsonRejection>,
) -> Result<Json<Verdict>> {
    let submission = json_body(payload)?;
    let verdict = ingestor(&state).preview(&submission)?;
    tracing::debug!(user_id = %user.user_id, valid = verdict.valid, "Run previewed");
    Ok(Json(verdict))
}

/// Fetch one of the caller's runs.
async fn get_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Run>> {
    // Other users' runs are reported as missing
    let run = state
        .db
        .get_run(&id)
        .await?
        .filter(|run| run.user_id == user.user_id)
        .ok_or_else(|| AppError::NotFound(format!("Run {} not found", id)))?;
    Ok(Json(run))
}

// ─── Territory ───────────────────────────────────────────────

/// Territory state for display.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TerritoryResponse {
    pub tile_id: String,
    pub owner_id: String,
    pub strength: u32,
    pub last_claimed_at: String,
    /// Tile polygon (GeoJSON, longitude first)
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown"))]
    pub geometry: serde_json::Value,
}

fn check_tile_id(tile_id: &str) -> Result<()> {
    tile_bounds(tile_id)
        .map(|_| ())
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn get_territory(
    State(state): State<Arc<AppState>>,
    Path(tile_id): Path<String>,
) -> Result<Json<TerritoryResponse>> {
    check_tile_id(&tile_id)?;

    let territory = state
        .db
        .get_territory(&tile_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tile {} has never been claimed", tile_id)))?;

    // Rows without stored geometry fall back to the grid-derived polygon
    let geometry = if territory.geometry.is_empty() {
        tile_geojson(&tile_id).map_err(|e| AppError::Internal(e.into()))?
    } else {
        territory.geometry
    };
    let geometry = serde_json::from_str(&geometry)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Stored tile geometry invalid: {}", e)))?;

    Ok(Json(TerritoryResponse {
        tile_id: territory.tile_id,
        owner_id: territory.owner_id,
        strength: territory.strength,
        last_claimed_at: territory.last_claimed_at,
        geometry,
    }))
}

/// Ownership changes for a tile, oldest first.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TileHistoryResponse {
    pub tile_id: String,
    pub history: Vec<TerritoryHistory>,
}

async fn get_tile_history(
    State(state): State<Arc<AppState>>,
    Path(tile_id): Path<String>,
) -> Result<Json<TileHistoryResponse>> {
    check_tile_id(&tile_id)?;
    let history = state.db.get_tile_history(&tile_id).await?;
    Ok(Json(TileHistoryResponse { tile_id, history }))
}

// ─── Stats ───────────────────────────────────────────────────

async fn get_my_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserStats>> {
    let stats = state
        .db
        .get_user_stats(&user.user_id)
        .await?
        .unwrap_or_else(|| UserStats::new(&user.user_id));
    Ok(Json(stats))
}

async fn rebuild_my_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserStats>> {
    tracing::info!(user_id = %user.user_id, "User-initiated stats rebuild");
    let stats = state
        .db
        .rebuild_user_stats(&user.user_id, &now_rfc3339())
        .await?;
    Ok(Json(stats))
}
