// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run ingest pipeline.
//!
//! Handles the core workflow:
//! 1. Parse the activity type and check the request shape
//! 2. Validate the samples (anti-cheat verdict)
//! 3. Build the path, its corridor and the touched tiles (on a blocking thread)
//! 4. Commit the run and its territory effects atomically
//! 5. Report per-tile outcomes, flips and updated stats
//!
//! The whole pipeline from step 3 on runs under one timeout.

use crate::config::Config;
use crate::db::{CommitOutcome, RunCommit, RunStore};
use crate::error::{AppError, Result};
use crate::models::{
    derive_run_id, ActivityType, FlipEvent, GpsSample, Run, RunSubmission, TileClaim,
    TileOutcome, UserStats, Verdict,
};
use crate::services::grid::{tile_geojson, tiles_touched_within, GridError};
use crate::services::path::build_path;
use crate::services::validator::{validate_with, ValidationPolicy};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use validator::Validate;

/// Largest stored run record. Firestore documents are capped at 1 MiB and the
/// JSON size used to check this can run slightly under Firestore's own count.
pub const MAX_RUN_RECORD_BYTES: usize = 1_000_000;

/// Default ceiling on tiles per run. A 200 km ride corridor touches about
/// 3,000 tiles, and 4,000 tile writes stay well inside one Firestore commit.
pub const DEFAULT_MAX_TILES_PER_RUN: usize = 4000;

/// Tunables for the ingest pipeline.
#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub policy: ValidationPolicy,
    /// Tile scanning stops and the run is refused past this many tiles
    pub max_tiles_per_run: usize,
    /// Bound on geometry plus commit for one run
    pub timeout: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            policy: ValidationPolicy::default(),
            max_tiles_per_run: DEFAULT_MAX_TILES_PER_RUN,
            timeout: Duration::from_secs(20),
        }
    }
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: ValidationPolicy {
                enforce_min_dwell: config.enforce_min_dwell,
            },
            max_tiles_per_run: config.max_tiles_per_run,
            timeout: config.ingest_timeout,
        }
    }
}

/// Response for a committed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub run_id: String,
    pub activity_type: ActivityType,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub verdict: Verdict,
    /// Post-run state of every touched tile
    pub tiles: Vec<TileOutcome>,
    /// Tiles taken from another user
    pub flipped: Vec<FlipEvent>,
    pub stats: UserStats,
}

/// Validates, tiles and commits runs against a store.
pub struct RunIngestor<S> {
    store: S,
    settings: IngestSettings,
}

impl<S: RunStore> RunIngestor<S> {
    pub fn new(store: S, settings: IngestSettings) -> Self {
        Self { store, settings }
    }

    /// Verdict for a submission without persisting anything.
    ///
    /// Unlike [`ingest`](Self::ingest), a failing verdict is returned as a
    /// value rather than an error.
    pub fn preview(&self, submission: &RunSubmission) -> Result<Verdict> {
        let activity = parse_submission(submission)?;
        self.verdict_for(submission, activity)
    }

    fn verdict_for(&self, submission: &RunSubmission, activity: ActivityType) -> Result<Verdict> {
        validate_with(
            &submission.points,
            activity,
            submission.distance_km,
            self.settings.policy,
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))
    }

    /// Validate and commit one run for `user_id`.
    pub async fn ingest(
        &self,
        user_id: &str,
        submission: RunSubmission,
        now: DateTime<Utc>,
    ) -> Result<IngestResult> {
        // 1. Request shape
        let activity = parse_submission(&submission)?;

        // 2. Anti-cheat verdict
        let verdict = self.verdict_for(&submission, activity)?;
        if !verdict.valid {
            tracing::warn!(
                user_id,
                activity = %activity,
                reasons = %verdict.reasons(),
                "Run rejected by validation"
            );
            return Err(AppError::RunRejected(Box::new(verdict)));
        }

        let timeout = self.settings.timeout;
        tokio::time::timeout(
            timeout,
            self.build_and_commit(user_id, activity, submission, verdict, now),
        )
        .await
        .map_err(|_| {
            AppError::Database(format!(
                "Run ingest for {} timed out after {:?}",
                user_id, timeout
            ))
        })?
    }

    async fn build_and_commit(
        &self,
        user_id: &str,
        activity: ActivityType,
        submission: RunSubmission,
        verdict: Verdict,
        now: DateTime<Utc>,
    ) -> Result<IngestResult> {
        // 3. Geometry and tiles, off the async workers
        let owner = user_id.to_string();
        let max_tiles = self.settings.max_tiles_per_run;
        let record = verdict.clone();
        let now = format_utc_rfc3339(now);
        let created_at = now.clone();
        let (run, claims) = tokio::task::spawn_blocking(move || {
            build_run(owner, activity, submission, record, max_tiles, created_at)
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Run geometry task failed: {}", e)))??;

        tracing::info!(
            user_id,
            activity = %activity,
            points = run.raw_points.len(),
            tiles = claims.len(),
            distance_km = run.distance_km,
            warnings = verdict.warnings.len(),
            "Run accepted, committing"
        );

        // 4. Commit
        let run_id = run.id.clone();
        let distance_km = run.distance_km;
        let duration_sec = run.duration_sec;
        let outcome = self.store.commit_run(RunCommit { run, claims, now }).await?;

        let receipt = match outcome {
            CommitOutcome::Committed(receipt) => receipt,
            CommitOutcome::Duplicate => {
                return Err(AppError::Conflict(format!(
                    "Run {} has already been submitted",
                    run_id
                )))
            }
        };

        for flip in &receipt.flips {
            tracing::info!(
                tile_id = %flip.tile_id,
                new_owner = %flip.new_owner,
                previous_owner = %flip.previous_owner,
                "Tile flipped"
            );
        }

        Ok(IngestResult {
            run_id,
            activity_type: activity,
            distance_km,
            duration_sec,
            verdict,
            tiles: receipt.outcomes,
            flipped: receipt.flips,
            stats: receipt.stats,
        })
    }
}

/// Path, corridor, tiles and the run record for an accepted submission.
fn build_run(
    user_id: String,
    activity: ActivityType,
    submission: RunSubmission,
    verdict: Verdict,
    max_tiles: usize,
    now: String,
) -> Result<(Run, Vec<TileClaim>)> {
    let path = build_path(&submission.points).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let tiles = tiles_touched_within(&path.corridor, max_tiles).map_err(|e| match e {
        GridError::TooManyTiles { limit } => AppError::BadRequest(format!(
            "Run touches more than {} tiles, the most allowed per run",
            limit
        )),
        other => AppError::Internal(anyhow::anyhow!("Tile scan failed: {}", other)),
    })?;

    let claims = tiles
        .iter()
        .map(|tile_id| {
            tile_geojson(tile_id).map(|geometry| TileClaim {
                tile_id: tile_id.clone(),
                geometry,
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Tile geometry error: {}", e)))?;

    let corridor = path
        .corridor_geojson()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Corridor encoding error: {}", e)))?;
    let summary_polyline = path
        .summary_polyline()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Polyline error: {}", e)))?;

    // Authoritative distance and duration
    let span_secs = sample_span_secs(&submission.points);
    let distance_km =
        authoritative_distance_km(path.length_km, submission.distance_km, activity, span_secs);
    let duration_sec = if span_secs > 0.0 {
        span_secs
    } else {
        submission.duration_sec.unwrap_or(0.0)
    };

    let run = Run {
        id: derive_run_id(&user_id, activity, &submission.points),
        user_id,
        activity_type: activity,
        raw_points: submission.points,
        geometry: corridor,
        summary_polyline,
        distance_km,
        client_distance_km: submission.distance_km,
        duration_sec,
        validation: verdict,
        tiles: tiles.into_iter().collect(),
        created_at: now,
    };
    check_record_size(&run)?;

    Ok((run, claims))
}

/// Refuse runs whose stored record would not fit in one document.
fn check_record_size(run: &Run) -> Result<()> {
    let bytes = serde_json::to_vec(run)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Run encoding error: {}", e)))?
        .len();
    if bytes > MAX_RUN_RECORD_BYTES {
        return Err(AppError::BadRequest(format!(
            "Run is too large to store ({} points, {} bytes encoded; at most {} bytes)",
            run.raw_points.len(),
            bytes,
            MAX_RUN_RECORD_BYTES
        )));
    }
    Ok(())
}

/// Activity type and request-shape checks shared by ingest and preview.
fn parse_submission(submission: &RunSubmission) -> Result<ActivityType> {
    let activity: ActivityType = submission
        .activity_type
        .parse()
        .map_err(|e: crate::models::run::UnknownActivityType| AppError::BadRequest(e.to_string()))?;

    submission
        .validate()
        .map_err(|e| AppError::BadRequest(format!("Invalid run submission: {}", e)))?;

    Ok(activity)
}

/// Seconds between the first and last sample, or zero when the timestamps
/// are too far apart to subtract.
fn sample_span_secs(points: &[GpsSample]) -> f64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => last
            .timestamp_ms
            .checked_sub(first.timestamp_ms)
            .map_or(0.0, |ms| ms as f64 / 1000.0),
        _ => 0.0,
    }
}

/// Computed path length, or the client hint when the path has zero length.
///
/// The hint is capped at what the activity's typical top speed could cover
/// in the sampled time span.
fn authoritative_distance_km(
    computed_km: f64,
    hint_km: Option<f64>,
    activity: ActivityType,
    span_secs: f64,
) -> f64 {
    if computed_km > 0.0 {
        return computed_km;
    }
    match hint_km {
        Some(hint) if hint > 0.0 => {
            let cap_km = activity.profile().typical_max_mps() * span_secs.max(0.0) / 1000.0;
            hint.min(cap_km)
        }
        _ => 0.0,
    }
}
