// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Runs (committed run records)
//! - Territories (current tile ownership)
//! - Territory history (append-only ownership changes)
//! - User stats (per-user aggregates)

use crate::db::{collections, CommitOutcome, CommitReceipt, RunCommit, RunStore};
use crate::error::AppError;
use crate::models::{Run, Territory, TerritoryHistory, UserStats};
use crate::services::conquest::ConquestPlan;
use firestore::errors::{BackoffError, FirestoreError};
use futures_util::{stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;

const MAX_CONCURRENT_DB_OPS: usize = 50;
/// Firestore's limit on one commit request.
const MAX_COMMIT_BYTES: usize = 10 * 1024 * 1024;
/// Per-tile allowance on top of the tile polygon: the territory fields, one
/// history row and a displaced owner's share of the stats writes.
const TILE_WRITE_OVERHEAD_BYTES: usize = 1024;

/// Upper estimate of the commit request size for `commit`.
fn estimated_commit_bytes(commit: &RunCommit) -> usize {
    let run = serde_json::to_vec(&commit.run).map_or(0, |bytes| bytes.len());
    let tiles: usize = commit
        .claims
        .iter()
        .map(|claim| claim.geometry.len() + TILE_WRITE_OVERHEAD_BYTES)
        .sum();
    run + tiles
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Connect to the emulator with a dummy token so no local credentials
    /// are looked up.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client for tests. Every operation returns a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

/// Tiles currently owned by `user_id`, counted from territory rows.
///
/// Only used by stats rebuilds; commits carry the count forward in the
/// stats document instead.
async fn count_owned(db: &firestore::FirestoreDb, user_id: &str) -> Result<u32, FirestoreError> {
    let owner = user_id.to_string();
    let owned: Vec<Territory> = db
        .fluent()
        .select()
        .from(collections::TERRITORIES)
        .filter(|q| q.for_all([q.field("owner_id").eq(owner.clone())]))
        .obj()
        .query()
        .await?;
    Ok(owned.len() as u32)
}

async fn read_stats(
    db: &firestore::FirestoreDb,
    user_id: &str,
) -> Result<UserStats, FirestoreError> {
    let stats: Option<UserStats> = db
        .fluent()
        .select()
        .by_id_in(collections::USER_STATS)
        .obj()
        .one(user_id)
        .await?;
    Ok(stats.unwrap_or_else(|| UserStats::new(user_id)))
}

/// Reads and planning for one commit attempt.
struct PreparedCommit {
    plan: ConquestPlan,
    /// Runner first, then every displaced owner
    stats: Vec<UserStats>,
}

/// Everything a commit reads, done through the transaction's view of the
/// database. Returns None when the run already exists.
async fn prepare_commit(
    db: &firestore::FirestoreDb,
    commit: &RunCommit,
) -> Result<Option<PreparedCommit>, FirestoreError> {
    let run = &commit.run;

    let existing_run: Option<Run> = db
        .fluent()
        .select()
        .by_id_in(collections::RUNS)
        .obj()
        .one(&run.id)
        .await?;
    if existing_run.is_some() {
        return Ok(None);
    }

    let tile_ids: Vec<String> = commit.claims.iter().map(|c| c.tile_id.clone()).collect();
    let rows: Vec<Option<Territory>> = stream::iter(tile_ids)
        .map(|tile_id| {
            let db = db.clone();
            async move {
                db.fluent()
                    .select()
                    .by_id_in(collections::TERRITORIES)
                    .obj::<Territory>()
                    .one(&tile_id)
                    .await
            }
        })
        .buffered(MAX_CONCURRENT_DB_OPS)
        .try_collect()
        .await?;
    let existing: HashMap<String, Territory> = rows
        .into_iter()
        .flatten()
        .map(|t| (t.tile_id.clone(), t))
        .collect();

    let plan = ConquestPlan::build(&commit.claims, &existing, &run.user_id, &run.id, &commit.now);

    // Stats documents are read in the transaction, so the carried-forward
    // territory counts change only together with the tiles they count
    let mut runner = read_stats(db, &run.user_id).await?;
    let owned_before = runner.territories_owned;
    runner.apply_run(run, &commit.now);
    runner.set_territories_owned(owned_before + plan.gained, &commit.now);

    let mut stats = vec![runner];
    for loser in plan.losers() {
        let mut loser_stats = read_stats(db, loser).await?;
        let owned_after = loser_stats
            .territories_owned
            .saturating_sub(plan.lost_by(loser));
        loser_stats.set_territories_owned(owned_after, &commit.now);
        stats.push(loser_stats);
    }

    Ok(Some(PreparedCommit { plan, stats }))
}

impl RunStore for FirestoreDb {
    /// Commit a run and all its territory effects in one transaction.
    ///
    /// Every touched tile is read inside the transaction, so a concurrent
    /// commit that changes one of them forces this one to retry against
    /// fresh data.
    async fn commit_run(&self, commit: RunCommit) -> Result<CommitOutcome, AppError> {
        let request_bytes = estimated_commit_bytes(&commit);
        if request_bytes > MAX_COMMIT_BYTES {
            return Err(AppError::BadRequest(format!(
                "Run touches {} tiles, too many to commit atomically ({} bytes)",
                commit.claims.len(),
                request_bytes
            )));
        }

        let run_id = commit.run.id.clone();
        let user_id = commit.run.user_id.clone();
        let commit = Arc::new(commit);

        let outcome = self
            .get_client()?
            .run_transaction(|db, transaction| {
                let commit = Arc::clone(&commit);
                Box::pin(async move {
                    let Some(prepared) = prepare_commit(&db, &commit).await? else {
                        return Ok(CommitOutcome::Duplicate);
                    };

                    db.fluent()
                        .update()
                        .in_col(collections::RUNS)
                        .document_id(&commit.run.id)
                        .object(&commit.run)
                        .add_to_transaction(transaction)?;

                    for territory in &prepared.plan.territories {
                        db.fluent()
                            .update()
                            .in_col(collections::TERRITORIES)
                            .document_id(&territory.tile_id)
                            .object(territory)
                            .add_to_transaction(transaction)?;
                    }

                    for entry in &prepared.plan.history {
                        db.fluent()
                            .update()
                            .in_col(collections::TERRITORY_HISTORY)
                            .document_id(entry.document_id())
                            .object(entry)
                            .add_to_transaction(transaction)?;
                    }

                    for stats in &prepared.stats {
                        db.fluent()
                            .update()
                            .in_col(collections::USER_STATS)
                            .document_id(&stats.user_id)
                            .object(stats)
                            .add_to_transaction(transaction)?;
                    }

                    let PreparedCommit { plan, mut stats } = prepared;
                    let runner_stats = stats.swap_remove(0);

                    Ok::<_, BackoffError<FirestoreError>>(CommitOutcome::Committed(
                        CommitReceipt {
                            outcomes: plan.outcomes,
                            flips: plan.flips,
                            stats: runner_stats,
                        },
                    ))
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Run commit transaction failed: {}", e)))?;

        match &outcome {
            CommitOutcome::Committed(receipt) => tracing::info!(
                run_id = %run_id,
                user_id = %user_id,
                tiles = receipt.outcomes.len(),
                flips = receipt.flips.len(),
                "Run committed"
            ),
            CommitOutcome::Duplicate => {
                tracing::info!(run_id = %run_id, user_id = %user_id, "Duplicate run, nothing written")
            }
        }

        Ok(outcome)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::RUNS)
            .obj()
            .one(run_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_territory(&self, tile_id: &str) -> Result<Option<Territory>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TERRITORIES)
            .obj()
            .one(tile_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_tile_history(&self, tile_id: &str) -> Result<Vec<TerritoryHistory>, AppError> {
        let tile = tile_id.to_string();
        let mut rows: Vec<TerritoryHistory> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TERRITORY_HISTORY)
            .filter(|q| q.for_all([q.field("tile_id").eq(tile.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Sorted here rather than in the query to avoid a composite index
        rows.sort_by(|a, b| {
            a.changed_at
                .cmp(&b.changed_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(rows)
    }

    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USER_STATS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn rebuild_user_stats(&self, user_id: &str, now: &str) -> Result<UserStats, AppError> {
        let user = Arc::new((user_id.to_string(), now.to_string()));

        let stats = self
            .get_client()?
            .run_transaction(|db, transaction| {
                let user = Arc::clone(&user);
                Box::pin(async move {
                    let (user_id, now) = &*user;
                    let owner = user_id.clone();
                    let mut runs: Vec<Run> = db
                        .fluent()
                        .select()
                        .from(collections::RUNS)
                        .filter(|q| q.for_all([q.field("user_id").eq(owner.clone())]))
                        .obj()
                        .query()
                        .await?;
                    runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

                    let owned = count_owned(&db, user_id).await?;
                    let stats = UserStats::rebuild(user_id, &runs, owned, now);

                    db.fluent()
                        .update()
                        .in_col(collections::USER_STATS)
                        .document_id(user_id)
                        .object(&stats)
                        .add_to_transaction(transaction)?;

                    Ok::<_, BackoffError<FirestoreError>>(stats)
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Stats rebuild failed: {}", e)))?;

        tracing::info!(
            user_id,
            territories_owned = stats.territories_owned,
            total_runs = stats.total_runs,
            "User stats rebuilt"
        );
        Ok(stats)
    }
}
