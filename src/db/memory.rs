// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store with the same commit guarantees as Firestore.
//!
//! Each tile and each user's stats document has its own async mutex. A commit
//! takes every tile lock it needs in ascending tile order, reads and plans,
//! then takes the stats locks for the runner and every user it displaces in
//! ascending user order. All writes are applied in one synchronous section
//! after the last lock is held, so a cancelled commit writes nothing.
//!
//! Territory counts are carried forward in each user's stats under the stats
//! lock; only a rebuild counts territory rows.

use crate::db::{CommitOutcome, CommitReceipt, RunCommit, RunStore};
use crate::error::AppError;
use crate::models::{Run, Territory, TerritoryHistory, UserStats};
use crate::services::conquest::ConquestPlan;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Memory-backed database. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    runs: DashMap<String, Run>,
    territories: DashMap<String, Territory>,
    /// Keyed by history document id
    history: DashMap<String, TerritoryHistory>,
    stats: DashMap<String, UserStats>,
    tile_locks: DashMap<String, Arc<Mutex<()>>>,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Lock every key in order. Callers pass sorted, distinct keys.
async fn lock_in_order(
    locks: &DashMap<String, Arc<Mutex<()>>>,
    keys: Vec<String>,
) -> Vec<OwnedMutexGuard<()>> {
    let mut guards = Vec::with_capacity(keys.len());
    for key in keys {
        let lock = locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        guards.push(lock.lock_owned().await);
    }
    guards
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn count_owned(&self, user_id: &str) -> u32 {
        self.inner
            .territories
            .iter()
            .filter(|t| t.owner_id == user_id)
            .count() as u32
    }

    /// Number of history rows across all tiles.
    pub fn history_len(&self) -> usize {
        self.inner.history.len()
    }
}

impl RunStore for MemoryDb {
    async fn commit_run(&self, commit: RunCommit) -> Result<CommitOutcome, AppError> {
        let RunCommit { run, claims, now } = commit;
        let inner = &self.inner;

        let tile_ids: BTreeSet<String> = claims.iter().map(|c| c.tile_id.clone()).collect();
        let _tile_guards =
            lock_in_order(&inner.tile_locks, tile_ids.iter().cloned().collect()).await;

        let existing: HashMap<String, Territory> = tile_ids
            .iter()
            .filter_map(|id| inner.territories.get(id).map(|t| (id.clone(), t.clone())))
            .collect();

        let plan = ConquestPlan::build(&claims, &existing, &run.user_id, &run.id, &now);

        let mut users: BTreeSet<String> = plan.losers().map(str::to_string).collect();
        users.insert(run.user_id.clone());
        let _user_guards = lock_in_order(&inner.user_locks, users.into_iter().collect()).await;

        if inner.runs.contains_key(&run.id) {
            tracing::info!(run_id = %run.id, user_id = %run.user_id, "Duplicate run, nothing written");
            return Ok(CommitOutcome::Duplicate);
        }

        // No awaits past this point
        for territory in &plan.territories {
            inner
                .territories
                .insert(territory.tile_id.clone(), territory.clone());
        }
        for entry in &plan.history {
            inner.history.insert(entry.document_id(), entry.clone());
        }

        let mut runner_stats = inner
            .stats
            .get(&run.user_id)
            .map(|s| s.clone())
            .unwrap_or_else(|| UserStats::new(&run.user_id));
        let owned_before = runner_stats.territories_owned;
        runner_stats.apply_run(&run, &now);
        runner_stats.set_territories_owned(owned_before + plan.gained, &now);
        inner
            .stats
            .insert(run.user_id.clone(), runner_stats.clone());

        for loser in plan.losers() {
            let mut stats = inner
                .stats
                .get(loser)
                .map(|s| s.clone())
                .unwrap_or_else(|| UserStats::new(loser));
            let owned_after = stats.territories_owned.saturating_sub(plan.lost_by(loser));
            stats.set_territories_owned(owned_after, &now);
            inner.stats.insert(loser.to_string(), stats);
        }

        inner.runs.insert(run.id.clone(), run.clone());

        tracing::info!(
            run_id = %run.id,
            user_id = %run.user_id,
            tiles = plan.territories.len(),
            flips = plan.flips.len(),
            "Run committed (memory)"
        );

        Ok(CommitOutcome::Committed(CommitReceipt {
            outcomes: plan.outcomes,
            flips: plan.flips,
            stats: runner_stats,
        }))
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, AppError> {
        Ok(self.inner.runs.get(run_id).map(|r| r.clone()))
    }

    async fn get_territory(&self, tile_id: &str) -> Result<Option<Territory>, AppError> {
        Ok(self.inner.territories.get(tile_id).map(|t| t.clone()))
    }

    async fn get_tile_history(&self, tile_id: &str) -> Result<Vec<TerritoryHistory>, AppError> {
        let mut rows: Vec<TerritoryHistory> = self
            .inner
            .history
            .iter()
            .filter(|h| h.tile_id == tile_id)
            .map(|h| h.clone())
            .collect();
        rows.sort_by(|a, b| {
            a.changed_at
                .cmp(&b.changed_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(rows)
    }

    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, AppError> {
        Ok(self.inner.stats.get(user_id).map(|s| s.clone()))
    }

    async fn rebuild_user_stats(&self, user_id: &str, now: &str) -> Result<UserStats, AppError> {
        let _guard = lock_in_order(&self.inner.user_locks, vec![user_id.to_string()]).await;

        let mut runs: Vec<Run> = self
            .inner
            .runs
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let stats = UserStats::rebuild(user_id, &runs, self.count_owned(user_id), now);
        self.inner.stats.insert(user_id.to_string(), stats.clone());

        tracing::info!(user_id, runs = runs.len(), "User stats rebuilt (memory)");
        Ok(stats)
    }
}
