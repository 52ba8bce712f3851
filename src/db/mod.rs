//! Database layer (Firestore, or in-process memory for development and tests).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{FlipEvent, Run, Territory, TerritoryHistory, TileClaim, TileOutcome, UserStats};
use std::future::Future;

/// Collection names as constants.
pub mod collections {
    /// Committed runs (keyed by run id)
    pub const RUNS: &str = "runs";
    /// Current tile ownership (keyed by tile id)
    pub const TERRITORIES: &str = "territories";
    /// Ownership changes (keyed by `{run_id}_{tile_id}`)
    pub const TERRITORY_HISTORY: &str = "territory_history";
    /// User stats aggregates (keyed by user_id)
    pub const USER_STATS: &str = "user_stats";
}

/// Everything needed to commit one validated run.
#[derive(Debug, Clone)]
pub struct RunCommit {
    pub run: Run,
    /// Touched tiles in ascending id order
    pub claims: Vec<TileClaim>,
    pub now: String,
}

/// What a successful commit changed.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub outcomes: Vec<TileOutcome>,
    pub flips: Vec<FlipEvent>,
    /// The runner's stats after the commit
    pub stats: UserStats,
}

#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Committed(CommitReceipt),
    /// A run with this id already exists; nothing was written
    Duplicate,
}

/// Persistence operations for runs and territory.
///
/// `commit_run` is all-or-nothing: the run record, every touched tile,
/// history rows and the affected users' stats are written together or not
/// at all, and concurrent commits touching the same tile are serialized.
pub trait RunStore: Send + Sync {
    fn commit_run(
        &self,
        commit: RunCommit,
    ) -> impl Future<Output = Result<CommitOutcome, AppError>> + Send;

    fn get_run(&self, run_id: &str) -> impl Future<Output = Result<Option<Run>, AppError>> + Send;

    fn get_territory(
        &self,
        tile_id: &str,
    ) -> impl Future<Output = Result<Option<Territory>, AppError>> + Send;

    /// Ownership changes for a tile, oldest first.
    fn get_tile_history(
        &self,
        tile_id: &str,
    ) -> impl Future<Output = Result<Vec<TerritoryHistory>, AppError>> + Send;

    fn get_user_stats(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<UserStats>, AppError>> + Send;

    /// Recompute a user's stats from their runs and current territory.
    fn rebuild_user_stats(
        &self,
        user_id: &str,
        now: &str,
    ) -> impl Future<Output = Result<UserStats, AppError>> + Send;
}

/// Storage backend chosen at startup.
#[derive(Clone)]
pub enum Database {
    Firestore(FirestoreDb),
    Memory(MemoryDb),
}

impl RunStore for Database {
    async fn commit_run(&self, commit: RunCommit) -> Result<CommitOutcome, AppError> {
        match self {
            Database::Firestore(db) => db.commit_run(commit).await,
            Database::Memory(db) => db.commit_run(commit).await,
        }
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, AppError> {
        match self {
            Database::Firestore(db) => db.get_run(run_id).await,
            Database::Memory(db) => db.get_run(run_id).await,
        }
    }

    async fn get_territory(&self, tile_id: &str) -> Result<Option<Territory>, AppError> {
        match self {
            Database::Firestore(db) => db.get_territory(tile_id).await,
            Database::Memory(db) => db.get_territory(tile_id).await,
        }
    }

    async fn get_tile_history(&self, tile_id: &str) -> Result<Vec<TerritoryHistory>, AppError> {
        match self {
            Database::Firestore(db) => db.get_tile_history(tile_id).await,
            Database::Memory(db) => db.get_tile_history(tile_id).await,
        }
    }

    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, AppError> {
        match self {
            Database::Firestore(db) => db.get_user_stats(user_id).await,
            Database::Memory(db) => db.get_user_stats(user_id).await,
        }
    }

    async fn rebuild_user_stats(&self, user_id: &str, now: &str) -> Result<UserStats, AppError> {
        match self {
            Database::Firestore(db) => db.rebuild_user_stats(user_id, now).await,
            Database::Memory(db) => db.rebuild_user_stats(user_id, now).await,
        }
    }
}
