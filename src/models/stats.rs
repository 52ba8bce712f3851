//! Per-user aggregate statistics.
//!
//! These are rolled forward inside the same transaction that commits a run,
//! so readers get totals with a single document read. They are derived data:
//! `rebuild` reproduces them from the user's runs and owned territories.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Run;
use crate::services::grid::TILE_AREA_KM2;

/// Pre-computed statistics for a user.
///
/// Stored at: `user_stats/{user_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,

    // ─── Distance / Time ─────────────────────────────────────────
    /// Total authoritative distance across committed runs
    #[serde(default)]
    pub total_distance_km: f64,
    #[serde(default)]
    pub total_duration_sec: f64,
    #[serde(default)]
    pub total_runs: u32,

    // ─── Territory ───────────────────────────────────────────────
    /// Tiles currently owned (fresh count at last commit)
    #[serde(default)]
    pub territories_owned: u32,
    /// `territories_owned` × nominal tile area
    #[serde(default)]
    pub area_km2: f64,

    // ─── Breakdowns ──────────────────────────────────────────────
    /// Run count per activity type
    #[serde(default)]
    pub runs_by_activity: HashMap<String, u32>,
    /// Distance per activity type (km)
    #[serde(default)]
    pub distance_by_activity: HashMap<String, f64>,
    /// Run count per month ("YYYY-MM" format)
    #[serde(default)]
    pub runs_by_month: HashMap<String, u32>,

    // ─── Metadata ────────────────────────────────────────────────
    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl UserStats {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_distance_km: 0.0,
            total_duration_sec: 0.0,
            total_runs: 0,
            territories_owned: 0,
            area_km2: 0.0,
            runs_by_activity: HashMap::new(),
            distance_by_activity: HashMap::new(),
            runs_by_month: HashMap::new(),
            updated_at: String::new(),
        }
    }

    /// Roll a committed run into the running totals.
    pub fn apply_run(&mut self, run: &Run, now: &str) {
        self.total_runs += 1;
        self.total_distance_km += run.distance_km;
        self.total_duration_sec += run.duration_sec;

        let activity = run.activity_type.as_str().to_string();
        *self.runs_by_activity.entry(activity.clone()).or_insert(0) += 1;
        *self.distance_by_activity.entry(activity).or_insert(0.0) += run.distance_km;

        if let Some(month_key) = extract_month_key(&run.created_at) {
            *self.runs_by_month.entry(month_key).or_insert(0) += 1;
        }

        self.updated_at = now.to_string();
    }

    /// Replace the territory count and the area derived from it.
    pub fn set_territories_owned(&mut self, count: u32, now: &str) {
        self.territories_owned = count;
        self.area_km2 = f64::from(count) * TILE_AREA_KM2;
        self.updated_at = now.to_string();
    }

    /// Recompute from scratch given every run by the user and their current
    /// territory count.
    pub fn rebuild<'a>(
        user_id: &str,
        runs: impl IntoIterator<Item = &'a Run>,
        territories_owned: u32,
        now: &str,
    ) -> Self {
        let mut stats = Self::new(user_id);
        for run in runs {
            stats.apply_run(run, now);
        }
        stats.set_territories_owned(territories_owned, now);
        stats
    }
}

/// Extract "YYYY-MM" from an ISO 8601 date string.
fn extract_month_key(date: &str) -> Option<String> {
    // ISO 8601: "2024-01-15T10:30:00Z" -> "2024-01"
    date.get(..7).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityType, Verdict, VerdictStats};

    fn make_run(id: &str, activity: ActivityType, created_at: &str, km: f64) -> Run {
        Run {
            id: id.to_string(),
            user_id: "alice".to_string(),
            activity_type: activity,
            raw_points: vec![],
            geometry: String::new(),
            summary_polyline: String::new(),
            distance_km: km,
            client_distance_km: None,
            duration_sec: 600.0,
            validation: Verdict {
                valid: true,
                errors: vec![],
                warnings: vec![],
                capture_eligible: true,
                stats: VerdictStats::default(),
            },
            tiles: vec![],
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_apply_run_accumulates() {
        let mut stats = UserStats::new("alice");
        stats.apply_run(
            &make_run("r1", ActivityType::Running, "2026-03-02T08:00:00Z", 5.0),
            "now",
        );
        stats.apply_run(
            &make_run("r2", ActivityType::Cycling, "2026-04-10T08:00:00Z", 20.0),
            "now",
        );

        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.total_distance_km, 25.0);
        assert_eq!(stats.total_duration_sec, 1200.0);
        assert_eq!(stats.runs_by_activity.get("running"), Some(&1));
        assert_eq!(stats.distance_by_activity.get("cycling"), Some(&20.0));
        assert_eq!(stats.runs_by_month.get("2026-03"), Some(&1));
        assert_eq!(stats.runs_by_month.get("2026-04"), Some(&1));
    }

    #[test]
    fn test_area_follows_territory_count() {
        let mut stats = UserStats::new("alice");
        stats.set_territories_owned(40, "now");
        assert_eq!(stats.territories_owned, 40);
        assert!((stats.area_km2 - 40.0 * TILE_AREA_KM2).abs() < 1e-12);

        stats.set_territories_owned(0, "later");
        assert_eq!(stats.area_km2, 0.0);
        assert_eq!(stats.updated_at, "later");
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let runs = vec![
            make_run("r1", ActivityType::Running, "2026-03-02T08:00:00Z", 5.0),
            make_run("r2", ActivityType::Running, "2026-03-05T08:00:00Z", 3.5),
        ];

        let mut incremental = UserStats::new("alice");
        for run in &runs {
            incremental.apply_run(run, "now");
        }
        incremental.set_territories_owned(7, "now");

        let rebuilt = UserStats::rebuild("alice", &runs, 7, "now");
        assert_eq!(rebuilt, incremental);
    }
}
