// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Anti-cheat validation verdict.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Outcome of validating one run's GPS samples.
///
/// Computed once per submission and stored unchanged with the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Verdict {
    /// False if any hard-fail condition triggered
    pub valid: bool,
    /// Hard failures (run is rejected)
    pub errors: Vec<String>,
    /// Informational findings (run still proceeds)
    pub warnings: Vec<String>,
    /// Whether the run dwelt long enough to count for territory capture
    pub capture_eligible: bool,
    pub stats: VerdictStats,
}

/// Diagnostic figures gathered by the four analyses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct VerdictStats {
    pub max_speed_mps: f64,
    pub avg_speed_mps: f64,
    pub vehicle_segment_count: u32,
    pub max_accel_mps2: f64,
    pub suspicious_accel_count: u32,
    pub gps_jump_count: u32,
    /// Fraction of three-point windows with almost no bearing change
    pub straightness_ratio: f64,
    /// Mean reported accuracy, if the client reported any
    pub avg_accuracy_meters: Option<f64>,
    /// Elapsed time spent moving
    pub valid_dwell_seconds: f64,
    /// Elapsed time spent below the movement threshold
    pub stationary_seconds: f64,
    /// Total elapsed time across all time-ordered pairs
    pub elapsed_seconds: f64,
}

impl Verdict {
    /// Human-readable reason list for rejections.
    pub fn reasons(&self) -> String {
        self.errors.join("; ")
    }
}
