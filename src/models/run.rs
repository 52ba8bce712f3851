// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run submissions, GPS samples and the persisted run record.

use crate::models::coords::GeoPoint;
use crate::models::verdict::Verdict;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Length of the hex run id (128 bits of the SHA-256 digest).
const RUN_ID_HEX_LEN: usize = 32;

/// A single GPS fix as captured by the client.
///
/// Field names match the client wire format; the same shape is persisted
/// verbatim in the run record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GpsSample {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[serde(rename = "lng")]
    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: f64,
    /// Unix epoch milliseconds
    #[serde(rename = "timestamp")]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub timestamp_ms: i64,
    /// Reported horizontal accuracy in meters
    #[serde(rename = "accuracy", default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub accuracy_m: Option<f64>,
}

impl GpsSample {
    pub fn new(lat: f64, lon: f64, timestamp_ms: i64) -> Self {
        Self {
            lat,
            lon,
            timestamp_ms,
            accuracy_m: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// Storage-order position of this sample.
    pub fn geo_point(&self) -> GeoPoint {
        GeoPoint::new(self.lon, self.lat)
    }
}

/// Declared activity. Selects the speed profile used by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ActivityType {
    /// Running or walking
    Running,
    Cycling,
}

/// Speed limits for an activity type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedProfile {
    /// Fastest speed considered normal for the activity (warning above this)
    pub typical_max_kmh: f64,
    /// Sustained speed above this is treated as motorized travel
    pub vehicle_kmh: f64,
}

impl SpeedProfile {
    pub fn typical_max_mps(&self) -> f64 {
        self.typical_max_kmh / 3.6
    }

    pub fn vehicle_mps(&self) -> f64 {
        self.vehicle_kmh / 3.6
    }
}

impl ActivityType {
    pub fn profile(self) -> SpeedProfile {
        match self {
            ActivityType::Running => SpeedProfile {
                typical_max_kmh: 20.0,
                vehicle_kmh: 25.0,
            },
            ActivityType::Cycling => SpeedProfile {
                typical_max_kmh: 45.0,
                vehicle_kmh: 60.0,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Running => "running",
            ActivityType::Cycling => "cycling",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown activity type '{0}' (expected running, walking or cycling)")]
pub struct UnknownActivityType(pub String);

impl FromStr for ActivityType {
    type Err = UnknownActivityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" | "walking" => Ok(ActivityType::Running),
            "cycling" => Ok(ActivityType::Cycling),
            _ => Err(UnknownActivityType(s.to_string())),
        }
    }
}

/// Inbound run payload from the client.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RunSubmission {
    #[validate(length(min = 2, max = 10000), nested)]
    pub points: Vec<GpsSample>,
    /// Parsed into [`ActivityType`] by the ingest pipeline so that unknown
    /// values produce a descriptive error instead of a generic decode failure.
    pub activity_type: String,
    /// Client-side distance estimate (hint only)
    #[validate(range(min = 0.0))]
    pub distance_km: Option<f64>,
    /// Client-side duration estimate (hint only)
    #[validate(range(min = 0.0))]
    pub duration_sec: Option<f64>,
}

/// Stored run record.
///
/// Written in the same transaction as every territory change it causes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Content-derived run id (also used as document ID)
    pub id: String,
    /// Opaque user id from the session layer
    pub user_id: String,
    pub activity_type: ActivityType,
    /// Samples exactly as submitted
    pub raw_points: Vec<GpsSample>,
    /// Buffered corridor as a GeoJSON geometry string (lon/lat order)
    pub geometry: String,
    /// Encoded path polyline (precision 5) for lightweight display
    pub summary_polyline: String,
    /// Authoritative distance
    pub distance_km: f64,
    /// Distance reported by the client, kept for auditing
    #[serde(default)]
    pub client_distance_km: Option<f64>,
    pub duration_sec: f64,
    pub validation: Verdict,
    /// Tile ids touched by the corridor, sorted
    pub tiles: Vec<String>,
    /// When the run was committed (ISO 8601)
    pub created_at: String,
}

/// Derive the stable id for a run submission.
///
/// Identical submissions from the same user map to the same id, which is what
/// makes a resubmitted run detectable as a duplicate at commit time.
pub fn derive_run_id(user_id: &str, activity: ActivityType, points: &[GpsSample]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(activity.as_str().as_bytes());
    for p in points {
        hasher.update(p.lat.to_bits().to_le_bytes());
        hasher.update(p.lon.to_bits().to_le_bytes());
        hasher.update(p.timestamp_ms.to_le_bytes());
        match p.accuracy_m {
            Some(acc) => {
                hasher.update([1u8]);
                hasher.update(acc.to_bits().to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(RUN_ID_HEX_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_type_parsing() {
        assert_eq!("running".parse::<ActivityType>().unwrap(), ActivityType::Running);
        assert_eq!("Walking".parse::<ActivityType>().unwrap(), ActivityType::Running);
        assert_eq!(" cycling ".parse::<ActivityType>().unwrap(), ActivityType::Cycling);

        let err = "driving".parse::<ActivityType>().unwrap_err();
        assert!(err.to_string().contains("driving"));
    }

    #[test]
    fn test_profiles_are_ordered() {
        for activity in [ActivityType::Running, ActivityType::Cycling] {
            let profile = activity.profile();
            assert!(profile.typical_max_kmh < profile.vehicle_kmh);
        }
        assert!((ActivityType::Running.profile().vehicle_mps() - 6.944).abs() < 0.01);
    }

    #[test]
    fn test_sample_wire_format() {
        let json = r#"{"lat":37.39,"lng":-122.08,"timestamp":1700000000000,"accuracy":4.5}"#;
        let sample: GpsSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.lat, 37.39);
        assert_eq!(sample.lon, -122.08);
        assert_eq!(sample.timestamp_ms, 1_700_000_000_000);
        assert_eq!(sample.accuracy_m, Some(4.5));
        assert_eq!(sample.geo_point(), GeoPoint::new(-122.08, 37.39));

        let no_accuracy: GpsSample =
            serde_json::from_str(r#"{"lat":1.0,"lng":2.0,"timestamp":0}"#).unwrap();
        assert_eq!(no_accuracy.accuracy_m, None);
    }

    #[test]
    fn test_submission_shape_validation() {
        let one_point = RunSubmission {
            points: vec![GpsSample::new(37.0, -122.0, 0)],
            activity_type: "running".to_string(),
            distance_km: None,
            duration_sec: None,
        };
        assert!(one_point.validate().is_err());

        let bad_latitude = RunSubmission {
            points: vec![
                GpsSample::new(37.0, -122.0, 0),
                GpsSample::new(91.0, -122.0, 1000),
            ],
            activity_type: "running".to_string(),
            distance_km: None,
            duration_sec: None,
        };
        assert!(bad_latitude.validate().is_err());

        let ok = RunSubmission {
            points: vec![
                GpsSample::new(37.0, -122.0, 0),
                GpsSample::new(37.001, -122.0, 1000),
            ],
            activity_type: "running".to_string(),
            distance_km: Some(0.1),
            duration_sec: None,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_run_id_is_stable_and_user_scoped() {
        let points = vec![
            GpsSample::new(37.0, -122.0, 0),
            GpsSample::new(37.001, -122.0, 1000).with_accuracy(5.0),
        ];

        let a = derive_run_id("alice", ActivityType::Running, &points);
        let again = derive_run_id("alice", ActivityType::Running, &points);
        let bob = derive_run_id("bob", ActivityType::Running, &points);
        let cycling = derive_run_id("alice", ActivityType::Cycling, &points);

        assert_eq!(a.len(), RUN_ID_HEX_LEN);
        assert_eq!(a, again);
        assert_ne!(a, bob);
        assert_ne!(a, cycling);
    }
}
