// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::sync::Arc;
use turf_tracker::config::Config;
use turf_tracker::db::{Database, FirestoreDb, MemoryDb};
use turf_tracker::models::{GpsSample, RunSubmission};
use turf_tracker::routes::create_router;
use turf_tracker::services::geodesy::METERS_PER_DEGREE;
use turf_tracker::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app backed by a fresh in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState {
        config: Config::default(),
        db: Database::Memory(MemoryDb::new()),
    });

    (create_router(state.clone()), state)
}

/// Create a test JWT token.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    turf_tracker::middleware::auth::create_jwt(user_id, signing_key).unwrap()
}

/// Generate a unique user ID for test isolation.
#[allow(dead_code)]
pub fn unique_user_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

/// Samples moving at a constant speed and heading, one every `dt_ms`.
///
/// Heading is in degrees clockwise from north.
#[allow(dead_code)]
pub fn steady_track(
    start_lat: f64,
    start_lon: f64,
    heading_deg: f64,
    speed_mps: f64,
    dt_ms: i64,
    count: usize,
) -> Vec<GpsSample> {
    let step_m = speed_mps * dt_ms as f64 / 1000.0;
    let (sin, cos) = heading_deg.to_radians().sin_cos();
    let dlat = step_m * cos / METERS_PER_DEGREE;
    let dlon = step_m * sin / (METERS_PER_DEGREE * start_lat.to_radians().cos());

    (0..count)
        .map(|i| {
            GpsSample::new(
                start_lat + i as f64 * dlat,
                start_lon + i as f64 * dlon,
                1_767_225_600_000 + i as i64 * dt_ms,
            )
        })
        .collect()
}

/// A five-minute jog heading north from the given start.
#[allow(dead_code)]
pub fn jog_from(lat: f64, lon: f64) -> Vec<GpsSample> {
    steady_track(lat, lon, 0.0, 3.0, 1000, 301)
}

#[allow(dead_code)]
pub fn submission(points: Vec<GpsSample>, activity: &str) -> RunSubmission {
    RunSubmission {
        points,
        activity_type: activity.to_string(),
        distance_km: None,
        duration_sec: None,
    }
}

/// Same samples, shifted later in time (a distinct run over the same route).
#[allow(dead_code)]
pub fn shifted(points: &[GpsSample], offset_ms: i64) -> Vec<GpsSample> {
    points
        .iter()
        .map(|p| GpsSample {
            timestamp_ms: p.timestamp_ms + offset_ms,
            ..*p
        })
        .collect()
}
