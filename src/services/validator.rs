// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Anti-cheat validation of GPS runs.
//!
//! Four independent analyses run over consecutive sample pairs:
//! 1. Speed: sustained vehicle speed is a hard failure
//! 2. Acceleration: implausible speed changes produce a warning
//! 3. GPS quality: repeated position jumps are a hard failure
//! 4. Dwell: runs too short to capture territory produce a warning
//!
//! The verdict is a pure function of the samples, the activity type, the
//! optional client distance hint and the policy. Pairs whose timestamps do
//! not advance are excluded from every rate calculation.

use crate::models::{ActivityType, GpsSample, Verdict, VerdictStats};
use crate::services::geodesy::{angle_deviation_deg, haversine_m, initial_bearing_deg};

/// Consecutive over-threshold segments tolerated before counting vehicle travel.
const VEHICLE_STREAK_ALLOWANCE: u32 = 5;

/// Fastest plausible change of speed for a person, m/s².
const MAX_HUMAN_ACCEL_MPS2: f64 = 4.0;
/// Pairs further apart than this are too coarse for acceleration.
const ACCEL_WINDOW_SECS: f64 = 10.0;
/// Over-ceiling acceleration only counts as suspicious below this interval.
const ACCEL_SUSPICIOUS_DT_SECS: f64 = 3.0;
const SUSPICIOUS_ACCEL_WARNING_COUNT: u32 = 3;

const GPS_JUMP_WINDOW_SECS: f64 = 5.0;
const GPS_JUMP_DISTANCE_M: f64 = 100.0;
const MAX_GPS_JUMPS: u32 = 5;

/// Bearing change below which a three-point window counts as "too straight".
const STRAIGHT_ANGLE_DEG: f64 = 2.0;
const COARSE_ACCURACY_M: f64 = 30.0;

const STATIONARY_DISTANCE_M: f64 = 2.0;
pub const MIN_DWELL_SECS: f64 = 180.0;

/// The client hint may exceed the tracked path by this much without comment.
const DISTANCE_HINT_TOLERANCE_KM: f64 = 1.0;
const DISTANCE_HINT_MAX_RATIO: f64 = 2.0;

/// Knobs that change how findings are classified.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationPolicy {
    /// Treat a too-short dwell as a hard failure instead of a warning.
    pub enforce_min_dwell: bool,
}

/// Input that cannot be validated at all.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationInputError {
    #[error("At least 2 points are required, got {0}")]
    TooFewPoints(usize),

    #[error("Point {0} has a non-finite coordinate")]
    NonFiniteCoordinate(usize),
}

/// Validate with the default policy and no distance hint.
pub fn validate(
    points: &[GpsSample],
    activity: ActivityType,
) -> Result<Verdict, ValidationInputError> {
    validate_with(points, activity, None, ValidationPolicy::default())
}

/// Validate a run, optionally checking a client-reported distance.
pub fn validate_with(
    points: &[GpsSample],
    activity: ActivityType,
    distance_hint_km: Option<f64>,
    policy: ValidationPolicy,
) -> Result<Verdict, ValidationInputError> {
    if points.len() < 2 {
        return Err(ValidationInputError::TooFewPoints(points.len()));
    }
    if let Some(idx) = points
        .iter()
        .position(|p| !p.lat.is_finite() || !p.lon.is_finite())
    {
        return Err(ValidationInputError::NonFiniteCoordinate(idx));
    }

    let segments = segments(points);
    let mut findings = Findings::default();
    let mut stats = VerdictStats::default();

    check_speed(&segments, activity, &mut stats, &mut findings);
    check_acceleration(&segments, &mut stats, &mut findings);
    check_gps_quality(points, &segments, distance_hint_km, &mut stats, &mut findings);
    let capture_eligible = check_dwell(&segments, policy, &mut stats, &mut findings);

    let verdict = Verdict {
        valid: findings.errors.is_empty(),
        errors: findings.errors,
        warnings: findings.warnings,
        capture_eligible,
        stats,
    };

    tracing::debug!(
        activity = %activity,
        points = points.len(),
        valid = verdict.valid,
        errors = verdict.errors.len(),
        warnings = verdict.warnings.len(),
        max_speed_mps = verdict.stats.max_speed_mps,
        gps_jumps = verdict.stats.gps_jump_count,
        "Run validated"
    );

    Ok(verdict)
}

#[derive(Default)]
struct Findings {
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Measurements for one consecutive sample pair.
#[derive(Debug, Clone, Copy)]
struct Segment {
    dist_m: f64,
    /// None when the timestamps do not advance
    timing: Option<Timing>,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    dt_secs: f64,
    speed_mps: f64,
}

fn segments(points: &[GpsSample]) -> Vec<Segment> {
    points
        .windows(2)
        .map(|w| {
            let dist_m = haversine_m(w[0].geo_point(), w[1].geo_point());
            // Unsubtractable timestamps count as untimed
            let dt_secs = w[1]
                .timestamp_ms
                .checked_sub(w[0].timestamp_ms)
                .map_or(0.0, |ms| ms as f64 / 1000.0);
            let timing = (dt_secs > 0.0).then(|| Timing {
                dt_secs,
                speed_mps: dist_m / dt_secs,
            });
            Segment { dist_m, timing }
        })
        .collect()
}

/// Time-ordered segments only.
fn timed(segments: &[Segment]) -> impl Iterator<Item = (f64, Timing)> + '_ {
    segments
        .iter()
        .filter_map(|s| s.timing.map(|t| (s.dist_m, t)))
}

fn check_speed(
    segments: &[Segment],
    activity: ActivityType,
    stats: &mut VerdictStats,
    findings: &mut Findings,
) {
    let profile = activity.profile();
    let vehicle_mps = profile.vehicle_mps();

    let mut streak = 0u32;
    let mut total_dist = 0.0;
    let mut total_time = 0.0;

    for (dist_m, t) in timed(segments) {
        stats.max_speed_mps = stats.max_speed_mps.max(t.speed_mps);
        total_dist += dist_m;
        total_time += t.dt_secs;

        if t.speed_mps > vehicle_mps {
            streak += 1;
            if streak > VEHICLE_STREAK_ALLOWANCE {
                stats.vehicle_segment_count += 1;
            }
        } else {
            streak = 0;
        }
    }

    if total_time > 0.0 {
        stats.avg_speed_mps = total_dist / total_time;
    }

    if stats.vehicle_segment_count > 0 {
        findings.errors.push(format!(
            "Vehicle-speed movement detected: {} segments sustained above {:.0} km/h for {}",
            stats.vehicle_segment_count, profile.vehicle_kmh, activity
        ));
    } else if stats.max_speed_mps > profile.typical_max_mps() {
        findings.warnings.push(format!(
            "Peak speed {:.1} km/h is above typical for {}",
            stats.max_speed_mps * 3.6,
            activity
        ));
    }
}

fn check_acceleration(segments: &[Segment], stats: &mut VerdictStats, findings: &mut Findings) {
    let mut prev_speed: Option<f64> = None;

    for (_, t) in timed(segments) {
        if t.dt_secs <= ACCEL_WINDOW_SECS {
            if let Some(prev) = prev_speed {
                let accel = (t.speed_mps - prev).abs() / t.dt_secs;
                stats.max_accel_mps2 = stats.max_accel_mps2.max(accel);
                if accel > MAX_HUMAN_ACCEL_MPS2 && t.dt_secs < ACCEL_SUSPICIOUS_DT_SECS {
                    stats.suspicious_accel_count += 1;
                }
            }
        }
        prev_speed = Some(t.speed_mps);
    }

    if stats.suspicious_accel_count > SUSPICIOUS_ACCEL_WARNING_COUNT {
        findings.warnings.push(format!(
            "Suspicious acceleration: {} changes above {:.1} m/s²",
            stats.suspicious_accel_count, MAX_HUMAN_ACCEL_MPS2
        ));
    }
}

fn check_gps_quality(
    points: &[GpsSample],
    segments: &[Segment],
    distance_hint_km: Option<f64>,
    stats: &mut VerdictStats,
    findings: &mut Findings,
) {
    stats.gps_jump_count = timed(segments)
        .filter(|(dist_m, t)| t.dt_secs < GPS_JUMP_WINDOW_SECS && *dist_m > GPS_JUMP_DISTANCE_M)
        .count() as u32;

    if stats.gps_jump_count > MAX_GPS_JUMPS {
        findings.errors.push(format!(
            "Too many GPS jumps ({}): possible location spoofing",
            stats.gps_jump_count
        ));
    }

    // Straightness over three-point windows. Windows with an untimed or
    // near-zero leg have no meaningful bearing and are skipped.
    let mut windows = 0u32;
    let mut straight = 0u32;
    for (i, pair) in segments.windows(2).enumerate() {
        let usable = |s: &Segment| s.timing.is_some() && s.dist_m >= STATIONARY_DISTANCE_M;
        if !usable(&pair[0]) || !usable(&pair[1]) {
            continue;
        }
        let b1 = initial_bearing_deg(points[i].geo_point(), points[i + 1].geo_point());
        let b2 = initial_bearing_deg(points[i + 1].geo_point(), points[i + 2].geo_point());
        windows += 1;
        if angle_deviation_deg(b1, b2) < STRAIGHT_ANGLE_DEG {
            straight += 1;
        }
    }
    if windows > 0 {
        stats.straightness_ratio = f64::from(straight) / f64::from(windows);
    }

    let accuracies: Vec<f64> = points.iter().filter_map(|p| p.accuracy_m).collect();
    if !accuracies.is_empty() {
        let avg = accuracies.iter().sum::<f64>() / accuracies.len() as f64;
        stats.avg_accuracy_meters = Some(avg);
        if avg > COARSE_ACCURACY_M {
            findings
                .warnings
                .push(format!("Low GPS accuracy: average {:.0} m", avg));
        }
    }

    if let Some(hint_km) = distance_hint_km {
        let tracked_km = segments.iter().map(|s| s.dist_m).sum::<f64>() / 1000.0;
        if hint_km - tracked_km > DISTANCE_HINT_TOLERANCE_KM
            && hint_km > tracked_km * DISTANCE_HINT_MAX_RATIO
        {
            findings.errors.push(format!(
                "GPS jump suspected: reported distance {:.2} km but tracked path is {:.2} km",
                hint_km, tracked_km
            ));
        }
    }
}

/// Returns whether the run dwelt long enough to capture territory.
fn check_dwell(
    segments: &[Segment],
    policy: ValidationPolicy,
    stats: &mut VerdictStats,
    findings: &mut Findings,
) -> bool {
    for (dist_m, t) in timed(segments) {
        stats.elapsed_seconds += t.dt_secs;
        if dist_m < STATIONARY_DISTANCE_M {
            stats.stationary_seconds += t.dt_secs;
        }
    }
    stats.valid_dwell_seconds = stats.elapsed_seconds - stats.stationary_seconds;

    let eligible = stats.elapsed_seconds >= MIN_DWELL_SECS;
    if !eligible {
        let message = format!(
            "Run lasted {:.0}s; at least {:.0}s is needed to capture territory",
            stats.elapsed_seconds, MIN_DWELL_SECS
        );
        if policy.enforce_min_dwell {
            findings.errors.push(message);
        } else {
            findings.warnings.push(message);
        }
    }
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::geodesy::METERS_PER_DEGREE;

    /// Samples heading north at a constant speed, one per `dt_ms`.
    fn track(n: usize, speed_mps: f64, dt_ms: i64) -> Vec<GpsSample> {
        let step_deg = speed_mps * (dt_ms as f64 / 1000.0) / METERS_PER_DEGREE;
        (0..n)
            .map(|i| GpsSample::new(37.0 + i as f64 * step_deg, -122.0, i as i64 * dt_ms))
            .collect()
    }

    #[test]
    fn test_steady_jog_is_clean() {
        // 3 m/s for 5 minutes
        let verdict = validate(&track(301, 3.0, 1000), ActivityType::Running).unwrap();
        assert!(verdict.valid);
        assert!(verdict.errors.is_empty());
        assert!(verdict.warnings.is_empty(), "{:?}", verdict.warnings);
        assert!(verdict.capture_eligible);
        assert!((verdict.stats.avg_speed_mps - 3.0).abs() < 0.01);
        assert_eq!(verdict.stats.vehicle_segment_count, 0);
        assert!((verdict.stats.elapsed_seconds - 300.0).abs() < 1e-9);
        assert!(verdict.stats.straightness_ratio > 0.99);
    }

    #[test]
    fn test_vehicle_streak_needs_more_than_five_segments() {
        // Exactly 5 fast segments: tolerated
        let five = track(6, 11.2, 1000);
        let verdict = validate(&five, ActivityType::Running).unwrap();
        assert_eq!(verdict.stats.vehicle_segment_count, 0);
        assert!(verdict.valid);

        // 6 fast segments: the sixth counts
        let six = track(7, 11.2, 1000);
        let verdict = validate(&six, ActivityType::Running).unwrap();
        assert_eq!(verdict.stats.vehicle_segment_count, 1);
        assert!(!verdict.valid);
    }

    #[test]
    fn test_same_speed_is_fine_for_cycling() {
        // 40 km/h is below the cycling vehicle threshold
        let verdict = validate(&track(400, 11.2, 1000), ActivityType::Cycling).unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.stats.vehicle_segment_count, 0);
    }

    #[test]
    fn test_fast_but_human_speed_warns() {
        // 6.5 m/s (23.4 km/h) is above typical running max, below vehicle
        let verdict = validate(&track(301, 6.5, 1000), ActivityType::Running).unwrap();
        assert!(verdict.valid);
        assert!(verdict.warnings.iter().any(|w| w.contains("Peak speed")));
    }

    #[test]
    fn test_acceleration_spikes_warn_but_do_not_fail() {
        // Alternate 1 m/s and 6 m/s legs at 1 Hz: every change is 5 m/s²
        let mut points = vec![GpsSample::new(37.0, -122.0, 0)];
        let mut lat = 37.0;
        for i in 1..=300 {
            let speed = if i % 2 == 0 { 1.0 } else { 6.0 };
            lat += speed / METERS_PER_DEGREE;
            points.push(GpsSample::new(lat, -122.0, i * 1000));
        }

        let verdict = validate(&points, ActivityType::Running).unwrap();
        assert!(verdict.valid);
        assert!(verdict.stats.suspicious_accel_count > SUSPICIOUS_ACCEL_WARNING_COUNT);
        assert!((verdict.stats.max_accel_mps2 - 5.0).abs() < 0.01);
        assert!(verdict
            .warnings
            .iter()
            .any(|w| w.contains("Suspicious acceleration")));
    }

    #[test]
    fn test_slow_acceleration_is_not_suspicious() {
        // Same speed swing over 4 s intervals stays under the short-interval rule
        let mut points = vec![GpsSample::new(37.0, -122.0, 0)];
        let mut lat = 37.0;
        for i in 1..=60 {
            let speed = if i % 2 == 0 { 1.0 } else { 6.0 };
            lat += speed * 4.0 / METERS_PER_DEGREE;
            points.push(GpsSample::new(lat, -122.0, i * 4000));
        }
        let verdict = validate(&points, ActivityType::Running).unwrap();
        assert_eq!(verdict.stats.suspicious_accel_count, 0);
    }

    #[test]
    fn test_repeated_gps_jumps_fail() {
        let mut points = track(241, 2.5, 1000);
        // Six isolated 150 m teleports within one-second intervals
        for k in 0..6 {
            let idx = 20 + k * 30;
            points[idx].lon += 150.0 / (METERS_PER_DEGREE * 37.0_f64.to_radians().cos());
        }

        let verdict = validate(&points, ActivityType::Cycling).unwrap();
        assert!(verdict.stats.gps_jump_count > MAX_GPS_JUMPS);
        assert!(!verdict.valid);
        assert!(verdict.errors.iter().any(|e| e.contains("GPS jumps")));
    }

    #[test]
    fn test_coarse_accuracy_warns() {
        let points: Vec<GpsSample> = track(200, 3.0, 1000)
            .into_iter()
            .map(|p| p.with_accuracy(45.0))
            .collect();
        let verdict = validate(&points, ActivityType::Running).unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.stats.avg_accuracy_meters, Some(45.0));
        assert!(verdict.warnings.iter().any(|w| w.contains("accuracy")));
    }

    #[test]
    fn test_short_dwell_policy() {
        let points = track(61, 3.0, 1000);

        let lenient = validate(&points, ActivityType::Running).unwrap();
        assert!(lenient.valid);
        assert!(!lenient.capture_eligible);
        assert!(lenient.warnings.iter().any(|w| w.contains("capture")));

        let strict = validate_with(
            &points,
            ActivityType::Running,
            None,
            ValidationPolicy {
                enforce_min_dwell: true,
            },
        )
        .unwrap();
        assert!(!strict.valid);
        assert!(!strict.capture_eligible);
    }

    #[test]
    fn test_stationary_time_is_tracked() {
        let mut points = track(100, 3.0, 1000);
        let last = *points.last().unwrap();
        // Stand still for 100 s
        for i in 1..=100 {
            points.push(GpsSample::new(last.lat, last.lon, last.timestamp_ms + i * 1000));
        }
        let verdict = validate(&points, ActivityType::Running).unwrap();
        assert!((verdict.stats.stationary_seconds - 100.0).abs() < 1e-9);
        assert!((verdict.stats.valid_dwell_seconds - 99.0).abs() < 1e-9);
        assert!(verdict.capture_eligible);
    }

    #[test]
    fn test_out_of_order_pairs_are_skipped() {
        let mut points = track(250, 3.0, 1000);
        points[100].timestamp_ms = points[99].timestamp_ms;
        points[150].timestamp_ms = points[149].timestamp_ms - 5000;

        let verdict = validate(&points, ActivityType::Running).unwrap();
        assert!(verdict.valid);
        assert!(verdict.stats.max_speed_mps.is_finite());
        assert!(verdict.stats.max_accel_mps2.is_finite());
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let points = vec![
            GpsSample::new(37.0, -122.0, i64::MIN),
            GpsSample::new(37.0001, -122.0, i64::MAX),
            GpsSample::new(37.0002, -122.0, i64::MIN),
        ];
        let verdict = validate(&points, ActivityType::Running).unwrap();
        assert!(verdict.stats.max_speed_mps.is_finite());
        assert!(verdict.stats.max_accel_mps2.is_finite());
    }

    #[test]
    fn test_input_errors() {
        assert_eq!(
            validate(&[GpsSample::new(37.0, -122.0, 0)], ActivityType::Running).unwrap_err(),
            ValidationInputError::TooFewPoints(1)
        );
        let nan = vec![
            GpsSample::new(37.0, -122.0, 0),
            GpsSample::new(f64::NAN, -122.0, 1000),
        ];
        assert_eq!(
            validate(&nan, ActivityType::Running).unwrap_err(),
            ValidationInputError::NonFiniteCoordinate(1)
        );
    }

    #[test]
    fn test_distance_hint_mismatch_is_flagged() {
        // ~50 m tracked, 5 km claimed
        let points = vec![
            GpsSample::new(37.0, -122.0, 0),
            GpsSample::new(37.00045, -122.0, 200_000),
        ];
        let verdict =
            validate_with(&points, ActivityType::Running, Some(5.0), ValidationPolicy::default())
                .unwrap();
        assert!(!verdict.valid);
        assert!(verdict.errors.iter().any(|e| e.contains("GPS jump")));

        // A modest overestimate is accepted
        let track = track(301, 3.0, 1000);
        let verdict =
            validate_with(&track, ActivityType::Running, Some(1.2), ValidationPolicy::default())
                .unwrap();
        assert!(verdict.valid);
    }
}
