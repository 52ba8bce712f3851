// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::Value;
use turf_tracker::error::AppError;
use turf_tracker::models::{ActivityType, GpsSample};
use turf_tracker::services::validate;

async fn render(err: AppError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_input_errors_map_to_client_statuses() {
    let (status, body) = render(AppError::BadRequest("points: too few".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert_eq!(body["details"], "points: too few");
    assert!(body.get("verdict").is_none());

    let (status, body) = render(AppError::Conflict("run abc".to_string())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = render(AppError::NotFound("tile".to_string())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejected_run_carries_verdict() {
    let points = vec![
        GpsSample::new(37.0, -122.0, 0),
        GpsSample::new(37.0, -122.0, 30_000),
    ];
    let mut verdict = validate(&points, ActivityType::Running).unwrap();
    verdict.valid = false;
    verdict.errors.push("Vehicle-speed movement detected".to_string());

    let (status, body) = render(AppError::RunRejected(Box::new(verdict))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "run_rejected");
    assert_eq!(body["verdict"]["valid"], false);
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("Vehicle-speed movement detected"));
}

#[tokio::test]
async fn test_server_errors_hide_details() {
    let (status, body) = render(AppError::Database("connection reset".to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "database_error");
    assert!(body.get("details").is_none());

    let (status, body) = render(AppError::Internal(anyhow::anyhow!("boom"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.get("details").is_none());
}
