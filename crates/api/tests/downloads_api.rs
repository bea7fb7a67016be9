//! HTTP-level integration tests for the download endpoints.
//!
//! The test app's daemon endpoint is a closed port, so these exercise
//! the degraded mode: submissions must still produce durable records
//! and sync passes must write nothing.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, build_test_app, get, post_json, send_json};
use sqlx::PgPool;

const MAGNET: &str =
    "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=Some.Release.2024";

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// An empty submission body is a 400, not an empty record set.
#[sqlx::test(migrations = "../db/migrations")]
async fn empty_submission_is_rejected(pool: PgPool) {
    let app = build_test_app(pool);
    let response = post_json(app, "/api/v1/downloads", serde_json::json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
}

/// With the daemon unreachable a magnet submission still yields one
/// durable record, failed and carrying an error message.
#[sqlx::test(migrations = "../db/migrations")]
async fn unreachable_daemon_yields_failed_record(pool: PgPool) {
    let app = build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/downloads",
        serde_json::json!({ "magnets": [MAGNET] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "failed");
    assert_eq!(records[0]["name"], "Some.Release.2024");
    assert!(records[0]["error_message"].is_string());
}

/// An invalid magnet also becomes a failed record with a validation
/// message rather than failing the whole request.
#[sqlx::test(migrations = "../db/migrations")]
async fn invalid_magnet_becomes_failed_record(pool: PgPool) {
    let app = build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/downloads",
        serde_json::json!({ "magnets": ["not-a-magnet"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["data"][0]["status"], "failed");
}

/// Resubmitting the same info hash returns the existing record instead
/// of creating a second one.
#[sqlx::test(migrations = "../db/migrations")]
async fn duplicate_magnet_is_deduplicated(pool: PgPool) {
    let app = build_test_app(pool.clone());
    let first = post_json(
        app,
        "/api/v1/downloads",
        serde_json::json!({ "magnets": [MAGNET] }),
    )
    .await;
    let first_id = body_json(first).await["data"][0]["id"].as_i64().unwrap();

    let app = build_test_app(pool);
    let second = post_json(
        app,
        "/api/v1/downloads",
        serde_json::json!({ "magnets": [MAGNET] }),
    )
    .await;
    let body = body_json(second).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"].as_i64().unwrap(), first_id);
}

// ---------------------------------------------------------------------------
// Read endpoints
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn list_returns_submitted_records(pool: PgPool) {
    let app = build_test_app(pool.clone());
    post_json(
        app,
        "/api/v1/downloads",
        serde_json::json!({ "urls": ["https://example.com/distro.iso"] }),
    )
    .await;

    let app = build_test_app(pool);
    let response = get(app, "/api/v1/downloads").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["kind"], "http");
    assert_eq!(records[0]["name"], "distro.iso");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_download_is_404(pool: PgPool) {
    let app = build_test_app(pool);
    let response = get(app, "/api/v1/downloads/9999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Pause on a record without a daemon handle is a 400.
#[sqlx::test(migrations = "../db/migrations")]
async fn pause_without_gid_is_rejected(pool: PgPool) {
    let app = build_test_app(pool.clone());
    let response = post_json(
        app,
        "/api/v1/downloads",
        serde_json::json!({ "magnets": [MAGNET] }),
    )
    .await;
    let id = body_json(response).await["data"][0]["id"].as_i64().unwrap();

    let app = build_test_app(pool);
    let response = send_json(
        app,
        Method::PATCH,
        &format!("/api/v1/downloads/{id}"),
        serde_json::json!({ "action": "pause" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Deleting a record removes it; the daemon being gone does not matter.
#[sqlx::test(migrations = "../db/migrations")]
async fn delete_removes_the_record(pool: PgPool) {
    let app = build_test_app(pool.clone());
    let response = post_json(
        app,
        "/api/v1/downloads",
        serde_json::json!({ "magnets": [MAGNET] }),
    )
    .await;
    let id = body_json(response).await["data"][0]["id"].as_i64().unwrap();

    let app = build_test_app(pool.clone());
    let response = send_json(
        app,
        Method::DELETE,
        &format!("/api/v1/downloads/{id}"),
        serde_json::json!(null),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let app = build_test_app(pool);
    let response = get(app, &format!("/api/v1/downloads/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// An on-demand pass with the daemon unreachable reports zero updates
/// but still returns the current list.
#[sqlx::test(migrations = "../db/migrations")]
async fn sync_with_unreachable_daemon_updates_nothing(pool: PgPool) {
    let app = build_test_app(pool.clone());
    post_json(
        app,
        "/api/v1/downloads",
        serde_json::json!({ "magnets": [MAGNET] }),
    )
    .await;

    let app = build_test_app(pool);
    let response = post_json(app, "/api/v1/downloads/sync", serde_json::json!(null)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["updated"].as_array().unwrap().len(), 0);
    assert_eq!(body["data"]["downloads"].as_array().unwrap().len(), 1);
}
