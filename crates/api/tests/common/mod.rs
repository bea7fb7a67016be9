use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use magnetar_api::config::ServerConfig;
use magnetar_api::router::build_app_router;
use magnetar_api::state::AppState;
use magnetar_aria2::Aria2Client;
use magnetar_events::EventBus;
use magnetar_sync::{PostCompleteHook, Reconciler, SyncConfig};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        sync_interval_secs: 1,
        torrent_files_dir: std::env::temp_dir()
            .join("magnetar-test-torrents")
            .display()
            .to_string(),
    }
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration
/// tests exercise the same middleware stack that production uses. The
/// aria2 endpoint points at a closed port: daemon calls fail fast,
/// which is exactly the degraded mode the submission and sync paths
/// must survive.
pub fn build_test_app(pool: PgPool) -> Router {
    let aria2 = Arc::new(Aria2Client::new(
        "http://127.0.0.1:1/jsonrpc",
        "",
        Duration::from_millis(200),
    ));
    let sync_config = SyncConfig {
        downloads_base_dir: "/downloads".into(),
        assets_base_dir: "/media/library".into(),
    };
    let hook = Arc::new(PostCompleteHook::new(
        pool.clone(),
        Arc::clone(&aria2),
        None,
        sync_config,
    ));
    let reconciler = Arc::new(Reconciler::new(pool.clone(), Arc::clone(&aria2), hook));

    let state = AppState {
        pool,
        config: Arc::new(test_config()),
        aria2,
        event_bus: Arc::new(EventBus::default()),
        reconciler,
    };

    build_app_router(state)
}

/// Send a GET request to the app.
pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a JSON request with the given method to the app.
pub async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::POST, uri, body).await
}

/// Read a response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
