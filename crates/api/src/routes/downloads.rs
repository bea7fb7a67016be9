//! Route definitions for download management.
//!
//! Mounted by `api_routes()` under `/downloads`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::downloads;
use crate::state::AppState;

/// Download management routes.
///
/// ```text
/// GET    /                  -> list_downloads
/// POST   /                  -> submit
/// POST   /sync              -> run_sync
/// GET    /events            -> events (SSE)
/// GET    /{id}              -> get_download
/// PATCH  /{id}              -> update_download
/// DELETE /{id}              -> delete_download
/// ```
pub fn download_router() -> Router<AppState> {
    Router::new()
        .route("/", get(downloads::list_downloads).post(downloads::submit))
        .route("/sync", post(downloads::run_sync))
        .route("/events", get(downloads::events))
        .route(
            "/{id}",
            get(downloads::get_download)
                .patch(downloads::update_download)
                .delete(downloads::delete_download),
        )
}
