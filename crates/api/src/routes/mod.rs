pub mod downloads;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /downloads                 list, submit (JSON or multipart)
/// /downloads/sync            on-demand reconciliation pass (POST)
/// /downloads/events          SSE live-update feed (GET)
/// /downloads/{id}            get, pause/resume (PATCH), delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/downloads", downloads::download_router())
}
