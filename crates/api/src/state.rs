use std::sync::Arc;

use magnetar_aria2::client::Aria2Client;
use magnetar_events::EventBus;
use magnetar_sync::Reconciler;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: magnetar_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// aria2 RPC client, shared with the reconciliation engine.
    pub aria2: Arc<Aria2Client>,
    /// Event bus feeding the SSE live-update stream.
    pub event_bus: Arc<EventBus>,
    /// Reconciliation engine, shared with the background sync task.
    pub reconciler: Arc<Reconciler>,
}
