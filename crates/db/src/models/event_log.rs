//! Event-log entity model.

use magnetar_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the append-only `event_log` table.
///
/// Rows are only ever inserted, never updated. The unique constraint
/// over `(download_id, level, message)` makes insertion usable as an
/// idempotency latch.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventLogEntry {
    pub id: DbId,
    pub download_id: DbId,
    pub level: String,
    pub message: String,
    pub created_at: Timestamp,
}

/// Level used for latch entries.
pub const LEVEL_INFO: &str = "info";

/// Latch message marking the post-completion hook as handled.
pub const POST_COMPLETE_HANDLED: &str = "post-complete:handled";
