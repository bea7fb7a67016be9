//! Repository for the append-only `event_log` table.

use magnetar_core::types::DbId;
use sqlx::PgPool;

use crate::models::event_log::EventLogEntry;

const COLUMNS: &str = "id, download_id, level, message, created_at";

/// Insert-only access to the event log plus the idempotency latch.
pub struct EventLogRepo;

impl EventLogRepo {
    /// Atomically acquire the `(download_id, level, message)` latch.
    ///
    /// Returns `Ok(true)` when this call inserted the entry (the caller
    /// won the latch) and `Ok(false)` when the entry already existed.
    /// The uniqueness constraint is the only concurrency primitive:
    /// under concurrent callers exactly one receives `true`.
    pub async fn try_acquire_once(
        pool: &PgPool,
        download_id: DbId,
        level: &str,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let inserted: Option<DbId> = sqlx::query_scalar(
            "INSERT INTO event_log (download_id, level, message) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_event_log_download_level_message DO NOTHING \
             RETURNING id",
        )
        .bind(download_id)
        .bind(level)
        .bind(message)
        .fetch_optional(pool)
        .await?;
        Ok(inserted.is_some())
    }

    /// Check whether a latch entry exists without inserting.
    pub async fn exists(
        pool: &PgPool,
        download_id: DbId,
        level: &str,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<DbId> = sqlx::query_scalar(
            "SELECT id FROM event_log \
             WHERE download_id = $1 AND level = $2 AND message = $3 \
             LIMIT 1",
        )
        .bind(download_id)
        .bind(level)
        .bind(message)
        .fetch_optional(pool)
        .await?;
        Ok(found.is_some())
    }

    /// List log entries for a download, oldest first.
    pub async fn list_for_download(
        pool: &PgPool,
        download_id: DbId,
    ) -> Result<Vec<EventLogEntry>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM event_log WHERE download_id = $1 ORDER BY created_at");
        sqlx::query_as::<_, EventLogEntry>(&query)
            .bind(download_id)
            .fetch_all(pool)
            .await
    }
}
