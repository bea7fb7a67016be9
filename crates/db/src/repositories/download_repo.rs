//! Repository for the `downloads` table.

use magnetar_core::status::DownloadStatus;
use magnetar_core::types::DbId;
use sqlx::PgPool;

use crate::models::download::{CreateDownload, Download, SyncUpdate};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, kind, source_uri, torrent_file_path, info_hash, gid, \
    display_name, status, progress, bytes_done, bytes_total, download_speed, \
    upload_speed, error_message, created_at, updated_at";

/// Provides CRUD and reconciliation writes for tracked downloads.
pub struct DownloadRepo;

impl DownloadRepo {
    /// Insert a new download record. Returns the created row.
    pub async fn create(pool: &PgPool, input: &CreateDownload) -> Result<Download, sqlx::Error> {
        let query = format!(
            "INSERT INTO downloads
                (kind, source_uri, torrent_file_path, info_hash, gid,
                 display_name, status, error_message)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Download>(&query)
            .bind(input.kind)
            .bind(&input.source_uri)
            .bind(&input.torrent_file_path)
            .bind(&input.info_hash)
            .bind(&input.gid)
            .bind(&input.display_name)
            .bind(input.status.as_str())
            .bind(&input.error_message)
            .fetch_one(pool)
            .await
    }

    /// Find a download by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Download>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM downloads WHERE id = $1");
        sqlx::query_as::<_, Download>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the first download with the given gid.
    pub async fn find_by_gid(pool: &PgPool, gid: &str) -> Result<Option<Download>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM downloads WHERE gid = $1 LIMIT 1");
        sqlx::query_as::<_, Download>(&query)
            .bind(gid)
            .fetch_optional(pool)
            .await
    }

    /// Find a magnet download by its info hash (deduplication lookup).
    ///
    /// Also matches records whose source URI embeds the hash, covering
    /// legacy rows created before hash extraction.
    pub async fn find_by_info_hash(
        pool: &PgPool,
        info_hash: &str,
    ) -> Result<Option<Download>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM downloads \
             WHERE info_hash = $1 OR source_uri ILIKE '%' || $1 || '%' \
             LIMIT 1"
        );
        sqlx::query_as::<_, Download>(&query)
            .bind(info_hash)
            .fetch_optional(pool)
            .await
    }

    /// Find an HTTP download by its source URL (deduplication lookup).
    pub async fn find_by_source_url(
        pool: &PgPool,
        url: &str,
    ) -> Result<Option<Download>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM downloads WHERE kind = 'http' AND source_uri = $1 LIMIT 1"
        );
        sqlx::query_as::<_, Download>(&query)
            .bind(url)
            .fetch_optional(pool)
            .await
    }

    /// List recent downloads, newest first.
    pub async fn list_recent(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Download>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM downloads ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, Download>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// List all downloads holding a non-null gid (the reconciliation set).
    pub async fn list_with_gid(pool: &PgPool) -> Result<Vec<Download>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM downloads WHERE gid IS NOT NULL");
        sqlx::query_as::<_, Download>(&query).fetch_all(pool).await
    }

    /// List completed downloads still holding a gid whose post-completion
    /// latch is absent. Covers downloads the daemon purged between passes.
    pub async fn list_completed_unhandled(
        pool: &PgPool,
        level: &str,
        message: &str,
    ) -> Result<Vec<Download>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM downloads d \
             WHERE d.status = 'completed' AND d.gid IS NOT NULL \
               AND NOT EXISTS (\
                   SELECT 1 FROM event_log e \
                   WHERE e.download_id = d.id AND e.level = $1 AND e.message = $2)"
        );
        sqlx::query_as::<_, Download>(&query)
            .bind(level)
            .bind(message)
            .fetch_all(pool)
            .await
    }

    /// Apply a reconciliation delta to every record sharing a gid.
    ///
    /// Returns the number of rows updated. The display name is only
    /// touched when the pass discovered a non-empty content name.
    pub async fn apply_sync_update(
        pool: &PgPool,
        gid: &str,
        update: &SyncUpdate,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE downloads SET \
                status = $2, \
                progress = $3, \
                bytes_done = $4, \
                bytes_total = $5, \
                download_speed = $6, \
                upload_speed = $7, \
                error_message = $8, \
                display_name = COALESCE(NULLIF($9, ''), display_name), \
                updated_at = NOW() \
             WHERE gid = $1",
        )
        .bind(gid)
        .bind(update.status.as_str())
        .bind(update.progress)
        .bind(update.bytes_done)
        .bind(update.bytes_total)
        .bind(update.download_speed)
        .bind(update.upload_speed)
        .bind(&update.error_message)
        .bind(update.display_name.as_deref().unwrap_or(""))
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Replace a stale gid with its successor on every record holding it.
    pub async fn replace_gid(
        pool: &PgPool,
        old_gid: &str,
        new_gid: &str,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE downloads SET gid = $2, updated_at = NOW() WHERE gid = $1")
                .bind(old_gid)
                .bind(new_gid)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Attach a gid to a record that was created without one.
    pub async fn attach_gid(
        pool: &PgPool,
        id: DbId,
        gid: &str,
        status: DownloadStatus,
    ) -> Result<Option<Download>, sqlx::Error> {
        let query = format!(
            "UPDATE downloads SET gid = $2, status = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Download>(&query)
            .bind(id)
            .bind(gid)
            .bind(status.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Update the status of every record sharing a gid.
    pub async fn update_status_by_gid(
        pool: &PgPool,
        gid: &str,
        status: DownloadStatus,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE downloads SET status = $2, updated_at = NOW() WHERE gid = $1")
                .bind(gid)
                .bind(status.as_str())
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Delete a download record. Event-log rows cascade.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM downloads WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
