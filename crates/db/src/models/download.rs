//! Download entity model and DTOs.

use magnetar_core::progress::clamp_progress;
use magnetar_core::status::DownloadStatus;
use magnetar_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `downloads` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Download {
    pub id: DbId,
    pub kind: String,
    pub source_uri: Option<String>,
    pub torrent_file_path: Option<String>,
    pub info_hash: Option<String>,
    pub gid: Option<String>,
    pub display_name: String,
    pub status: String,
    pub progress: f64,
    pub bytes_done: i64,
    pub bytes_total: i64,
    pub download_speed: i64,
    pub upload_speed: i64,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Download {
    /// Parsed canonical status. Rows only ever hold the six known values
    /// (enforced by a CHECK constraint), so unknown text maps to `Failed`
    /// rather than panicking.
    pub fn canonical_status(&self) -> DownloadStatus {
        DownloadStatus::parse(&self.status).unwrap_or(DownloadStatus::Failed)
    }
}

/// DTO for creating a new download record at submission time.
#[derive(Debug, Clone)]
pub struct CreateDownload {
    pub kind: &'static str,
    pub source_uri: Option<String>,
    pub torrent_file_path: Option<String>,
    pub info_hash: Option<String>,
    pub gid: Option<String>,
    pub display_name: String,
    pub status: DownloadStatus,
    pub error_message: Option<String>,
}

/// Per-record state written back by a reconciliation pass.
///
/// Addressed by gid, not record id: during the metadata-GID handover
/// multiple rows can briefly share a stale gid and all of them must be
/// brought forward together.
#[derive(Debug, Clone)]
pub struct SyncUpdate {
    pub status: DownloadStatus,
    pub progress: f64,
    pub bytes_done: i64,
    pub bytes_total: i64,
    pub download_speed: i64,
    pub upload_speed: i64,
    pub error_message: Option<String>,
    /// Only written when the daemon reported a non-empty content name.
    pub display_name: Option<String>,
}

/// API-facing representation of a download, with display-side clamping.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadDto {
    pub id: DbId,
    pub name: String,
    pub kind: String,
    pub status: String,
    pub progress: f64,
    pub bytes_done: i64,
    pub bytes_total: i64,
    pub download_speed: i64,
    pub upload_speed: i64,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
}

impl From<&Download> for DownloadDto {
    fn from(d: &Download) -> Self {
        Self {
            id: d.id,
            name: d.display_name.clone(),
            kind: d.kind.clone(),
            status: d.status.clone(),
            progress: clamp_progress(d.progress),
            bytes_done: d.bytes_done,
            bytes_total: d.bytes_total,
            download_speed: d.download_speed,
            upload_speed: d.upload_speed,
            error_message: d.error_message.clone(),
            created_at: d.created_at,
        }
    }
}

/// API request DTO for submitting magnets and/or HTTP URLs.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub magnets: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// API request DTO for pause/resume.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleRequest {
    pub action: String,
}
