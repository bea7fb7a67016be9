//! Pure normalization of aria2 status snapshots.
//!
//! aria2 reports every numeric field as a decimal string and uses its
//! own status vocabulary. [`normalize`] turns one raw snapshot into a
//! [`NormalizedStatus`]: canonical status, raw progress percentage, byte
//! and speed counters, the daemon-discovered content name, and the
//! advisory allocating/checking phase hints. No side effects, no
//! clamping (display-side clamping lives in `magnetar_core::progress`).

use magnetar_core::status::DownloadStatus;
use serde::Deserialize;

use crate::client::FileEntry;

/// Key list requested from `aria2.tellStatus` during reconciliation.
pub const STATUS_KEYS: [&str; 12] = [
    "gid",
    "status",
    "totalLength",
    "completedLength",
    "verifiedLength",
    "downloadSpeed",
    "uploadSpeed",
    "connections",
    "followedBy",
    "errorMessage",
    "errorCode",
    "bittorrent",
];

/// One raw status snapshot as returned by the daemon.
///
/// All fields are optional: aria2 omits keys that do not apply to the
/// download's current state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub gid: Option<String>,
    pub status: Option<String>,
    pub total_length: Option<String>,
    pub completed_length: Option<String>,
    pub verified_length: Option<String>,
    pub download_speed: Option<String>,
    pub upload_speed: Option<String>,
    pub connections: Option<String>,
    pub followed_by: Option<Vec<String>>,
    pub bittorrent: Option<BitTorrentSection>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub dir: Option<String>,
    pub files: Option<Vec<FileEntry>>,
}

impl StatusSnapshot {
    /// The GID the real download continues under, if the daemon has
    /// rewritten this one (magnet metadata handover).
    pub fn follow_up_gid(&self) -> Option<&str> {
        self.followed_by
            .as_deref()
            .and_then(|gids| gids.first())
            .map(String::as_str)
    }
}

/// The `bittorrent` section of a status snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BitTorrentSection {
    pub info: Option<BitTorrentInfo>,
}

/// Torrent metadata nested inside the `bittorrent` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BitTorrentInfo {
    pub name: Option<String>,
}

/// The canonical view of one snapshot.
#[derive(Debug, Clone)]
pub struct NormalizedStatus {
    /// The authoritative GID (the follow-up one after redirect resolution).
    pub gid: String,
    pub status: DownloadStatus,
    /// Raw `done / total * 100`; 0 when the total is unknown. Unclamped.
    pub progress: f64,
    pub bytes_done: i64,
    pub bytes_total: i64,
    pub download_speed: i64,
    pub upload_speed: i64,
    pub connections: i64,
    /// Content name reported by the daemon, when it knows one.
    pub name: Option<String>,
    pub error_message: Option<String>,
    /// Advisory: pre-allocating disk space before any byte arrives.
    pub is_allocating: bool,
    /// Advisory: hash-checking previously downloaded data.
    pub is_checking: bool,
}

/// Map an aria2 status string onto the canonical status.
///
/// Unknown strings deliberately fail open to `Downloading`: a daemon
/// vocabulary change must never strand a record in a terminal state.
pub fn map_daemon_status(status: &str) -> DownloadStatus {
    match status {
        "active" => DownloadStatus::Downloading,
        "waiting" => DownloadStatus::Queued,
        "paused" => DownloadStatus::Paused,
        "error" => DownloadStatus::Failed,
        "complete" => DownloadStatus::Completed,
        "removed" => DownloadStatus::Cancelled,
        _ => DownloadStatus::Downloading,
    }
}

/// Parse one of aria2's stringly-typed counters, defaulting to 0.
fn counter(field: Option<&str>) -> i64 {
    field.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Normalize one snapshot under the given authoritative GID.
///
/// `gid` is passed explicitly rather than read from the snapshot so the
/// caller can supply the follow-up GID after redirect resolution.
pub fn normalize(gid: &str, snapshot: &StatusSnapshot) -> NormalizedStatus {
    let bytes_total = counter(snapshot.total_length.as_deref());
    let bytes_done = counter(snapshot.completed_length.as_deref());
    let verified = counter(snapshot.verified_length.as_deref());
    let download_speed = counter(snapshot.download_speed.as_deref());
    let upload_speed = counter(snapshot.upload_speed.as_deref());
    let connections = counter(snapshot.connections.as_deref());

    let daemon_status = snapshot.status.as_deref().unwrap_or("unknown");
    let status = map_daemon_status(daemon_status);

    let progress = if bytes_total > 0 {
        (bytes_done as f64 / bytes_total as f64) * 100.0
    } else {
        0.0
    };

    let name = snapshot
        .bittorrent
        .as_ref()
        .and_then(|bt| bt.info.as_ref())
        .and_then(|info| info.name.clone())
        .filter(|n| !n.trim().is_empty());

    let idle = download_speed == 0 && connections == 0;
    // aria2 exposes no explicit phase signal; these are best-effort
    // inferences tolerant of false positives.
    let is_allocating = daemon_status == "active" && bytes_total > 0 && bytes_done == 0 && idle;
    let is_checking = daemon_status == "active" && idle && bytes_done > 0 && verified < bytes_done;

    NormalizedStatus {
        gid: gid.to_string(),
        status,
        progress,
        bytes_done,
        bytes_total,
        download_speed,
        upload_speed,
        connections,
        name,
        error_message: snapshot.error_message.clone().filter(|m| !m.is_empty()),
        is_allocating,
        is_checking,
    }
}
