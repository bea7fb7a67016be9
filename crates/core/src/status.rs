//! Canonical download status and source-kind vocabulary.
//!
//! The six-value [`DownloadStatus`] enum is the status every consumer
//! (store, API, live feed) agrees on, independent of the aria2-specific
//! vocabulary. Mapping from daemon status strings lives in the
//! `magnetar-aria2` crate; this module only owns the canonical side.

use serde::{Deserialize, Serialize};

/// Canonical lifecycle status of a tracked download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    /// The text stored in the `downloads.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a stored status string. Unknown values return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(DownloadStatus::Queued),
            "downloading" => Some(DownloadStatus::Downloading),
            "paused" => Some(DownloadStatus::Paused),
            "completed" => Some(DownloadStatus::Completed),
            "failed" => Some(DownloadStatus::Failed),
            "cancelled" => Some(DownloadStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether this status is terminal (no further daemon transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a download was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    /// A `magnet:` URI.
    Magnet,
    /// An uploaded `.torrent` file.
    Torrent,
    /// A plain HTTP/HTTPS URL.
    Http,
}

impl DownloadKind {
    /// The text stored in the `downloads.kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::Magnet => "magnet",
            DownloadKind::Torrent => "torrent",
            DownloadKind::Http => "http",
        }
    }
}
