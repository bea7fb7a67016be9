//! The reconciliation engine.
//!
//! One [`Reconciler`] owns the periodic pull of daemon state onto the
//! durable download records. Passes are single-flight: a pass that
//! finds another one in flight returns [`PassOutcome::Busy`] without
//! touching anything, and a pass that cannot reach the daemon returns
//! [`PassOutcome::Unreachable`] having written nothing. Stale state is
//! always preferable to invented state.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use magnetar_aria2::client::{Aria2Client, Aria2Error};
use magnetar_aria2::status::{normalize, NormalizedStatus, StatusSnapshot};
use magnetar_core::progress::clamp_progress;
use magnetar_core::status::DownloadStatus;
use magnetar_core::types::DbId;
use magnetar_db::models::download::SyncUpdate;
use magnetar_db::models::event_log::{LEVEL_INFO, POST_COMPLETE_HANDLED};
use magnetar_db::repositories::download_repo::DownloadRepo;
use magnetar_db::DbPool;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::post_complete::PostCompleteHook;

/// How one reconciliation pass ended.
#[derive(Debug)]
pub enum PassOutcome {
    /// Another pass held the lock; nothing was read or written.
    Busy,
    /// The daemon probe failed; nothing was read or written.
    Unreachable,
    /// The pass ran to completion.
    Completed {
        /// Rows updated across all per-gid writes.
        updated_count: u64,
        /// One delta per reconciled record, for the live feed.
        items: Vec<FeedItem>,
    },
}

/// One record's delta as published on the live feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: DbId,
    pub gid: String,
    pub status: DownloadStatus,
    /// Clamped to `[0, 100]` for display.
    pub progress: f64,
    pub bytes_done: i64,
    pub bytes_total: i64,
    pub download_speed: i64,
    pub upload_speed: i64,
    pub connections: i64,
    pub name: Option<String>,
    pub error_message: Option<String>,
    pub is_allocating: bool,
    pub is_checking: bool,
}

impl FeedItem {
    fn new(id: DbId, n: &NormalizedStatus) -> Self {
        Self {
            id,
            gid: n.gid.clone(),
            status: n.status,
            progress: clamp_progress(n.progress),
            bytes_done: n.bytes_done,
            bytes_total: n.bytes_total,
            download_speed: n.download_speed,
            upload_speed: n.upload_speed,
            connections: n.connections,
            name: n.name.clone(),
            error_message: n.error_message.clone(),
            is_allocating: n.is_allocating,
            is_checking: n.is_checking,
        }
    }
}

/// A status snapshot resolved through the daemon's GID rewrite.
#[derive(Debug)]
pub struct Resolved {
    /// The authoritative GID after following any rewrite.
    pub gid: String,
    pub snapshot: StatusSnapshot,
}

/// Resolve one handle through the daemon's GID rewrite.
///
/// Resolution steps `direct -> following -> resolved`: query the stored
/// GID, and when the snapshot names a follow-up GID, re-query under it.
/// A failed follow-up query resolves back to the original handle for
/// this pass; the rewrite is retried on the next one.
pub async fn resolve_redirect<F, Fut>(gid: &str, lookup: F) -> Result<Resolved, Aria2Error>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<StatusSnapshot, Aria2Error>>,
{
    let snapshot = lookup(gid.to_string()).await?;
    let Some(next) = snapshot.follow_up_gid().map(str::to_string) else {
        return Ok(Resolved {
            gid: gid.to_string(),
            snapshot,
        });
    };

    match lookup(next.clone()).await {
        Ok(next_snapshot) => Ok(Resolved {
            gid: next,
            snapshot: next_snapshot,
        }),
        Err(error) => {
            tracing::debug!(
                gid,
                follow_up = %next,
                %error,
                "follow-up gid query failed, keeping original this pass"
            );
            Ok(Resolved {
                gid: gid.to_string(),
                snapshot,
            })
        }
    }
}

/// Pulls daemon state onto the durable records, one pass at a time.
pub struct Reconciler {
    pool: DbPool,
    client: Arc<Aria2Client>,
    hook: Arc<PostCompleteHook>,
    pass_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(pool: DbPool, client: Arc<Aria2Client>, hook: Arc<PostCompleteHook>) -> Self {
        Self {
            pool,
            client,
            hook,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Reads are concurrent across tracked GIDs; writes only begin once
    /// every read has settled, so a slow handle cannot interleave with
    /// another record's write. Database errors abort the pass and
    /// surface to the caller; daemon errors on individual handles are
    /// logged and skipped.
    pub async fn run_pass(&self) -> Result<PassOutcome, sqlx::Error> {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            return Ok(PassOutcome::Busy);
        };

        // Cheap reachability probe. An unreachable daemon means this
        // pass is a no-op, never a reason to guess at state.
        if let Err(error) = self.client.tell_active(&["gid"]).await {
            tracing::debug!(%error, "daemon unreachable, skipping pass");
            return Ok(PassOutcome::Unreachable);
        }

        let tracked = DownloadRepo::list_with_gid(&self.pool).await?;

        // Records can briefly share a gid during the metadata handover;
        // query each distinct handle once.
        let gids: HashSet<String> = tracked.iter().filter_map(|d| d.gid.clone()).collect();
        let lookups = gids.into_iter().map(|gid| {
            let client = Arc::clone(&self.client);
            async move {
                let resolved = resolve_redirect(&gid, move |g| {
                    let client = Arc::clone(&client);
                    async move { client.tell_status(&g).await }
                })
                .await;
                (gid, resolved)
            }
        });
        let resolved: HashMap<String, Result<Resolved, Aria2Error>> =
            join_all(lookups).await.into_iter().collect();

        // Write phase: one update per distinct gid, so records sharing a
        // handle during the metadata handover are written (and counted)
        // once, not once per record.
        let mut updated_count = 0u64;
        let mut normalized_by_gid: HashMap<String, NormalizedStatus> = HashMap::new();

        for (gid, result) in &resolved {
            let resolution = match result {
                Ok(resolution) => resolution,
                Err(error) if error.is_not_found() => {
                    // Purged from daemon memory; the records keep their
                    // last known state.
                    tracing::debug!(gid = %gid, "gid not found in daemon, skipping");
                    continue;
                }
                Err(error) => {
                    tracing::warn!(gid = %gid, %error, "status query failed, skipping");
                    continue;
                }
            };

            let normalized = normalize(&resolution.gid, &resolution.snapshot);
            let update = SyncUpdate {
                status: normalized.status,
                progress: normalized.progress,
                bytes_done: normalized.bytes_done,
                bytes_total: normalized.bytes_total,
                download_speed: normalized.download_speed,
                upload_speed: normalized.upload_speed,
                error_message: normalized.error_message.clone(),
                display_name: normalized.name.clone(),
            };
            updated_count += DownloadRepo::apply_sync_update(&self.pool, gid, &update).await?;

            if resolution.gid != *gid {
                let moved = DownloadRepo::replace_gid(&self.pool, gid, &resolution.gid).await?;
                tracing::info!(old_gid = %gid, new_gid = %resolution.gid, moved, "followed gid rewrite");
            }

            normalized_by_gid.insert(gid.clone(), normalized);
        }

        // Per-record phase: feed items and hook dispatch.
        let mut items = Vec::with_capacity(tracked.len());
        let mut hooked: HashSet<DbId> = HashSet::new();

        for record in &tracked {
            let Some(gid) = record.gid.as_deref() else {
                continue;
            };
            let Some(normalized) = normalized_by_gid.get(gid) else {
                continue;
            };

            if normalized.status == DownloadStatus::Completed && hooked.insert(record.id) {
                let outcome = self.hook.run(record.id, &normalized.gid).await;
                tracing::debug!(id = record.id, ?outcome, "post-completion hook");
            }

            items.push(FeedItem::new(record.id, normalized));
        }

        // Downloads that completed and were purged from daemon memory
        // between passes still owe their one hook invocation.
        let unhandled =
            DownloadRepo::list_completed_unhandled(&self.pool, LEVEL_INFO, POST_COMPLETE_HANDLED)
                .await?;
        for record in unhandled {
            if hooked.contains(&record.id) {
                continue;
            }
            let Some(gid) = record.gid.as_deref() else {
                continue;
            };
            let outcome = self.hook.run(record.id, gid).await;
            tracing::debug!(id = record.id, ?outcome, "post-completion hook (catch-up)");
        }

        Ok(PassOutcome::Completed {
            updated_count,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn snapshot(json: serde_json::Value) -> StatusSnapshot {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn direct_handle_resolves_to_itself() {
        let resolved = resolve_redirect("g1", |_| async {
            Ok(snapshot(serde_json::json!({
                "status": "active",
                "totalLength": "100",
                "completedLength": "50",
            })))
        })
        .await
        .unwrap();
        assert_eq!(resolved.gid, "g1");
    }

    #[tokio::test]
    async fn rewrite_is_followed_to_the_successor() {
        let resolved = resolve_redirect("g1", |gid| async move {
            if gid == "g1" {
                Ok(snapshot(serde_json::json!({
                    "status": "complete",
                    "followedBy": ["g2"],
                })))
            } else {
                Ok(snapshot(serde_json::json!({
                    "status": "active",
                    "totalLength": "500000",
                    "completedLength": "100000",
                })))
            }
        })
        .await
        .unwrap();

        assert_eq!(resolved.gid, "g2");
        let n = normalize(&resolved.gid, &resolved.snapshot);
        assert_eq!(n.status, DownloadStatus::Downloading);
        assert!((n.progress - 20.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failed_follow_up_keeps_the_original_handle() {
        let resolved = resolve_redirect("g1", |gid| async move {
            if gid == "g1" {
                Ok(snapshot(serde_json::json!({
                    "status": "complete",
                    "followedBy": ["g2"],
                })))
            } else {
                Err(Aria2Error::Rpc {
                    message: "GID g2 is not found".into(),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(resolved.gid, "g1");
        assert_eq!(resolved.snapshot.status.as_deref(), Some("complete"));
    }

    #[tokio::test]
    async fn unknown_handle_surfaces_the_error() {
        let result = resolve_redirect("g1", |_| async {
            Err(Aria2Error::Rpc {
                message: "GID g1 is not found".into(),
            })
        })
        .await;
        assert_matches!(result, Err(e) if e.is_not_found());
    }

    #[test]
    fn feed_item_clamps_progress_for_display() {
        let n = normalize(
            "g1",
            &snapshot(serde_json::json!({
                "status": "active",
                "totalLength": "100",
                "completedLength": "150",
            })),
        );
        let item = FeedItem::new(7, &n);
        assert_eq!(item.progress, 100.0);
        assert_eq!(item.id, 7);
    }
}
