//! Exactly-once post-completion workflow.
//!
//! When a download reaches terminal success the hook fires once per
//! record lifetime, guarded by the event-log latch: acquire first, work
//! second. The work itself — sidecar cleanup, agent classification,
//! the move or action list — is best-effort and never reopens the
//! latch; a failed move stays failed until an operator intervenes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use magnetar_agent::client::{AgentClient, ClassifyRequest};
use magnetar_agent::plan::{parse_plan, ActionList, MovePlan, PostProcessPlan};
use magnetar_aria2::client::Aria2Client;
use magnetar_core::types::DbId;
use magnetar_db::models::event_log::{LEVEL_INFO, POST_COMPLETE_HANDLED};
use magnetar_db::repositories::download_repo::DownloadRepo;
use magnetar_db::repositories::event_log_repo::EventLogRepo;
use magnetar_db::DbPool;
use tokio::process::Command;

use crate::config::SyncConfig;

/// Fixed flag set for the rclone move step, tuned for large payloads
/// onto S3-backed remotes.
const RCLONE_MOVE_FLAGS: [&str; 11] = [
    "--progress",
    "--transfers=8",
    "--checkers=16",
    "--s3-upload-concurrency=8",
    "--s3-chunk-size=512M",
    "--buffer-size=256M",
    "--fast-list",
    "--delete-empty-src-dirs",
    "--low-level-retries=10",
    "--retries=2",
    "--retries-sleep=10s",
];

/// How one hook invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// The latch was already held (or could not be confirmed free);
    /// no work ran.
    AlreadyHandled,
    /// This invocation held the latch and ran the workflow. `moved`
    /// reports whether the primary action finished without error.
    Ran { moved: bool },
}

/// Runs the post-completion workflow for one download.
pub struct PostCompleteHook {
    pool: DbPool,
    client: Arc<Aria2Client>,
    agent: Option<AgentClient>,
    config: SyncConfig,
}

impl PostCompleteHook {
    pub fn new(
        pool: DbPool,
        client: Arc<Aria2Client>,
        agent: Option<AgentClient>,
        config: SyncConfig,
    ) -> Self {
        Self {
            pool,
            client,
            agent,
            config,
        }
    }

    /// Fire the hook for a completed download.
    ///
    /// Latch acquisition comes first; everything after it is
    /// best-effort and logged rather than propagated, so a hook failure
    /// can never abort the reconciliation pass that triggered it.
    pub async fn run(&self, download_id: DbId, gid: &str) -> HookOutcome {
        match EventLogRepo::try_acquire_once(
            &self.pool,
            download_id,
            LEVEL_INFO,
            POST_COMPLETE_HANDLED,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => return HookOutcome::AlreadyHandled,
            Err(error) => {
                // A store failure is indistinguishable from a lost
                // race without another read; skipping is the side that
                // cannot double-run the workflow.
                tracing::warn!(download_id, %error, "latch insert failed, treating as handled");
                return HookOutcome::AlreadyHandled;
            }
        }

        tracing::info!(download_id, gid, "running post-completion workflow");

        self.remove_sidecars(gid).await;

        let name = match DownloadRepo::find_by_id(&self.pool, download_id).await {
            Ok(Some(record)) => record.display_name,
            Ok(None) => {
                tracing::warn!(download_id, "record vanished before post-completion work");
                return HookOutcome::Ran { moved: false };
            }
            Err(error) => {
                tracing::warn!(download_id, %error, "record lookup failed after latch");
                return HookOutcome::Ran { moved: false };
            }
        };

        let moved = self.classify_and_execute(download_id, &name).await;
        HookOutcome::Ran { moved }
    }

    /// Delete the `.aria2` control sidecar next to each payload file.
    ///
    /// Best-effort throughout: a purged daemon result or an already
    /// missing sidecar is the common case, not an error.
    async fn remove_sidecars(&self, gid: &str) {
        let listing = match self.client.tell_files(gid).await {
            Ok(listing) => listing,
            Err(error) => {
                tracing::debug!(gid, %error, "file list unavailable, skipping sidecar cleanup");
                return;
            }
        };

        let base_dir = listing.dir.as_deref();
        for file in listing.files.unwrap_or_default() {
            let Some(path) = file.path else { continue };
            let path = path.trim();
            // Metadata pseudo-entries name no file on disk.
            if path.is_empty() || path.starts_with("[METADATA]") {
                continue;
            }

            let payload = if Path::new(path).is_absolute() {
                PathBuf::from(path)
            } else if let Some(dir) = base_dir {
                Path::new(dir).join(path)
            } else {
                PathBuf::from(path)
            };

            let sidecar = PathBuf::from(format!("{}.aria2", payload.display()));
            match tokio::fs::remove_file(&sidecar).await {
                Ok(()) => tracing::debug!(sidecar = %sidecar.display(), "removed control file"),
                Err(error) => {
                    tracing::debug!(sidecar = %sidecar.display(), %error, "sidecar not removed")
                }
            }
        }
    }

    /// Ask the agent where the payload belongs and carry out its plan.
    ///
    /// Returns whether the primary action finished without error. An
    /// unconfigured agent, a failed call, or a malformed plan skips the
    /// move entirely; the payload stays where the daemon left it.
    async fn classify_and_execute(&self, download_id: DbId, name: &str) -> bool {
        let Some(agent) = &self.agent else {
            tracing::info!(download_id, "no agent configured, leaving payload in place");
            return false;
        };

        let request = ClassifyRequest {
            name: name.to_string(),
            source_path: format!("{}/{}", self.config.downloads_base_dir, name),
            target_parent: self.config.assets_base_dir.clone(),
            os: std::env::consts::OS.to_string(),
        };

        let answer = match agent.classify(&request).await {
            Ok(answer) => answer,
            Err(error) => {
                tracing::warn!(download_id, %error, "classification failed, skipping move");
                return false;
            }
        };

        match parse_plan(&answer) {
            Ok(PostProcessPlan::Move(plan)) => self.run_move(download_id, &plan).await,
            Ok(PostProcessPlan::Actions(list)) => self.run_actions(download_id, &list).await,
            Err(error) => {
                tracing::warn!(download_id, %error, "agent plan rejected, skipping move");
                false
            }
        }
    }

    async fn run_move(&self, download_id: DbId, plan: &MovePlan) -> bool {
        tracing::info!(
            download_id,
            source = %plan.source_path,
            target = %plan.target_path,
            "moving payload"
        );
        let status = Command::new("rclone")
            .arg("move")
            .arg(&plan.source_path)
            .arg(&plan.target_path)
            .args(RCLONE_MOVE_FLAGS)
            .status()
            .await;
        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                tracing::warn!(download_id, %status, "rclone move exited non-zero");
                false
            }
            Err(error) => {
                tracing::warn!(download_id, %error, "rclone could not be spawned");
                false
            }
        }
    }

    /// Run the agent's shell actions in order. Each action is
    /// best-effort; a failure is logged and the loop continues.
    async fn run_actions(&self, download_id: DbId, list: &ActionList) -> bool {
        let mut all_ok = true;
        for action in &list.actions {
            let status = Command::new(&list.shell)
                .arg("-c")
                .arg(action)
                .status()
                .await;
            match status {
                Ok(status) if status.success() => {
                    tracing::debug!(download_id, action, "action completed");
                }
                Ok(status) => {
                    tracing::warn!(download_id, action, %status, "action exited non-zero");
                    all_ok = false;
                }
                Err(error) => {
                    tracing::warn!(download_id, action, %error, "action could not be spawned");
                    all_ok = false;
                }
            }
        }
        all_ok
    }
}
