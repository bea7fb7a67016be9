//! Handlers for download submission, lifecycle, sync, and the live feed.
//!
//! Submission never turns a daemon failure into a 5xx: every accepted
//! input yields exactly one durable record, and inputs the daemon
//! rejects become `failed` records carrying the daemon's message.

use std::convert::Infallible;
use std::path::{Path as FsPath, PathBuf};

use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use magnetar_core::error::CoreError;
use magnetar_core::magnet::{
    extract_filename_from_url, extract_info_hash, extract_magnet_display_name,
    validate_http_url, validate_magnet_uri,
};
use magnetar_core::status::{DownloadKind, DownloadStatus};
use magnetar_core::types::DbId;
use magnetar_db::models::download::{
    CreateDownload, Download, DownloadDto, LifecycleRequest, SubmitRequest,
};
use magnetar_db::repositories::DownloadRepo;
use magnetar_events::DownloadEvent;
use magnetar_sync::{FeedItem, PassOutcome};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Verify that a download exists, returning the full row.
async fn ensure_download_exists(pool: &sqlx::PgPool, id: DbId) -> AppResult<Download> {
    DownloadRepo::find_by_id(pool, id).await?.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Download",
            id,
        })
    })
}

/// Record an input the daemon (or validation) rejected as a `failed` row.
async fn failed_record(
    state: &AppState,
    kind: DownloadKind,
    source_uri: Option<String>,
    info_hash: Option<String>,
    display_name: String,
    error: String,
) -> AppResult<Download> {
    tracing::warn!(kind = kind.as_str(), %display_name, %error, "submission failed");
    let record = DownloadRepo::create(
        &state.pool,
        &CreateDownload {
            kind: kind.as_str(),
            source_uri,
            torrent_file_path: None,
            info_hash,
            gid: None,
            display_name,
            status: DownloadStatus::Failed,
            error_message: Some(error),
        },
    )
    .await?;
    Ok(record)
}

/// A deduplicated hit that lost its daemon handle gets a fresh one.
async fn backfill_gid(state: &AppState, existing: Download, uri: &str) -> AppResult<Download> {
    if existing.gid.is_some() {
        return Ok(existing);
    }
    match state.aria2.add_uri(&[uri.to_string()]).await {
        Ok(gid) => {
            tracing::info!(id = existing.id, %gid, "backfilled daemon handle for duplicate");
            let updated =
                DownloadRepo::attach_gid(&state.pool, existing.id, &gid, DownloadStatus::Queued)
                    .await?;
            Ok(updated.unwrap_or(existing))
        }
        Err(error) => {
            tracing::warn!(id = existing.id, %error, "could not backfill daemon handle");
            Ok(existing)
        }
    }
}

// ---------------------------------------------------------------------------
// POST /downloads
// ---------------------------------------------------------------------------

/// Submit downloads: JSON `{magnets?, urls?}` or multipart `.torrent`
/// uploads, dispatched on the request content type.
pub async fn submit(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<impl IntoResponse> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let records = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?;
        submit_torrent_files(&state, multipart).await?
    } else {
        let Json(input) = Json::<SubmitRequest>::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?;
        if input.magnets.is_empty() && input.urls.is_empty() {
            return Err(AppError::BadRequest(
                "Provide at least one magnet or url".to_string(),
            ));
        }
        submit_uris(&state, input).await?
    };

    let dtos: Vec<DownloadDto> = records.iter().map(DownloadDto::from).collect();
    Ok((StatusCode::CREATED, Json(DataResponse { data: dtos })))
}

async fn submit_uris(state: &AppState, input: SubmitRequest) -> AppResult<Vec<Download>> {
    let mut records = Vec::with_capacity(input.magnets.len() + input.urls.len());
    for magnet in &input.magnets {
        records.push(submit_magnet(state, magnet).await?);
    }
    for url in &input.urls {
        records.push(submit_http(state, url).await?);
    }
    Ok(records)
}

async fn submit_magnet(state: &AppState, magnet: &str) -> AppResult<Download> {
    if let Err(error) = validate_magnet_uri(magnet) {
        return failed_record(
            state,
            DownloadKind::Magnet,
            Some(magnet.to_string()),
            None,
            magnet.chars().take(80).collect(),
            error.to_string(),
        )
        .await;
    }

    let info_hash = extract_info_hash(magnet);
    if let Some(hash) = &info_hash {
        if let Some(existing) = DownloadRepo::find_by_info_hash(&state.pool, hash).await? {
            tracing::info!(id = existing.id, info_hash = %hash, "duplicate magnet submission");
            return backfill_gid(state, existing, magnet).await;
        }
    }

    let display_name = extract_magnet_display_name(magnet)
        .or_else(|| info_hash.clone())
        .unwrap_or_else(|| "magnet download".to_string());

    match state.aria2.add_uri(&[magnet.to_string()]).await {
        Ok(gid) => {
            tracing::info!(%gid, %display_name, "magnet submitted to daemon");
            let record = DownloadRepo::create(
                &state.pool,
                &CreateDownload {
                    kind: DownloadKind::Magnet.as_str(),
                    source_uri: Some(magnet.to_string()),
                    torrent_file_path: None,
                    info_hash,
                    gid: Some(gid),
                    display_name,
                    status: DownloadStatus::Queued,
                    error_message: None,
                },
            )
            .await?;
            Ok(record)
        }
        Err(error) => {
            failed_record(
                state,
                DownloadKind::Magnet,
                Some(magnet.to_string()),
                info_hash,
                display_name,
                error.to_string(),
            )
            .await
        }
    }
}

async fn submit_http(state: &AppState, url: &str) -> AppResult<Download> {
    if let Err(error) = validate_http_url(url) {
        return failed_record(
            state,
            DownloadKind::Http,
            Some(url.to_string()),
            None,
            url.chars().take(80).collect(),
            error.to_string(),
        )
        .await;
    }

    if let Some(existing) = DownloadRepo::find_by_source_url(&state.pool, url).await? {
        tracing::info!(id = existing.id, "duplicate url submission");
        return backfill_gid(state, existing, url).await;
    }

    let display_name = extract_filename_from_url(url);

    match state.aria2.add_uri(&[url.to_string()]).await {
        Ok(gid) => {
            tracing::info!(%gid, %display_name, "url submitted to daemon");
            let record = DownloadRepo::create(
                &state.pool,
                &CreateDownload {
                    kind: DownloadKind::Http.as_str(),
                    source_uri: Some(url.to_string()),
                    torrent_file_path: None,
                    info_hash: None,
                    gid: Some(gid),
                    display_name,
                    status: DownloadStatus::Queued,
                    error_message: None,
                },
            )
            .await?;
            Ok(record)
        }
        Err(error) => {
            failed_record(
                state,
                DownloadKind::Http,
                Some(url.to_string()),
                None,
                display_name,
                error.to_string(),
            )
            .await
        }
    }
}

async fn submit_torrent_files(
    state: &AppState,
    mut multipart: Multipart,
) -> AppResult<Vec<Download>> {
    let mut records = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !file_name.to_ascii_lowercase().ends_with(".torrent") {
            records.push(
                failed_record(
                    state,
                    DownloadKind::Torrent,
                    None,
                    None,
                    file_name,
                    "Not a .torrent file".to_string(),
                )
                .await?,
            );
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
        let display_name = file_name[..file_name.len() - ".torrent".len()].to_string();
        let stored_path = store_torrent_file(state, &file_name, &bytes).await;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        match state.aria2.add_torrent(&encoded).await {
            Ok(gid) => {
                // The daemon reuses the gid for a torrent it already
                // holds; an existing row means this upload is a dup.
                if let Some(existing) = DownloadRepo::find_by_gid(&state.pool, &gid).await? {
                    tracing::info!(id = existing.id, %gid, "duplicate torrent upload");
                    records.push(existing);
                    continue;
                }
                tracing::info!(%gid, %display_name, "torrent file submitted to daemon");
                records.push(
                    DownloadRepo::create(
                        &state.pool,
                        &CreateDownload {
                            kind: DownloadKind::Torrent.as_str(),
                            source_uri: None,
                            torrent_file_path: stored_path,
                            info_hash: None,
                            gid: Some(gid),
                            display_name,
                            status: DownloadStatus::Queued,
                            error_message: None,
                        },
                    )
                    .await?,
                );
            }
            Err(error) => {
                records.push(
                    failed_record(
                        state,
                        DownloadKind::Torrent,
                        None,
                        None,
                        display_name,
                        error.to_string(),
                    )
                    .await?,
                );
            }
        }
    }

    if records.is_empty() {
        return Err(AppError::BadRequest(
            "No .torrent files in upload".to_string(),
        ));
    }
    Ok(records)
}

/// Persist an uploaded torrent file for later resubmission. Best-effort:
/// a failed write only loses the stored copy, not the submission.
async fn store_torrent_file(state: &AppState, file_name: &str, bytes: &[u8]) -> Option<String> {
    let dir = &state.config.torrent_files_dir;
    if let Err(error) = tokio::fs::create_dir_all(dir).await {
        tracing::warn!(dir, %error, "could not create torrent file directory");
        return None;
    }
    // The name is client-supplied; keep it to a single path component.
    let safe_name: String = file_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let path = format!("{dir}/{safe_name}");
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => Some(path),
        Err(error) => {
            tracing::warn!(%path, %error, "could not store torrent file");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// GET /downloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListDownloadsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List recent downloads, newest first.
pub async fn list_downloads(
    State(state): State<AppState>,
    Query(params): Query<ListDownloadsQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);
    let downloads = DownloadRepo::list_recent(&state.pool, limit, offset).await?;
    let dtos: Vec<DownloadDto> = downloads.iter().map(DownloadDto::from).collect();
    Ok(Json(DataResponse { data: dtos }))
}

// ---------------------------------------------------------------------------
// GET /downloads/{id}
// ---------------------------------------------------------------------------

/// Get a single download by ID.
pub async fn get_download(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let download = ensure_download_exists(&state.pool, id).await?;
    Ok(Json(DataResponse {
        data: DownloadDto::from(&download),
    }))
}

// ---------------------------------------------------------------------------
// PATCH /downloads/{id}
// ---------------------------------------------------------------------------

/// Pause or resume a download.
///
/// Daemon calls are best-effort (pause falls back to force-pause once);
/// the stored status is updated by gid either way and the next
/// reconciliation pass confirms it against the daemon.
pub async fn update_download(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<LifecycleRequest>,
) -> AppResult<impl IntoResponse> {
    let download = ensure_download_exists(&state.pool, id).await?;
    let Some(gid) = download.gid.as_deref() else {
        return Err(AppError::BadRequest(
            "Download has no active daemon handle".to_string(),
        ));
    };

    match input.action.as_str() {
        "pause" => {
            if let Err(first) = state.aria2.pause(gid).await {
                tracing::debug!(gid, %first, "pause failed, trying force-pause");
                if let Err(second) = state.aria2.force_pause(gid).await {
                    tracing::warn!(gid, %second, "force-pause failed");
                }
            }
            DownloadRepo::update_status_by_gid(&state.pool, gid, DownloadStatus::Paused).await?;
            tracing::info!(download_id = id, gid, "download paused");
        }
        "resume" => {
            if let Err(error) = state.aria2.unpause(gid).await {
                tracing::warn!(gid, %error, "unpause failed");
            }
            DownloadRepo::update_status_by_gid(&state.pool, gid, DownloadStatus::Downloading)
                .await?;
            tracing::info!(download_id = id, gid, "download resumed");
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "Unknown action '{other}', expected pause or resume"
            )));
        }
    }

    let updated = ensure_download_exists(&state.pool, id).await?;
    Ok(Json(DataResponse {
        data: DownloadDto::from(&updated),
    }))
}

// ---------------------------------------------------------------------------
// DELETE /downloads/{id}?deleteFiles=
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    #[serde(default)]
    pub delete_files: bool,
}

/// Remove a download from the daemon and delete its record.
///
/// With `deleteFiles=true` the payload files (and their `.aria2`
/// sidecars) are removed best-effort before the record goes. Event-log
/// rows cascade with the record.
pub async fn delete_download(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<DeleteQuery>,
) -> AppResult<impl IntoResponse> {
    let download = ensure_download_exists(&state.pool, id).await?;

    if let Some(gid) = download.gid.as_deref() {
        // Capture the file list before removal makes it unavailable.
        let listing = if params.delete_files {
            state.aria2.tell_files(gid).await.ok()
        } else {
            None
        };

        if let Err(first) = state.aria2.remove(gid).await {
            if !first.is_not_found() {
                tracing::debug!(gid, %first, "remove failed, trying force-remove");
                if let Err(second) = state.aria2.force_remove(gid).await {
                    tracing::warn!(gid, %second, "force-remove failed");
                }
            }
        }
        if let Err(error) = state.aria2.purge_download_result().await {
            tracing::debug!(%error, "purge of daemon results failed");
        }

        if let Some(listing) = listing {
            delete_payload_files(listing.dir.as_deref(), listing.files.unwrap_or_default()).await;
        }
    }

    DownloadRepo::delete(&state.pool, id).await?;
    tracing::info!(download_id = id, delete_files = params.delete_files, "download deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Best-effort removal of payload files and their control sidecars.
async fn delete_payload_files(base_dir: Option<&str>, files: Vec<magnetar_aria2::client::FileEntry>) {
    for file in files {
        let Some(path) = file.path else { continue };
        let path = path.trim();
        if path.is_empty() || path.starts_with("[METADATA]") {
            continue;
        }

        let payload = if FsPath::new(path).is_absolute() {
            PathBuf::from(path)
        } else if let Some(dir) = base_dir {
            FsPath::new(dir).join(path)
        } else {
            PathBuf::from(path)
        };

        if let Err(error) = tokio::fs::remove_file(&payload).await {
            tracing::debug!(path = %payload.display(), %error, "payload file not removed");
        }
        let sidecar = PathBuf::from(format!("{}.aria2", payload.display()));
        if let Err(error) = tokio::fs::remove_file(&sidecar).await {
            tracing::debug!(path = %sidecar.display(), %error, "sidecar not removed");
        }
    }
}

// ---------------------------------------------------------------------------
// POST /downloads/sync
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// Per-record deltas from this pass (empty when the pass was busy
    /// or the daemon unreachable).
    pub updated: Vec<FeedItem>,
    /// The current download list after the pass.
    pub downloads: Vec<DownloadDto>,
}

/// Run an on-demand reconciliation pass.
///
/// Serialized with the background task through the engine's
/// single-flight guard: an overlapping call observes a busy pass and
/// returns the current list unchanged.
pub async fn run_sync(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let outcome = state.reconciler.run_pass().await?;
    let updated = match outcome {
        PassOutcome::Completed { items, .. } => {
            publish_updates(&state, &items);
            items
        }
        PassOutcome::Busy | PassOutcome::Unreachable => Vec::new(),
    };

    let downloads = DownloadRepo::list_recent(&state.pool, DEFAULT_LIST_LIMIT, 0).await?;
    let dtos: Vec<DownloadDto> = downloads.iter().map(DownloadDto::from).collect();

    Ok(Json(DataResponse {
        data: SyncResponse {
            updated,
            downloads: dtos,
        },
    }))
}

/// Publish one `download.updated` event for a completed pass.
pub fn publish_updates(state: &AppState, items: &[FeedItem]) {
    let payload = serde_json::to_value(items).unwrap_or_default();
    state
        .event_bus
        .publish(DownloadEvent::new("download.updated", payload));
}

// ---------------------------------------------------------------------------
// GET /downloads/events
// ---------------------------------------------------------------------------

/// SSE live-update feed.
///
/// Each subscriber gets an independent receiver on the event bus; a
/// lagging or disconnecting subscriber never affects reconciliation.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.event_bus.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        // A lagged receiver just skips the dropped messages.
        let event = result.ok()?;
        let sse = Event::default()
            .event(event.event_type.clone())
            .json_data(&event)
            .ok()?;
        Some(Ok::<_, Infallible>(sse))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
