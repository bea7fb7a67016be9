//! Integration tests for the idempotency latch and download writes.
//!
//! These run against a live Postgres via `#[sqlx::test]`, which creates
//! an isolated database per test and applies the crate migrations.

use magnetar_core::status::DownloadStatus;
use magnetar_db::models::download::{CreateDownload, SyncUpdate};
use magnetar_db::models::event_log::{LEVEL_INFO, POST_COMPLETE_HANDLED};
use magnetar_db::repositories::{DownloadRepo, EventLogRepo};
use sqlx::PgPool;

fn magnet_input(hash: &str) -> CreateDownload {
    CreateDownload {
        kind: "magnet",
        source_uri: Some(format!("magnet:?xt=urn:btih:{hash}&dn=test")),
        torrent_file_path: None,
        info_hash: Some(hash.to_string()),
        gid: Some("gid-0001".to_string()),
        display_name: "test".to_string(),
        status: DownloadStatus::Downloading,
        error_message: None,
    }
}

#[sqlx::test]
async fn latch_first_acquire_wins_second_loses(pool: PgPool) {
    let d = DownloadRepo::create(&pool, &magnet_input("aaaa1111")).await.unwrap();

    let first = EventLogRepo::try_acquire_once(&pool, d.id, LEVEL_INFO, POST_COMPLETE_HANDLED)
        .await
        .unwrap();
    let second = EventLogRepo::try_acquire_once(&pool, d.id, LEVEL_INFO, POST_COMPLETE_HANDLED)
        .await
        .unwrap();

    assert!(first, "first insert should win the latch");
    assert!(!second, "second insert must observe the existing latch");

    let entries = EventLogRepo::list_for_download(&pool, d.id).await.unwrap();
    assert_eq!(entries.len(), 1, "latch row is inserted exactly once");
}

#[sqlx::test]
async fn latch_is_scoped_per_download(pool: PgPool) {
    let a = DownloadRepo::create(&pool, &magnet_input("aaaa2222")).await.unwrap();
    let b = DownloadRepo::create(&pool, &magnet_input("bbbb2222")).await.unwrap();

    assert!(
        EventLogRepo::try_acquire_once(&pool, a.id, LEVEL_INFO, POST_COMPLETE_HANDLED)
            .await
            .unwrap()
    );
    assert!(
        EventLogRepo::try_acquire_once(&pool, b.id, LEVEL_INFO, POST_COMPLETE_HANDLED)
            .await
            .unwrap(),
        "a latch on one download must not block another"
    );
}

#[sqlx::test]
async fn event_log_cascades_on_delete(pool: PgPool) {
    let d = DownloadRepo::create(&pool, &magnet_input("cccc3333")).await.unwrap();
    EventLogRepo::try_acquire_once(&pool, d.id, LEVEL_INFO, POST_COMPLETE_HANDLED)
        .await
        .unwrap();

    assert!(DownloadRepo::delete(&pool, d.id).await.unwrap());

    let entries = EventLogRepo::list_for_download(&pool, d.id).await.unwrap();
    assert!(entries.is_empty());
}

#[sqlx::test]
async fn sync_update_addresses_rows_by_gid(pool: PgPool) {
    let d = DownloadRepo::create(&pool, &magnet_input("dddd4444")).await.unwrap();

    let update = SyncUpdate {
        status: DownloadStatus::Downloading,
        progress: 20.0,
        bytes_done: 100_000,
        bytes_total: 500_000,
        download_speed: 1024,
        upload_speed: 0,
        error_message: None,
        display_name: Some("Real Torrent Name".to_string()),
    };
    let updated = DownloadRepo::apply_sync_update(&pool, "gid-0001", &update)
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let row = DownloadRepo::find_by_id(&pool, d.id).await.unwrap().unwrap();
    assert_eq!(row.status, "downloading");
    assert_eq!(row.bytes_done, 100_000);
    assert_eq!(row.display_name, "Real Torrent Name");
}

#[sqlx::test]
async fn empty_name_does_not_overwrite_display_name(pool: PgPool) {
    DownloadRepo::create(&pool, &magnet_input("eeee5555")).await.unwrap();

    let update = SyncUpdate {
        status: DownloadStatus::Downloading,
        progress: 0.0,
        bytes_done: 0,
        bytes_total: 0,
        download_speed: 0,
        upload_speed: 0,
        error_message: None,
        display_name: None,
    };
    DownloadRepo::apply_sync_update(&pool, "gid-0001", &update)
        .await
        .unwrap();

    let row = DownloadRepo::find_by_gid(&pool, "gid-0001").await.unwrap().unwrap();
    assert_eq!(row.display_name, "test", "name must be preserved");
}

#[sqlx::test]
async fn gid_replacement_rewrites_all_holders(pool: PgPool) {
    let d = DownloadRepo::create(&pool, &magnet_input("ffff6666")).await.unwrap();

    let moved = DownloadRepo::replace_gid(&pool, "gid-0001", "gid-0002").await.unwrap();
    assert_eq!(moved, 1);

    let row = DownloadRepo::find_by_id(&pool, d.id).await.unwrap().unwrap();
    assert_eq!(row.gid.as_deref(), Some("gid-0002"));
    assert!(DownloadRepo::find_by_gid(&pool, "gid-0001").await.unwrap().is_none());
}

#[sqlx::test]
async fn completed_unhandled_scan_skips_latched_rows(pool: PgPool) {
    let d = DownloadRepo::create(&pool, &magnet_input("abab7777")).await.unwrap();
    let update = SyncUpdate {
        status: DownloadStatus::Completed,
        progress: 100.0,
        bytes_done: 500_000,
        bytes_total: 500_000,
        download_speed: 0,
        upload_speed: 0,
        error_message: None,
        display_name: None,
    };
    DownloadRepo::apply_sync_update(&pool, "gid-0001", &update)
        .await
        .unwrap();

    let pending =
        DownloadRepo::list_completed_unhandled(&pool, LEVEL_INFO, POST_COMPLETE_HANDLED)
            .await
            .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, d.id);

    EventLogRepo::try_acquire_once(&pool, d.id, LEVEL_INFO, POST_COMPLETE_HANDLED)
        .await
        .unwrap();

    let pending =
        DownloadRepo::list_completed_unhandled(&pool, LEVEL_INFO, POST_COMPLETE_HANDLED)
            .await
            .unwrap();
    assert!(pending.is_empty(), "latched rows drop out of the scan");
}

#[sqlx::test]
async fn dedup_lookup_by_info_hash(pool: PgPool) {
    let d = DownloadRepo::create(&pool, &magnet_input("cdcd8888")).await.unwrap();

    let found = DownloadRepo::find_by_info_hash(&pool, "cdcd8888").await.unwrap();
    assert_eq!(found.map(|f| f.id), Some(d.id));

    let missing = DownloadRepo::find_by_info_hash(&pool, "0000dead").await.unwrap();
    assert!(missing.is_none());
}
