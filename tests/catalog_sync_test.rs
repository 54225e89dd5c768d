//! End-to-end tests for cross-session convergence over the shared event log
//! and for repointing the catalog root.

use lightbox_core::Core;
use std::path::Path;
use tempfile::TempDir;
use tokio::time::{sleep, Duration};

fn write_file(path: &Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Event timestamps have millisecond resolution; spacing mutations out
/// keeps their replay order unambiguous.
async fn tick() {
    sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn test_two_sessions_converge_via_shared_log() {
    let media = TempDir::new().unwrap();
    write_file(&media.path().join("shots/a.png"), b"pixels");

    let data_a = TempDir::new().unwrap();
    let core_a = Core::new_with_config(data_a.path().to_path_buf())
        .await
        .unwrap();
    core_a.set_root(media.path().to_path_buf()).await.unwrap();
    assert_eq!(core_a.scan().await.unwrap(), 1);

    let asset = core_a.assets().await.unwrap().remove(0);
    tick().await;
    let tag = core_a
        .create_tag("keeper", Some("#00ff00".to_string()))
        .await
        .unwrap();
    tick().await;
    core_a.tag_asset(&asset.id, &tag.id).await.unwrap();
    tick().await;
    core_a
        .update_asset_status(&asset.id, "approved")
        .await
        .unwrap();

    // Second session, separate database: replaying the shared log must
    // reconstruct the asset, its tag, and its final status.
    let data_b = TempDir::new().unwrap();
    let core_b = Core::new_with_config(data_b.path().to_path_buf())
        .await
        .unwrap();
    core_b.set_root(media.path().to_path_buf()).await.unwrap();

    let assets_b = core_b.assets().await.unwrap();
    assert_eq!(assets_b.len(), 1);
    assert_eq!(assets_b[0].id, asset.id);
    assert_eq!(assets_b[0].status, "approved");
    assert_eq!(assets_b[0].path, "shots/a.png");
    let tag_names: Vec<&str> = assets_b[0].tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tag_names, vec!["keeper"]);

    core_a.shutdown().await.unwrap();
    core_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remote_update_applies_exactly_once_across_double_replay() {
    let media = TempDir::new().unwrap();
    write_file(&media.path().join("a1.png"), b"pixels");

    let data = TempDir::new().unwrap();
    let core = Core::new_with_config(data.path().to_path_buf())
        .await
        .unwrap();
    core.set_root(media.path().to_path_buf()).await.unwrap();
    assert_eq!(core.scan().await.unwrap(), 1);
    let asset_id = core.assets().await.unwrap()[0].id.clone();

    // A status change written by another session, dropped straight into
    // the shared log directory.
    let timestamp = lightbox_core::domain::now_millis() + 10;
    let event = serde_json::json!({
        "id": "evt-remote-1",
        "timestamp": timestamp,
        "userId": "remote-session",
        "type": "ASSET_UPDATE",
        "payload": {"assetId": asset_id, "changes": {"status": "approved"}}
    });
    let sync_dir = media.path().join(".lightbox/sync");
    std::fs::write(
        sync_dir.join(format!("{}_evt-remote-1.json", timestamp)),
        serde_json::to_vec(&event).unwrap(),
    )
    .unwrap();

    core.resync().await.unwrap();
    core.resync().await.unwrap();

    let asset = core.asset(&asset_id).await.unwrap().unwrap();
    assert_eq!(asset.status, "approved");

    // Exactly one audit row for the remote mutation, despite two replays.
    let remote_rows = core
        .asset_history(&asset_id, 50)
        .await
        .unwrap()
        .into_iter()
        .filter(|row| row.user_id.as_deref() == Some("remote-session"))
        .count();
    assert_eq!(remote_rows, 1);

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rehome_to_parent_remaps_assets_and_keeps_history() {
    let outer = TempDir::new().unwrap();
    let inner = outer.path().join("shoot");
    write_file(&inner.join("img/a.png"), b"pixels");

    let data = TempDir::new().unwrap();
    let core = Core::new_with_config(data.path().to_path_buf())
        .await
        .unwrap();
    core.set_root(inner.clone()).await.unwrap();
    assert_eq!(core.scan().await.unwrap(), 1);
    let asset_id = core.assets().await.unwrap()[0].id.clone();

    core.set_root(outer.path().to_path_buf()).await.unwrap();

    let assets = core.assets().await.unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].id, asset_id);
    assert_eq!(assets[0].path, "shoot/img/a.png");

    let parity = core.index_parity().await.unwrap();
    assert!(parity.is_consistent(), "parity after rehome: {parity:?}");

    // The audit trail survives the remap untouched.
    let history = core.asset_history(&asset_id, 10).await.unwrap();
    assert!(!history.is_empty());

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_search_finds_assets_by_metadata() {
    let media = TempDir::new().unwrap();
    write_file(&media.path().join("render_final.png"), b"pixels");
    write_file(&media.path().join("other.png"), b"pixels");

    let data = TempDir::new().unwrap();
    let core = Core::new_with_config(data.path().to_path_buf())
        .await
        .unwrap();
    core.set_root(media.path().to_path_buf()).await.unwrap();
    core.scan().await.unwrap();

    let target = core
        .assets()
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.path == "render_final.png")
        .unwrap();
    let mut metadata = target.metadata.clone();
    metadata.description = Some("hero shot for the launch page".to_string());
    core.update_asset_metadata(&target.id, metadata).await.unwrap();

    let hits = core.search("hero").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, target.id);

    let by_path = core.search("render_final").await.unwrap();
    assert_eq!(by_path.len(), 1);

    core.shutdown().await.unwrap();
}
