//! Tests for the file- and store-level operations behind the CLI.

use cartographer::offline::{
    inspect, list_store, preview, prune_store, read_live_file, read_snapshot, simulate,
};
use cartographer::telemetry::LogConfig;
use cartographer::{
    CartographerConfig, CartographerErrorKind, ChannelKind, ChannelSpecBuilder, FileSystemStore,
    GroupSpecBuilder, LiveRole, LiveState, OverlaySubject, PermissionOverlay, Permissions,
    RestorePolicy, RoleSpecBuilder, Snapshot, SnapshotStore, TenantId, compute_hash,
    serialize_pretty,
};
use std::path::{Path, PathBuf};

fn tenant() -> TenantId {
    TenantId::from("guild-1")
}

fn snapshot() -> Snapshot {
    let roles = vec![
        RoleSpecBuilder::default()
            .key("r0")
            .name("Moderator")
            .permissions(Permissions::MANAGE_MESSAGES)
            .rank(0u32)
            .build()
            .unwrap(),
    ];
    let groups = vec![
        GroupSpecBuilder::default()
            .key("g0")
            .name("Community")
            .position(0u32)
            .build()
            .unwrap(),
    ];
    let channels = vec![
        ChannelSpecBuilder::default()
            .key("c0")
            .name("general")
            .kind(ChannelKind::Text)
            .position(0u32)
            .parent_ref("g0")
            .overlays(vec![PermissionOverlay::normalized(
                OverlaySubject::Role("r0".into()),
                Permissions::MANAGE_MESSAGES,
                Permissions::empty(),
            )])
            .build()
            .unwrap(),
    ];
    Snapshot::new(tenant(), chrono::Utc::now(), roles, groups, channels).unwrap()
}

fn bare_live() -> LiveState {
    LiveState {
        roles: vec![LiveRole {
            id: "1".into(),
            name: "@everyone".into(),
            color: 0,
            hoist: false,
            mentionable: false,
            permissions: Permissions::VIEW_CHANNEL,
            position: 0,
            managed: false,
            is_default: true,
        }],
        ..Default::default()
    }
}

async fn write_snapshot(dir: &Path) -> PathBuf {
    let path = dir.join("backup.json");
    tokio::fs::write(&path, serialize_pretty(&snapshot()).unwrap())
        .await
        .unwrap();
    path
}

async fn write_live(dir: &Path, live: &LiveState) -> PathBuf {
    let path = dir.join("live.json");
    tokio::fs::write(&path, serde_json::to_vec(live).unwrap())
        .await
        .unwrap();
    path
}

#[tokio::test]
async fn test_inspect_summarizes_backup_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path()).await;
    let bytes = tokio::fs::read(&path).await.unwrap();

    let inspection = inspect(&path).await.unwrap();

    assert_eq!(inspection.tenant_id, tenant());
    assert_eq!(inspection.summary.roles, 1);
    assert_eq!(inspection.summary.channels, 1);
    assert_eq!(inspection.summary.overlays, 1);
    assert_eq!(inspection.size_bytes, bytes.len() as u64);
    assert_eq!(inspection.content_hash, compute_hash(&bytes));
    assert!(inspection.to_string().contains("guild-1"));
}

#[tokio::test]
async fn test_invalid_backup_file_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    tokio::fs::write(&path, b"{\"schema_version\": 1").await.unwrap();

    let err = read_snapshot(&path).await.unwrap_err();

    assert!(matches!(err.kind(), CartographerErrorKind::Format(_)));
}

#[tokio::test]
async fn test_missing_file_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();

    let err = read_live_file(&dir.path().join("absent.json")).await.unwrap_err();

    assert!(matches!(err.kind(), CartographerErrorKind::Storage(_)));
}

#[tokio::test]
async fn test_preview_reads_files_and_checks_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = write_snapshot(dir.path()).await;
    let live_path = write_live(dir.path(), &bare_live()).await;

    let snapshot = read_snapshot(&snapshot_path).await.unwrap();
    let live = read_live_file(&live_path).await.unwrap();
    let plan = preview(&snapshot, &live, RestorePolicy::default()).unwrap();

    // Role, group, channel, then the overlay.
    assert_eq!(plan.len(), 4);
    assert!(plan.diagnostics().is_empty());
}

#[tokio::test]
async fn test_simulate_restores_onto_copy() {
    let live = bare_live();

    let simulation = simulate(
        &snapshot(),
        live.clone(),
        RestorePolicy::default(),
        &CartographerConfig::default(),
    )
    .await
    .unwrap();

    assert!(simulation.report.is_complete(), "{}", simulation.report);
    assert_eq!(simulation.report.applied(), 4);
    assert_eq!(simulation.live.roles.len(), 2);
    assert_eq!(simulation.live.groups.len(), 1);
    assert_eq!(
        simulation.live.channels[0].parent_id.as_ref(),
        Some(&simulation.live.groups[0].id)
    );

    // Simulating over the result changes nothing.
    let again = simulate(
        &snapshot(),
        simulation.live.clone(),
        RestorePolicy::default(),
        &CartographerConfig::default(),
    )
    .await
    .unwrap();
    assert!(again.plan.is_empty());
    assert_eq!(again.live, simulation.live);
}

#[tokio::test]
async fn test_list_and_prune_filesystem_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSystemStore::new(dir.path()).unwrap();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(*store.put(&snapshot()).await.unwrap().id());
    }

    let listed = list_store(dir.path(), &tenant()).await.unwrap();
    assert_eq!(listed.len(), 3);

    let evicted = prune_store(dir.path(), &tenant(), 1).await.unwrap();
    assert_eq!(evicted.len(), 2);
    let remaining = list_store(dir.path(), &tenant()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(!evicted.contains(remaining[0].id()));
}

#[tokio::test]
async fn test_prune_of_unknown_tenant_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();

    let evicted = prune_store(dir.path(), &TenantId::from("nobody"), 1)
        .await
        .unwrap();

    assert!(evicted.is_empty());
}

#[test]
fn test_log_config_builds_filter() {
    let config = LogConfig::new("info,cartographer=debug").with_json_logs(true);

    assert!(config.json_logs);
    assert!(config.env_filter().is_ok());
    assert!(!LogConfig::default().json_logs);
}
