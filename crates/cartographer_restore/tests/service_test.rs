//! End-to-end tests for the backup and restore service.

mod common;

use cartographer_core::{
    ChannelKind, LiveState, LiveSubject, Permissions, SnapshotId, TenantId, TenantSettings,
};
use cartographer_error::{CartographerErrorKind, RestoreErrorKind};
use cartographer_interface::SnapshotStore;
use cartographer_rate_limit::CartographerConfig;
use cartographer_restore::{
    CancelToken, Cartographer, MemoryPlatform, RestorePolicy, TenantLocks, enforce_retention,
};
use cartographer_storage::{FileSystemStore, InMemoryStore};
use common::*;
use std::sync::Arc;

fn guild_live() -> LiveState {
    let mut bot = live_role("bot", "Helper Bot", 9);
    bot.managed = true;

    let mut announcements = live_channel("c-news", "announcements", Some("g-info"), 0);
    announcements.overlays = vec![
        overlay(
            LiveSubject::Role("everyone".into()),
            Permissions::empty(),
            Permissions::SEND_MESSAGES,
        ),
        overlay(
            LiveSubject::Role("staff".into()),
            Permissions::SEND_MESSAGES | Permissions::MENTION_EVERYONE,
            Permissions::empty(),
        ),
    ];
    let mut stage = live_channel("c-stage", "Stage", Some("g-voice"), 0);
    stage.kind = ChannelKind::Voice;
    stage.bitrate = Some(96_000);

    let mut staff = live_role("staff", "Staff", 4);
    staff.hoist = true;
    staff.permissions = Permissions::MANAGE_MESSAGES;

    LiveState {
        roles: vec![everyone(), staff, live_role("regular", "Regular", 2), bot],
        groups: vec![
            live_group("g-info", "Info", 0),
            live_group("g-voice", "Voice", 1),
        ],
        channels: vec![
            announcements,
            live_channel("c-welcome", "welcome", None, 0),
            live_channel("c-faq", "faq", Some("g-info"), 1),
            stage,
        ],
    }
}

fn service(platform: Arc<MemoryPlatform>) -> (Cartographer, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let mut config = CartographerConfig::default();
    config.retry.initial_backoff_ms = 1;
    config.retry.max_delay_ms = 5;
    let service = Cartographer::new(platform, store.clone(), store.clone(), config);
    (service, store)
}

#[tokio::test]
async fn test_backup_wipe_restore_round_trip() {
    let platform = Arc::new(platform_with(guild_live()));
    let (service, store) = service(platform.clone());

    let backup = service.backup(&tenant()).await.unwrap();
    let original = store.get(&tenant(), *backup.snapshot().id()).await.unwrap();
    assert_eq!(original.roles().len(), 2);
    assert_eq!(original.channels().len(), 4);

    let mut wiped = empty_live();
    wiped.roles.push(guild_live().roles[3].clone());
    platform.set_state(tenant(), wiped);

    let outcome = service
        .restore(
            &tenant(),
            *backup.snapshot().id(),
            RestorePolicy::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert!(outcome.report().is_complete(), "{}", outcome.report());

    let again = service.backup(&tenant()).await.unwrap();
    let recaptured = store.get(&tenant(), *again.snapshot().id()).await.unwrap();
    assert_eq!(recaptured.roles(), original.roles());
    assert_eq!(recaptured.groups(), original.groups());
    assert_eq!(recaptured.channels(), original.channels());
}

#[tokio::test]
async fn test_restore_with_delete_existing_removes_extras() {
    let platform = Arc::new(platform_with(guild_live()));
    let (service, _) = service(platform.clone());
    let backup = service.backup(&tenant()).await.unwrap();

    let mut drifted = guild_live();
    drifted.roles.push(live_role("raider", "Raider", 3));
    drifted.channels.push(live_channel("c-spam", "spam", Some("g-info"), 2));
    drifted.channels.retain(|c| c.name != "faq");
    platform.set_state(tenant(), drifted);

    let outcome = service
        .restore(
            &tenant(),
            *backup.snapshot().id(),
            RestorePolicy {
                delete_existing: true,
                dry_run: false,
            },
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.report().is_complete(), "{}", outcome.report());
    let state = platform.state(&tenant());
    assert!(state.roles.iter().all(|r| r.name != "Raider"));
    assert!(state.roles.iter().any(|r| r.name == "Helper Bot"));
    assert!(state.channels.iter().all(|c| c.name != "spam"));
    assert!(state.channels.iter().any(|c| c.name == "faq"));
}

#[tokio::test]
async fn test_retention_keeps_most_recent() {
    let platform = Arc::new(platform_with(guild_live()));
    let (service, _) = service(platform);
    service
        .update_settings(&TenantSettings::new(tenant()).with_max_backups(2))
        .await
        .unwrap();

    let first = service.backup(&tenant()).await.unwrap();
    let second = service.backup(&tenant()).await.unwrap();
    let third = service.backup(&tenant()).await.unwrap();

    assert!(second.evicted().is_empty());
    assert_eq!(third.evicted(), &vec![*first.snapshot().id()]);
    let ids: Vec<SnapshotId> = service
        .list(&tenant())
        .await
        .unwrap()
        .iter()
        .map(|m| *m.id())
        .collect();
    assert_eq!(ids, vec![*second.snapshot().id(), *third.snapshot().id()]);
}

#[tokio::test]
async fn test_prune_applies_a_lowered_quota() {
    let platform = Arc::new(platform_with(guild_live()));
    let (service, _) = service(platform);
    service.backup(&tenant()).await.unwrap();
    service.backup(&tenant()).await.unwrap();
    let newest = service.backup(&tenant()).await.unwrap();

    service
        .update_settings(&TenantSettings::new(tenant()).with_max_backups(1))
        .await
        .unwrap();
    let evicted = service.prune(&tenant()).await.unwrap();

    assert_eq!(evicted.len(), 2);
    let remaining = service.list(&tenant()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id(), newest.snapshot().id());
}

#[tokio::test]
async fn test_disabled_backups_reject_backup_and_restore() {
    let platform = Arc::new(platform_with(guild_live()));
    let (service, _) = service(platform.clone());
    let backup = service.backup(&tenant()).await.unwrap();

    let mut settings = service.tenant_settings(&tenant()).await.unwrap();
    settings.backups_enabled = false;
    service.update_settings(&settings).await.unwrap();

    let err = service.backup(&tenant()).await.unwrap_err();
    assert!(matches!(
        err.kind(),
        CartographerErrorKind::Restore(e) if matches!(e.kind, RestoreErrorKind::BackupsDisabled(_))
    ));
    let err = service
        .restore(
            &tenant(),
            *backup.snapshot().id(),
            RestorePolicy::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), CartographerErrorKind::Restore(_)));
    assert_eq!(platform.mutation_count(), 0);
}

#[tokio::test]
async fn test_unknown_snapshot_is_rejected() {
    let platform = Arc::new(platform_with(guild_live()));
    let (service, _) = service(platform.clone());

    let err = service
        .restore(
            &tenant(),
            SnapshotId::new(),
            RestorePolicy::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind(),
        CartographerErrorKind::Restore(e) if matches!(e.kind, RestoreErrorKind::SnapshotNotFound { .. })
    ));
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_snapshot_of_another_tenant_is_not_found() {
    let other = TenantId::from("guild-2");
    let platform = Arc::new(
        MemoryPlatform::new()
            .with_state(tenant(), guild_live())
            .with_state(other.clone(), empty_live()),
    );
    let (service, _) = service(platform);
    let backup = service.backup(&tenant()).await.unwrap();

    let err = service
        .restore(
            &other,
            *backup.snapshot().id(),
            RestorePolicy::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), CartographerErrorKind::Restore(_)));
}

#[tokio::test]
async fn test_failed_capture_persists_nothing() {
    let platform = Arc::new(platform_with(guild_live()).with_failure(
        cartographer_restore::FailureRule::new(
            cartographer_restore::CallKind::ListChannels,
            cartographer_error::AdapterErrorKind::Timeout("read".into()),
        ),
    ));
    let (service, _) = service(platform);

    let err = service.backup(&tenant()).await.unwrap_err();

    assert!(matches!(err.kind(), CartographerErrorKind::Capture(_)));
    assert!(service.list(&tenant()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_filesystem_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSystemStore::new(dir.path()).unwrap());
    let platform = Arc::new(platform_with(guild_live()));
    let service = Cartographer::new(
        platform.clone(),
        store.clone(),
        store.clone(),
        CartographerConfig::default(),
    );

    let backup = service.backup(&tenant()).await.unwrap();
    platform.set_state(tenant(), empty_live());
    let outcome = service
        .restore(
            &tenant(),
            *backup.snapshot().id(),
            RestorePolicy::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.report().is_complete(), "{}", outcome.report());
    assert_eq!(platform.state(&tenant()).channels.len(), 4);

    // A fresh store over the same directory sees the snapshot.
    let reopened = FileSystemStore::new(dir.path()).unwrap();
    assert_eq!(reopened.list(&tenant()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_tenant_lock_is_exclusive_per_tenant() {
    let locks = TenantLocks::new();
    let held = locks.lock(&tenant()).await;

    assert!(locks.try_lock(&tenant()).is_none());
    assert!(locks.try_lock(&TenantId::from("guild-2")).is_some());

    drop(held);
    assert!(locks.try_lock(&tenant()).is_some());
}

#[tokio::test]
async fn test_tenant_lock_entries_are_dropped_when_released() {
    let locks = TenantLocks::new();
    let held = locks.lock(&tenant()).await;
    let other = locks.try_lock(&TenantId::from("guild-2"));
    assert_eq!(locks.tracked(), 2);

    drop(other);
    assert_eq!(locks.tracked(), 1);

    // A waiter keeps the entry alive after the holder lets go.
    let waiter = {
        let locks = locks.clone();
        tokio::spawn(async move {
            let guard = locks.lock(&tenant()).await;
            drop(guard);
        })
    };
    tokio::task::yield_now().await;
    drop(held);
    waiter.await.unwrap();

    assert_eq!(locks.tracked(), 0);
    assert!(locks.try_lock(&tenant()).is_some());
}

#[tokio::test]
async fn test_retention_rejects_guard_of_other_tenant() {
    let store = InMemoryStore::new();
    let locks = TenantLocks::new();
    let guard = locks.lock(&TenantId::from("guild-2")).await;

    let err = enforce_retention(
        &store,
        &guard,
        SnapshotId::new(),
        &TenantSettings::new(tenant()),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err.kind(),
        CartographerErrorKind::Restore(e) if matches!(e.kind, RestoreErrorKind::TenantMismatch { .. })
    ));
}
