//! Fixtures shared by the restore tests.

#![allow(dead_code)]

use cartographer_core::{
    ChannelKind, ChannelSpecBuilder, GroupSpecBuilder, LiveEntity, LiveOverlay, LiveRole,
    LiveState, LiveSubject, OverlaySubject, PermissionOverlay, Permissions, RoleSpecBuilder,
    Snapshot, TenantId,
};
use cartographer_rate_limit::{PlatformTier, RateLimiter, RetryConfig, TierConfig};
use cartographer_restore::MemoryPlatform;
use chrono::Utc;

pub const TENANT: &str = "guild-1";

pub fn tenant() -> TenantId {
    TenantId::from(TENANT)
}

/// Limiter without rate limits and with millisecond backoff.
pub fn limiter() -> RateLimiter<TierConfig> {
    RateLimiter::new(TierConfig::from(PlatformTier::Unlimited)).with_retry(RetryConfig {
        initial_backoff_ms: 1,
        factor: 2,
        max_delay_ms: 5,
        max_attempts: 3,
    })
}

pub fn everyone() -> LiveRole {
    LiveRole {
        id: "everyone".into(),
        name: "@everyone".into(),
        color: 0,
        hoist: false,
        mentionable: false,
        permissions: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
        position: 0,
        managed: false,
        is_default: true,
    }
}

pub fn live_role(id: &str, name: &str, position: i32) -> LiveRole {
    LiveRole {
        id: id.into(),
        name: name.into(),
        color: 0,
        hoist: false,
        mentionable: false,
        permissions: Permissions::empty(),
        position,
        managed: false,
        is_default: false,
    }
}

pub fn live_group(id: &str, name: &str, position: i32) -> LiveEntity {
    LiveEntity {
        id: id.into(),
        name: name.into(),
        kind: ChannelKind::Category,
        parent_id: None,
        position,
        overlays: Vec::new(),
        topic: None,
        nsfw: false,
        rate_limit_per_user: 0,
        bitrate: None,
        user_limit: None,
    }
}

pub fn live_channel(id: &str, name: &str, parent: Option<&str>, position: i32) -> LiveEntity {
    LiveEntity {
        kind: ChannelKind::Text,
        parent_id: parent.map(Into::into),
        ..live_group(id, name, position)
    }
}

pub fn overlay(subject: LiveSubject, allow: Permissions, deny: Permissions) -> LiveOverlay {
    LiveOverlay {
        subject,
        allow,
        deny,
    }
}

/// A hierarchy with only the default role.
pub fn empty_live() -> LiveState {
    LiveState {
        roles: vec![everyone()],
        ..Default::default()
    }
}

pub fn platform_with(live: LiveState) -> MemoryPlatform {
    MemoryPlatform::new().with_state(tenant(), live)
}

/// Roles Mod (rank 0) and Member (rank 1), group General, and channel
/// general-chat under General that denies sending to everyone and allows it
/// for Mod.
pub fn example_snapshot() -> Snapshot {
    let roles = vec![
        RoleSpecBuilder::default()
            .key("r0")
            .name("Mod")
            .color(0x3498db_u32)
            .hoist(true)
            .permissions(Permissions::MANAGE_MESSAGES | Permissions::KICK_MEMBERS)
            .rank(0u32)
            .build()
            .unwrap(),
        RoleSpecBuilder::default()
            .key("r1")
            .name("Member")
            .rank(1u32)
            .build()
            .unwrap(),
    ];
    let groups = vec![
        GroupSpecBuilder::default()
            .key("g0")
            .name("General")
            .position(0u32)
            .build()
            .unwrap(),
    ];
    let channels = vec![
        ChannelSpecBuilder::default()
            .key("c0")
            .name("general-chat")
            .kind(ChannelKind::Text)
            .position(0u32)
            .parent_ref("g0")
            .topic("Talk about anything")
            .overlays(vec![
                PermissionOverlay::normalized(
                    OverlaySubject::Everyone,
                    Permissions::empty(),
                    Permissions::SEND_MESSAGES,
                ),
                PermissionOverlay::normalized(
                    OverlaySubject::Role("r0".into()),
                    Permissions::SEND_MESSAGES,
                    Permissions::empty(),
                ),
            ])
            .build()
            .unwrap(),
    ];
    Snapshot::new(tenant(), Utc::now(), roles, groups, channels).unwrap()
}
