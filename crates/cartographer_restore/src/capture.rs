//! Capture: read a live hierarchy into a snapshot.
//!
//! Capture is read-only and atomic. Every adapter read is attempted once;
//! any failure abandons the capture and the caller retries it as a whole.

use cartographer_core::{
    ChannelSpec, ChannelSpecBuilder, EntityId, GroupSpec, GroupSpecBuilder, LiveEntity,
    LiveOverlay, LiveRole, LiveSubject, OverlaySubject, PermissionOverlay, RoleSpec,
    RoleSpecBuilder, Snapshot, TenantId, TenantSettings,
};
use cartographer_error::{AdapterError, AdapterResult, CaptureError, CaptureErrorKind};
use cartographer_interface::PlatformAdapter;
use cartographer_rate_limit::{RateLimiter, Tier};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;

/// Capture the live hierarchy of `tenant`.
///
/// Managed and default roles are never captured. Names in the tenant's
/// ignore lists are skipped; channels under an ignored group are skipped
/// with it.
///
/// # Errors
///
/// Returns [`CaptureError`] when a read fails or the captured hierarchy does
/// not form a valid snapshot. Nothing is persisted in either case.
#[tracing::instrument(skip(adapter, limiter, settings), fields(adapter = adapter.name(), tenant = %tenant))]
pub async fn capture<T: Tier>(
    adapter: &dyn PlatformAdapter,
    limiter: &RateLimiter<T>,
    tenant: &TenantId,
    settings: &TenantSettings,
) -> Result<Snapshot, CaptureError> {
    let live_roles = read_once(limiter, "roles", || adapter.list_roles(tenant)).await?;
    let live_groups = read_once(limiter, "groups", || adapter.list_groups(tenant)).await?;
    let live_channels = read_once(limiter, "channels", || adapter.list_channels(tenant)).await?;

    let default_role = live_roles.iter().find(|r| r.is_default).map(|r| r.id.clone());

    let (roles, role_keys) = capture_roles(&live_roles, settings)?;

    let mut groups_live: Vec<&LiveEntity> = live_groups
        .iter()
        .filter(|g| g.kind.is_group() && !settings.is_channel_ignored(&g.name))
        .collect();
    groups_live.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

    let ignored_groups: Vec<&EntityId> = live_groups
        .iter()
        .filter(|g| settings.is_channel_ignored(&g.name))
        .map(|g| &g.id)
        .collect();

    let mut group_keys: HashMap<EntityId, String> = HashMap::new();
    let mut groups = Vec::with_capacity(groups_live.len());
    for (index, live) in groups_live.iter().enumerate() {
        let key = format!("g{}", index);
        let overlays = read_once(limiter, "overlays", || adapter.list_overlays(tenant, &live.id))
            .await?;
        let group = GroupSpecBuilder::default()
            .key(key.clone())
            .name(live.name.clone())
            .position(index as u32)
            .overlays(capture_overlays(&overlays, &role_keys, default_role.as_ref()))
            .build()
            .map_err(|e| CaptureError::new(CaptureErrorKind::Invalid(e.to_string())))?;
        group_keys.insert(live.id.clone(), key);
        groups.push(group);
    }

    // Channels grouped by parent: top level first, then each group in order.
    let mut by_parent: HashMap<Option<String>, Vec<&LiveEntity>> = HashMap::new();
    for live in live_channels.iter().filter(|c| !c.kind.is_group()) {
        if settings.is_channel_ignored(&live.name) {
            continue;
        }
        let parent = match &live.parent_id {
            Some(parent_id) if ignored_groups.contains(&parent_id) => continue,
            Some(parent_id) => match group_keys.get(parent_id) {
                Some(key) => Some(key.clone()),
                None => {
                    tracing::warn!(channel = %live.name, parent = %parent_id, "Channel parent not listed, capturing at top level");
                    None
                }
            },
            None => None,
        };
        by_parent.entry(parent).or_default().push(live);
    }

    let parent_order: Vec<Option<String>> = std::iter::once(None)
        .chain(groups.iter().map(|g: &GroupSpec| Some(g.key().clone())))
        .collect();

    let mut channels: Vec<ChannelSpec> = Vec::with_capacity(live_channels.len());
    for parent in parent_order {
        let Some(mut siblings) = by_parent.remove(&parent) else {
            continue;
        };
        siblings.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        for (index, live) in siblings.into_iter().enumerate() {
            let overlays =
                read_once(limiter, "overlays", || adapter.list_overlays(tenant, &live.id)).await?;
            let channel = channel_spec(
                format!("c{}", channels.len()),
                live,
                index as u32,
                parent.clone(),
                capture_overlays(&overlays, &role_keys, default_role.as_ref()),
            )?;
            channels.push(channel);
        }
    }

    let snapshot = Snapshot::new(tenant.clone(), Utc::now(), roles, groups, channels)
        .map_err(|e| CaptureError::new(CaptureErrorKind::Invalid(e.kind.to_string())))?;

    let summary = snapshot.summary();
    tracing::info!(
        roles = summary.roles,
        groups = summary.groups,
        channels = summary.channels,
        overlays = summary.overlays,
        "Captured hierarchy"
    );
    Ok(snapshot)
}

async fn read_once<T, F, Fut, R>(
    limiter: &RateLimiter<T>,
    what: &str,
    read: F,
) -> Result<R, CaptureError>
where
    T: Tier,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AdapterResult<R>>,
{
    let _guard = limiter.acquire().await;
    read().await.map_err(|e| read_error(what, e))
}

fn read_error(what: &str, err: AdapterError) -> CaptureError {
    let kind = if err.kind.is_retryable() {
        CaptureErrorKind::Read {
            what: what.to_string(),
            message: err.kind.to_string(),
        }
    } else {
        CaptureErrorKind::Rejected {
            what: what.to_string(),
            message: err.kind.to_string(),
        }
    };
    tracing::warn!(what, error = %err, "Capture read failed");
    CaptureError::new(kind)
}

fn capture_roles(
    live_roles: &[LiveRole],
    settings: &TenantSettings,
) -> Result<(Vec<RoleSpec>, HashMap<EntityId, String>), CaptureError> {
    let mut capturable: Vec<&LiveRole> = live_roles
        .iter()
        .filter(|r| r.is_restorable() && !settings.is_role_ignored(&r.name))
        .collect();
    // Most senior first.
    capturable.sort_by(|a, b| b.position.cmp(&a.position).then_with(|| a.id.cmp(&b.id)));

    let mut keys = HashMap::with_capacity(capturable.len());
    let mut roles = Vec::with_capacity(capturable.len());
    for (rank, live) in capturable.into_iter().enumerate() {
        let key = format!("r{}", rank);
        roles.push(role_spec(key.clone(), live, rank as u32)?);
        keys.insert(live.id.clone(), key);
    }
    Ok((roles, keys))
}

fn role_spec(key: String, live: &LiveRole, rank: u32) -> Result<RoleSpec, CaptureError> {
    RoleSpecBuilder::default()
        .key(key)
        .name(live.name.clone())
        .color(live.color)
        .hoist(live.hoist)
        .mentionable(live.mentionable)
        .permissions(live.permissions)
        .rank(rank)
        .build()
        .map_err(|e| CaptureError::new(CaptureErrorKind::Invalid(e.to_string())))
}

fn channel_spec(
    key: String,
    live: &LiveEntity,
    position: u32,
    parent: Option<String>,
    overlays: Vec<PermissionOverlay>,
) -> Result<ChannelSpec, CaptureError> {
    let mut builder = ChannelSpecBuilder::default();
    builder
        .key(key)
        .name(live.name.clone())
        .kind(live.kind)
        .position(position)
        .overlays(overlays)
        .nsfw(live.nsfw)
        .rate_limit_per_user(live.rate_limit_per_user);
    if let Some(parent) = parent {
        builder.parent_ref(parent);
    }
    if let Some(topic) = live.topic.clone().filter(|t| !t.is_empty()) {
        builder.topic(topic);
    }
    if live.kind.is_voice_like() {
        if let Some(bitrate) = live.bitrate {
            builder.bitrate(bitrate);
        }
        if let Some(user_limit) = live.user_limit {
            builder.user_limit(user_limit);
        }
    }
    builder
        .build()
        .map_err(|e| CaptureError::new(CaptureErrorKind::Invalid(e.to_string())))
}

/// Translate live overlays to snapshot overlays.
///
/// Subjects that are not captured roles (managed or ignored roles) are
/// dropped. The default role is folded into the everyone subject. Bits both
/// allowed and denied resolve to allowed. Output is ordered by subject.
fn capture_overlays(
    live: &[LiveOverlay],
    role_keys: &HashMap<EntityId, String>,
    default_role: Option<&EntityId>,
) -> Vec<PermissionOverlay> {
    let mut merged: Vec<PermissionOverlay> = Vec::with_capacity(live.len());
    for overlay in live {
        let subject = match &overlay.subject {
            LiveSubject::Everyone => OverlaySubject::Everyone,
            LiveSubject::Role(id) if Some(id) == default_role => OverlaySubject::Everyone,
            LiveSubject::Role(id) => match role_keys.get(id) {
                Some(key) => OverlaySubject::Role(key.clone()),
                None => {
                    tracing::debug!(role = %id, "Dropping overlay for uncaptured role");
                    continue;
                }
            },
        };
        match merged.iter_mut().find(|o| o.subject == subject) {
            Some(existing) => {
                *existing = PermissionOverlay::normalized(
                    subject,
                    existing.allow | overlay.allow,
                    existing.deny | overlay.deny,
                );
            }
            None => merged.push(PermissionOverlay::normalized(
                subject,
                overlay.allow,
                overlay.deny,
            )),
        }
    }
    merged.retain(|o| !o.is_empty());
    merged.sort_by(|a, b| a.subject.cmp(&b.subject));
    merged
}
