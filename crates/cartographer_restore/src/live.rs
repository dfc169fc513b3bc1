//! Rate-limited reads of the live hierarchy.

use cartographer_core::{LiveState, TenantId, TenantSettings};
use cartographer_error::AdapterResult;
use cartographer_interface::PlatformAdapter;
use cartographer_rate_limit::{RateLimiter, Tier};

/// Read roles, groups, channels and every entity's overlays.
///
/// Each adapter call acquires the limiter separately and transient failures
/// are retried per call.
#[tracing::instrument(skip(adapter, limiter), fields(adapter = adapter.name(), tenant = %tenant))]
pub async fn read_live_state<T: Tier>(
    adapter: &dyn PlatformAdapter,
    limiter: &RateLimiter<T>,
    tenant: &TenantId,
) -> AdapterResult<LiveState> {
    let roles = limiter.execute(|| adapter.list_roles(tenant)).await?;
    let mut groups = limiter.execute(|| adapter.list_groups(tenant)).await?;
    let mut channels = limiter.execute(|| adapter.list_channels(tenant)).await?;

    for entity in groups.iter_mut().chain(channels.iter_mut()) {
        let id = entity.id.clone();
        entity.overlays = limiter
            .execute(|| adapter.list_overlays(tenant, &id))
            .await?;
    }

    tracing::debug!(
        roles = roles.len(),
        groups = groups.len(),
        channels = channels.len(),
        "Read live state"
    );

    Ok(LiveState {
        roles,
        groups,
        channels,
    })
}

/// Drop the entities a tenant excludes from backups.
///
/// Ignored roles, ignored groups with their channels, and ignored channels
/// disappear from the returned state, so restore neither matches nor deletes
/// them. Overlays that mention an ignored role stay on their entities.
pub fn without_ignored(mut live: LiveState, settings: &TenantSettings) -> LiveState {
    live.roles.retain(|r| !settings.is_role_ignored(&r.name));

    let ignored_groups: Vec<_> = live
        .groups
        .iter()
        .filter(|g| settings.is_channel_ignored(&g.name))
        .map(|g| g.id.clone())
        .collect();
    live.groups.retain(|g| !ignored_groups.contains(&g.id));
    live.channels.retain(|c| {
        !settings.is_channel_ignored(&c.name)
            && !c
                .parent_id
                .as_ref()
                .is_some_and(|p| ignored_groups.contains(p))
    });
    live
}
