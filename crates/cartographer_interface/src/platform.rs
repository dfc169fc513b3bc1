//! Platform adapter trait.

use crate::{ChannelDraft, RoleDraft};
use cartographer_core::{EntityId, EntityKind, LiveEntity, LiveOverlay, LiveRole, TenantId};
use cartographer_error::AdapterResult;
use cartographer_rate_limit::{LimitsConfig, PlatformTier, TierConfig};
use serde::{Deserialize, Serialize};

/// Rate and payload limits an adapter publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterLimits {
    /// Request rate and concurrency for the adapter's credential
    pub tier: TierConfig,
    /// Longest accepted entity name
    pub max_name_length: usize,
    /// Longest accepted channel topic
    pub max_topic_length: usize,
}

impl AdapterLimits {
    /// Limits built from a tier and configured payload limits.
    pub fn new(tier: TierConfig, limits: LimitsConfig) -> Self {
        Self {
            tier,
            max_name_length: limits.max_name_length,
            max_topic_length: limits.max_topic_length,
        }
    }
}

impl Default for AdapterLimits {
    fn default() -> Self {
        Self::new(PlatformTier::Unlimited.into(), LimitsConfig::default())
    }
}

/// Read and mutate a tenant's live hierarchy.
///
/// Every call is independent and returns a typed
/// [`AdapterError`](cartographer_error::AdapterError); transient kinds are
/// retried by the caller. Implementations must be safe to call concurrently.
///
/// An overlay whose `allow` and `deny` are both empty passed to
/// [`set_overlay`](PlatformAdapter::set_overlay) removes the overlay for
/// that subject.
#[async_trait::async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &str;

    /// Published rate and payload limits.
    fn limits(&self) -> AdapterLimits;

    /// All roles, including managed and default roles.
    async fn list_roles(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveRole>>;

    /// All groups.
    async fn list_groups(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveEntity>>;

    /// All channels.
    async fn list_channels(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveEntity>>;

    /// Overlays currently set on a group or channel.
    async fn list_overlays(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
    ) -> AdapterResult<Vec<LiveOverlay>>;

    /// Create a role and return its new identity.
    async fn create_role(&self, tenant: &TenantId, draft: &RoleDraft) -> AdapterResult<EntityId>;

    /// Update a role's attributes (position is set separately).
    async fn update_role(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &RoleDraft,
    ) -> AdapterResult<()>;

    /// Create a group and return its new identity.
    async fn create_group(
        &self,
        tenant: &TenantId,
        draft: &ChannelDraft,
    ) -> AdapterResult<EntityId>;

    /// Update a group's attributes.
    async fn update_group(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &ChannelDraft,
    ) -> AdapterResult<()>;

    /// Create a channel and return its new identity.
    async fn create_channel(
        &self,
        tenant: &TenantId,
        draft: &ChannelDraft,
    ) -> AdapterResult<EntityId>;

    /// Update a channel's attributes, including its parent.
    async fn update_channel(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &ChannelDraft,
    ) -> AdapterResult<()>;

    /// Set (or with an empty overlay, clear) one subject's overlay on an entity.
    async fn set_overlay(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
        overlay: &LiveOverlay,
    ) -> AdapterResult<()>;

    /// Delete a role, group or channel.
    async fn delete_entity(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &EntityId,
    ) -> AdapterResult<()>;

    /// Move an entity to a position among its siblings.
    async fn set_position(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &EntityId,
        position: i32,
    ) -> AdapterResult<()>;
}
