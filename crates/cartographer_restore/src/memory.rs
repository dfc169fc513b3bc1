//! In-process platform backend.
//!
//! `MemoryPlatform` keeps a live hierarchy per tenant and applies adapter
//! calls to it the way a real platform would, including cascading effects
//! (deleting a group moves its channels to the top level, deleting a role
//! drops its overlays). Failures can be scripted per call kind and entity
//! name, which makes it the synthetic backend for tests and simulations.

use cartographer_core::{
    ChannelKind, EntityId, EntityKind, LiveEntity, LiveOverlay, LiveRole, LiveState, LiveSubject,
    TenantId,
};
use cartographer_error::{AdapterError, AdapterErrorKind, AdapterResult};
use cartographer_interface::{AdapterLimits, ChannelDraft, PlatformAdapter, RoleDraft};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Adapter call families, for failure scripting and call logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum CallKind {
    /// `list_roles`
    ListRoles,
    /// `list_groups`
    ListGroups,
    /// `list_channels`
    ListChannels,
    /// `list_overlays`
    ListOverlays,
    /// `create_role`
    CreateRole,
    /// `update_role`
    UpdateRole,
    /// `create_group`
    CreateGroup,
    /// `update_group`
    UpdateGroup,
    /// `create_channel`
    CreateChannel,
    /// `update_channel`
    UpdateChannel,
    /// `set_overlay`
    SetOverlay,
    /// `delete_entity`
    DeleteEntity,
    /// `set_position`
    SetPosition,
}

impl CallKind {
    /// Whether the call changes the hierarchy.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            CallKind::ListRoles | CallKind::ListGroups | CallKind::ListChannels | CallKind::ListOverlays
        )
    }
}

/// Scripted failure.
///
/// # Examples
///
/// ```
/// use cartographer_error::AdapterErrorKind;
/// use cartographer_restore::{CallKind, FailureRule};
///
/// // The first two attempts to create "General" time out.
/// let rule = FailureRule::new(CallKind::CreateGroup, AdapterErrorKind::Timeout("slow".into()))
///     .matching_name("General")
///     .times(2);
/// # let _ = rule;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRule {
    call: CallKind,
    error: AdapterErrorKind,
    name: Option<String>,
    remaining: Option<u32>,
}

impl FailureRule {
    /// Fail every call of `call` with `error`.
    pub fn new(call: CallKind, error: AdapterErrorKind) -> Self {
        Self {
            call,
            error,
            name: None,
            remaining: None,
        }
    }

    /// Only fail calls whose target is named `name` (case-insensitive).
    pub fn matching_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stop failing after `count` failures.
    pub fn times(mut self, count: u32) -> Self {
        self.remaining = Some(count);
        self
    }

    fn applies(&self, call: CallKind, name: Option<&str>) -> bool {
        self.call == call
            && self.remaining != Some(0)
            && match (&self.name, name) {
                (None, _) => true,
                (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
                (Some(_), None) => false,
            }
    }
}

/// One call received by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Call family
    pub call: CallKind,
    /// Tenant addressed
    pub tenant: TenantId,
    /// Name of the target entity, when known
    pub target: Option<String>,
    /// Whether a scripted failure answered the call
    pub failed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    tenants: HashMap<TenantId, LiveState>,
    rules: Vec<FailureRule>,
    calls: Vec<RecordedCall>,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> EntityId {
        self.next_id += 1;
        EntityId(format!("{}-{}", prefix, self.next_id))
    }

    /// Log the call and answer it with a scripted failure if one applies.
    fn intercept(
        &mut self,
        call: CallKind,
        tenant: &TenantId,
        target: Option<&str>,
    ) -> AdapterResult<()> {
        let rule = self.rules.iter_mut().find(|r| r.applies(call, target));
        let error = rule.map(|rule| {
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            rule.error.clone()
        });
        self.calls.push(RecordedCall {
            call,
            tenant: tenant.clone(),
            target: target.map(str::to_string),
            failed: error.is_some(),
        });
        match error {
            Some(kind) => {
                tracing::debug!(%call, ?target, error = %kind, "Scripted failure");
                Err(AdapterError::new(kind))
            }
            None => Ok(()),
        }
    }

    fn state(&mut self, tenant: &TenantId) -> AdapterResult<&mut LiveState> {
        self.tenants.get_mut(tenant).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::NotFound(format!("tenant {}", tenant)))
        })
    }
}

/// Platform adapter backed by in-process state.
#[derive(Debug)]
pub struct MemoryPlatform {
    inner: Mutex<Inner>,
    limits: AdapterLimits,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    /// Platform with no tenants and unlimited rate.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            limits: AdapterLimits::default(),
        }
    }

    /// Seed a tenant's live hierarchy.
    pub fn with_state(self, tenant: impl Into<TenantId>, state: LiveState) -> Self {
        self.set_state(tenant, state);
        self
    }

    /// Publish different limits.
    pub fn with_limits(mut self, limits: AdapterLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Add a scripted failure.
    pub fn with_failure(self, rule: FailureRule) -> Self {
        self.fail(rule);
        self
    }

    /// Add a scripted failure to a running platform.
    pub fn fail(&self, rule: FailureRule) {
        self.lock().rules.push(rule);
    }

    /// Remove every scripted failure.
    pub fn clear_failures(&self) {
        self.lock().rules.clear();
    }

    /// Replace a tenant's live hierarchy.
    pub fn set_state(&self, tenant: impl Into<TenantId>, state: LiveState) {
        let mut inner = self.lock();
        // Keep generated ids clear of any seeded ones.
        inner.next_id = inner.next_id.max(1000);
        inner.tenants.insert(tenant.into(), state);
    }

    /// Copy of a tenant's live hierarchy (empty if unknown).
    pub fn state(&self, tenant: &TenantId) -> LiveState {
        self.lock().tenants.get(tenant).cloned().unwrap_or_default()
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Number of mutating calls received (failed ones included).
    pub fn mutation_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.call.is_mutation()).count()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn not_found(what: &str, id: &EntityId) -> AdapterError {
    AdapterError::new(AdapterErrorKind::NotFound(format!("{} {}", what, id)))
}

fn entity_name(state: &LiveState, kind: EntityKind, id: &EntityId) -> Option<String> {
    match kind {
        EntityKind::Role => state.role(id).map(|r| r.name.clone()),
        EntityKind::Group => state.group(id).map(|g| g.name.clone()),
        EntityKind::Channel => state.channel(id).map(|c| c.name.clone()),
    }
}

fn find_entity<'s>(state: &'s mut LiveState, id: &EntityId) -> Option<&'s mut LiveEntity> {
    state
        .groups
        .iter_mut()
        .chain(state.channels.iter_mut())
        .find(|e| &e.id == id)
}

fn apply_channel_draft(entity: &mut LiveEntity, draft: &ChannelDraft) {
    entity.name = draft.name.clone();
    entity.kind = draft.kind;
    entity.parent_id = draft.parent.clone();
    entity.topic = draft.topic.clone();
    entity.nsfw = draft.nsfw;
    entity.rate_limit_per_user = draft.rate_limit_per_user;
    if draft.bitrate.is_some() {
        entity.bitrate = draft.bitrate;
    }
    if draft.user_limit.is_some() {
        entity.user_limit = draft.user_limit;
    }
}

fn new_entity(id: EntityId, draft: &ChannelDraft) -> LiveEntity {
    let mut entity = LiveEntity {
        id,
        name: String::new(),
        kind: draft.kind,
        parent_id: None,
        position: draft.position,
        overlays: Vec::new(),
        topic: None,
        nsfw: false,
        rate_limit_per_user: 0,
        bitrate: None,
        user_limit: None,
    };
    apply_channel_draft(&mut entity, draft);
    entity
}

#[async_trait::async_trait]
impl PlatformAdapter for MemoryPlatform {
    fn name(&self) -> &str {
        "memory"
    }

    fn limits(&self) -> AdapterLimits {
        self.limits.clone()
    }

    async fn list_roles(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveRole>> {
        let mut inner = self.lock();
        inner.intercept(CallKind::ListRoles, tenant, None)?;
        Ok(inner.state(tenant)?.roles.clone())
    }

    async fn list_groups(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveEntity>> {
        let mut inner = self.lock();
        inner.intercept(CallKind::ListGroups, tenant, None)?;
        Ok(inner.state(tenant)?.groups.clone())
    }

    async fn list_channels(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveEntity>> {
        let mut inner = self.lock();
        inner.intercept(CallKind::ListChannels, tenant, None)?;
        Ok(inner.state(tenant)?.channels.clone())
    }

    async fn list_overlays(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
    ) -> AdapterResult<Vec<LiveOverlay>> {
        let mut inner = self.lock();
        let name = inner
            .tenants
            .get_mut(tenant)
            .and_then(|s| find_entity(s, entity).map(|e| e.name.clone()));
        inner.intercept(CallKind::ListOverlays, tenant, name.as_deref())?;
        find_entity(inner.state(tenant)?, entity)
            .map(|e| e.overlays.clone())
            .ok_or_else(|| not_found("entity", entity))
    }

    async fn create_role(&self, tenant: &TenantId, draft: &RoleDraft) -> AdapterResult<EntityId> {
        let mut inner = self.lock();
        inner.intercept(CallKind::CreateRole, tenant, Some(&draft.name))?;
        inner.state(tenant)?;
        let id = inner.next_id("role");
        let state = inner.state(tenant)?;
        state.roles.push(LiveRole {
            id: id.clone(),
            name: draft.name.clone(),
            color: draft.color,
            hoist: draft.hoist,
            mentionable: draft.mentionable,
            permissions: draft.permissions,
            position: draft.position,
            managed: false,
            is_default: false,
        });
        Ok(id)
    }

    async fn update_role(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &RoleDraft,
    ) -> AdapterResult<()> {
        let mut inner = self.lock();
        inner.intercept(CallKind::UpdateRole, tenant, Some(&draft.name))?;
        let role = inner
            .state(tenant)?
            .roles
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| not_found("role", id))?;
        if !role.is_restorable() {
            return Err(AdapterError::new(AdapterErrorKind::PermissionDenied(format!(
                "role {} is not editable",
                id
            ))));
        }
        role.name = draft.name.clone();
        role.color = draft.color;
        role.hoist = draft.hoist;
        role.mentionable = draft.mentionable;
        role.permissions = draft.permissions;
        Ok(())
    }

    async fn create_group(
        &self,
        tenant: &TenantId,
        draft: &ChannelDraft,
    ) -> AdapterResult<EntityId> {
        let mut inner = self.lock();
        inner.intercept(CallKind::CreateGroup, tenant, Some(&draft.name))?;
        if draft.kind != ChannelKind::Category || draft.parent.is_some() {
            return Err(AdapterError::new(AdapterErrorKind::Malformed(
                "groups are top-level categories".to_string(),
            )));
        }
        inner.state(tenant)?;
        let id = inner.next_id("group");
        inner.state(tenant)?.groups.push(new_entity(id.clone(), draft));
        Ok(id)
    }

    async fn update_group(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &ChannelDraft,
    ) -> AdapterResult<()> {
        let mut inner = self.lock();
        inner.intercept(CallKind::UpdateGroup, tenant, Some(&draft.name))?;
        let group = inner
            .state(tenant)?
            .groups
            .iter_mut()
            .find(|g| &g.id == id)
            .ok_or_else(|| not_found("group", id))?;
        apply_channel_draft(group, draft);
        Ok(())
    }

    async fn create_channel(
        &self,
        tenant: &TenantId,
        draft: &ChannelDraft,
    ) -> AdapterResult<EntityId> {
        let mut inner = self.lock();
        inner.intercept(CallKind::CreateChannel, tenant, Some(&draft.name))?;
        if draft.kind.is_group() {
            return Err(AdapterError::new(AdapterErrorKind::Malformed(
                "channels cannot be categories".to_string(),
            )));
        }
        if let Some(parent) = &draft.parent
            && inner.state(tenant)?.group(parent).is_none()
        {
            return Err(not_found("parent group", parent));
        }
        inner.state(tenant)?;
        let id = inner.next_id("channel");
        inner
            .state(tenant)?
            .channels
            .push(new_entity(id.clone(), draft));
        Ok(id)
    }

    async fn update_channel(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &ChannelDraft,
    ) -> AdapterResult<()> {
        let mut inner = self.lock();
        inner.intercept(CallKind::UpdateChannel, tenant, Some(&draft.name))?;
        let state = inner.state(tenant)?;
        if let Some(parent) = &draft.parent
            && state.group(parent).is_none()
        {
            return Err(not_found("parent group", parent));
        }
        let channel = state
            .channels
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| not_found("channel", id))?;
        apply_channel_draft(channel, draft);
        Ok(())
    }

    async fn set_overlay(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
        overlay: &LiveOverlay,
    ) -> AdapterResult<()> {
        let mut inner = self.lock();
        let name = inner
            .tenants
            .get_mut(tenant)
            .and_then(|s| find_entity(s, entity).map(|e| e.name.clone()));
        inner.intercept(CallKind::SetOverlay, tenant, name.as_deref())?;
        let state = inner.state(tenant)?;
        if let LiveSubject::Role(role) = &overlay.subject
            && state.role(role).is_none()
        {
            return Err(not_found("role", role));
        }
        let target = find_entity(state, entity).ok_or_else(|| not_found("entity", entity))?;
        target.overlays.retain(|o| o.subject != overlay.subject);
        if !overlay.is_empty() {
            target.overlays.push(overlay.clone());
        }
        Ok(())
    }

    async fn delete_entity(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &EntityId,
    ) -> AdapterResult<()> {
        let mut inner = self.lock();
        let name = inner
            .tenants
            .get(tenant)
            .and_then(|s| entity_name(s, kind, id));
        inner.intercept(CallKind::DeleteEntity, tenant, name.as_deref())?;
        let state = inner.state(tenant)?;
        match kind {
            EntityKind::Role => {
                let role = state.role(id).ok_or_else(|| not_found("role", id))?;
                if !role.is_restorable() {
                    return Err(AdapterError::new(AdapterErrorKind::PermissionDenied(
                        format!("role {} cannot be deleted", id),
                    )));
                }
                state.roles.retain(|r| &r.id != id);
                let subject = LiveSubject::Role(id.clone());
                for entity in state.groups.iter_mut().chain(state.channels.iter_mut()) {
                    entity.overlays.retain(|o| o.subject != subject);
                }
            }
            EntityKind::Group => {
                state.group(id).ok_or_else(|| not_found("group", id))?;
                state.groups.retain(|g| &g.id != id);
                for channel in state.channels.iter_mut() {
                    if channel.parent_id.as_ref() == Some(id) {
                        channel.parent_id = None;
                    }
                }
            }
            EntityKind::Channel => {
                state.channel(id).ok_or_else(|| not_found("channel", id))?;
                state.channels.retain(|c| &c.id != id);
            }
        }
        Ok(())
    }

    async fn set_position(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &EntityId,
        position: i32,
    ) -> AdapterResult<()> {
        let mut inner = self.lock();
        let name = inner
            .tenants
            .get(tenant)
            .and_then(|s| entity_name(s, kind, id));
        inner.intercept(CallKind::SetPosition, tenant, name.as_deref())?;
        let state = inner.state(tenant)?;
        let slot = match kind {
            EntityKind::Role => state
                .roles
                .iter_mut()
                .find(|r| &r.id == id)
                .map(|r| &mut r.position),
            EntityKind::Group => state
                .groups
                .iter_mut()
                .find(|g| &g.id == id)
                .map(|g| &mut g.position),
            EntityKind::Channel => state
                .channels
                .iter_mut()
                .find(|c| &c.id == id)
                .map(|c| &mut c.position),
        };
        *slot.ok_or_else(|| not_found(&kind.to_string(), id))? = position;
        Ok(())
    }
}
