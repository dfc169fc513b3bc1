//! Plan execution.
//!
//! Barriers run strictly one after another. Before each barrier the live
//! state is read again and every operation is re-checked against it, so a
//! plan can be re-run safely: work that already holds is reported as
//! already correct instead of being sent twice. Within a barrier the
//! remaining operations run concurrently, each adapter call passing through
//! the shared rate limiter with retry on transient errors. Deletions are the
//! exception: each entity kind finishes before its parents' kind starts.

use crate::live::read_live_state;
use crate::planner::{
    Barrier, Bindings, NodeRef, Operation, RestorePlan, SubjectRef, deletion_rank,
    find_live_overlay,
};
use crate::report::{
    FailureReason, OperationOutcome, OperationReport, RestoreReport, SkipReason,
};
use cartographer_core::{EntityId, EntityKind, LiveEntity, LiveOverlay, LiveState, LiveSubject, TenantId};
use cartographer_error::{AdapterErrorKind, AdapterResult};
use cartographer_interface::{AdapterLimits, ChannelDraft, PlatformAdapter, RoleDraft};
use cartographer_rate_limit::{RateLimiter, Tier};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::IntoEnumIterator;

/// Cooperative cancellation, checked between barriers.
///
/// Operations already in flight when the token fires run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Adapter call with every snapshot key replaced by a live identity.
#[derive(Debug, Clone)]
enum Call {
    CreateRole(RoleDraft),
    UpdateRole(EntityId, RoleDraft),
    CreateGroup(ChannelDraft),
    UpdateGroup(EntityId, ChannelDraft),
    CreateChannel(ChannelDraft),
    UpdateChannel(EntityId, ChannelDraft),
    SetOverlay(EntityId, LiveOverlay),
    SetPosition(EntityKind, EntityId, i32),
    Delete(EntityKind, EntityId),
}

enum Prepared {
    Done(OperationOutcome),
    Send(Call),
}

/// Applies restore plans through a platform adapter.
pub struct Executor<'a, T: Tier> {
    adapter: &'a dyn PlatformAdapter,
    limiter: &'a RateLimiter<T>,
    concurrency: usize,
    limits: AdapterLimits,
}

impl<'a, T: Tier> Executor<'a, T> {
    /// Executor bounded by the adapter's published concurrency.
    pub fn new(adapter: &'a dyn PlatformAdapter, limiter: &'a RateLimiter<T>) -> Self {
        let limits = adapter.limits();
        let concurrency = limits
            .tier
            .max_concurrent
            .map(|n| n as usize)
            .unwrap_or(1)
            .max(1);
        Self {
            adapter,
            limiter,
            concurrency,
            limits,
        }
    }

    /// Bound the number of operations in flight within one barrier.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Apply `plan` to `tenant`, starting from a freshly read `live` state.
    ///
    /// Never aborts: every planned operation appears in the report exactly
    /// once, in plan order.
    #[tracing::instrument(skip_all, fields(adapter = self.adapter.name(), tenant = %tenant, operations = plan.len()))]
    pub async fn execute(
        &self,
        tenant: &TenantId,
        plan: &RestorePlan,
        live: LiveState,
        cancel: &CancelToken,
    ) -> RestoreReport {
        if plan.policy().dry_run {
            tracing::info!("Dry run, nothing sent");
            return RestoreReport::dry_run(tenant.clone(), plan);
        }

        let mut slots: Vec<Option<OperationReport>> = vec![None; plan.len()];
        let mut bindings = plan.bindings().clone();
        let mut live = live;
        let mut fresh = true;
        let mut any_failed = false;
        let mut cancelled = false;

        for barrier in Barrier::iter() {
            let ops: Vec<(usize, &Operation)> = plan.barrier(barrier).collect();
            if ops.is_empty() {
                continue;
            }

            let skip = if cancelled || cancel.is_cancelled() {
                cancelled = true;
                Some(SkipReason::Cancelled)
            } else if barrier == Barrier::Deletions && any_failed {
                Some(SkipReason::EarlierFailures)
            } else {
                None
            };
            if let Some(reason) = skip {
                tracing::warn!(%barrier, %reason, count = ops.len(), "Barrier not attempted");
                for (index, op) in ops {
                    slots[index] = Some(report(index, op, OperationOutcome::NotAttempted(reason), 0));
                }
                continue;
            }

            if !fresh {
                match read_live_state(self.adapter, self.limiter, tenant).await {
                    Ok(state) => live = state,
                    Err(e) => {
                        tracing::warn!(%barrier, error = %e, "Live state refresh failed, re-checking against last known state");
                    }
                }
            }
            fresh = false;

            let mut pending = Vec::new();
            for (index, op) in ops {
                match self.prepare(op, &mut bindings, &live) {
                    Prepared::Done(outcome) => {
                        tracing::debug!(index, operation = %op, %outcome, "Resolved without a call");
                        if outcome.is_failure() {
                            any_failed = true;
                        }
                        slots[index] = Some(report(index, op, outcome, 0));
                    }
                    Prepared::Send(call) => pending.push((index, op, call)),
                }
            }

            let mut results = Vec::with_capacity(pending.len());
            for wave in waves(pending) {
                let done: Vec<_> = stream::iter(wave)
                    .map(|(index, op, call)| async move {
                        let (result, attempts) = self
                            .limiter
                            .execute_counted(|| self.send(tenant, &call))
                            .await;
                        (index, op, result, attempts)
                    })
                    .buffer_unordered(self.concurrency)
                    .collect()
                    .await;
                results.extend(done);
            }

            let mut applied = 0usize;
            let mut failed = 0usize;
            for (index, op, result, attempts) in results {
                let outcome = match result {
                    Ok(created) => {
                        if let (Some(id), Some(node)) = (created, op.node()) {
                            bindings.bind(&node, id);
                        }
                        applied += 1;
                        OperationOutcome::Applied
                    }
                    Err(e) => {
                        tracing::warn!(index, operation = %op, error = %e, attempts, "Operation failed");
                        failed += 1;
                        any_failed = true;
                        OperationOutcome::Failed(FailureReason::Adapter(e.kind))
                    }
                };
                slots[index] = Some(report(index, op, outcome, attempts));
            }

            tracing::info!(%barrier, applied, failed, "Barrier complete");
        }

        let operations: Vec<OperationReport> = slots
            .into_iter()
            .zip(plan.operations())
            .enumerate()
            .map(|(index, (slot, op))| {
                // Only reachable for an operation whose barrier was never visited.
                slot.unwrap_or_else(|| {
                    report(index, op, OperationOutcome::NotAttempted(SkipReason::Cancelled), 0)
                })
            })
            .collect();

        let report = RestoreReport::new(
            tenant.clone(),
            operations,
            plan.diagnostics().clone(),
            bindings,
            cancelled,
        );
        tracing::info!(
            applied = report.applied(),
            already_correct = report.already_correct(),
            failed = report.failed(),
            not_attempted = report.not_attempted(),
            cancelled,
            "Restore executed"
        );
        report
    }

    /// Re-check an operation against the live state and bind its references.
    fn prepare(&self, op: &Operation, bindings: &mut Bindings, live: &LiveState) -> Prepared {
        match op {
            Operation::CreateRole { key, draft } => {
                let existing = live.roles.iter().find(|r| {
                    r.is_restorable() && !bindings.is_bound(&r.id) && draft.matches(r)
                });
                if let Some(existing) = existing {
                    bindings.bind(&NodeRef::Role(key.clone()), existing.id.clone());
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                match self.check_name(&draft.name) {
                    Some(outcome) => Prepared::Done(outcome),
                    None => Prepared::Send(Call::CreateRole(draft.clone())),
                }
            }
            Operation::UpdateRole { id, draft, .. } => {
                if live.role(id).is_some_and(|r| draft.matches(r)) {
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                match self.check_name(&draft.name) {
                    Some(outcome) => Prepared::Done(outcome),
                    None => Prepared::Send(Call::UpdateRole(id.clone(), draft.clone())),
                }
            }
            Operation::CreateGroup { key, draft } => {
                if let Some(existing) = unbound_match(&live.groups, draft, bindings) {
                    bindings.bind(&NodeRef::Group(key.clone()), existing);
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                match self.check_channel(draft) {
                    Some(outcome) => Prepared::Done(outcome),
                    None => Prepared::Send(Call::CreateGroup(draft.clone())),
                }
            }
            Operation::UpdateGroup { id, draft, .. } => {
                if live.group(id).is_some_and(|g| draft.matches(g)) {
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                match self.check_channel(draft) {
                    Some(outcome) => Prepared::Done(outcome),
                    None => Prepared::Send(Call::UpdateGroup(id.clone(), draft.clone())),
                }
            }
            Operation::CreateChannel { key, parent, draft } => {
                let draft = match with_parent(draft, parent.as_deref(), bindings) {
                    Ok(draft) => draft,
                    Err(outcome) => return Prepared::Done(outcome),
                };
                if let Some(existing) = unbound_match(&live.channels, &draft, bindings) {
                    bindings.bind(&NodeRef::Channel(key.clone()), existing);
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                match self.check_channel(&draft) {
                    Some(outcome) => Prepared::Done(outcome),
                    None => Prepared::Send(Call::CreateChannel(draft)),
                }
            }
            Operation::UpdateChannel {
                id, parent, draft, ..
            } => {
                let draft = match with_parent(draft, parent.as_deref(), bindings) {
                    Ok(draft) => draft,
                    Err(outcome) => return Prepared::Done(outcome),
                };
                if live.channel(id).is_some_and(|c| draft.matches(c)) {
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                match self.check_channel(&draft) {
                    Some(outcome) => Prepared::Done(outcome),
                    None => Prepared::Send(Call::UpdateChannel(id.clone(), draft)),
                }
            }
            Operation::SetOverlay {
                target,
                subject,
                allow,
                deny,
            } => {
                let Some(target_id) = bindings.get(target) else {
                    return unmet(target);
                };
                let live_subject = match subject {
                    SubjectRef::Everyone => LiveSubject::Everyone,
                    SubjectRef::Role(key) => {
                        let role = NodeRef::Role(key.clone());
                        match bindings.get(&role) {
                            Some(id) => LiveSubject::Role(id.clone()),
                            None => return unmet(&role),
                        }
                    }
                    SubjectRef::Live(id) => LiveSubject::Role(id.clone()),
                };
                let entity = live_entity(live, target.kind(), target_id);
                let default_role = live.default_role().map(|r| &r.id);
                let current =
                    entity.and_then(|e| find_live_overlay(e, &live_subject, default_role));
                let unchanged = match current {
                    Some(current) => current.allow == *allow && current.deny == *deny,
                    None => allow.is_empty() && deny.is_empty(),
                };
                if unchanged {
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                Prepared::Send(Call::SetOverlay(
                    target_id.clone(),
                    LiveOverlay {
                        subject: live_subject,
                        allow: *allow,
                        deny: *deny,
                    },
                ))
            }
            Operation::SetPosition { target, position } => {
                let Some(id) = bindings.get(target) else {
                    return unmet(target);
                };
                let current = match target.kind() {
                    EntityKind::Role => live.role(id).map(|r| r.position),
                    kind => live_entity(live, kind, id).map(|e| e.position),
                };
                if current == Some(*position) {
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                Prepared::Send(Call::SetPosition(target.kind(), id.clone(), *position))
            }
            Operation::DeleteEntity { kind, id, .. } => {
                let exists = match kind {
                    EntityKind::Role => live.role(id).is_some(),
                    kind => live_entity(live, *kind, id).is_some(),
                };
                if !exists {
                    return Prepared::Done(OperationOutcome::AlreadyCorrect);
                }
                Prepared::Send(Call::Delete(*kind, id.clone()))
            }
        }
    }

    fn check_name(&self, name: &str) -> Option<OperationOutcome> {
        let length = name.chars().count();
        (length > self.limits.max_name_length).then(|| {
            malformed(format!(
                "name of {} characters exceeds the limit of {}",
                length, self.limits.max_name_length
            ))
        })
    }

    fn check_channel(&self, draft: &ChannelDraft) -> Option<OperationOutcome> {
        self.check_name(&draft.name).or_else(|| {
            let length = draft.topic.as_deref().map_or(0, |t| t.chars().count());
            (length > self.limits.max_topic_length).then(|| {
                malformed(format!(
                    "topic of {} characters exceeds the limit of {}",
                    length, self.limits.max_topic_length
                ))
            })
        })
    }

    /// Send one call. Returns the new identity for creates.
    async fn send(&self, tenant: &TenantId, call: &Call) -> AdapterResult<Option<EntityId>> {
        let adapter = self.adapter;
        match call {
            Call::CreateRole(draft) => adapter.create_role(tenant, draft).await.map(Some),
            Call::UpdateRole(id, draft) => adapter.update_role(tenant, id, draft).await.map(|_| None),
            Call::CreateGroup(draft) => adapter.create_group(tenant, draft).await.map(Some),
            Call::UpdateGroup(id, draft) => {
                adapter.update_group(tenant, id, draft).await.map(|_| None)
            }
            Call::CreateChannel(draft) => adapter.create_channel(tenant, draft).await.map(Some),
            Call::UpdateChannel(id, draft) => {
                adapter.update_channel(tenant, id, draft).await.map(|_| None)
            }
            Call::SetOverlay(entity, overlay) => {
                adapter.set_overlay(tenant, entity, overlay).await.map(|_| None)
            }
            Call::SetPosition(kind, id, position) => adapter
                .set_position(tenant, *kind, id, *position)
                .await
                .map(|_| None),
            Call::Delete(kind, id) => adapter.delete_entity(tenant, *kind, id).await.map(|_| None),
        }
    }
}

/// Split a barrier's calls into waves that run one after another.
///
/// Deletions go channels, then groups, then roles, so a container is empty
/// by the time it is removed. Any other barrier is a single wave.
fn waves<'p>(pending: Vec<(usize, &'p Operation, Call)>) -> Vec<Vec<(usize, &'p Operation, Call)>> {
    let mut waves: BTreeMap<u8, Vec<_>> = BTreeMap::new();
    for entry in pending {
        let rank = match &entry.2 {
            Call::Delete(kind, _) => deletion_rank(*kind),
            _ => 0,
        };
        waves.entry(rank).or_default().push(entry);
    }
    waves.into_values().collect()
}

fn report(index: usize, op: &Operation, outcome: OperationOutcome, attempts: u32) -> OperationReport {
    OperationReport::new(index, op.barrier(), op.to_string(), outcome, attempts)
}

// Payloads over the published limits fail as the platform would reject them.
fn malformed(message: String) -> OperationOutcome {
    OperationOutcome::Failed(FailureReason::Adapter(AdapterErrorKind::Malformed(message)))
}

fn unmet(node: &NodeRef) -> Prepared {
    Prepared::Done(OperationOutcome::Failed(FailureReason::DependencyUnmet(
        format!("{} has no live identity", node),
    )))
}

fn live_entity<'l>(live: &'l LiveState, kind: EntityKind, id: &EntityId) -> Option<&'l LiveEntity> {
    match kind {
        EntityKind::Group => live.group(id),
        EntityKind::Channel => live.channel(id),
        EntityKind::Role => None,
    }
}

/// Fill in the live parent of a channel draft.
fn with_parent(
    draft: &ChannelDraft,
    parent: Option<&str>,
    bindings: &Bindings,
) -> Result<ChannelDraft, OperationOutcome> {
    let mut draft = draft.clone();
    draft.parent = match parent {
        None => None,
        Some(key) => {
            let group = NodeRef::Group(key.to_string());
            match bindings.get(&group) {
                Some(id) => Some(id.clone()),
                None => {
                    return Err(OperationOutcome::Failed(FailureReason::DependencyUnmet(
                        format!("{} has no live identity", group),
                    )));
                }
            }
        }
    };
    Ok(draft)
}

/// An unclaimed live entity that already carries the draft's attributes.
fn unbound_match(
    entities: &[LiveEntity],
    draft: &ChannelDraft,
    bindings: &Bindings,
) -> Option<EntityId> {
    entities
        .iter()
        .find(|e| !bindings.is_bound(&e.id) && draft.matches(e))
        .map(|e| e.id.clone())
}
