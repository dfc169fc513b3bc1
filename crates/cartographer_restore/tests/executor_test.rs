//! Tests for plan execution against the in-memory platform.

mod common;

use cartographer_core::{
    EntityId, EntityKind, LiveEntity, LiveOverlay, LiveRole, LiveState, LiveSubject, Permissions,
    TenantId,
};
use cartographer_error::{AdapterError, AdapterErrorKind, AdapterResult};
use cartographer_interface::{AdapterLimits, ChannelDraft, PlatformAdapter, RoleDraft};
use cartographer_restore::{
    CallKind, CancelToken, Executor, FailureReason, FailureRule, MemoryPlatform, OperationOutcome,
    RestorePlan, RestorePolicy, RestoreReport, SkipReason, plan, resolve,
};
use common::*;
use std::sync::Mutex;
use std::time::Duration;

async fn restore(
    platform: &MemoryPlatform,
    policy: RestorePolicy,
    cancel: &CancelToken,
) -> (RestorePlan, RestoreReport) {
    let snapshot = example_snapshot();
    let live = platform.state(&tenant());
    let plan = plan(&snapshot, &resolve(&snapshot, &live), &live, policy);
    let limiter = limiter();
    let report = Executor::new(platform, &limiter)
        .with_concurrency(4)
        .execute(&tenant(), &plan, live, cancel)
        .await;
    (plan, report)
}

fn outcomes(report: &RestoreReport) -> Vec<OperationOutcome> {
    report
        .operations()
        .iter()
        .map(|op| op.outcome().clone())
        .collect()
}

fn calls_of(platform: &MemoryPlatform, call: CallKind) -> usize {
    platform.calls().iter().filter(|c| c.call == call).count()
}

#[tokio::test]
async fn test_restore_onto_empty_tenant_applies_everything() {
    let platform = platform_with(empty_live());

    let (plan, report) = restore(&platform, RestorePolicy::default(), &CancelToken::new()).await;

    assert_eq!(report.operations().len(), plan.len());
    assert!(report.is_complete(), "{report}");
    assert_eq!(report.applied(), 6);
    let indices: Vec<_> = report.operations().iter().map(|op| *op.index()).collect();
    assert_eq!(indices, (0..plan.len()).collect::<Vec<_>>());

    let state = platform.state(&tenant());
    let moderator = state.roles.iter().find(|r| r.name == "Mod").unwrap();
    assert_eq!(moderator.position, 2);
    assert!(moderator.hoist);
    let member = state.roles.iter().find(|r| r.name == "Member").unwrap();
    assert_eq!(member.position, 1);

    let group = &state.groups[0];
    let channel = &state.channels[0];
    assert_eq!(channel.parent_id.as_ref(), Some(&group.id));
    assert_eq!(channel.topic.as_deref(), Some("Talk about anything"));
    assert_eq!(
        channel.overlay_for(&LiveSubject::Everyone).unwrap().deny,
        Permissions::SEND_MESSAGES
    );
    assert_eq!(
        channel
            .overlay_for(&LiveSubject::Role(moderator.id.clone()))
            .unwrap()
            .allow,
        Permissions::SEND_MESSAGES
    );
    assert_eq!(report.bindings().roles.get("r0"), Some(&moderator.id));
}

#[tokio::test]
async fn test_second_restore_plans_nothing() {
    let platform = platform_with(empty_live());
    restore(&platform, RestorePolicy::default(), &CancelToken::new()).await;

    let (plan, report) = restore(&platform, RestorePolicy::default(), &CancelToken::new()).await;

    assert!(plan.is_empty());
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_rerunning_an_applied_plan_sends_nothing() {
    let platform = platform_with(empty_live());
    let (plan, _) = restore(&platform, RestorePolicy::default(), &CancelToken::new()).await;
    let mutations = platform.mutation_count();
    let limiter = limiter();

    let report = Executor::new(&platform, &limiter)
        .execute(&tenant(), &plan, platform.state(&tenant()), &CancelToken::new())
        .await;

    assert!(
        outcomes(&report)
            .iter()
            .all(|o| *o == OperationOutcome::AlreadyCorrect),
        "{report}"
    );
    assert_eq!(platform.mutation_count(), mutations);
}

#[tokio::test]
async fn test_failed_group_marks_dependents_and_withholds_deletions() {
    let mut live = empty_live();
    live.channels.push(live_channel("99", "old", None, 0));
    let platform = platform_with(live).with_failure(FailureRule::new(
        CallKind::CreateGroup,
        AdapterErrorKind::PermissionDenied("MANAGE_CHANNELS".into()),
    ));

    let (_, report) = restore(
        &platform,
        RestorePolicy {
            delete_existing: true,
            dry_run: false,
        },
        &CancelToken::new(),
    )
    .await;

    let outcomes = outcomes(&report);
    assert_eq!(outcomes.len(), 7);
    assert_eq!(outcomes[0], OperationOutcome::Applied);
    assert_eq!(outcomes[1], OperationOutcome::Applied);
    assert_eq!(
        outcomes[2],
        OperationOutcome::Failed(FailureReason::Adapter(AdapterErrorKind::PermissionDenied(
            "MANAGE_CHANNELS".into()
        )))
    );
    assert!(outcomes[3..6].iter().all(OperationOutcome::is_dependency_unmet));
    assert_eq!(
        outcomes[6],
        OperationOutcome::NotAttempted(SkipReason::EarlierFailures)
    );
    assert!(!report.is_complete());
    assert_eq!(calls_of(&platform, CallKind::CreateChannel), 0);
    assert_eq!(calls_of(&platform, CallKind::DeleteEntity), 0);
    assert!(platform.state(&tenant()).channel(&EntityId::from("99")).is_some());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let platform = platform_with(empty_live()).with_failure(
        FailureRule::new(
            CallKind::CreateGroup,
            AdapterErrorKind::Timeout("gateway".into()),
        )
        .matching_name("General")
        .times(2),
    );

    let (_, report) = restore(&platform, RestorePolicy::default(), &CancelToken::new()).await;

    assert!(report.is_complete(), "{report}");
    let group = &report.operations()[2];
    assert_eq!(*group.outcome(), OperationOutcome::Applied);
    assert_eq!(*group.attempts(), 3);
    assert_eq!(*report.operations()[0].attempts(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_fail_only_that_operation() {
    let platform = platform_with(empty_live()).with_failure(
        FailureRule::new(
            CallKind::CreateRole,
            AdapterErrorKind::Server {
                status: 503,
                message: "unavailable".into(),
            },
        )
        .matching_name("Member"),
    );

    let (_, report) = restore(&platform, RestorePolicy::default(), &CancelToken::new()).await;

    let member = &report.operations()[1];
    assert!(member.outcome().is_failure());
    assert_eq!(*member.attempts(), 3);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.applied(), 5);
    assert_eq!(calls_of(&platform, CallKind::CreateRole), 4);
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let platform = platform_with(empty_live());
    let cancel = CancelToken::new();
    cancel.cancel();

    let (plan, report) = restore(&platform, RestorePolicy::default(), &cancel).await;

    assert!(*report.cancelled());
    assert_eq!(report.not_attempted(), plan.len());
    assert!(
        outcomes(&report)
            .iter()
            .all(|o| *o == OperationOutcome::NotAttempted(SkipReason::Cancelled))
    );
    assert_eq!(platform.mutation_count(), 0);
}

#[tokio::test]
async fn test_dry_run_reports_without_mutating() {
    let platform = platform_with(empty_live());

    let (plan, report) = restore(
        &platform,
        RestorePolicy {
            delete_existing: false,
            dry_run: true,
        },
        &CancelToken::new(),
    )
    .await;

    assert_eq!(plan.len(), 6);
    assert!(
        outcomes(&report)
            .iter()
            .all(|o| *o == OperationOutcome::NotAttempted(SkipReason::DryRun))
    );
    assert_eq!(platform.mutation_count(), 0);
    assert_eq!(platform.state(&tenant()), empty_live());
}

#[tokio::test]
async fn test_names_over_the_published_limit_fail_without_a_call() {
    let platform = MemoryPlatform::new()
        .with_state(tenant(), empty_live())
        .with_limits(AdapterLimits {
            max_name_length: 6,
            ..AdapterLimits::default()
        });

    let (_, report) = restore(&platform, RestorePolicy::default(), &CancelToken::new()).await;

    assert!(matches!(
        report.operations()[2].outcome(),
        OperationOutcome::Failed(FailureReason::Adapter(AdapterErrorKind::Malformed(_)))
    ));
    assert_eq!(*report.operations()[2].attempts(), 0);
    assert_eq!(calls_of(&platform, CallKind::CreateGroup), 0);
    assert_eq!(report.applied(), 2);
}

#[tokio::test]
async fn test_unknown_tenant_fails_every_call() {
    let platform = MemoryPlatform::new();
    let limiter = limiter();
    let snapshot = example_snapshot();
    let live = LiveState::default();
    let plan = plan(
        &snapshot,
        &resolve(&snapshot, &live),
        &live,
        RestorePolicy::default(),
    );

    let report = Executor::new(&platform, &limiter)
        .execute(&tenant(), &plan, live, &CancelToken::new())
        .await;

    assert_eq!(report.operations().len(), plan.len());
    assert_eq!(report.applied(), 0);
    assert!(report.operations().iter().all(|op| op.outcome().is_failure()));
}

/// Platform that refuses to delete a group while channels remain under it.
///
/// Channel deletes are slow, so a group delete sent alongside them would
/// arrive first.
struct NonEmptyGroupsRejected {
    inner: MemoryPlatform,
    deleted: Mutex<Vec<(EntityKind, EntityId)>>,
}

impl NonEmptyGroupsRejected {
    fn new(inner: MemoryPlatform) -> Self {
        Self {
            inner,
            deleted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for NonEmptyGroupsRejected {
    fn name(&self) -> &str {
        "non-empty-groups-rejected"
    }

    fn limits(&self) -> AdapterLimits {
        self.inner.limits()
    }

    async fn list_roles(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveRole>> {
        self.inner.list_roles(tenant).await
    }

    async fn list_groups(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveEntity>> {
        self.inner.list_groups(tenant).await
    }

    async fn list_channels(&self, tenant: &TenantId) -> AdapterResult<Vec<LiveEntity>> {
        self.inner.list_channels(tenant).await
    }

    async fn list_overlays(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
    ) -> AdapterResult<Vec<LiveOverlay>> {
        self.inner.list_overlays(tenant, entity).await
    }

    async fn create_role(&self, tenant: &TenantId, draft: &RoleDraft) -> AdapterResult<EntityId> {
        self.inner.create_role(tenant, draft).await
    }

    async fn update_role(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &RoleDraft,
    ) -> AdapterResult<()> {
        self.inner.update_role(tenant, id, draft).await
    }

    async fn create_group(
        &self,
        tenant: &TenantId,
        draft: &ChannelDraft,
    ) -> AdapterResult<EntityId> {
        self.inner.create_group(tenant, draft).await
    }

    async fn update_group(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &ChannelDraft,
    ) -> AdapterResult<()> {
        self.inner.update_group(tenant, id, draft).await
    }

    async fn create_channel(
        &self,
        tenant: &TenantId,
        draft: &ChannelDraft,
    ) -> AdapterResult<EntityId> {
        self.inner.create_channel(tenant, draft).await
    }

    async fn update_channel(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        draft: &ChannelDraft,
    ) -> AdapterResult<()> {
        self.inner.update_channel(tenant, id, draft).await
    }

    async fn set_overlay(
        &self,
        tenant: &TenantId,
        entity: &EntityId,
        overlay: &LiveOverlay,
    ) -> AdapterResult<()> {
        self.inner.set_overlay(tenant, entity, overlay).await
    }

    async fn delete_entity(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &EntityId,
    ) -> AdapterResult<()> {
        match kind {
            EntityKind::Channel => tokio::time::sleep(Duration::from_millis(50)).await,
            EntityKind::Group => {
                let state = self.inner.state(tenant);
                if state.channels.iter().any(|c| c.parent_id.as_ref() == Some(id)) {
                    return Err(AdapterError::new(AdapterErrorKind::PermissionDenied(
                        format!("group {} is not empty", id),
                    )));
                }
            }
            EntityKind::Role => {}
        }
        self.inner.delete_entity(tenant, kind, id).await?;
        self.deleted
            .lock()
            .unwrap()
            .push((kind, id.clone()));
        Ok(())
    }

    async fn set_position(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        id: &EntityId,
        position: i32,
    ) -> AdapterResult<()> {
        self.inner.set_position(tenant, kind, id, position).await
    }
}

#[tokio::test]
async fn test_deletions_empty_groups_before_removing_them() {
    let mut live = empty_live();
    live.roles.push(live_role("3", "Old", 1));
    live.groups.push(live_group("11", "Trash", 1));
    live.channels.push(live_channel("21", "spam", Some("11"), 0));
    live.channels.push(live_channel("22", "more-spam", Some("11"), 1));
    let platform = NonEmptyGroupsRejected::new(platform_with(live.clone()));
    let policy = RestorePolicy {
        delete_existing: true,
        dry_run: false,
    };

    let snapshot = example_snapshot();
    let plan = plan(&snapshot, &resolve(&snapshot, &live), &live, policy);
    let limiter = limiter();
    let report = Executor::new(&platform, &limiter)
        .with_concurrency(4)
        .execute(&tenant(), &plan, live, &CancelToken::new())
        .await;

    assert!(report.is_complete(), "{report}");
    let deleted = platform.deleted.lock().unwrap().clone();
    let kinds: Vec<_> = deleted.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntityKind::Channel,
            EntityKind::Channel,
            EntityKind::Group,
            EntityKind::Role
        ]
    );
    let state = platform.inner.state(&tenant());
    assert!(state.group(&EntityId::from("11")).is_none());
    assert!(state.channels.iter().all(|c| c.name == "general-chat"));
}
