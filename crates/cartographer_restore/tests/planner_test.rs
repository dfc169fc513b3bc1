//! Tests for restore planning.

mod common;

use cartographer_core::{
    ChannelKind, ChannelSpecBuilder, EntityKind, LiveState, LiveSubject, OverlaySubject, PermissionOverlay, Permissions,
    RoleSpecBuilder, Snapshot,
};
use cartographer_restore::{
    Barrier, NodeRef, Operation, PlanDiagnostic, RestorePlan, RestorePolicy, SubjectRef, plan,
    resolve,
};
use chrono::Utc;
use common::*;

/// The live hierarchy after the example snapshot was fully restored.
fn restored_live() -> LiveState {
    let mut moderator = live_role("1", "Mod", 2);
    moderator.color = 0x3498db;
    moderator.hoist = true;
    moderator.permissions = Permissions::MANAGE_MESSAGES | Permissions::KICK_MEMBERS;

    let mut chat = live_channel("20", "general-chat", Some("10"), 0);
    chat.topic = Some("Talk about anything".into());
    chat.overlays = vec![
        overlay(
            LiveSubject::Everyone,
            Permissions::empty(),
            Permissions::SEND_MESSAGES,
        ),
        overlay(
            LiveSubject::Role("1".into()),
            Permissions::SEND_MESSAGES,
            Permissions::empty(),
        ),
    ];

    LiveState {
        roles: vec![everyone(), moderator, live_role("2", "Member", 1)],
        groups: vec![live_group("10", "General", 0)],
        channels: vec![chat],
    }
}

fn plan_for(snapshot: &Snapshot, live: &LiveState, policy: RestorePolicy) -> RestorePlan {
    plan(snapshot, &resolve(snapshot, live), live, policy)
}

#[test]
fn test_plan_onto_empty_tenant_creates_in_dependency_order() {
    let snapshot = example_snapshot();
    let live = empty_live();
    let resolution = resolve(&snapshot, &live);

    let plan = plan(&snapshot, &resolution, &live, RestorePolicy::default());

    let barriers: Vec<_> = plan.operations().iter().map(Operation::barrier).collect();
    assert_eq!(
        barriers,
        vec![
            Barrier::Roles,
            Barrier::Roles,
            Barrier::Groups,
            Barrier::Channels,
            Barrier::Overlays,
            Barrier::Overlays,
        ]
    );
    match &plan.operations()[0] {
        Operation::CreateRole { key, draft } => {
            assert_eq!(key, "r0");
            assert_eq!(draft.position, 2);
        }
        other => panic!("unexpected first operation: {other}"),
    }
    match &plan.operations()[3] {
        Operation::CreateChannel { parent, draft, .. } => {
            assert_eq!(parent.as_deref(), Some("g0"));
            assert_eq!(draft.parent, None);
        }
        other => panic!("unexpected channel operation: {other}"),
    }
    assert!(plan.diagnostics().is_empty());
    assert!(plan.check_ordering(&resolution).is_ok());
}

#[test]
fn test_plan_over_restored_state_is_empty() {
    let plan = plan_for(&example_snapshot(), &restored_live(), RestorePolicy::default());

    assert!(plan.is_empty(), "unexpected operations: {:?}", plan.operations());
}

#[test]
fn test_everyone_overlay_on_default_role_counts_as_equal() {
    let mut live = restored_live();
    live.channels[0].overlays[0].subject = LiveSubject::Role("everyone".into());

    let plan = plan_for(&example_snapshot(), &live, RestorePolicy::default());

    assert!(plan.is_empty());
}

#[test]
fn test_changed_attributes_produce_updates() {
    let mut live = restored_live();
    live.roles[1].color = 0xff0000;
    live.channels[0].topic = None;

    let plan = plan_for(&example_snapshot(), &live, RestorePolicy::default());

    assert_eq!(plan.len(), 2);
    assert!(matches!(&plan.operations()[0], Operation::UpdateRole { key, id, .. } if key == "r0" && id.0 == "1"));
    assert!(matches!(&plan.operations()[1], Operation::UpdateChannel { key, .. } if key == "c0"));
}

#[test]
fn test_roles_in_rank_order_at_other_positions_stay_put() {
    let mut live = restored_live();
    live.roles[1].position = 4;
    live.roles[2].position = 3;
    let mut bot = live_role("9", "Bot", 1);
    bot.managed = true;
    live.roles.push(bot);

    let plan = plan_for(&example_snapshot(), &live, RestorePolicy::default());

    assert!(plan.is_empty(), "unexpected operations: {:?}", plan.operations());
}

#[test]
fn test_matched_entity_missing_from_live_state_is_reported() {
    let snapshot = example_snapshot();
    let resolution = resolve(&snapshot, &restored_live());
    let mut live = restored_live();
    live.roles.retain(|r| r.id.0 != "2");

    let plan = plan(&snapshot, &resolution, &live, RestorePolicy::default());

    assert!(plan.diagnostics().contains(&PlanDiagnostic::MissingLive {
        target: NodeRef::Role("r1".into()),
        id: "2".into(),
    }));
    assert!(plan.operations().iter().all(|op| op.node() != Some(NodeRef::Role("r1".into()))));
}

#[test]
fn test_swapped_roles_only_move() {
    let mut live = restored_live();
    live.roles[1].position = 1;
    live.roles[2].position = 2;

    let plan = plan_for(&example_snapshot(), &live, RestorePolicy::default());

    assert_eq!(
        plan.operations().as_slice(),
        &[
            Operation::SetPosition {
                target: NodeRef::Role("r0".into()),
                position: 2,
            },
            Operation::SetPosition {
                target: NodeRef::Role("r1".into()),
                position: 1,
            },
        ]
    );
}

#[test]
fn test_matched_channel_under_created_parent_is_reparented() {
    let mut live = restored_live();
    live.groups.clear();
    live.channels[0].parent_id = None;
    live.channels[0].position = 3;
    let snapshot = example_snapshot();
    let resolution = resolve(&snapshot, &live);

    let plan = plan(&snapshot, &resolution, &live, RestorePolicy::default());

    let kinds: Vec<_> = plan.operations().iter().map(ToString::to_string).collect();
    assert!(matches!(&plan.operations()[0], Operation::CreateGroup { key, .. } if key == "g0"), "{kinds:?}");
    assert!(
        matches!(&plan.operations()[1], Operation::UpdateChannel { id, parent, .. } if id.0 == "20" && parent.as_deref() == Some("g0")),
        "{kinds:?}"
    );
    assert!(matches!(
        plan.operations().last(),
        Some(Operation::SetPosition { target: NodeRef::Channel(key), position: 0 }) if key == "c0"
    ));
    assert!(plan.check_ordering(&resolution).is_ok());
}

#[test]
fn test_delete_existing_clears_stale_overlays_and_deletes_children_first() {
    let mut live = restored_live();
    let mut bot = live_role("bot", "Helper Bot", 9);
    bot.managed = true;
    live.roles.push(bot);
    live.roles.push(live_role("3", "Old", 3));
    live.groups.push(live_group("11", "Trash", 1));
    live.channels.push(live_channel("21", "spam", Some("11"), 0));
    live.channels[0].overlays.push(overlay(
        LiveSubject::Role("3".into()),
        Permissions::SEND_MESSAGES,
        Permissions::empty(),
    ));
    live.channels[0].overlays.push(overlay(
        LiveSubject::Role("bot".into()),
        Permissions::SEND_MESSAGES,
        Permissions::empty(),
    ));
    let snapshot = example_snapshot();
    let resolution = resolve(&snapshot, &live);

    let plan = plan(
        &snapshot,
        &resolution,
        &live,
        RestorePolicy {
            delete_existing: true,
            dry_run: false,
        },
    );

    assert_eq!(
        plan.operations().as_slice(),
        &[
            Operation::SetOverlay {
                target: NodeRef::Channel("c0".into()),
                subject: SubjectRef::Live("3".into()),
                allow: Permissions::empty(),
                deny: Permissions::empty(),
            },
            Operation::DeleteEntity {
                kind: EntityKind::Channel,
                id: "21".into(),
                name: "spam".into(),
            },
            Operation::DeleteEntity {
                kind: EntityKind::Group,
                id: "11".into(),
                name: "Trash".into(),
            },
            Operation::DeleteEntity {
                kind: EntityKind::Role,
                id: "3".into(),
                name: "Old".into(),
            },
        ]
    );
    assert!(plan.check_ordering(&resolution).is_ok());
}

#[test]
fn test_without_delete_existing_extras_are_left_alone() {
    let mut live = restored_live();
    live.roles.push(live_role("3", "Old", 3));
    live.channels.push(live_channel("21", "spam", None, 1));

    let plan = plan_for(&example_snapshot(), &live, RestorePolicy::default());

    assert!(plan.barrier(Barrier::Deletions).next().is_none());
}

#[test]
fn test_reserved_role_is_reported_not_created() {
    let roles = vec![
        RoleSpecBuilder::default()
            .key("r0")
            .name("@here")
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
    let channel = ChannelSpecBuilder::default()
        .key("c0")
        .name("general-chat")
        .kind(ChannelKind::Text)
        .position(0u32)
        .parent_ref("g0")
        .overlays(vec![PermissionOverlay::normalized(
            OverlaySubject::Role("r0".into()),
            Permissions::SEND_MESSAGES,
            Permissions::empty(),
        )])
        .build()
        .unwrap();
    let snapshot = Snapshot::new(
        tenant(),
        Utc::now(),
        roles,
        example_snapshot().groups().clone(),
        vec![channel],
    )
    .unwrap();

    let plan = plan_for(&snapshot, &empty_live(), RestorePolicy::default());

    let roles: Vec<_> = plan.barrier(Barrier::Roles).map(|(_, op)| op.clone()).collect();
    assert_eq!(roles.len(), 1);
    assert!(matches!(&roles[0], Operation::CreateRole { key, draft } if key == "r1" && draft.position == 1));
    assert!(plan.barrier(Barrier::Overlays).next().is_none());
    assert!(plan.diagnostics().contains(&PlanDiagnostic::ReservedRole {
        key: "r0".into(),
        name: "@here".into(),
    }));
    assert!(
        plan.diagnostics()
            .iter()
            .any(|d| matches!(d, PlanDiagnostic::DependencyUnmet { .. }))
    );
}

#[test]
fn test_ambiguities_surface_as_diagnostics() {
    let mut live = restored_live();
    live.roles.push(live_role("9", "mod", 0));

    let plan = plan_for(&example_snapshot(), &live, RestorePolicy::default());

    assert!(matches!(
        plan.diagnostics().first(),
        Some(PlanDiagnostic::Ambiguous(a)) if a.key == "r0"
    ));
}

#[test]
fn test_check_ordering_rejects_reordered_plan() {
    let snapshot = example_snapshot();
    let live = empty_live();
    let resolution = resolve(&snapshot, &live);
    let plan = plan(&snapshot, &resolution, &live, RestorePolicy::default());

    let mut json = serde_json::to_value(&plan).unwrap();
    json["operations"].as_array_mut().unwrap().reverse();
    let reordered: RestorePlan = serde_json::from_value(json).unwrap();

    let violation = reordered.check_ordering(&resolution).unwrap_err();
    assert_eq!(violation.index, 0);
}
