//! Tests for matching snapshot nodes to live entities.

mod common;

use cartographer_core::{ChannelKind, EntityId, EntityKind, LiveState};
use cartographer_restore::{Resolution, resolve};
use common::*;

fn matched(id: &str) -> Resolution {
    Resolution::Matched(EntityId::from(id))
}

#[test]
fn test_empty_live_state_creates_everything() {
    let map = resolve(&example_snapshot(), &empty_live());

    assert!(map.roles().values().all(|r| *r == Resolution::Create));
    assert_eq!(map.group("g0"), Some(&Resolution::Create));
    assert_eq!(map.channel("c0"), Some(&Resolution::Create));
    assert!(map.ambiguities().is_empty());
}

#[test]
fn test_names_match_case_insensitively() {
    let mut live = empty_live();
    live.roles.push(live_role("100", "MOD", 3));
    live.groups.push(live_group("200", "general", 0));
    live.channels
        .push(live_channel("300", "General-Chat", Some("200"), 0));

    let map = resolve(&example_snapshot(), &live);

    assert_eq!(map.role("r0"), Some(&matched("100")));
    assert_eq!(map.role("r1"), Some(&Resolution::Create));
    assert_eq!(map.group("g0"), Some(&matched("200")));
    assert_eq!(map.channel("c0"), Some(&matched("300")));
    assert_eq!(map.matched_count(), 3);
}

#[test]
fn test_kind_must_match() {
    let mut live = empty_live();
    live.groups.push(live_group("200", "General", 0));
    let mut voice = live_channel("300", "general-chat", Some("200"), 0);
    voice.kind = ChannelKind::Voice;
    live.channels.push(voice);

    let map = resolve(&example_snapshot(), &live);

    assert_eq!(map.channel("c0"), Some(&Resolution::Create));
}

#[test]
fn test_managed_and_default_roles_never_match() {
    let mut live = empty_live();
    let mut managed = live_role("100", "Mod", 4);
    managed.managed = true;
    live.roles.push(managed);

    let map = resolve(&example_snapshot(), &live);

    assert_eq!(map.role("r0"), Some(&Resolution::Create));
}

#[test]
fn test_duplicate_names_pick_closest_rank_and_record_ambiguity() {
    // Live ranks by position: Mod(a) 0, Other 1, Member 2, Mod(b) 3.
    let live = LiveState {
        roles: vec![
            everyone(),
            live_role("a", "Mod", 10),
            live_role("other", "Other", 8),
            live_role("member", "Member", 6),
            live_role("b", "Mod", 2),
        ],
        ..Default::default()
    };

    let map = resolve(&example_snapshot(), &live);

    assert_eq!(map.role("r0"), Some(&matched("a")));
    assert_eq!(map.role("r1"), Some(&matched("member")));
    assert_eq!(map.ambiguities().len(), 1);
    let ambiguity = &map.ambiguities()[0];
    assert_eq!(ambiguity.kind, EntityKind::Role);
    assert_eq!(ambiguity.key, "r0");
    assert_eq!(ambiguity.candidates.len(), 2);
    assert_eq!(ambiguity.chosen, EntityId::from("a"));
}

#[test]
fn test_each_live_entity_is_claimed_once() {
    let mut live = empty_live();
    live.roles.push(live_role("100", "Mod", 3));
    let mut snapshot_live = live.clone();
    snapshot_live.roles.push(live_role("101", "member", 2));

    let map = resolve(&example_snapshot(), &live);
    assert_eq!(map.role("r0"), Some(&matched("100")));
    assert_eq!(map.role("r1"), Some(&Resolution::Create));

    let map = resolve(&example_snapshot(), &snapshot_live);
    assert_eq!(map.role("r1"), Some(&matched("101")));
}

#[test]
fn test_channel_prefers_candidate_under_resolved_parent() {
    let mut live = empty_live();
    live.groups.push(live_group("g-other", "Archive", 0));
    live.groups.push(live_group("g-general", "General", 1));
    live.channels
        .push(live_channel("c-archived", "general-chat", Some("g-other"), 0));
    live.channels
        .push(live_channel("c-current", "general-chat", Some("g-general"), 0));

    let map = resolve(&example_snapshot(), &live);

    assert_eq!(map.group("g0"), Some(&matched("g-general")));
    assert_eq!(map.channel("c0"), Some(&matched("c-current")));
    assert!(map.ambiguities().is_empty());
}

#[test]
fn test_channel_elsewhere_is_matched_when_parent_has_none() {
    let mut live = empty_live();
    live.channels
        .push(live_channel("c-top", "general-chat", None, 4));

    let map = resolve(&example_snapshot(), &live);

    assert_eq!(map.group("g0"), Some(&Resolution::Create));
    assert_eq!(map.channel("c0"), Some(&matched("c-top")));
}
