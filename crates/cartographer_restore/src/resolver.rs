//! Identity resolution between snapshot nodes and live entities.
//!
//! Resolution is a pure function of a snapshot and a live state. It never
//! deletes or merges live entities; it only decides, per snapshot key, which
//! live entity (if any) stands for it.

use cartographer_core::{EntityId, EntityKind, LiveEntity, LiveState, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Outcome of resolving one snapshot node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// An existing live entity stands for the node
    Matched(EntityId),
    /// No live entity matches; the node must be created
    Create,
}

impl Resolution {
    /// Live identity, if matched.
    pub fn live_id(&self) -> Option<&EntityId> {
        match self {
            Resolution::Matched(id) => Some(id),
            Resolution::Create => None,
        }
    }
}

/// Several live entities matched one snapshot node by name and kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionAmbiguity {
    /// Entity kind of the node
    pub kind: EntityKind,
    /// Snapshot key
    pub key: String,
    /// Shared name
    pub name: String,
    /// Every unclaimed candidate considered
    pub candidates: Vec<EntityId>,
    /// Candidate picked by sibling rank
    pub chosen: EntityId,
}

impl std::fmt::Display for ResolutionAmbiguity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} '{}' ({}) matched {} live entities, chose {}",
            self.kind,
            self.name,
            self.key,
            self.candidates.len(),
            self.chosen
        )
    }
}

/// Per-key resolution of a whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionMap {
    roles: BTreeMap<String, Resolution>,
    groups: BTreeMap<String, Resolution>,
    channels: BTreeMap<String, Resolution>,
    ambiguities: Vec<ResolutionAmbiguity>,
}

impl ResolutionMap {
    /// Resolution of a role key.
    pub fn role(&self, key: &str) -> Option<&Resolution> {
        self.roles.get(key)
    }

    /// Resolution of a group key.
    pub fn group(&self, key: &str) -> Option<&Resolution> {
        self.groups.get(key)
    }

    /// Resolution of a channel key.
    pub fn channel(&self, key: &str) -> Option<&Resolution> {
        self.channels.get(key)
    }

    /// Every role resolution, by key.
    pub fn roles(&self) -> &BTreeMap<String, Resolution> {
        &self.roles
    }

    /// Every group resolution, by key.
    pub fn groups(&self) -> &BTreeMap<String, Resolution> {
        &self.groups
    }

    /// Every channel resolution, by key.
    pub fn channels(&self) -> &BTreeMap<String, Resolution> {
        &self.channels
    }

    /// Ambiguous matches, in resolution order.
    pub fn ambiguities(&self) -> &[ResolutionAmbiguity] {
        &self.ambiguities
    }

    /// Live identities claimed by any snapshot node.
    pub fn claimed(&self) -> HashSet<&EntityId> {
        self.roles
            .values()
            .chain(self.groups.values())
            .chain(self.channels.values())
            .filter_map(Resolution::live_id)
            .collect()
    }

    /// Number of nodes matched to live entities.
    pub fn matched_count(&self) -> usize {
        self.claimed().len()
    }
}

struct Candidate<'a> {
    id: &'a EntityId,
    name: String,
    rank: usize,
}

/// Match every snapshot node to a live entity or mark it to-create.
///
/// Matching is exact case-insensitive name plus kind among entities not yet
/// claimed. When several candidates remain, the one whose sibling rank is
/// closest to the node's recorded position wins. Channels prefer candidates
/// already under the node's resolved parent.
#[tracing::instrument(skip_all, fields(tenant = %snapshot.tenant_id()))]
pub fn resolve(snapshot: &Snapshot, live: &LiveState) -> ResolutionMap {
    let mut map = ResolutionMap::default();
    let mut claimed: HashSet<EntityId> = HashSet::new();

    // Roles: most senior first, matching the snapshot's rank order.
    let mut live_roles: Vec<_> = live.roles.iter().filter(|r| r.is_restorable()).collect();
    live_roles.sort_by(|a, b| b.position.cmp(&a.position).then_with(|| a.id.cmp(&b.id)));
    let role_candidates: Vec<Candidate<'_>> = live_roles
        .iter()
        .enumerate()
        .map(|(rank, r)| Candidate {
            id: &r.id,
            name: r.name.to_lowercase(),
            rank,
        })
        .collect();

    for role in snapshot.roles() {
        let resolution = pick(
            &role_candidates,
            role.name(),
            *role.rank() as usize,
            &mut claimed,
        )
        .map(|(chosen, candidates)| {
            record(&mut map, EntityKind::Role, role.key(), role.name(), candidates, &chosen);
            Resolution::Matched(chosen)
        })
        .unwrap_or(Resolution::Create);
        map.roles.insert(role.key().clone(), resolution);
    }

    let group_candidates = sibling_candidates(live.groups.iter().filter(|g| g.kind.is_group()));
    for group in snapshot.groups() {
        let resolution = pick(
            &group_candidates,
            group.name(),
            *group.position() as usize,
            &mut claimed,
        )
        .map(|(chosen, candidates)| {
            record(&mut map, EntityKind::Group, group.key(), group.name(), candidates, &chosen);
            Resolution::Matched(chosen)
        })
        .unwrap_or(Resolution::Create);
        map.groups.insert(group.key().clone(), resolution);
    }

    for channel in snapshot.channels() {
        // A parent that will be created has no live children yet.
        let parent = match channel.parent_ref() {
            None => Some(None),
            Some(key) => match map.groups.get(key) {
                Some(Resolution::Matched(id)) => Some(Some(id.clone())),
                _ => None,
            },
        };

        let same_kind: Vec<&LiveEntity> = live
            .channels
            .iter()
            .filter(|c| c.kind == *channel.kind())
            .collect();

        let under_parent: Vec<&LiveEntity> = match &parent {
            Some(parent_id) => same_kind
                .iter()
                .copied()
                .filter(|c| &c.parent_id == parent_id)
                .collect(),
            None => Vec::new(),
        };

        let position = *channel.position() as usize;
        let resolution = pick(
            &sibling_candidates(under_parent.into_iter()),
            channel.name(),
            position,
            &mut claimed,
        )
        .or_else(|| {
            // Fall back to a same-named channel anywhere; the planner moves it.
            let anywhere = per_parent_candidates(&same_kind);
            pick(&anywhere, channel.name(), position, &mut claimed)
        })
        .map(|(chosen, candidates)| {
            record(
                &mut map,
                EntityKind::Channel,
                channel.key(),
                channel.name(),
                candidates,
                &chosen,
            );
            Resolution::Matched(chosen)
        })
        .unwrap_or(Resolution::Create);
        map.channels.insert(channel.key().clone(), resolution);
    }

    tracing::debug!(
        matched = map.matched_count(),
        ambiguities = map.ambiguities.len(),
        "Resolved snapshot against live state"
    );
    map
}

/// Candidates ranked by (position, id) among one sibling list.
fn sibling_candidates<'a>(entities: impl Iterator<Item = &'a LiveEntity>) -> Vec<Candidate<'a>> {
    let mut sorted: Vec<&LiveEntity> = entities.collect();
    sorted.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
    sorted
        .into_iter()
        .enumerate()
        .map(|(rank, e)| Candidate {
            id: &e.id,
            name: e.name.to_lowercase(),
            rank,
        })
        .collect()
}

/// Candidates ranked within their own parent.
fn per_parent_candidates<'a>(entities: &[&'a LiveEntity]) -> Vec<Candidate<'a>> {
    let mut parents: Vec<&Option<EntityId>> = entities.iter().map(|e| &e.parent_id).collect();
    parents.sort();
    parents.dedup();
    parents
        .into_iter()
        .flat_map(|parent| {
            sibling_candidates(
                entities
                    .iter()
                    .copied()
                    .filter(move |e| &e.parent_id == parent),
            )
        })
        .collect()
}

/// Claim the best unclaimed candidate named `name`.
///
/// Returns the chosen id and every candidate considered.
fn pick(
    candidates: &[Candidate<'_>],
    name: &str,
    rank: usize,
    claimed: &mut HashSet<EntityId>,
) -> Option<(EntityId, Vec<EntityId>)> {
    let name = name.to_lowercase();
    let matching: Vec<&Candidate<'_>> = candidates
        .iter()
        .filter(|c| c.name == name && !claimed.contains(c.id))
        .collect();

    let best = matching
        .iter()
        .min_by_key(|c| (c.rank.abs_diff(rank), c.rank))?;
    let chosen = best.id.clone();
    claimed.insert(chosen.clone());
    Some((chosen, matching.iter().map(|c| c.id.clone()).collect()))
}

fn record(
    map: &mut ResolutionMap,
    kind: EntityKind,
    key: &str,
    name: &str,
    candidates: Vec<EntityId>,
    chosen: &EntityId,
) {
    if candidates.len() < 2 {
        return;
    }
    let ambiguity = ResolutionAmbiguity {
        kind,
        key: key.to_string(),
        name: name.to_string(),
        candidates,
        chosen: chosen.clone(),
    };
    tracing::warn!(%ambiguity, "Ambiguous match");
    map.ambiguities.push(ambiguity);
}
