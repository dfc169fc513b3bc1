//! Restore planning.
//!
//! A plan is an ordered list of independent, idempotent operations grouped
//! into barriers: roles, groups, channels, overlays, positions, deletions.
//! Operations address snapshot nodes by key; live identities of created nodes
//! are bound while the plan executes.

use crate::resolver::{Resolution, ResolutionAmbiguity, ResolutionMap};
use cartographer_core::{
    EntityId, EntityKind, LiveEntity, LiveOverlay, LiveState, LiveSubject, OverlaySubject,
    PermissionOverlay, Permissions, Snapshot,
};
use cartographer_interface::{ChannelDraft, RoleDraft};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Role names the platform owns and never lets a caller create.
pub const RESERVED_ROLE_NAMES: &[&str] = &["@everyone", "@here"];

/// Whether `name` collides with a platform-reserved role.
pub fn is_reserved_role_name(name: &str) -> bool {
    RESERVED_ROLE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}

/// Knobs of a restore request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestorePolicy {
    /// Delete live entities the snapshot does not contain and clear stale overlays
    pub delete_existing: bool,
    /// Plan and report without mutating anything
    pub dry_run: bool,
}

/// Snapshot node addressed by key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    /// Role key
    Role(String),
    /// Group key
    Group(String),
    /// Channel key
    Channel(String),
}

impl NodeRef {
    /// Entity family of the node.
    pub fn kind(&self) -> EntityKind {
        match self {
            NodeRef::Role(_) => EntityKind::Role,
            NodeRef::Group(_) => EntityKind::Group,
            NodeRef::Channel(_) => EntityKind::Channel,
        }
    }

    /// Snapshot key of the node.
    pub fn key(&self) -> &str {
        match self {
            NodeRef::Role(key) | NodeRef::Group(key) | NodeRef::Channel(key) => key,
        }
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.key())
    }
}

/// Subject of an overlay operation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectRef {
    /// The member-default subject
    Everyone,
    /// A snapshot role, by key
    Role(String),
    /// A live role the snapshot does not know (stale overlay cleanup)
    Live(EntityId),
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectRef::Everyone => write!(f, "everyone"),
            SubjectRef::Role(key) => write!(f, "role {}", key),
            SubjectRef::Live(id) => write!(f, "live role {}", id),
        }
    }
}

/// Execution barrier. Barriers run strictly in declaration order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Barrier {
    /// Role creates and updates
    Roles,
    /// Group creates and updates
    Groups,
    /// Channel creates and updates
    Channels,
    /// Overlay sets and clears
    Overlays,
    /// Position fixes
    Positions,
    /// Deletions, children before parents
    Deletions,
}

/// One planned mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a role
    CreateRole {
        /// Role key
        key: String,
        /// Attributes
        draft: RoleDraft,
    },
    /// Bring a matched role's attributes in line
    UpdateRole {
        /// Role key
        key: String,
        /// Live role
        id: EntityId,
        /// Attributes
        draft: RoleDraft,
    },
    /// Create a group
    CreateGroup {
        /// Group key
        key: String,
        /// Attributes
        draft: ChannelDraft,
    },
    /// Bring a matched group's attributes in line
    UpdateGroup {
        /// Group key
        key: String,
        /// Live group
        id: EntityId,
        /// Attributes
        draft: ChannelDraft,
    },
    /// Create a channel under its (bound) parent
    CreateChannel {
        /// Channel key
        key: String,
        /// Parent group key
        parent: Option<String>,
        /// Attributes; the parent identity is filled in at execution
        draft: ChannelDraft,
    },
    /// Bring a matched channel's attributes and parent in line
    UpdateChannel {
        /// Channel key
        key: String,
        /// Live channel
        id: EntityId,
        /// Parent group key
        parent: Option<String>,
        /// Attributes; the parent identity is filled in at execution
        draft: ChannelDraft,
    },
    /// Set one subject's overlay on a group or channel (empty bits clear it)
    SetOverlay {
        /// Group or channel
        target: NodeRef,
        /// Overlay subject
        subject: SubjectRef,
        /// Granted bits
        allow: Permissions,
        /// Revoked bits
        deny: Permissions,
    },
    /// Move a node to its recorded position
    SetPosition {
        /// Node to move
        target: NodeRef,
        /// Platform position
        position: i32,
    },
    /// Delete a live entity the snapshot does not contain
    DeleteEntity {
        /// Entity family
        kind: EntityKind,
        /// Live identity
        id: EntityId,
        /// Name, for reports
        name: String,
    },
}

impl Operation {
    /// Barrier the operation belongs to.
    pub fn barrier(&self) -> Barrier {
        match self {
            Operation::CreateRole { .. } | Operation::UpdateRole { .. } => Barrier::Roles,
            Operation::CreateGroup { .. } | Operation::UpdateGroup { .. } => Barrier::Groups,
            Operation::CreateChannel { .. } | Operation::UpdateChannel { .. } => Barrier::Channels,
            Operation::SetOverlay { .. } => Barrier::Overlays,
            Operation::SetPosition { .. } => Barrier::Positions,
            Operation::DeleteEntity { .. } => Barrier::Deletions,
        }
    }

    /// Node whose live identity the operation creates or updates.
    pub fn node(&self) -> Option<NodeRef> {
        match self {
            Operation::CreateRole { key, .. } | Operation::UpdateRole { key, .. } => {
                Some(NodeRef::Role(key.clone()))
            }
            Operation::CreateGroup { key, .. } | Operation::UpdateGroup { key, .. } => {
                Some(NodeRef::Group(key.clone()))
            }
            Operation::CreateChannel { key, .. } | Operation::UpdateChannel { key, .. } => {
                Some(NodeRef::Channel(key.clone()))
            }
            Operation::SetOverlay { .. }
            | Operation::SetPosition { .. }
            | Operation::DeleteEntity { .. } => None,
        }
    }

    /// Whether the operation introduces a new live identity.
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Operation::CreateRole { .. }
                | Operation::CreateGroup { .. }
                | Operation::CreateChannel { .. }
        )
    }

    /// Nodes that must have a live identity before the operation can run.
    pub fn dependencies(&self) -> Vec<NodeRef> {
        match self {
            Operation::CreateChannel { parent, .. } | Operation::UpdateChannel { parent, .. } => {
                parent.iter().cloned().map(NodeRef::Group).collect()
            }
            Operation::SetOverlay {
                target, subject, ..
            } => {
                let mut deps = vec![target.clone()];
                if let SubjectRef::Role(key) = subject {
                    deps.push(NodeRef::Role(key.clone()));
                }
                deps
            }
            Operation::SetPosition { target, .. } => vec![target.clone()],
            Operation::CreateRole { .. }
            | Operation::UpdateRole { .. }
            | Operation::CreateGroup { .. }
            | Operation::UpdateGroup { .. }
            | Operation::DeleteEntity { .. } => Vec::new(),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::CreateRole { key, draft } => {
                write!(f, "create role '{}' ({}) at {}", draft.name, key, draft.position)
            }
            Operation::UpdateRole { key, id, draft } => {
                write!(f, "update role '{}' ({} -> {})", draft.name, key, id)
            }
            Operation::CreateGroup { key, draft } => {
                write!(f, "create group '{}' ({})", draft.name, key)
            }
            Operation::UpdateGroup { key, id, draft } => {
                write!(f, "update group '{}' ({} -> {})", draft.name, key, id)
            }
            Operation::CreateChannel { key, parent, draft } => {
                write!(f, "create {} channel '{}' ({})", draft.kind, draft.name, key)?;
                if let Some(parent) = parent {
                    write!(f, " under group {}", parent)?;
                }
                Ok(())
            }
            Operation::UpdateChannel {
                key,
                id,
                parent,
                draft,
            } => {
                write!(f, "update channel '{}' ({} -> {})", draft.name, key, id)?;
                if let Some(parent) = parent {
                    write!(f, " under group {}", parent)?;
                }
                Ok(())
            }
            Operation::SetOverlay {
                target,
                subject,
                allow,
                deny,
            } => {
                if allow.is_empty() && deny.is_empty() {
                    write!(f, "clear overlay for {} on {}", subject, target)
                } else {
                    write!(
                        f,
                        "set overlay for {} on {} (allow {:#x}, deny {:#x})",
                        subject,
                        target,
                        allow.bits(),
                        deny.bits()
                    )
                }
            }
            Operation::SetPosition { target, position } => {
                write!(f, "move {} to position {}", target, position)
            }
            Operation::DeleteEntity { kind, id, name } => {
                write!(f, "delete {} '{}' ({})", kind, name, id)
            }
        }
    }
}

/// Something the planner skipped or could not decide cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "diagnostic", rename_all = "snake_case")]
pub enum PlanDiagnostic {
    /// Several live entities matched one node
    Ambiguous(ResolutionAmbiguity),
    /// A snapshot role collides with a platform-reserved role and is not restored
    ReservedRole {
        /// Role key
        key: String,
        /// Role name
        name: String,
    },
    /// An operation was dropped because something it references cannot exist
    DependencyUnmet {
        /// What was dropped
        target: String,
        /// The reference that cannot be satisfied
        missing: String,
    },
    /// A node matched a live entity that the live state no longer contains
    MissingLive {
        /// Node left untouched
        target: NodeRef,
        /// Identity it was matched to
        id: EntityId,
    },
}

impl std::fmt::Display for PlanDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanDiagnostic::Ambiguous(ambiguity) => write!(f, "ambiguous: {}", ambiguity),
            PlanDiagnostic::ReservedRole { key, name } => {
                write!(f, "role '{}' ({}) is reserved by the platform", name, key)
            }
            PlanDiagnostic::DependencyUnmet { target, missing } => {
                write!(f, "skipped {}: dependency unmet ({})", target, missing)
            }
            PlanDiagnostic::MissingLive { target, id } => {
                write!(f, "skipped {}: matched live entity {} is missing", target, id)
            }
        }
    }
}

/// Live identities bound to snapshot keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bindings {
    /// Role key to live id
    pub roles: BTreeMap<String, EntityId>,
    /// Group key to live id
    pub groups: BTreeMap<String, EntityId>,
    /// Channel key to live id
    pub channels: BTreeMap<String, EntityId>,
}

impl Bindings {
    /// Bindings of every matched node.
    pub fn from_resolution(resolution: &ResolutionMap) -> Self {
        fn matched(map: &BTreeMap<String, Resolution>) -> BTreeMap<String, EntityId> {
            map.iter()
                .filter_map(|(key, r)| r.live_id().map(|id| (key.clone(), id.clone())))
                .collect()
        }
        Self {
            roles: matched(resolution.roles()),
            groups: matched(resolution.groups()),
            channels: matched(resolution.channels()),
        }
    }

    /// Live identity bound to a node.
    pub fn get(&self, node: &NodeRef) -> Option<&EntityId> {
        match node {
            NodeRef::Role(key) => self.roles.get(key),
            NodeRef::Group(key) => self.groups.get(key),
            NodeRef::Channel(key) => self.channels.get(key),
        }
    }

    /// Bind a node to a live identity.
    pub fn bind(&mut self, node: &NodeRef, id: EntityId) {
        let map = match node {
            NodeRef::Role(_) => &mut self.roles,
            NodeRef::Group(_) => &mut self.groups,
            NodeRef::Channel(_) => &mut self.channels,
        };
        map.insert(node.key().to_string(), id);
    }

    /// Whether any node is bound to `id`.
    pub fn is_bound(&self, id: &EntityId) -> bool {
        self.roles
            .values()
            .chain(self.groups.values())
            .chain(self.channels.values())
            .any(|bound| bound == id)
    }
}

/// An operation that appears before something it depends on.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("Operation {} is out of order: {}", index, message)]
pub struct OrderingViolation {
    /// Index of the offending operation
    pub index: usize,
    /// What is wrong
    pub message: String,
}

/// Ordered, dependency-safe list of operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct RestorePlan {
    /// Operations in execution order
    operations: Vec<Operation>,
    /// Skips and ambiguities
    diagnostics: Vec<PlanDiagnostic>,
    /// Policy the plan was built under
    policy: RestorePolicy,
    /// Live identities of matched nodes
    bindings: Bindings,
}

impl RestorePlan {
    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the plan does nothing.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations of one barrier, with their plan indices.
    pub fn barrier(&self, barrier: Barrier) -> impl Iterator<Item = (usize, &Operation)> {
        self.operations
            .iter()
            .enumerate()
            .filter(move |(_, op)| op.barrier() == barrier)
    }

    /// Verify that barriers never go backwards, that every dependency is
    /// matched live or created by an earlier operation, and that deletions
    /// remove children before parents.
    ///
    /// # Errors
    ///
    /// Returns the first offending operation.
    pub fn check_ordering(&self, resolution: &ResolutionMap) -> Result<(), OrderingViolation> {
        let mut available: HashSet<NodeRef> = HashSet::new();
        for (key, r) in resolution.roles() {
            if r.live_id().is_some() {
                available.insert(NodeRef::Role(key.clone()));
            }
        }
        for (key, r) in resolution.groups() {
            if r.live_id().is_some() {
                available.insert(NodeRef::Group(key.clone()));
            }
        }
        for (key, r) in resolution.channels() {
            if r.live_id().is_some() {
                available.insert(NodeRef::Channel(key.clone()));
            }
        }

        let mut last_barrier = Barrier::Roles;
        let mut last_deleted: Option<EntityKind> = None;
        for (index, op) in self.operations.iter().enumerate() {
            if op.barrier() < last_barrier {
                return Err(OrderingViolation {
                    index,
                    message: format!("{} barrier after {}", op.barrier(), last_barrier),
                });
            }
            last_barrier = op.barrier();

            for dependency in op.dependencies() {
                if !available.contains(&dependency) {
                    return Err(OrderingViolation {
                        index,
                        message: format!("'{}' needs {} first", op, dependency),
                    });
                }
            }

            if let Operation::DeleteEntity { kind, .. } = op {
                if last_deleted.is_some_and(|last| deletion_rank(*kind) < deletion_rank(last)) {
                    return Err(OrderingViolation {
                        index,
                        message: format!("'{}' deletes a parent before its children", op),
                    });
                }
                last_deleted = Some(*kind);
            }

            if op.is_create()
                && let Some(node) = op.node()
            {
                available.insert(node);
            }
        }
        Ok(())
    }
}

/// Deletion order: channels, then groups, then roles.
pub(crate) fn deletion_rank(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::Channel => 0,
        EntityKind::Group => 1,
        EntityKind::Role => 2,
    }
}

/// Overlay currently set on `entity` for a live subject.
///
/// The everyone subject also matches an overlay keyed on the default role.
pub(crate) fn find_live_overlay<'a>(
    entity: &'a LiveEntity,
    subject: &LiveSubject,
    default_role: Option<&EntityId>,
) -> Option<&'a LiveOverlay> {
    entity.overlay_for(subject).or_else(|| match (subject, default_role) {
        (LiveSubject::Everyone, Some(id)) => entity.overlay_for(&LiveSubject::Role(id.clone())),
        _ => None,
    })
}

/// Build a plan that reconstructs `snapshot` over `live`.
///
/// Updates, overlay sets and position fixes are only planned where the live
/// state differs. Nodes that cannot be restored are recorded as diagnostics.
#[tracing::instrument(skip_all, fields(tenant = %snapshot.tenant_id(), delete_existing = policy.delete_existing))]
pub fn plan(
    snapshot: &Snapshot,
    resolution: &ResolutionMap,
    live: &LiveState,
    policy: RestorePolicy,
) -> RestorePlan {
    let mut planner = Planner {
        snapshot,
        resolution,
        live,
        default_role: live.default_role().map(|r| r.id.clone()),
        reserved: HashSet::new(),
        operations: Vec::new(),
        diagnostics: resolution
            .ambiguities()
            .iter()
            .cloned()
            .map(PlanDiagnostic::Ambiguous)
            .collect(),
        positions: Vec::new(),
    };

    planner.roles();
    planner.groups();
    planner.channels();
    planner.overlays(policy.delete_existing);
    let positions = std::mem::take(&mut planner.positions);
    planner.operations.extend(positions);
    if policy.delete_existing {
        planner.deletions();
    }

    let plan = RestorePlan {
        operations: planner.operations,
        diagnostics: planner.diagnostics,
        policy,
        bindings: Bindings::from_resolution(resolution),
    };
    tracing::info!(
        operations = plan.len(),
        diagnostics = plan.diagnostics.len(),
        "Planned restore"
    );
    plan
}

struct Planner<'a> {
    snapshot: &'a Snapshot,
    resolution: &'a ResolutionMap,
    live: &'a LiveState,
    default_role: Option<EntityId>,
    reserved: HashSet<String>,
    operations: Vec<Operation>,
    diagnostics: Vec<PlanDiagnostic>,
    positions: Vec<Operation>,
}

impl Planner<'_> {
    fn roles(&mut self) {
        let (snapshot, resolution, live) = (self.snapshot, self.resolution, self.live);
        let mut roles: Vec<_> = snapshot.roles().iter().collect();
        roles.sort_by_key(|r| *r.rank());

        for role in roles.iter().filter(|r| is_reserved_role_name(r.name())) {
            tracing::warn!(key = %role.key(), name = %role.name(), "Skipping reserved role");
            self.reserved.insert(role.key().clone());
            self.diagnostics.push(PlanDiagnostic::ReservedRole {
                key: role.key().clone(),
                name: role.name().clone(),
            });
        }

        let restorable: Vec<_> = roles
            .into_iter()
            .filter(|r| !self.reserved.contains(r.key()))
            .collect();
        let top = restorable.len() as i32;
        // (key, target position, live position) of matched roles, in rank order.
        let mut matched: Vec<(String, i32, i32)> = Vec::new();
        let mut created = false;

        for (index, role) in restorable.into_iter().enumerate() {
            // Rank 0 sits highest, just above the default role at 0.
            let position = top - index as i32;
            let draft = RoleDraft::from_spec(role, position);
            let key = role.key().clone();
            match resolution.role(&key).and_then(Resolution::live_id) {
                None => {
                    created = true;
                    self.operations.push(Operation::CreateRole { key, draft });
                }
                Some(id) => {
                    let Some(live) = live.role(id) else {
                        self.missing_live(NodeRef::Role(key), id);
                        continue;
                    };
                    matched.push((key.clone(), position, live.position));
                    if !draft.matches(live) {
                        self.operations.push(Operation::UpdateRole {
                            key,
                            id: id.clone(),
                            draft,
                        });
                    }
                }
            }
        }

        // Rank is relative. Roles already stacked in rank order stay where
        // they are unless new roles have to slot in among them.
        let in_order = matched.windows(2).all(|pair| pair[0].2 > pair[1].2);
        if created || !in_order {
            for (key, position, current) in matched {
                if current != position {
                    self.positions.push(Operation::SetPosition {
                        target: NodeRef::Role(key),
                        position,
                    });
                }
            }
        }
    }

    fn missing_live(&mut self, target: NodeRef, id: &EntityId) {
        tracing::warn!(%target, %id, "Matched live entity is missing, leaving node untouched");
        self.diagnostics.push(PlanDiagnostic::MissingLive {
            target,
            id: id.clone(),
        });
    }

    fn groups(&mut self) {
        let (snapshot, resolution, live) = (self.snapshot, self.resolution, self.live);
        let mut groups: Vec<_> = snapshot.groups().iter().collect();
        groups.sort_by_key(|g| *g.position());

        for group in groups {
            let draft = ChannelDraft::from_group(group);
            let key = group.key().clone();
            match resolution.group(&key).and_then(Resolution::live_id) {
                None => self.operations.push(Operation::CreateGroup { key, draft }),
                Some(id) => {
                    let Some(live) = live.group(id) else {
                        self.missing_live(NodeRef::Group(key), id);
                        continue;
                    };
                    if live.position != draft.position {
                        self.positions.push(Operation::SetPosition {
                            target: NodeRef::Group(key.clone()),
                            position: draft.position,
                        });
                    }
                    if !draft.matches(live) {
                        self.operations.push(Operation::UpdateGroup {
                            key,
                            id: id.clone(),
                            draft,
                        });
                    }
                }
            }
        }
    }

    fn channels(&mut self) {
        let (snapshot, resolution, live) = (self.snapshot, self.resolution, self.live);
        // Top level first, then each group's children, each by position.
        let mut channels: Vec<_> = snapshot.channels().iter().collect();
        let group_order: BTreeMap<&str, u32> = snapshot
            .groups()
            .iter()
            .map(|g| (g.key().as_str(), *g.position()))
            .collect();
        channels.sort_by_key(|c| {
            (
                c.parent_ref()
                    .as_deref()
                    .map(|p| group_order.get(p).copied().unwrap_or(u32::MAX)),
                *c.position(),
            )
        });

        for channel in channels {
            let key = channel.key().clone();
            let parent_key = channel.parent_ref().clone();
            // Parent identity, when the parent is already live.
            let parent_id = parent_key
                .as_deref()
                .and_then(|p| resolution.group(p))
                .and_then(Resolution::live_id)
                .cloned();
            let parent_pending = parent_key.is_some() && parent_id.is_none();
            let draft = ChannelDraft::from_channel(channel, parent_id);

            match resolution.channel(&key).and_then(Resolution::live_id) {
                None => self.operations.push(Operation::CreateChannel {
                    key,
                    parent: parent_key,
                    draft,
                }),
                Some(id) => {
                    let Some(live) = live.channel(id) else {
                        self.missing_live(NodeRef::Channel(key), id);
                        continue;
                    };
                    if parent_pending || live.position != draft.position {
                        self.positions.push(Operation::SetPosition {
                            target: NodeRef::Channel(key.clone()),
                            position: draft.position,
                        });
                    }
                    if parent_pending || !draft.matches(live) {
                        self.operations.push(Operation::UpdateChannel {
                            key,
                            id: id.clone(),
                            parent: parent_key,
                            draft,
                        });
                    }
                }
            }
        }
    }

    fn overlays(&mut self, clear_stale: bool) {
        let (snapshot, resolution, live) = (self.snapshot, self.resolution, self.live);
        let targets: Vec<(NodeRef, &[PermissionOverlay], Option<&EntityId>)> = snapshot
            .groups()
            .iter()
            .map(|g| {
                (
                    NodeRef::Group(g.key().clone()),
                    g.overlays().as_slice(),
                    resolution.group(g.key()).and_then(Resolution::live_id),
                )
            })
            .chain(snapshot.channels().iter().map(|c| {
                (
                    NodeRef::Channel(c.key().clone()),
                    c.overlays().as_slice(),
                    resolution.channel(c.key()).and_then(Resolution::live_id),
                )
            }))
            .collect();

        for (target, overlays, live_id) in targets {
            let live_entity = live_id.and_then(|id| match &target {
                NodeRef::Group(_) => live.group(id),
                _ => live.channel(id),
            });

            let mut kept_subjects: Vec<LiveSubject> = Vec::new();
            for overlay in overlays {
                let (subject, live_subject) = match &overlay.subject {
                    OverlaySubject::Everyone => (SubjectRef::Everyone, Some(LiveSubject::Everyone)),
                    OverlaySubject::Role(role) if self.reserved.contains(role) => {
                        self.diagnostics.push(PlanDiagnostic::DependencyUnmet {
                            target: format!("overlay for role {} on {}", role, target),
                            missing: format!("reserved role {}", role),
                        });
                        continue;
                    }
                    OverlaySubject::Role(role) => (
                        SubjectRef::Role(role.clone()),
                        resolution
                            .role(role)
                            .and_then(Resolution::live_id)
                            .cloned()
                            .map(LiveSubject::Role),
                    ),
                };

                if let (Some(entity), Some(live_subject)) = (live_entity, &live_subject) {
                    kept_subjects.push(live_subject.clone());
                    let current =
                        find_live_overlay(entity, live_subject, self.default_role.as_ref());
                    if current.is_some_and(|c| c.allow == overlay.allow && c.deny == overlay.deny)
                    {
                        continue;
                    }
                }

                self.operations.push(Operation::SetOverlay {
                    target: target.clone(),
                    subject,
                    allow: overlay.allow,
                    deny: overlay.deny,
                });
            }

            if let (true, Some(entity)) = (clear_stale, live_entity) {
                self.clear_stale(&target, entity, &kept_subjects);
            }
        }
    }

    /// Clear overlays for subjects the snapshot does not set on this node.
    ///
    /// Overlays of managed roles are left alone.
    fn clear_stale(&mut self, target: &NodeRef, entity: &LiveEntity, kept: &[LiveSubject]) {
        let live = self.live;
        let everyone_kept = kept.contains(&LiveSubject::Everyone);
        for overlay in &entity.overlays {
            let subject = match &overlay.subject {
                LiveSubject::Everyone => SubjectRef::Everyone,
                LiveSubject::Role(id) if Some(id) == self.default_role.as_ref() => {
                    SubjectRef::Everyone
                }
                LiveSubject::Role(id) => {
                    let restorable = live.role(id).is_some_and(|r| r.is_restorable());
                    if !restorable || kept.contains(&overlay.subject) {
                        continue;
                    }
                    SubjectRef::Live(id.clone())
                }
            };
            if subject == SubjectRef::Everyone && everyone_kept {
                continue;
            }
            self.operations.push(Operation::SetOverlay {
                target: target.clone(),
                subject,
                allow: Permissions::empty(),
                deny: Permissions::empty(),
            });
        }
    }

    fn deletions(&mut self) {
        let (resolution, live) = (self.resolution, self.live);
        let claimed = resolution.claimed();
        let mut deletions: Vec<Operation> = Vec::new();

        for channel in &live.channels {
            if !claimed.contains(&channel.id) {
                deletions.push(Operation::DeleteEntity {
                    kind: EntityKind::Channel,
                    id: channel.id.clone(),
                    name: channel.name.clone(),
                });
            }
        }
        for group in live.groups.iter().filter(|g| g.kind.is_group()) {
            if !claimed.contains(&group.id) {
                deletions.push(Operation::DeleteEntity {
                    kind: EntityKind::Group,
                    id: group.id.clone(),
                    name: group.name.clone(),
                });
            }
        }
        for role in live.roles.iter().filter(|r| r.is_restorable()) {
            if !claimed.contains(&role.id) {
                deletions.push(Operation::DeleteEntity {
                    kind: EntityKind::Role,
                    id: role.id.clone(),
                    name: role.name.clone(),
                });
            }
        }

        tracing::debug!(count = deletions.len(), "Planned deletions");
        self.operations.extend(deletions);
    }
}
