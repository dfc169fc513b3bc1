//! Live hierarchy as reported by a platform adapter.

use crate::{ChannelKind, EntityId, Permissions};
use serde::{Deserialize, Serialize};

/// Subject of a live overlay.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveSubject {
    /// The member-default subject
    Everyone,
    /// A live role
    Role(EntityId),
}

/// Overlay attached to a live group or channel.
///
/// An overlay with empty `allow` and `deny` sent to an adapter removes the
/// overlay for that subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiveOverlay {
    /// Who the overlay applies to
    pub subject: LiveSubject,
    /// Granted bits
    pub allow: Permissions,
    /// Revoked bits
    pub deny: Permissions,
}

impl LiveOverlay {
    /// Overlay that clears any exception for `subject`.
    pub fn cleared(subject: LiveSubject) -> Self {
        Self {
            subject,
            allow: Permissions::empty(),
            deny: Permissions::empty(),
        }
    }

    /// Whether this overlay carries no bits.
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// A role as it exists on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRole {
    /// Platform identity
    pub id: EntityId,
    /// Role name
    pub name: String,
    /// RGB color
    pub color: u32,
    /// Displayed separately
    pub hoist: bool,
    /// Mentionable
    pub mentionable: bool,
    /// Base permissions
    pub permissions: Permissions,
    /// Platform position, higher is more senior
    pub position: i32,
    /// Owned by an integration, cannot be edited or recreated
    #[serde(default)]
    pub managed: bool,
    /// The implicit member-default role
    #[serde(default)]
    pub is_default: bool,
}

impl LiveRole {
    /// Whether the role may take part in capture and restore.
    pub fn is_restorable(&self) -> bool {
        !self.managed && !self.is_default
    }
}

/// A group or channel as it exists on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEntity {
    /// Platform identity
    pub id: EntityId,
    /// Name
    pub name: String,
    /// Type tag
    pub kind: ChannelKind,
    /// Parent group, if nested
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    /// Position among siblings
    pub position: i32,
    /// Permission overlays
    #[serde(default)]
    pub overlays: Vec<LiveOverlay>,
    /// Topic
    #[serde(default)]
    pub topic: Option<String>,
    /// Age-restricted
    #[serde(default)]
    pub nsfw: bool,
    /// Slowmode in seconds
    #[serde(default)]
    pub rate_limit_per_user: u32,
    /// Voice bitrate
    #[serde(default)]
    pub bitrate: Option<u32>,
    /// Voice user limit
    #[serde(default)]
    pub user_limit: Option<u32>,
}

impl LiveEntity {
    /// Overlay currently set for `subject`, if any.
    pub fn overlay_for(&self, subject: &LiveSubject) -> Option<&LiveOverlay> {
        self.overlays.iter().find(|o| &o.subject == subject)
    }
}

/// Full live hierarchy of one tenant at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveState {
    /// Roles, in any order
    #[serde(default)]
    pub roles: Vec<LiveRole>,
    /// Groups (kind `Category`)
    #[serde(default)]
    pub groups: Vec<LiveEntity>,
    /// Channels
    #[serde(default)]
    pub channels: Vec<LiveEntity>,
}

impl LiveState {
    /// Role by identity.
    pub fn role(&self, id: &EntityId) -> Option<&LiveRole> {
        self.roles.iter().find(|r| &r.id == id)
    }

    /// Group by identity.
    pub fn group(&self, id: &EntityId) -> Option<&LiveEntity> {
        self.groups.iter().find(|g| &g.id == id)
    }

    /// Channel by identity.
    pub fn channel(&self, id: &EntityId) -> Option<&LiveEntity> {
        self.channels.iter().find(|c| &c.id == id)
    }

    /// The member-default role, if the platform reports one.
    pub fn default_role(&self) -> Option<&LiveRole> {
        self.roles.iter().find(|r| r.is_default)
    }
}
