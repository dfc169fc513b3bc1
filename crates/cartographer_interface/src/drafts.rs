//! Payloads sent to an adapter to create or update entities.

use cartographer_core::{
    ChannelKind, ChannelSpec, EntityId, GroupSpec, LiveEntity, LiveRole, Permissions, RoleSpec,
};
use serde::{Deserialize, Serialize};

/// Desired attributes of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDraft {
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
    /// Target platform position, higher is more senior
    pub position: i32,
}

impl RoleDraft {
    /// Draft for a snapshot role placed at `position`.
    pub fn from_spec(spec: &RoleSpec, position: i32) -> Self {
        Self {
            name: spec.name().clone(),
            color: *spec.color(),
            hoist: *spec.hoist(),
            mentionable: *spec.mentionable(),
            permissions: *spec.permissions(),
            position,
        }
    }

    /// Whether a live role already carries these attributes (position excluded).
    pub fn matches(&self, live: &LiveRole) -> bool {
        live.name == self.name
            && live.color == self.color
            && live.hoist == self.hoist
            && live.mentionable == self.mentionable
            && live.permissions == self.permissions
    }
}

/// Desired attributes of a group or channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDraft {
    /// Name
    pub name: String,
    /// Type tag
    pub kind: ChannelKind,
    /// Live parent group
    pub parent: Option<EntityId>,
    /// Target position among siblings
    pub position: i32,
    /// Topic
    pub topic: Option<String>,
    /// Age-restricted
    pub nsfw: bool,
    /// Slowmode in seconds
    pub rate_limit_per_user: u32,
    /// Voice bitrate
    pub bitrate: Option<u32>,
    /// Voice user limit
    pub user_limit: Option<u32>,
}

impl ChannelDraft {
    /// Draft for a snapshot group.
    pub fn from_group(spec: &GroupSpec) -> Self {
        Self {
            name: spec.name().clone(),
            kind: *spec.kind(),
            parent: None,
            position: *spec.position() as i32,
            topic: None,
            nsfw: false,
            rate_limit_per_user: 0,
            bitrate: None,
            user_limit: None,
        }
    }

    /// Draft for a snapshot channel under an already-resolved parent.
    pub fn from_channel(spec: &ChannelSpec, parent: Option<EntityId>) -> Self {
        Self {
            name: spec.name().clone(),
            kind: *spec.kind(),
            parent,
            position: *spec.position() as i32,
            topic: spec.topic().clone(),
            nsfw: *spec.nsfw(),
            rate_limit_per_user: *spec.rate_limit_per_user(),
            bitrate: *spec.bitrate(),
            user_limit: *spec.user_limit(),
        }
    }

    /// Whether a live entity already carries these attributes (position excluded).
    pub fn matches(&self, live: &LiveEntity) -> bool {
        live.name == self.name
            && live.kind == self.kind
            && live.parent_id == self.parent
            && live.topic == self.topic
            && live.nsfw == self.nsfw
            && live.rate_limit_per_user == self.rate_limit_per_user
            && (self.bitrate.is_none() || live.bitrate == self.bitrate)
            && (self.user_limit.is_none() || live.user_limit == self.user_limit)
    }
}
