//! Snapshot model.
//!
//! A snapshot is an immutable, self-contained record of one hierarchy capture.
//! Entities address each other through snapshot-local keys (`RoleSpec::key`,
//! `GroupSpec::key`), never through live identities, so the document stays
//! valid after the live entities it was captured from are gone.

use crate::{ChannelKind, Permissions, TenantId};
use cartographer_error::{FormatError, FormatErrorKind};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Highest schema version this build reads and the version it writes.
///
/// Additive, optional fields do not bump the version; older readers ignore
/// them. The version only changes when existing fields change meaning.
pub const SCHEMA_VERSION: u32 = 1;

/// Subject of a permission overlay.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlaySubject {
    /// The member-default ("everyone") subject
    Everyone,
    /// A role in the same snapshot, by key
    Role(String),
}

/// Per-entity permission exception.
///
/// Bits set in neither `allow` nor `deny` inherit from the role base
/// permissions. `allow` and `deny` never share a bit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionOverlay {
    /// Who the overlay applies to
    pub subject: OverlaySubject,
    /// Explicitly granted bits
    pub allow: Permissions,
    /// Explicitly revoked bits
    pub deny: Permissions,
}

impl PermissionOverlay {
    /// Build an overlay, clearing from `deny` any bit that is also allowed.
    ///
    /// # Examples
    ///
    /// ```
    /// use cartographer_core::{OverlaySubject, PermissionOverlay, Permissions};
    ///
    /// let overlay = PermissionOverlay::normalized(
    ///     OverlaySubject::Everyone,
    ///     Permissions::SEND_MESSAGES,
    ///     Permissions::SEND_MESSAGES | Permissions::ATTACH_FILES,
    /// );
    /// assert_eq!(overlay.deny, Permissions::ATTACH_FILES);
    /// ```
    pub fn normalized(subject: OverlaySubject, allow: Permissions, deny: Permissions) -> Self {
        Self {
            subject,
            allow,
            deny: deny - allow,
        }
    }

    /// Whether the overlay carries no bits at all.
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Captured role.
///
/// `rank` orders roles relative to each other only (0 is the most senior
/// role); absolute platform positions are not recorded.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[builder(setter(into))]
pub struct RoleSpec {
    /// Snapshot-local key
    key: String,
    /// Role name
    name: String,
    /// RGB color (0 means no color)
    #[serde(default)]
    #[builder(default)]
    color: u32,
    /// Displayed separately in the member list
    #[serde(default)]
    #[builder(default)]
    hoist: bool,
    /// Can be mentioned by everyone
    #[serde(default)]
    #[builder(default)]
    mentionable: bool,
    /// Base permission set
    #[serde(default)]
    #[builder(default)]
    permissions: Permissions,
    /// Relative rank, 0 is the most senior
    rank: u32,
}

/// Captured container group (category).
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[builder(setter(into))]
pub struct GroupSpec {
    /// Snapshot-local key
    key: String,
    /// Group name
    name: String,
    /// Type tag, always `Category`
    #[serde(default = "default_group_kind")]
    #[builder(default = "ChannelKind::Category")]
    kind: ChannelKind,
    /// Order among groups
    position: u32,
    /// Permission overlays
    #[serde(default)]
    #[builder(default)]
    overlays: Vec<PermissionOverlay>,
}

fn default_group_kind() -> ChannelKind {
    ChannelKind::Category
}

/// Captured channel.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[builder(setter(into))]
pub struct ChannelSpec {
    /// Snapshot-local key
    key: String,
    /// Channel name
    name: String,
    /// Type tag (never `Category`)
    kind: ChannelKind,
    /// Order among siblings under the same parent
    position: u32,
    /// Key of the parent group, if nested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    parent_ref: Option<String>,
    /// Permission overlays
    #[serde(default)]
    #[builder(default)]
    overlays: Vec<PermissionOverlay>,
    /// Channel topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    topic: Option<String>,
    /// Age-restricted
    #[serde(default)]
    #[builder(default)]
    nsfw: bool,
    /// Slowmode in seconds (0 = off)
    #[serde(default)]
    #[builder(default)]
    rate_limit_per_user: u32,
    /// Voice bitrate in bits per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    bitrate: Option<u32>,
    /// Voice user limit (0 = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    user_limit: Option<u32>,
}

/// Versioned record of one hierarchy capture.
///
/// Build one with [`Snapshot::new`] or read one with [`crate::deserialize`].
/// Both validate the referential invariants before returning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct Snapshot {
    /// Document schema version
    schema_version: u32,
    /// Tenant the hierarchy belongs to
    tenant_id: TenantId,
    /// When the capture happened
    captured_at: DateTime<Utc>,
    /// Roles in rank order
    #[serde(default)]
    roles: Vec<RoleSpec>,
    /// Groups in position order
    #[serde(default)]
    groups: Vec<GroupSpec>,
    /// Channels in position order within their parent
    #[serde(default)]
    channels: Vec<ChannelSpec>,
}

/// Entity counts of a snapshot, for listings and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Number of roles
    pub roles: usize,
    /// Number of groups
    pub groups: usize,
    /// Number of channels
    pub channels: usize,
    /// Number of overlays across groups and channels
    pub overlays: usize,
}

impl Snapshot {
    /// Assemble and validate a snapshot at the current schema version.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if any referential invariant is violated.
    pub fn new(
        tenant_id: TenantId,
        captured_at: DateTime<Utc>,
        roles: Vec<RoleSpec>,
        groups: Vec<GroupSpec>,
        channels: Vec<ChannelSpec>,
    ) -> Result<Self, FormatError> {
        let snapshot = Self {
            schema_version: SCHEMA_VERSION,
            tenant_id,
            captured_at,
            roles,
            groups,
            channels,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Look up a role by key.
    pub fn role(&self, key: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.key == key)
    }

    /// Look up a group by key.
    pub fn group(&self, key: &str) -> Option<&GroupSpec> {
        self.groups.iter().find(|g| g.key == key)
    }

    /// Look up a channel by key.
    pub fn channel(&self, key: &str) -> Option<&ChannelSpec> {
        self.channels.iter().find(|c| c.key == key)
    }

    /// Channels nested under the given group key, in recorded order.
    pub fn children_of<'a>(&'a self, group_key: &'a str) -> impl Iterator<Item = &'a ChannelSpec> {
        self.channels
            .iter()
            .filter(move |c| c.parent_ref.as_deref() == Some(group_key))
    }

    /// Entity counts.
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            roles: self.roles.len(),
            groups: self.groups.len(),
            channels: self.channels.len(),
            overlays: self.groups.iter().map(|g| g.overlays.len()).sum::<usize>()
                + self.channels.iter().map(|c| c.overlays.len()).sum::<usize>(),
        }
    }

    /// Check the schema version and every referential invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.schema_version == 0 || self.schema_version > SCHEMA_VERSION {
            return Err(FormatError::new(FormatErrorKind::UnsupportedVersion {
                found: self.schema_version,
                supported: SCHEMA_VERSION,
            }));
        }

        let role_keys = unique_keys("role", self.roles.iter().map(|r| r.key.as_str()))?;
        let group_keys = unique_keys("group", self.groups.iter().map(|g| g.key.as_str()))?;
        unique_keys("channel", self.channels.iter().map(|c| c.key.as_str()))?;

        for group in &self.groups {
            if !group.kind.is_group() {
                return Err(FormatError::new(FormatErrorKind::InvalidKind {
                    entity: group.key.clone(),
                    kind: group.kind.to_string(),
                }));
            }
            validate_overlays(&group.key, &group.overlays, &role_keys)?;
        }

        for channel in &self.channels {
            if channel.kind.is_group() {
                return Err(FormatError::new(FormatErrorKind::InvalidKind {
                    entity: channel.key.clone(),
                    kind: channel.kind.to_string(),
                }));
            }
            if let Some(parent) = &channel.parent_ref
                && !group_keys.contains(parent.as_str())
            {
                return Err(FormatError::new(FormatErrorKind::DanglingParent {
                    channel: channel.key.clone(),
                    parent: parent.clone(),
                }));
            }
            validate_overlays(&channel.key, &channel.overlays, &role_keys)?;
        }

        Ok(())
    }
}

fn unique_keys<'a>(
    entity: &str,
    keys: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>, FormatError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(FormatError::new(FormatErrorKind::DuplicateKey {
                entity: entity.to_string(),
                key: key.to_string(),
            }));
        }
    }
    Ok(seen)
}

fn validate_overlays(
    entity: &str,
    overlays: &[PermissionOverlay],
    role_keys: &HashSet<&str>,
) -> Result<(), FormatError> {
    let mut subjects = HashSet::new();
    for overlay in overlays {
        if let OverlaySubject::Role(role) = &overlay.subject
            && !role_keys.contains(role.as_str())
        {
            return Err(FormatError::new(FormatErrorKind::DanglingSubject {
                entity: entity.to_string(),
                role: role.clone(),
            }));
        }
        let overlap = overlay.allow.overlap(overlay.deny);
        if !overlap.is_empty() {
            return Err(FormatError::new(FormatErrorKind::OverlappingOverlay {
                entity: entity.to_string(),
                bits: overlap.bits(),
            }));
        }
        if !subjects.insert(&overlay.subject) {
            return Err(FormatError::new(FormatErrorKind::DuplicateKey {
                entity: format!("overlay on {}", entity),
                key: match &overlay.subject {
                    OverlaySubject::Everyone => "everyone".to_string(),
                    OverlaySubject::Role(role) => role.clone(),
                },
            }));
        }
    }
    Ok(())
}
