//! Per-tenant backup settings.

use crate::TenantId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

const DEFAULT_MAX_BACKUPS: usize = 5;

/// Backup preferences of one tenant.
///
/// Ignore lists match names case-insensitively. Names are lowercased when
/// added and when settings are loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Tenant these settings belong to
    pub tenant_id: TenantId,
    /// Whether captures and restores are allowed at all
    #[serde(default = "default_true")]
    pub backups_enabled: bool,
    /// Whether a scheduler should capture periodically
    #[serde(default)]
    pub auto_backup: bool,
    /// How many snapshots retention keeps
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// Role names excluded from capture
    #[serde(default, deserialize_with = "lowercased")]
    pub ignored_roles: BTreeSet<String>,
    /// Group and channel names excluded from capture
    #[serde(default, deserialize_with = "lowercased")]
    pub ignored_channels: BTreeSet<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_backups() -> usize {
    DEFAULT_MAX_BACKUPS
}

fn lowercased<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
    let names = Vec::<String>::deserialize(deserializer)?;
    Ok(names.iter().map(|n| n.to_lowercase()).collect())
}

fn contains_name(names: &BTreeSet<String>, name: &str) -> bool {
    let name = name.to_lowercase();
    names.contains(&name) || names.iter().any(|n| n.to_lowercase() == name)
}

impl TenantSettings {
    /// Default settings for a tenant that never saved any.
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            backups_enabled: true,
            auto_backup: false,
            max_backups: DEFAULT_MAX_BACKUPS,
            ignored_roles: BTreeSet::new(),
            ignored_channels: BTreeSet::new(),
        }
    }

    /// Override the retention count.
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Add a role name to the ignore list.
    pub fn ignore_role(mut self, name: impl AsRef<str>) -> Self {
        self.ignored_roles.insert(name.as_ref().to_lowercase());
        self
    }

    /// Add a group or channel name to the ignore list.
    pub fn ignore_channel(mut self, name: impl AsRef<str>) -> Self {
        self.ignored_channels.insert(name.as_ref().to_lowercase());
        self
    }

    /// Whether a role with this name is excluded from capture.
    pub fn is_role_ignored(&self, name: &str) -> bool {
        contains_name(&self.ignored_roles, name)
    }

    /// Whether a group or channel with this name is excluded from capture.
    pub fn is_channel_ignored(&self, name: &str) -> bool {
        contains_name(&self.ignored_channels, name)
    }

    /// Retention count, never below one.
    ///
    /// # Examples
    ///
    /// ```
    /// use cartographer_core::{TenantId, TenantSettings};
    ///
    /// let settings = TenantSettings::new(TenantId::from("t1")).with_max_backups(0);
    /// assert_eq!(settings.effective_max_backups(), 1);
    /// ```
    pub fn effective_max_backups(&self) -> usize {
        self.max_backups.max(1)
    }
}
