//! Closed enumerations of entity kinds.

use serde::{Deserialize, Serialize};

/// Type tag carried by groups and channels.
///
/// `Category` is the only kind a group may have, and the only kind a channel
/// may not have.
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
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelKind {
    /// Container that organizes other channels
    Category,
    /// Standard text channel
    Text,
    /// Voice channel
    Voice,
    /// Forum channel (each post is a thread)
    Forum,
    /// Announcement channel
    Announcement,
    /// Stage channel (one-to-many broadcast)
    Stage,
}

impl ChannelKind {
    /// Whether this kind is a container.
    pub fn is_group(&self) -> bool {
        matches!(self, ChannelKind::Category)
    }

    /// Whether this kind carries audio settings (bitrate, user limit).
    pub fn is_voice_like(&self) -> bool {
        matches!(self, ChannelKind::Voice | ChannelKind::Stage)
    }
}

/// The three structural entity families.
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
pub enum EntityKind {
    /// Access-control role
    Role,
    /// Container group (category)
    Group,
    /// Leaf channel
    Channel,
}
