//! Permission bitsets.
//!
//! Bits follow the common chat-platform layout. Bits this build does not name
//! are preserved as-is so snapshots captured from a newer platform survive a
//! round trip unchanged.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Role base permissions and overlay allow/deny sets.
///
/// Serialized as a plain integer.
///
/// # Examples
///
/// ```
/// use cartographer_core::Permissions;
///
/// let perms = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES;
/// assert!(perms.contains(Permissions::SEND_MESSAGES));
/// assert_eq!(serde_json::to_string(&perms).unwrap(), "3072");
///
/// // Unknown bits are retained.
/// let future = Permissions::from_bits_retain(1 << 60);
/// assert_eq!(future.bits(), 1 << 60);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u64);

bitflags! {
    impl Permissions: u64 {
        /// Create invite links
        const CREATE_INVITES        = 1 << 0;
        /// Kick members
        const KICK_MEMBERS          = 1 << 1;
        /// Ban members
        const BAN_MEMBERS           = 1 << 2;
        /// All permissions, bypasses overlays
        const ADMINISTRATOR         = 1 << 3;
        /// Edit and delete channels
        const MANAGE_CHANNELS       = 1 << 4;
        /// Edit workspace settings
        const MANAGE_SERVER         = 1 << 5;
        /// Add reactions to messages
        const ADD_REACTIONS         = 1 << 6;
        /// View audit log
        const VIEW_AUDIT_LOG        = 1 << 7;
        /// Priority speaker in voice
        const PRIORITY_SPEAKER      = 1 << 8;
        /// Stream video in voice
        const STREAM                = 1 << 9;
        /// See the channel and read its messages
        const VIEW_CHANNEL          = 1 << 10;
        /// Send messages
        const SEND_MESSAGES         = 1 << 11;
        /// Send text-to-speech messages
        const SEND_TTS_MESSAGES     = 1 << 12;
        /// Delete or pin other members' messages
        const MANAGE_MESSAGES       = 1 << 13;
        /// Links are auto-embedded
        const EMBED_LINKS           = 1 << 14;
        /// Upload files
        const ATTACH_FILES          = 1 << 15;
        /// Read message history
        const READ_MESSAGE_HISTORY  = 1 << 16;
        /// Mention everyone
        const MENTION_EVERYONE      = 1 << 17;
        /// Use emojis from other workspaces
        const USE_EXTERNAL_EMOJIS   = 1 << 18;
        /// Connect to voice
        const CONNECT               = 1 << 20;
        /// Speak in voice
        const SPEAK                 = 1 << 21;
        /// Mute others in voice
        const MUTE_MEMBERS          = 1 << 22;
        /// Deafen others in voice
        const DEAFEN_MEMBERS        = 1 << 23;
        /// Move members between voice channels
        const MOVE_MEMBERS          = 1 << 24;
        /// Change own nickname
        const CHANGE_NICKNAME       = 1 << 26;
        /// Change others' nicknames
        const MANAGE_NICKNAMES      = 1 << 27;
        /// Create, edit and delete roles below the highest own role
        const MANAGE_ROLES          = 1 << 28;
        /// Manage webhooks
        const MANAGE_WEBHOOKS       = 1 << 29;
        /// Manage threads
        const MANAGE_THREADS        = 1 << 34;
        /// Send messages in threads
        const SEND_MESSAGES_IN_THREADS = 1 << 38;

        // Keep unnamed bits through `all()`/`complement()`.
        const _ = !0;
    }
}

impl Permissions {
    /// Check if administrator (overrides all other checks).
    pub fn is_admin(&self) -> bool {
        self.contains(Self::ADMINISTRATOR)
    }

    /// Bits present in both sets.
    pub fn overlap(&self, other: Permissions) -> Permissions {
        *self & other
    }
}
