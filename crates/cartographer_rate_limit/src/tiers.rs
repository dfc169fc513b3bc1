//! Built-in tier presets.
//!
//! These mirror the `[tiers.*]` tables of the bundled configuration and are
//! useful when no configuration file is available, e.g. in tests.

use crate::{Tier, TierConfig};

/// Well-known platform limit profiles.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum PlatformTier {
    /// A typical bot credential: 50 requests per second, 10 in flight
    Standard,
    /// Conservative profile for shared credentials: 5 per second, 2 in flight
    Shared,
    /// No limits, for in-process backends
    Unlimited,
}

impl Tier for PlatformTier {
    fn requests_per_second(&self) -> Option<u32> {
        match self {
            PlatformTier::Standard => Some(50),
            PlatformTier::Shared => Some(5),
            PlatformTier::Unlimited => None,
        }
    }

    fn burst(&self) -> Option<u32> {
        match self {
            PlatformTier::Standard => Some(50),
            PlatformTier::Shared => Some(5),
            PlatformTier::Unlimited => None,
        }
    }

    fn max_concurrent(&self) -> Option<u32> {
        match self {
            PlatformTier::Standard => Some(10),
            PlatformTier::Shared => Some(2),
            PlatformTier::Unlimited => None,
        }
    }

    fn name(&self) -> &str {
        match self {
            PlatformTier::Standard => "Standard",
            PlatformTier::Shared => "Shared",
            PlatformTier::Unlimited => "Unlimited",
        }
    }
}

impl From<PlatformTier> for TierConfig {
    fn from(tier: PlatformTier) -> Self {
        TierConfig {
            name: tier.name().to_string(),
            requests_per_second: tier.requests_per_second(),
            burst: tier.burst(),
            max_concurrent: tier.max_concurrent(),
        }
    }
}
