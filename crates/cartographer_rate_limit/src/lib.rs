//! Rate limiting, retry policy and configuration.
//!
//! Platform adapters publish their limits as a [`Tier`]. A [`RateLimiter`]
//! built from that tier is shared by every caller using the same credential
//! and wraps each outbound call, retrying transient failures with backoff.
//!
//! [`CartographerConfig`] loads tiers, retry policy and execution settings
//! from bundled defaults merged with user overrides.

mod config;
mod limiter;
mod tier;
pub mod tiers;

pub use config::{
    CartographerConfig, ExecutionConfig, LimitsConfig, RetentionConfig, RetryConfig, TierConfig,
};
pub use limiter::{RateLimiter, RateLimiterGuard};
pub use tier::Tier;
pub use tiers::PlatformTier;
