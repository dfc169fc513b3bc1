//! Configuration structures for rate limiting, retry and execution.
//!
//! The configuration system supports:
//! - Bundled defaults (include_str! from cartographer.toml)
//! - User overrides (~/.config/cartographer/cartographer.toml, then ./cartographer.toml)
//! - Automatic merging with user values taking precedence

use crate::Tier;
use cartographer_error::{CartographerError, CartographerResult, ConfigError};
use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for one platform tier.
///
/// ```toml
/// [tiers.standard]
/// name = "Standard"
/// requests_per_second = 50
/// burst = 50
/// max_concurrent = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierConfig {
    /// Name of the tier
    pub name: String,

    /// Sustained requests per second
    #[serde(default)]
    pub requests_per_second: Option<u32>,

    /// Burst allowance
    #[serde(default)]
    pub burst: Option<u32>,

    /// Maximum concurrent requests
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

impl Tier for TierConfig {
    fn requests_per_second(&self) -> Option<u32> {
        self.requests_per_second
    }

    fn burst(&self) -> Option<u32> {
        self.burst
    }

    fn max_concurrent(&self) -> Option<u32> {
        self.max_concurrent
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Retry policy for transient adapter errors.
///
/// Delays grow as `initial_backoff_ms * factor^n`, capped at `max_delay_ms`,
/// with random jitter. `max_attempts` counts the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Growth factor between retries
    #[serde(default = "default_factor")]
    pub factor: u64,
    /// Upper bound on a single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_factor() -> u64 {
    2
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> usize {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            factor: default_factor(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    /// Retry delays before jitter, one per retry after the first attempt.
    ///
    /// # Example
    ///
    /// ```
    /// use cartographer_rate_limit::RetryConfig;
    /// use std::time::Duration;
    ///
    /// let retry = RetryConfig { initial_backoff_ms: 100, factor: 2, max_delay_ms: 300, max_attempts: 4 };
    /// let delays: Vec<_> = retry.delays().collect();
    /// assert_eq!(delays, vec![
    ///     Duration::from_millis(100),
    ///     Duration::from_millis(200),
    ///     Duration::from_millis(300),
    /// ]);
    /// ```
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let initial = self.initial_backoff_ms;
        let factor = self.factor.max(1);
        let max_delay = self.max_delay_ms;
        (0..self.max_attempts.saturating_sub(1)).map(move |n| {
            let exp = u32::try_from(n).unwrap_or(u32::MAX);
            let ms = factor
                .checked_pow(exp)
                .and_then(|f| initial.checked_mul(f))
                .unwrap_or(max_delay)
                .min(max_delay);
            Duration::from_millis(ms)
        })
    }
}

/// Execution engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// In-barrier worker bound per tenant
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

/// Retention defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Snapshot quota for tenants that never saved settings
    #[serde(default = "default_max_backups")]
    pub default_max_backups: usize,
}

fn default_max_backups() -> usize {
    5
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_max_backups: default_max_backups(),
        }
    }
}

/// Payload limits for adapters that do not declare their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Longest accepted entity name
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Longest accepted channel topic
    #[serde(default = "default_max_topic_length")]
    pub max_topic_length: usize,
}

fn default_max_name_length() -> usize {
    100
}

fn default_max_topic_length() -> usize {
    1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_name_length: default_max_name_length(),
            max_topic_length: default_max_topic_length(),
        }
    }
}

/// Top-level Cartographer configuration.
///
/// Loads configuration from TOML files with a precedence system:
/// 1. Bundled defaults (include_str! from cartographer.toml)
/// 2. User override (~/.config/cartographer/cartographer.toml)
/// 3. User override (./cartographer.toml)
///
/// # Example
///
/// ```no_run
/// use cartographer_rate_limit::CartographerConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CartographerConfig::load()?;
/// let tier = config.get_tier(None).unwrap();
/// println!("Default tier allows {:?} requests/s", tier.requests_per_second);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CartographerConfig {
    /// Name of the tier used when none is requested
    #[serde(default = "default_tier_name")]
    pub default_tier: String,

    /// Map of tier name to tier configuration
    #[serde(default)]
    pub tiers: HashMap<String, TierConfig>,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Retention defaults
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Fallback payload limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_tier_name() -> String {
    "standard".to_string()
}

impl Default for CartographerConfig {
    fn default() -> Self {
        Self {
            default_tier: default_tier_name(),
            tiers: HashMap::new(),
            retry: RetryConfig::default(),
            execution: ExecutionConfig::default(),
            retention: RetentionConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl CartographerConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> CartographerResult<Self> {
        debug!("Loading configuration from file");

        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                CartographerError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                CartographerError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Load configuration with precedence: current dir > home dir > bundled defaults.
    ///
    /// User config files are optional and silently skipped if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed.
    #[instrument]
    pub fn load() -> CartographerResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        const DEFAULT_CONFIG: &str = include_str!("../../../cartographer.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/cartographer/cartographer.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("cartographer").required(false));

        builder
            .build()
            .map_err(|e| {
                CartographerError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                CartographerError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Get a tier configuration by name, or the default tier if `None`.
    #[instrument(skip(self))]
    pub fn get_tier(&self, tier_name: Option<&str>) -> Option<TierConfig> {
        let tier = tier_name.unwrap_or(&self.default_tier);
        debug!(tier, "Looking up tier configuration");
        self.tiers.get(tier).cloned()
    }
}
