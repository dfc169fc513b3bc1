//! Tests for the configuration system.

use cartographer_rate_limit::{CartographerConfig, PlatformTier, RetryConfig, Tier, TierConfig};
use std::time::Duration;

#[test]
fn test_load_bundled_defaults() {
    let config = CartographerConfig::load().unwrap();

    assert!(config.tiers.contains_key("standard"));
    assert!(config.tiers.contains_key("unlimited"));
    assert!(config.retry.max_attempts >= 1);
    assert!(config.execution.concurrency >= 1);
    assert!(config.limits.max_name_length > 0);
}

#[test]
fn test_get_tier_with_default() {
    let config = CartographerConfig::load().unwrap();
    let tier = config.get_tier(None).unwrap();
    assert_eq!(tier.name, config.tiers[&config.default_tier].name);
}

#[test]
fn test_unlimited_tier_has_no_limits() {
    let config = CartographerConfig::load().unwrap();
    let tier = config.get_tier(Some("unlimited")).unwrap();
    assert_eq!(tier.requests_per_second(), None);
    assert_eq!(tier.max_concurrent(), None);
}

#[test]
fn test_tier_config_implements_tier_trait() {
    let tier_config = TierConfig {
        name: "Test Tier".to_string(),
        requests_per_second: Some(20),
        burst: Some(40),
        max_concurrent: Some(3),
    };

    assert_eq!(tier_config.requests_per_second(), Some(20));
    assert_eq!(tier_config.burst(), Some(40));
    assert_eq!(tier_config.max_concurrent(), Some(3));
    assert_eq!(tier_config.name(), "Test Tier");
}

#[test]
fn test_preset_converts_to_config() {
    let config = TierConfig::from(PlatformTier::Shared);
    assert_eq!(config.name, "Shared");
    assert_eq!(config.requests_per_second, Some(5));
    assert_eq!(config.max_concurrent, Some(2));
}

#[test]
fn test_config_from_file() {
    use std::io::Write;
    use tempfile::Builder;

    let mut temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        temp_file,
        r#"
default_tier = "custom"

[tiers.custom]
name = "Custom Tier"
requests_per_second = 7
max_concurrent = 1

[retry]
initial_backoff_ms = 10
max_attempts = 2

[execution]
concurrency = 8
"#
    )
    .unwrap();

    let config = CartographerConfig::from_file(temp_file.path()).unwrap();

    let tier = config.get_tier(None).unwrap();
    assert_eq!(tier.name, "Custom Tier");
    assert_eq!(tier.requests_per_second, Some(7));
    assert_eq!(tier.burst, None);
    assert_eq!(config.retry.initial_backoff_ms, 10);
    assert_eq!(config.retry.max_attempts, 2);
    // Omitted keys fall back to defaults.
    assert_eq!(config.retry.factor, 2);
    assert_eq!(config.execution.concurrency, 8);
    assert_eq!(config.retention.default_max_backups, 5);
}

#[test]
fn test_missing_file_is_error() {
    let result = CartographerConfig::from_file("/definitely/not/here/cartographer.toml");
    assert!(result.is_err());
}

#[test]
fn test_retry_delays_are_capped() {
    let retry = RetryConfig {
        initial_backoff_ms: 1_000,
        factor: 10,
        max_delay_ms: 5_000,
        max_attempts: 4,
    };
    let delays: Vec<_> = retry.delays().collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1_000),
            Duration::from_millis(5_000),
            Duration::from_millis(5_000),
        ]
    );
}

#[test]
fn test_single_attempt_has_no_delays() {
    let retry = RetryConfig {
        max_attempts: 1,
        ..RetryConfig::default()
    };
    assert_eq!(retry.delays().count(), 0);
}
