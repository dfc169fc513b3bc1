//! Tier trait for representing platform rate limit constraints.

/// Rate limiting constraints published by a platform for one credential.
///
/// All methods return `Option<T>` where `None` indicates unlimited.
///
/// # Example
///
/// ```
/// use cartographer_rate_limit::Tier;
///
/// struct Strict;
///
/// impl Tier for Strict {
///     fn requests_per_second(&self) -> Option<u32> { Some(5) }
///     fn burst(&self) -> Option<u32> { Some(5) }
///     fn max_concurrent(&self) -> Option<u32> { Some(2) }
///     fn name(&self) -> &str { "Strict" }
/// }
///
/// assert_eq!(Strict.requests_per_second(), Some(5));
/// ```
pub trait Tier: Send + Sync {
    /// Sustained request rate.
    ///
    /// Returns `None` if the platform does not limit request rate.
    fn requests_per_second(&self) -> Option<u32>;

    /// Requests that may be issued back to back before the sustained rate applies.
    ///
    /// Returns `None` to use the per-second rate as the burst.
    fn burst(&self) -> Option<u32>;

    /// Maximum in-flight requests.
    ///
    /// Returns `None` if there is no concurrency limit.
    fn max_concurrent(&self) -> Option<u32>;

    /// Human-readable tier name.
    fn name(&self) -> &str;
}
