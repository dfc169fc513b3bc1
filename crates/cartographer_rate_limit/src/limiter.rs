//! Rate limiter implementation using governor and Tokio Semaphore.
//!
//! - Governor (GCRA) enforces the sustained request rate and burst
//! - A Tokio Semaphore enforces the in-flight request limit
//!
//! A limiter is shared by every caller using the same platform credential.
//! Permission is acquired per outbound call and released as soon as that call
//! returns, including between retry attempts.

use crate::{RetryConfig, Tier};
use cartographer_error::RetryableError;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Semaphore;
use tokio_retry2::strategy::jitter;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// Permits handed out when a tier sets no concurrency limit.
const UNBOUNDED_PERMITS: usize = Semaphore::MAX_PERMITS;

/// Rate limiter that enforces a request rate and a concurrency limit.
///
/// The limiter takes ownership of a value implementing `Tier` and uses it to
/// configure its limits. Cloning is cheap and clones share the same budget.
///
/// # Example
///
/// ```
/// use cartographer_rate_limit::{PlatformTier, RateLimiter};
///
/// # #[tokio::main]
/// # async fn main() {
/// let limiter = RateLimiter::new(PlatformTier::Unlimited);
/// let guard = limiter.acquire().await;
/// // call the platform...
/// drop(guard);
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiter<T: Tier> {
    inner: Arc<T>,
    rate_limiter: Option<Arc<DirectRateLimiter>>,
    concurrent_semaphore: Arc<Semaphore>,
    retry: RetryConfig,
}

impl<T: Tier> std::fmt::Debug for RateLimiter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tier", &self.inner.name())
            .field("available_permits", &self.concurrent_semaphore.available_permits())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<T: Tier> RateLimiter<T> {
    /// Create a new rate limiter from a tier, using the default retry policy.
    pub fn new(tier: T) -> Self {
        let rate_limiter = tier.requests_per_second().and_then(|rps| {
            NonZeroU32::new(rps).map(|n| {
                let burst = tier.burst().and_then(NonZeroU32::new).unwrap_or(n);
                let quota = Quota::per_second(n).allow_burst(burst);
                Arc::new(GovernorRateLimiter::direct(quota))
            })
        });

        let permits = tier
            .max_concurrent()
            .map(|n| (n as usize).max(1))
            .unwrap_or(UNBOUNDED_PERMITS);
        let concurrent_semaphore = Arc::new(Semaphore::new(permits));

        Self {
            inner: Arc::new(tier),
            rate_limiter,
            concurrent_semaphore,
            retry: RetryConfig::default(),
        }
    }

    /// Replace the retry policy used by [`RateLimiter::execute`].
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The tier this limiter enforces.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// The retry policy in effect.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Wait until both the rate and the concurrency limit allow one request.
    ///
    /// Returns a guard that releases the concurrent slot when dropped.
    pub async fn acquire(&self) -> RateLimiterGuard {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        // Acquired last so a slot is never held while waiting on the rate.
        let permit = match self.concurrent_semaphore.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("Concurrency semaphore closed, proceeding without a slot");
                None
            }
        };

        RateLimiterGuard { _permit: permit }
    }

    /// Try to acquire without waiting.
    ///
    /// Returns `None` if either limit would block.
    pub fn try_acquire(&self) -> Option<RateLimiterGuard> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.check().ok()?;
        }
        let permit = self.concurrent_semaphore.clone().try_acquire_owned().ok()?;
        Some(RateLimiterGuard {
            _permit: Some(permit),
        })
    }

    /// Execute an operation with rate limiting and automatic retry.
    ///
    /// For each attempt the limiter acquires permission, runs the operation
    /// and releases permission. Transient errors are retried with exponential
    /// backoff and jitter, honoring any platform-supplied retry-after delay.
    /// Permanent errors return immediately.
    pub async fn execute<F, Fut, R, E>(&self, operation: F) -> Result<R, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<R, E>>,
        E: RetryableError + std::fmt::Display,
    {
        self.execute_counted(operation).await.0
    }

    /// Like [`RateLimiter::execute`], also returning how many attempts ran.
    pub async fn execute_counted<F, Fut, R, E>(&self, operation: F) -> (Result<R, E>, u32)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<R, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let attempts = AtomicU32::new(0);
        let retry_strategy = self.retry.delays().map(jitter);

        let attempts_ref = &attempts;
        let operation_ref = &operation;

        let result = Retry::spawn(retry_strategy, || async move {
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
            let result = {
                let _guard = self.acquire().await;
                operation_ref().await
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    Ok(value)
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "Transient error, will retry");
                    Err(RetryError::Transient {
                        retry_after: e.retry_after(),
                        err: e,
                    })
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Permanent error, failing immediately");
                    Err(RetryError::Permanent(e))
                }
            }
        })
        .await;

        (result, attempts.load(Ordering::SeqCst))
    }
}

/// RAII guard for rate limiter.
///
/// Releases the concurrent request slot when dropped.
pub struct RateLimiterGuard {
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}
