//! Bounded retry with exponential backoff for remote lookups.
//!
//! Only transient failures are retried (see [`QrLinkError::is_retryable`]);
//! validation-class failures surface on the first attempt.

use crate::config::RetryDefaults;
use crate::error::QrLinkError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Scale each delay by a random factor in 0.5..1.5.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RetryDefaults::MAX_ATTEMPTS,
            base_delay: RetryDefaults::BASE_DELAY,
            max_delay: RetryDefaults::MAX_DELAY,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed), capped at `max_delay`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.exponential_base.powi(attempt as i32);
        let capped_secs = (self.base_delay.as_secs_f64() * multiplier).min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent.
///
/// A rate-limit error carrying a retry-after hint waits at least that long,
/// still bounded by `max_delay`.
pub async fn retry_async<F, Fut, T>(
    config: &RetryConfig,
    mut operation: F,
) -> (Result<T, QrLinkError>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QrLinkError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut stats = RetryStats::default();
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;

        let err = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Lookup succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };
        stats.last_error = Some(err.to_string());

        if !err.is_retryable() {
            debug!("Not retrying {}: {}", err.kind(), err);
            return (Err(err), stats);
        }
        if attempt + 1 >= max_attempts {
            warn!("All {} attempts exhausted. Last error: {}", max_attempts, err);
            return (Err(err), stats);
        }

        let mut delay = config.calculate_delay(attempt);
        if let QrLinkError::RateLimited {
            retry_after_secs: Some(secs),
            ..
        } = &err
        {
            delay = delay.max(Duration::from_secs(*secs)).min(config.max_delay);
        }
        stats.total_delay += delay;

        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            max_attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn network_error() -> QrLinkError {
        QrLinkError::Network {
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn test_defaults() {
        let config = RetryConfig::default().with_jitter(false);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(5), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig::new().with_base_delay(Duration::from_secs(2));
        for _ in 0..20 {
            let delay = config.calculate_delay(0);
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_is_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let (result, stats) = retry_async(&RetryConfig::new(), || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(network_error())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.attempts, 3);
        assert!(stats.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget() {
        let (result, stats) =
            retry_async(&RetryConfig::new().with_jitter(false), || async {
                Err::<(), _>(network_error())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.total_delay, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retried() {
        let (result, stats) = retry_async(&RetryConfig::new(), || async {
            Err::<(), _>(QrLinkError::EntityNotFound {
                entity: "account_tdx_2_1xyz".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.total_delay, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_is_honored() {
        let config = RetryConfig::new().with_max_attempts(2).with_jitter(false);
        let (_, stats) = retry_async(&config, || async {
            Err::<(), _>(QrLinkError::RateLimited {
                service: "gateway".to_string(),
                retry_after_secs: Some(5),
            })
        })
        .await;

        assert_eq!(stats.total_delay, Duration::from_secs(5));
    }
}
