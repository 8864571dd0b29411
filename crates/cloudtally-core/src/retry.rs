//! Retry and rollback around a collector pass

use crate::collector::Collector;
use crate::error::Result;
use crate::report::PassReport;
use crate::store::Store;
use std::time::Duration;

/// Retry configuration for collector passes
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Run `collector` in a fresh session, retrying transient failures
///
/// The session is rolled back after every failure. Non-transient errors
/// and the last transient one are returned as is.
pub async fn run_with_retry<S, C>(
    store: &S,
    collector: &C,
    config: &RetryConfig,
) -> Result<PassReport>
where
    S: Store + ?Sized,
    C: Collector + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let mut session = store.begin().await?;
        let err = match collector.collect(session.as_mut()).await {
            Ok(report) => return Ok(report),
            Err(err) => err,
        };

        if let Err(rollback_err) = session.rollback().await {
            tracing::warn!(
                "Rollback after failed {} pass failed: {}",
                collector.name(),
                rollback_err
            );
        }

        if !err.is_transient() || attempt >= max_attempts {
            tracing::error!(
                "{} pass for {} failed after {} attempt(s): {}",
                collector.name(),
                collector.account().name,
                attempt,
                err
            );
            return Err(err);
        }

        let delay = config.delay_for(attempt);
        tracing::warn!(
            "{} pass for {} failed (attempt {}/{}), retrying in {:?}: {}",
            collector.name(),
            collector.account().name,
            attempt,
            max_attempts,
            delay,
            err
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
