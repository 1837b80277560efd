//! Bounded retry of deadline-guarded attempts.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::MiseConfig;
use crate::error::{self, ConfigError, ResilienceError};
use crate::util::stats::ExecutionStats;
use crate::util::timeout::{DeadlineGuard, DEFAULT_TIMEOUT_MS};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Delay schedule between attempts.
///
/// `attempt` below is the 0-based index of the attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// `retry_delay * attempt`. The first retry follows immediately.
    #[default]
    AttemptScaled,
    /// `retry_delay * (attempt + 1)`.
    Linear,
    /// `retry_delay` before every retry.
    Fixed,
    /// `retry_delay * multiplier^attempt`, capped at `max_delay_ms`.
    Exponential { multiplier: f64, max_delay_ms: u64 },
}

impl Backoff {
    /// Delay before the retry that follows failed attempt `attempt`.
    pub fn delay(&self, retry_delay: Duration, attempt: u32) -> Duration {
        match *self {
            Self::AttemptScaled => retry_delay.saturating_mul(attempt),
            Self::Linear => retry_delay.saturating_mul(attempt.saturating_add(1)),
            Self::Fixed => retry_delay,
            Self::Exponential {
                multiplier,
                max_delay_ms,
            } => {
                let max = Duration::from_millis(max_delay_ms);
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = retry_delay.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }
}

/// Retry configuration.
///
/// Total attempts made are always `max_retries + 1`.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    /// Deadline applied to each attempt.
    #[builder(default = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
    /// Base delay fed to the backoff schedule.
    #[builder(default = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,
    #[builder(default)]
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the retry that follows failed attempt `attempt`.
    pub fn delay_before_retry(&self, attempt: u32) -> Duration {
        self.backoff.delay(self.retry_delay(), attempt)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "timeout_ms" });
        }
        if self.retry_delay_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "retry_delay_ms",
            });
        }
        Ok(())
    }
}

/// Observer notified with the upcoming attempt number before each retry.
pub type RetryObserver = Arc<dyn Fn(u32) + Send + Sync>;

/// Runs an operation until it succeeds or its attempts run out.
///
/// Every attempt goes through a [`DeadlineGuard`], so a timed-out attempt
/// may still be running in the background when the next one starts. The
/// operation must be safe to invoke more than once.
///
/// Each call to [`RetryExecutor::execute`] is an independent run; the
/// executor itself holds only configuration and can be shared.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    guard: DeadlineGuard,
    on_retry: Option<RetryObserver>,
    stats: Option<ExecutionStats>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::from_validated(RetryConfig::default())
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("on_retry", &self.on_retry.as_ref().map(|_| ".."))
            .field("stats", &self.stats)
            .finish()
    }
}

impl RetryExecutor {
    /// Create an executor. Fails if `config` has a zero timeout or delay.
    pub fn new(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: RetryConfig) -> Self {
        Self {
            guard: DeadlineGuard::unchecked(config.timeout()),
            config,
            on_retry: None,
            stats: None,
        }
    }

    /// Register an observer called synchronously before each retry delay.
    pub fn on_retry(mut self, observer: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// Record attempts and outcomes into `stats`.
    ///
    /// A retry is counted once its delay has elapsed and the next attempt
    /// is about to start.
    pub fn with_stats(mut self, stats: ExecutionStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an async operation with retry.
    ///
    /// Returns the first successful value. When every attempt fails, the
    /// last error is returned: [`ResilienceError::DeadlineExceeded`] if the
    /// final attempt timed out, [`ResilienceError::OperationFailed`] if it
    /// failed on its own. Earlier failures are only visible to the retry
    /// observer and the logs.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> error::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.run(operation, None).await
    }

    /// Like [`RetryExecutor::execute`], but cancelling `cancel` ends the run
    /// with [`ResilienceError::Cancelled`], whether an attempt or a delay is
    /// in progress. An attempt interrupted this way is detached, the same
    /// as one that hit its deadline.
    pub async fn execute_with_cancel<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> error::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.run(operation, Some(cancel)).await
    }

    async fn run<F, Fut, T, E>(
        &self,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> error::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let guard = self.guard;
        let max_retries = self.config.max_retries;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            self.record(ExecutionStats::record_attempt);

            let attempt_future = guard.guard(operation());
            let outcome = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    () = token.cancelled() => Err(ResilienceError::Cancelled),
                    outcome = attempt_future => outcome,
                },
                None => attempt_future.await,
            };

            let error = match outcome {
                Ok(value) => {
                    self.record(ExecutionStats::record_success);
                    return Ok(value);
                }
                Err(ResilienceError::Cancelled) => {
                    self.record(ExecutionStats::record_failure);
                    return Err(ResilienceError::Cancelled);
                }
                Err(error) => error,
            };

            if error.is_timeout() {
                self.record(ExecutionStats::record_timeout);
                if attempt == max_retries {
                    self.record(ExecutionStats::record_failure);
                    return Err(error);
                }
            }

            if attempt < max_retries {
                let next_attempt = attempt + 1;
                let delay = self.config.delay_before_retry(attempt);

                tracing::warn!(
                    attempt = next_attempt,
                    max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Retrying after error"
                );

                if let Some(observer) = &self.on_retry {
                    observer(next_attempt);
                }

                if !pause(delay, cancel).await {
                    self.record(ExecutionStats::record_failure);
                    return Err(ResilienceError::Cancelled);
                }
                self.record(ExecutionStats::record_retry);
            }

            last_error = Some(error);
        }

        self.record(ExecutionStats::record_failure);
        Err(last_error.unwrap_or(ResilienceError::RetriesExhausted {
            attempts: self.config.total_attempts(),
        }))
    }

    fn record(&self, update: impl FnOnce(&ExecutionStats)) {
        if let Some(stats) = &self.stats {
            update(stats);
        }
    }
}

/// Sleep for `delay`. Returns `false` if cancelled first.
async fn pause(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

/// Execute `operation` under the process-wide [`MiseConfig::global`] retry
/// settings with no observer attached.
pub async fn with_retry<F, Fut, T, E>(operation: F) -> error::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    // Global config is validated when it is loaded.
    RetryExecutor::from_validated(MiseConfig::global().retry.clone())
        .execute(operation)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn attempt_scaled_schedule_starts_at_zero() {
        let config = RetryConfig::default();
        let delays: Vec<_> = (0..4).map(|i| config.delay_before_retry(i)).collect();
        assert_eq!(delays, vec![ms(0), ms(1000), ms(2000), ms(3000)]);
    }

    #[test]
    fn linear_and_fixed_schedules() {
        assert_eq!(Backoff::Linear.delay(ms(100), 0), ms(100));
        assert_eq!(Backoff::Linear.delay(ms(100), 2), ms(300));
        assert_eq!(Backoff::Fixed.delay(ms(100), 7), ms(100));
    }

    #[test]
    fn exponential_schedule_is_capped() {
        let backoff = Backoff::Exponential {
            multiplier: 2.0,
            max_delay_ms: 500,
        };
        assert_eq!(backoff.delay(ms(100), 0), ms(100));
        assert_eq!(backoff.delay(ms(100), 2), ms(400));
        assert_eq!(backoff.delay(ms(100), 3), ms(500));
        assert_eq!(backoff.delay(ms(100), u32::MAX), ms(500));
    }

    #[test]
    fn builder_fills_defaults() {
        let config = RetryConfig::builder().max_retries(5).build();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
        assert_eq!(config.backoff, Backoff::AttemptScaled);
        assert_eq!(config.total_attempts(), 6);
    }

    #[test]
    fn validate_rejects_zero_durations() {
        let zero_timeout = RetryConfig::builder().timeout_ms(0).build();
        assert!(matches!(
            zero_timeout.validate(),
            Err(ConfigError::ZeroDuration { field: "timeout_ms" })
        ));

        let zero_delay = RetryConfig::builder().retry_delay_ms(0).build();
        assert!(matches!(
            zero_delay.validate(),
            Err(ConfigError::ZeroDuration {
                field: "retry_delay_ms"
            })
        ));

        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn executor_rejects_zero_timeout() {
        let err = RetryExecutor::new(RetryConfig::builder().timeout_ms(0).build()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDuration { field: "timeout_ms" }));
    }

    #[test]
    fn default_executor_uses_default_config() {
        let executor = RetryExecutor::default();
        assert_eq!(executor.config(), &RetryConfig::default());
        assert_eq!(executor.guard.deadline(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }
}
