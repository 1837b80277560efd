//! Convenience re-exports for common use.

pub use crate::config::{CacheConfig, MiseConfig};
pub use crate::error::{ConfigError, ErrorCategory, RecoverySuggestion, ResilienceError};
pub use crate::util::cache::{FetchResponse, FreshnessCache};
pub use crate::util::retry::{with_retry, Backoff, RetryConfig, RetryExecutor};
pub use crate::util::stats::{ExecutionStats, StatsSnapshot};
pub use crate::util::timeout::{with_timeout, DeadlineGuard};
