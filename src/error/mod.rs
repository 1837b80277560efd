//! Error types for mise.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Terminal failure of a guarded or retried operation.
///
/// `E` is the error type of the wrapped operation. Only
/// [`ResilienceError::OperationFailed`] carries it; every other variant is
/// raised by the resilience layer itself.
#[derive(Error, Debug)]
pub enum ResilienceError<E> {
    #[error("Operation timed out after {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },

    #[error("Operation failed: {0}")]
    OperationFailed(#[source] E),

    #[error("Retries exhausted after {attempts} attempts without a recorded error")]
    RetriesExhausted { attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,
}

impl<E> ResilienceError<E> {
    /// Whether the deadline elapsed before the operation settled.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Borrow the underlying operation error, if this is one.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::OperationFailed(e) => Some(e),
            _ => None,
        }
    }

    /// Take the underlying operation error, if this is one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationFailed(e) => Some(e),
            _ => None,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DeadlineExceeded { .. } => ErrorCategory::Timeout,
            Self::OperationFailed(_) => ErrorCategory::Operation,
            Self::RetriesExhausted { .. } => ErrorCategory::Exhausted,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Operation => RecoverySuggestion::InspectCause,
            ErrorCategory::Exhausted => RecoverySuggestion::RetryLater,
            ErrorCategory::Cancelled => RecoverySuggestion::NoAction,
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a guarded or retried operation whose own error type is `E`.
pub type Result<T, E> = std::result::Result<T, ResilienceError<E>>;
