//! Error classification and recovery hints.

use strum::Display;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Operation,
    Exhausted,
    Cancelled,
}

/// Suggested recovery action.
///
/// Presentation layers map these to user-facing messages. A timed-out
/// operation and a failed one never share a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecoverySuggestion {
    IncreaseTimeout,
    InspectCause,
    RetryLater,
    NoAction,
}
