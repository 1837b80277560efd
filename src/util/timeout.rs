//! Deadline guard: race an operation against a fixed time budget.

use std::future::Future;
use std::panic;
use std::time::Duration;

use crate::error::{self, ConfigError, ResilienceError};

/// Default deadline applied when none is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

const MIN_DEADLINE: Duration = Duration::from_millis(1);

/// Fails an operation that does not settle within a fixed deadline.
///
/// [`DeadlineGuard::guard`] spawns the operation as its own tokio task and
/// waits on whichever of the task or the deadline timer finishes first.
/// When the deadline wins, the task is detached, **not** aborted: it keeps
/// running in the background and whatever it eventually produces is
/// discarded. Operations passed through the guard must tolerate being
/// abandoned mid-flight (a late write can still land after the caller has
/// seen [`ResilienceError::DeadlineExceeded`]).
///
/// [`DeadlineGuard::guard_local`] is the exception: it polls the operation
/// in place and drops it at the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineGuard {
    deadline: Duration,
}

impl Default for DeadlineGuard {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl DeadlineGuard {
    /// Create a guard. The deadline must be non-zero.
    pub fn new(deadline: Duration) -> Result<Self, ConfigError> {
        if deadline.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "deadline" });
        }
        Ok(Self { deadline })
    }

    pub fn from_millis(timeout_ms: u64) -> Result<Self, ConfigError> {
        Self::new(Duration::from_millis(timeout_ms))
    }

    /// Builds a guard from a duration already checked to be non-zero.
    pub(crate) fn unchecked(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX)
    }

    /// Run `operation` against the deadline.
    ///
    /// The timer is dropped as soon as the operation settles, so it can
    /// never fire for a call that already returned. If the operation task
    /// panics, the panic is resumed on the caller.
    pub async fn guard<T, E, F>(&self, operation: F) -> error::Result<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut task = tokio::spawn(operation);

        tokio::select! {
            biased;
            joined = &mut task => match joined {
                Ok(settled) => settled.map_err(ResilienceError::OperationFailed),
                Err(join_error) if join_error.is_panic() => {
                    panic::resume_unwind(join_error.into_panic())
                }
                Err(_) => Err(ResilienceError::Cancelled),
            },
            () = tokio::time::sleep(self.deadline) => {
                tracing::debug!(
                    timeout_ms = self.timeout_ms(),
                    "Deadline elapsed, detaching operation"
                );
                // `task` is dropped on return, which detaches it.
                Err(ResilienceError::DeadlineExceeded {
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }

    /// Run `operation` against the deadline without spawning it.
    ///
    /// Accepts futures that are not `Send` or borrow from the caller. The
    /// operation is dropped, and therefore cancelled, if the deadline wins.
    pub async fn guard_local<T, E, F>(&self, operation: F) -> error::Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            settled = operation => settled.map_err(ResilienceError::OperationFailed),
            () = tokio::time::sleep(self.deadline) => {
                tracing::debug!(timeout_ms = self.timeout_ms(), "Deadline elapsed, dropping operation");
                Err(ResilienceError::DeadlineExceeded {
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }
}

/// Wrap a future with a deadline.
///
/// Shorthand for [`DeadlineGuard::guard`]. A zero duration is raised to
/// one millisecond.
pub async fn with_timeout<T, E, F>(duration: Duration, future: F) -> error::Result<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    DeadlineGuard::unchecked(duration.max(MIN_DEADLINE))
        .guard(future)
        .await
}
