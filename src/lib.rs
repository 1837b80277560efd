//! Mise: resilient async operations
//!
//! Control-flow infrastructure for fallible async work: a deadline guard
//! that races an operation against a time budget, a retry executor that
//! runs guarded attempts with a configurable delay schedule, and a
//! freshness cache that memoizes a fetch function's last good result for a
//! fixed window. None of these know what the wrapped operation does.
//!
//! # Quick Start
//!
//! ```no_run
//! use mise::prelude::*;
//!
//! # async fn example() -> mise::error::Result<(), std::io::Error> {
//! let executor = RetryExecutor::new(RetryConfig::builder().max_retries(2).build())
//!     .expect("non-zero timeout and delay")
//!     .on_retry(|attempt| eprintln!("retrying, attempt {attempt}"));
//!
//! let menu = executor
//!     .execute(|| async { Ok::<_, std::io::Error>("daily specials") })
//!     .await?;
//! println!("{menu}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod prelude;
pub mod util;
