//! Utility modules: deadline guard, retry executor, freshness cache, stats.

pub mod cache;
pub mod retry;
pub mod stats;
pub mod timeout;
