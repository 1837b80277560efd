//! Configuration system (layered: code > env > TOML file > defaults).

use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::util::cache::FreshnessCache;
use crate::util::retry::{RetryConfig, RetryExecutor};

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<MiseConfig> = OnceLock::new();

pub const DEFAULT_VALIDITY_WINDOW_MS: u64 = 60_000;

pub const ENV_MAX_RETRIES: &str = "MISE_MAX_RETRIES";
pub const ENV_TIMEOUT_MS: &str = "MISE_TIMEOUT_MS";
pub const ENV_RETRY_DELAY_MS: &str = "MISE_RETRY_DELAY_MS";
pub const ENV_CACHE_TTL_MS: &str = "MISE_CACHE_TTL_MS";

/// Freshness cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub validity_window_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            validity_window_ms: DEFAULT_VALIDITY_WINDOW_MS,
        }
    }
}

impl CacheConfig {
    pub fn validity_window(&self) -> Duration {
        Duration::from_millis(self.validity_window_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validity_window_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "validity_window_ms",
            });
        }
        Ok(())
    }
}

/// Top-level configuration.
///
/// ```toml
/// [retry]
/// max_retries = 3
/// timeout_ms = 30000
/// retry_delay_ms = 1000
/// backoff = { kind = "attempt_scaled" }
///
/// [cache]
/// validity_window_ms = 60000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiseConfig {
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

impl MiseConfig {
    /// Load from environment variables (`MISE_MAX_RETRIES`,
    /// `MISE_TIMEOUT_MS`, `MISE_RETRY_DELAY_MS`, `MISE_CACHE_TTL_MS`) on top
    /// of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Get (or create) the global default config.
    ///
    /// Invalid environment values are logged and the defaults used instead.
    pub fn global() -> &'static MiseConfig {
        DEFAULT_CONFIG.get_or_init(|| {
            let _ = dotenvy::dotenv();
            Self::env_or_default(|var| std::env::var(var).ok())
        })
    }

    fn env_or_default(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::default()
            .with_env_overrides(lookup)
            .unwrap_or_else(|error| {
                tracing::warn!(%error, "Ignoring invalid environment configuration");
                Self::default()
            })
    }

    /// Apply overrides resolved through `lookup`, then validate.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(max_retries) = parse_var(&lookup, ENV_MAX_RETRIES)? {
            self.retry.max_retries = max_retries;
        }
        if let Some(timeout_ms) = parse_var(&lookup, ENV_TIMEOUT_MS)? {
            self.retry.timeout_ms = timeout_ms;
        }
        if let Some(retry_delay_ms) = parse_var(&lookup, ENV_RETRY_DELAY_MS)? {
            self.retry.retry_delay_ms = retry_delay_ms;
        }
        if let Some(validity_window_ms) = parse_var(&lookup, ENV_CACHE_TTL_MS)? {
            self.cache.validity_window_ms = validity_window_ms;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.cache.validate()
    }

    pub fn executor(&self) -> Result<RetryExecutor, ConfigError> {
        RetryExecutor::new(self.retry.clone())
    }

    pub fn cache<T: Clone>(&self) -> FreshnessCache<T> {
        FreshnessCache::from_config(&self.cache)
    }
}

fn parse_var<N: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<N>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let parsed = raw.trim().parse::<N>();
    match parsed {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: raw,
        }),
    }
}
