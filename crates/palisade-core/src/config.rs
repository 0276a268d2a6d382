//! Configuration for ACL lookup and caching.
//!
//! Every field has a default, so an empty document is a valid configuration.
//!
//! ```toml
//! [lookup]
//! max_depth = 32
//! batch_size = 50
//! store_timeout_ms = 5000
//!
//! [cache]
//! enabled = true
//! ttl_secs = 300
//! cascade_invalidation = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum number of parent hops followed during resolution.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Default number of identities per backing-store read.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default backing-store call timeout, in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Top-level Palisade configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Lookup strategy settings.
    pub lookup: LookupConfig,
    /// Cache settings.
    pub cache: CacheConfig,
}

/// Settings for batched, hierarchy-aware resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Maximum parent hops before resolution fails with `DepthExceeded`.
    pub max_depth: usize,
    /// Maximum identities sent to the store in one read.
    pub batch_size: usize,
    /// Timeout for a single backing-store call, in milliseconds.
    pub store_timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            batch_size: DEFAULT_BATCH_SIZE,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

impl LookupConfig {
    /// Store call timeout as a `Duration`.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Rejects zero depth, batch size, or timeout.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::config("lookup.max_depth must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("lookup.batch_size must be at least 1"));
        }
        if self.store_timeout_ms == 0 {
            return Err(Error::config("lookup.store_timeout_ms must be at least 1"));
        }
        Ok(())
    }
}

/// Settings for the resolved-Acl cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When `false`, every resolution reads the store. In-flight
    /// deduplication still applies.
    pub enabled: bool,
    /// Entry lifetime in seconds. `None` keeps entries until invalidated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Whether invalidating an Acl also evicts cached descendants.
    pub cascade_invalidation: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
            cascade_invalidation: true,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime as a `Duration`, if one is configured.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    /// Rejects a zero TTL.
    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == Some(0) {
            return Err(Error::config("cache.ttl_secs must be at least 1 when set"));
        }
        Ok(())
    }
}

impl AclConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded ACL configuration from {}", path.display());
        Ok(config)
    }

    /// Serializes to a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Rejects settings that would make resolution impossible.
    pub fn validate(&self) -> Result<()> {
        self.lookup.validate()?;
        self.cache.validate()
    }
}
