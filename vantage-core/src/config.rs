//! Cache configuration
//!
//! Settings are loaded from environment variables with defaults suited to
//! local development (in-process memory store, five minute TTL).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default time-to-live for cached collections.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(300);

/// Longest accepted entry TTL.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

/// Largest accepted LMDB map size in megabytes (1 TiB).
pub const MAX_LMDB_MAX_SIZE_MB: usize = 1024 * 1024;

/// Which cache store backs the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    /// Process-local map. Not shared between instances.
    #[default]
    Memory,
    /// LMDB file on local disk.
    Lmdb,
    /// Redis, shared between instances.
    Redis,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "local" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::BackendNotSupported {
                backend: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Lmdb => "lmdb",
            Self::Redis => "redis",
        };
        f.write_str(name)
    }
}

/// Settings for the cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Store implementation.
    pub backend: CacheBackendKind,
    /// Expiry applied by the store to every entry. Must be finite and non-zero.
    pub entry_ttl: Duration,
    /// Directory for the LMDB environment (required for `Lmdb`).
    pub lmdb_path: Option<PathBuf>,
    /// LMDB map size in megabytes.
    pub lmdb_max_size_mb: usize,
    /// Redis connection URL (required for `Redis`).
    pub redis_url: Option<String>,
    /// Prefix for keys in shared stores.
    pub namespace: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            entry_ttl: DEFAULT_ENTRY_TTL,
            lmdb_path: None,
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
            redis_url: None,
            namespace: None,
        }
    }
}

impl CacheSettings {
    /// Create settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheSettings from environment variables.
    ///
    /// Environment variables:
    /// - `VANTAGE_CACHE_BACKEND`: "memory", "lmdb" or "redis" (default: memory)
    /// - `VANTAGE_CACHE_TTL_SECS`: Entry TTL in seconds (default: 300)
    /// - `VANTAGE_LMDB_PATH`: Directory for the LMDB environment
    /// - `VANTAGE_LMDB_MAX_SIZE_MB`: LMDB map size (default: 64)
    /// - `VANTAGE_REDIS_URL`: Redis URL, e.g. "redis://127.0.0.1:6379"
    /// - `VANTAGE_CACHE_NAMESPACE`: Key prefix for shared stores
    ///
    /// The result is validated before it is returned.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup("VANTAGE_CACHE_BACKEND") {
            settings.backend = raw.parse()?;
        }

        if let Some(raw) = lookup("VANTAGE_CACHE_TTL_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "entry_ttl".to_string(),
                value: raw.clone(),
                reason: "must be a whole number of seconds".to_string(),
            })?;
            settings.entry_ttl = Duration::from_secs(secs);
        }

        settings.lmdb_path = lookup("VANTAGE_LMDB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        if let Some(raw) = lookup("VANTAGE_LMDB_MAX_SIZE_MB") {
            settings.lmdb_max_size_mb =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "lmdb_max_size_mb".to_string(),
                    value: raw.clone(),
                    reason: "must be a positive integer".to_string(),
                })?;
        }

        settings.redis_url = lookup("VANTAGE_REDIS_URL").filter(|s| !s.trim().is_empty());
        settings.namespace = lookup("VANTAGE_CACHE_NAMESPACE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        settings.validate()?;
        Ok(settings)
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: CacheBackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the LMDB directory.
    pub fn with_lmdb_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lmdb_path = Some(path.into());
        self
    }

    /// Set the LMDB map size.
    pub fn with_lmdb_max_size_mb(mut self, size: usize) -> Self {
        self.lmdb_max_size_mb = size;
        self
    }

    /// Set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Check that the settings describe a usable store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ttl(self.entry_ttl)?;

        match self.backend {
            CacheBackendKind::Memory => {}
            CacheBackendKind::Lmdb => {
                if self.lmdb_path.is_none() {
                    return Err(ConfigError::MissingRequired {
                        field: "lmdb_path".to_string(),
                    });
                }
                lmdb_map_size_bytes(self.lmdb_max_size_mb)?;
            }
            CacheBackendKind::Redis => {
                if self.redis_url.is_none() {
                    return Err(ConfigError::MissingRequired {
                        field: "redis_url".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Stale entries are only bounded if every store expires them.
///
/// Accepts `1ns..=MAX_ENTRY_TTL`.
pub fn validate_ttl(ttl: Duration) -> Result<(), ConfigError> {
    let reason = if ttl.is_zero() {
        "must be greater than zero".to_string()
    } else if ttl > MAX_ENTRY_TTL {
        format!("must be at most {}s", MAX_ENTRY_TTL.as_secs())
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidValue {
        field: "entry_ttl".to_string(),
        value: format!("{:?}", ttl),
        reason,
    })
}

/// LMDB map size in bytes for a size in megabytes.
///
/// Accepts `1..=MAX_LMDB_MAX_SIZE_MB`.
pub fn lmdb_map_size_bytes(max_size_mb: usize) -> Result<usize, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        field: "lmdb_max_size_mb".to_string(),
        value: max_size_mb.to_string(),
        reason,
    };
    if max_size_mb == 0 {
        return Err(invalid("must be greater than zero".to_string()));
    }
    if max_size_mb > MAX_LMDB_MAX_SIZE_MB {
        return Err(invalid(format!("must be at most {}", MAX_LMDB_MAX_SIZE_MB)));
    }
    max_size_mb
        .checked_mul(1024 * 1024)
        .ok_or_else(|| invalid("does not fit in the address space".to_string()))
}
