//! Vantage Core - Keys, Errors, Configuration
//!
//! Shared vocabulary for the read-through cache: owner-scoped cache keys,
//! the cache/source error split, and store settings. No I/O lives here.

pub mod config;
pub mod error;
pub mod key;

pub use config::{
    lmdb_map_size_bytes, validate_ttl, CacheBackendKind, CacheSettings, DEFAULT_ENTRY_TTL,
    MAX_ENTRY_TTL, MAX_LMDB_MAX_SIZE_MB,
};
pub use error::{
    CacheError, ConfigError, SourceError, ValidationError, VantageError, VantageResult,
};
pub use key::{CacheKey, CollectionKind, OwnerId};
