//! Read results carrying cache provenance.
//!
//! Every successful read says where its value came from and how old it is,
//! so callers and logs can tell a cache hit from a degraded read.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Where the value of a read came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadOrigin {
    /// Served from the cache store.
    CacheHit,
    /// The store had no entry; served from the source of truth.
    CacheMiss,
    /// The store returned an entry that did not decode; served from the source.
    CacheRejected,
    /// The store failed; served from the source.
    CacheBypassed,
}

impl ReadOrigin {
    /// Returns true if the source of truth produced the value.
    pub fn from_source(&self) -> bool {
        !matches!(self, Self::CacheHit)
    }

    /// Returns true if the cache could not be used because it was degraded.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::CacheRejected | Self::CacheBypassed)
    }
}

impl fmt::Display for ReadOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CacheHit => "cache_hit",
            Self::CacheMiss => "cache_miss",
            Self::CacheRejected => "cache_rejected",
            Self::CacheBypassed => "cache_bypassed",
        };
        f.write_str(name)
    }
}

/// Result of a read-through lookup.
///
/// Wraps the value with when it was cached (or fetched) and its origin.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The value.
    value: T,
    /// When this value was cached, or fetched from the source.
    cached_at: DateTime<Utc>,
    /// Where the value came from.
    origin: ReadOrigin,
}

impl<T> CacheRead<T> {
    /// A value decoded from a stored entry written at `cached_at`.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            origin: ReadOrigin::CacheHit,
        }
    }

    /// A value the source just produced, stamped now.
    pub fn from_source(value: T, origin: ReadOrigin) -> Self {
        debug_assert!(origin.from_source());
        Self {
            value,
            cached_at: Utc::now(),
            origin,
        }
    }

    /// Unwrap the collection.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Borrow the collection.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Where the value came from.
    pub fn origin(&self) -> ReadOrigin {
        self.origin
    }

    /// Write time of the entry, or fetch time for source reads.
    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Age of the value; source reads start at zero.
    pub fn staleness(&self) -> Duration {
        let now = Utc::now();
        if now > self.cached_at {
            (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    pub fn was_cache_hit(&self) -> bool {
        self.origin == ReadOrigin::CacheHit
    }

    /// True for every origin but `CacheHit`.
    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit()
    }

    /// Transform the value, keeping provenance.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            origin: self.origin,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
