//! Error types for Vantage operations
//!
//! Cache-layer problems and source-of-truth problems are separate enums so
//! the read path can expose one and swallow the other.

use std::time::Duration;
use thiserror::Error;

/// Cache store errors.
///
/// These never escape `fetch_collection` or `invalidate`; they are logged and
/// the read degrades to the source of truth.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Malformed cache entry for {key}: {reason}")]
    Malformed { key: String, reason: String },
}

impl CacheError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn transaction(reason: impl Into<String>) -> Self {
        Self::Transaction {
            reason: reason.into(),
        }
    }
}

/// Source-of-truth errors. The only failure class callers of the read path see.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Collection not found: {key}")]
    NotFound { key: String },

    #[error("Source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Source timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Source rejected request: {reason}")]
    Rejected { reason: String },
}

impl SourceError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Returns true when the source answered definitively that there is no data.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Backend not supported: {backend}")]
    BackendNotSupported { backend: String },
}

/// Master error type for all Vantage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VantageError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VantageError {
    /// The source of truth could not produce a result ("no data").
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Infrastructure is degraded rather than the data being absent.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Self::Cache(_) => true,
            Self::Source(e) => matches!(
                e,
                SourceError::Unavailable { .. } | SourceError::Timeout { .. }
            ),
            Self::Validation(_) | Self::Config(_) => false,
        }
    }
}

/// Result type alias for Vantage operations.
pub type VantageResult<T> = Result<T, VantageError>;
