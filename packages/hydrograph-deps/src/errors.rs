//! Error types for the dependency core
//!
//! Structural conditions (missing child group, cycle, malformed pattern) are
//! absorbed by the resolver and only surface as warnings; backing-store
//! failures propagate and roll the surrounding transaction back.

use crate::config::ConfigError;
use crate::shared::models::DbKey;
use hydrograph_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// What kind of object a lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    TimeSeries,
    Group,
    Computation,
    Notification,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::TimeSeries => "time series",
            ObjectKind::Group => "group",
            ObjectKind::Computation => "computation",
            ObjectKind::Notification => "notification",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum DepsError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: ObjectKind, key: String },

    #[error("Backing store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cyclic group reference: group {parent} refers to group {child}, which is already being expanded")]
    CyclicReference { parent: DbKey, child: DbKey },

    #[error("Malformed pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metrics registration error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DepsError {
    pub fn not_found(kind: ObjectKind, key: impl fmt::Display) -> Self {
        DepsError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DepsError::Validation(message.into())
    }

    pub fn malformed(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        DepsError::MalformedPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// True for absent objects, whether reported by the core or the store
    pub fn is_not_found(&self) -> bool {
        match self {
            DepsError::NotFound { .. } => true,
            DepsError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Failures of the backing store itself (I/O, SQL, transaction)
    pub fn is_backing_store(&self) -> bool {
        matches!(self, DepsError::Storage(e) if !e.is_not_found())
    }
}

pub type DepsResult<T> = std::result::Result<T, DepsError>;
