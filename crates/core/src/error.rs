//! Core error types for node registry and controller operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for nodemeta operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Registry errors
    #[error("node '{name}' not found")]
    NodeNotFound { name: String },

    #[error("node '{name}' already exists")]
    AlreadyExists { name: String },

    #[error(
        "conflict updating node '{name}': resource version {expected} is stale (current {actual})"
    )]
    Conflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("node registry unavailable: {reason}")]
    RegistryUnavailable { reason: String },

    // Dispatch errors
    #[error("operation '{operation}' cancelled")]
    Cancelled { operation: String },

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },
}

impl Error {
    /// Create a node not found error.
    pub fn node_not_found(name: impl Into<String>) -> Self {
        Self::NodeNotFound { name: name.into() }
    }

    /// Create an already exists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    /// Create an optimistic-concurrency conflict error.
    pub fn conflict(name: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Create a registry unavailable error.
    pub fn registry_unavailable(reason: impl Into<String>) -> Self {
        Self::RegistryUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(reason: impl Into<String>) -> Self {
        Self::TomlParseFailed {
            reason: reason.into(),
        }
    }

    /// Whether this error reports a stale snapshot.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
