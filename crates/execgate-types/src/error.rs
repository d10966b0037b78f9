//! Infrastructure error types.
//!
//! These are distinct from policy denials: a [`crate::DenyReason`] is a
//! verdict, while [`ExecGateError`] and [`StoreError`] report failures of
//! the machinery itself (store I/O, malformed documents, bad config).
//! Both are non-exhaustive to allow future extension.

use thiserror::Error;

/// Top-level error type for the exec approval engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExecGateError {
    /// The allowlist store failed.
    #[error("allowlist store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the persisted allowlist store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// Reading or writing the document failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The document on disk is not valid JSON.
    #[error("malformed allowlist document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The store's writer lock was poisoned by a panicking thread.
    #[error("allowlist store lock poisoned")]
    Poisoned,
}

/// A convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, ExecGateError>;
