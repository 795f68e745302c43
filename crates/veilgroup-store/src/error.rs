//! Error types for the store module.

use thiserror::Error;

use veilgroup_core::GroupId;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A transaction referenced a group the ledger does not hold.
    #[error("unknown group: {0}")]
    UnknownGroup(GroupId),

    /// A transaction does not apply on top of the committed state
    /// (stale id, stale message index, duplicate member).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The store's lock or worker thread failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] veilgroup_core::CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
