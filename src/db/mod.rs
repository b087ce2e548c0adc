//! Database layer (SQLite).

pub mod schema;
pub mod sqlite;

pub use sqlite::ActivityDb;

use std::path::PathBuf;

/// Errors raised by the local activity store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to open or create the database file.
    #[error("Failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A new record could not be turned into a stored activity.
    #[error("Invalid record {id}: {reason}")]
    InvalidRecord { id: i64, reason: String },

    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    #[error("Database connection lock poisoned")]
    Poisoned,

    /// The database schema version is newer than supported.
    #[error("Database schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}
