//! # Database Error Types
//!
//! The failure taxonomy of the persistence core.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← classified: duplicate, missing, pool, ...     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Service layer ← decides: re-fetch, show 404, ask user to fix input    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Policy
//! Nothing in this crate retries. `is_retryable()` only tells the caller
//! which failures may succeed on a fresh attempt.

use std::time::Duration;

use thiserror::Error;
use tracker_core::CoreError;

/// Persistence failures.
#[derive(Debug, Error)]
pub enum DbError {
    /// No pooled connection became free within the acquire timeout.
    ///
    /// ## When This Occurs
    /// - Every connection is leased by a running transaction
    /// - A caller leaks leases (holds transactions open too long)
    #[error("Out of connections: none available after {timeout:?}")]
    OutOfConnections { timeout: Duration },

    /// Transaction lifecycle violation or failed commit/rollback.
    ///
    /// ## When This Occurs
    /// - Using a transaction after commit, rollback or abort
    /// - COMMIT rejected by the database
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// The row changed since the caller read it.
    ///
    /// ## User Workflow
    /// ```text
    /// Read report (version 5) ──► someone else saves (version 6)
    ///      │
    ///      ▼
    /// update(report v5) ──► ConcurrentModification { expected: 5, actual: 6 }
    ///      │
    ///      ▼
    /// Caller re-fetches, re-applies the edit, saves again
    /// ```
    #[error("{entity} {id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        entity: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Registering a taken username or email
    /// - Creating a topic with an existing title
    /// - Adding a moderator twice
    #[error("Duplicate {entity}: {field} already exists")]
    Duplicate { entity: String, field: String },

    /// Entity (or a row it references) not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// An entity was made to reference itself.
    #[error("{entity} {id} cannot reference itself")]
    SelfReference { entity: String, id: String },

    /// Caller passed something unusable (unknown sort key, empty lazy value).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Configuration value missing or malformed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Unclassified storage failure.
    #[error("Store failure: {0}")]
    Store(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Duplicate error.
    pub fn duplicate(entity: impl Into<String>, field: impl Into<String>) -> Self {
        DbError::Duplicate {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Creates a SelfReference error.
    pub fn self_reference(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::SelfReference {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Whether the same unit of work may succeed if the caller starts over.
    ///
    /// Conflicts need a re-fetch first; pool exhaustion needs a moment.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::ConcurrentModification { .. } | DbError::OutOfConnections { .. }
        )
    }

    /// Whether this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::ConcurrentModification { .. })
    }

    /// Maps a pool timeout, which sqlx reports without the duration.
    pub(crate) fn from_acquire(err: sqlx::Error, timeout: Duration) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::OutOfConnections { timeout },
            other => DbError::from(other),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// UNIQUE constraint failed    → DbError::Duplicate (table.column parsed)
/// FOREIGN KEY constraint      → DbError::NotFound (referenced row)
/// SQLITE_BUSY (locked)        → DbError::Transaction (start over)
/// sqlx::Error::PoolTimedOut   → DbError::OutOfConnections
/// Other                       → DbError::Store
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // "UNIQUE constraint failed: users.username"
                // "FOREIGN KEY constraint failed"
                if let Some(target) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    let first = target.split(',').next().unwrap_or(target).trim();
                    let (table, column) = first.split_once('.').unwrap_or(("unknown", first));
                    DbError::duplicate(table, column)
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    // SQLite does not say which reference; repositories check
                    // their references first, so this is a fallback
                    DbError::not_found("Referenced row", "unknown")
                } else if is_busy_code(db_err.code().as_deref()) {
                    DbError::Transaction(format!("{msg}: another writer holds the database"))
                } else {
                    DbError::Store(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::OutOfConnections {
                timeout: Duration::ZERO,
            },

            sqlx::Error::PoolClosed => DbError::Store("Pool is closed".to_string()),

            _ => DbError::Store(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err.to_string())
    }
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        DbError::InvalidArgument(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::InvalidArgument(format!("payload is not valid JSON: {err}"))
    }
}

const SQLITE_BUSY: i32 = 5;

/// Whether SQLite refused a statement because another connection holds the
/// write lock or committed past this transaction's snapshot.
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => is_busy_code(db_err.code().as_deref()),
        _ => false,
    }
}

// Extended result codes (BUSY_SNAPSHOT = 517, ...) keep the primary code in
// the low byte
fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .is_some_and(|c| c & 0xff == SQLITE_BUSY)
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
