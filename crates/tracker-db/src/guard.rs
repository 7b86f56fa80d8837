//! # Concurrency Guard
//!
//! Optimistic concurrency for every update path.
//!
//! ## Compare-and-Swap on the Version Column
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Caller holds report { id: R, version: 5, title: "new title" }         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE reports SET title = ?, version = version + 1                   │
//! │   WHERE id = 'R' AND version = 5                 ← one statement       │
//! │       │                                                                 │
//! │       ├── 1 row  ──► Applied { version: 6 }                            │
//! │       │                                                                 │
//! │       └── 0 rows ──► SELECT version WHERE id = 'R' (same transaction)  │
//! │                         ├── no row  ──► DbError::NotFound              │
//! │                         └── 7       ──► Conflict { expected 5, actual 7 }
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The check and the write are the same statement, so there is no window
//! between them. The follow-up read only explains a miss.
//!
//! ## Stale Snapshots
//! A transaction that read before writing holds a WAL snapshot. Once another
//! writer commits, SQLite refuses to upgrade that snapshot (`SQLITE_BUSY`).
//! The row's committed version is then read on a separate pooled connection:
//! a newer version is a `Conflict`, a vanished row is `NotFound`, and an
//! unchanged row (another row was written) is a `DbError::Transaction`
//! asking the caller to start over.

use sqlx::{Encode, QueryBuilder, Sqlite, SqliteConnection, Type};
use tracing::{debug, warn};

use crate::error::{self, DbError, DbResult};
use crate::repository::Table;
use crate::transaction::Transaction;

/// Outcome of a guarded update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum VersionCheck {
    /// Row written; `version` is the new marker.
    Applied { version: i64 },
    /// Row exists but was changed by someone else.
    Conflict { expected: i64, actual: i64 },
}

impl VersionCheck {
    /// New version on success, `ConcurrentModification` on conflict.
    pub fn into_result(self, entity: &str, id: &str) -> DbResult<i64> {
        match self {
            VersionCheck::Applied { version } => Ok(version),
            VersionCheck::Conflict { expected, actual } => Err(DbError::ConcurrentModification {
                entity: entity.to_string(),
                id: id.to_string(),
                expected,
                actual,
            }),
        }
    }
}

/// Column assignments of one guarded UPDATE.
pub(crate) struct Assignments<'q, 'args> {
    qb: &'q mut QueryBuilder<'args, Sqlite>,
}

impl<'q, 'args> Assignments<'q, 'args> {
    /// Adds `column = <value>`.
    pub(crate) fn set<T>(&mut self, column: &'static str, value: T) -> &mut Self
    where
        T: 'args + Encode<'args, Sqlite> + Type<Sqlite> + Send,
    {
        self.qb.push(column).push(" = ").push_bind(value).push(", ");
        self
    }
}

/// Runs `UPDATE <table> SET <assignments>, version = version + 1
/// WHERE id = ? AND version = ?` and classifies the outcome.
pub(crate) async fn compare_and_swap<'args>(
    tx: &mut Transaction,
    table: Table,
    id: &str,
    expected: i64,
    assign: impl FnOnce(&mut Assignments<'_, 'args>),
) -> DbResult<VersionCheck> {
    let mut qb: QueryBuilder<'args, Sqlite> = QueryBuilder::new("UPDATE ");
    qb.push(table.name()).push(" SET ");
    assign(&mut Assignments { qb: &mut qb });
    qb.push("version = version + 1 WHERE id = ")
        .push_bind(id.to_string())
        .push(" AND version = ")
        .push_bind(expected);

    let result = match qb.build().execute(tx.conn()?).await {
        Ok(result) => result,
        Err(err) if error::is_busy(&err) => {
            return resolve_stale_snapshot(tx, table, id, expected).await;
        }
        Err(err) => return Err(err.into()),
    };

    if result.rows_affected() == 1 {
        debug!(table = table.name(), id = %id, version = expected + 1, "Guarded update applied");
        return Ok(VersionCheck::Applied {
            version: expected + 1,
        });
    }

    match current_version(tx.conn()?, table, id).await? {
        None => Err(DbError::not_found(table.entity(), id)),
        Some(actual) => {
            warn!(
                table = table.name(),
                id = %id,
                expected,
                actual,
                "Stale version rejected"
            );
            Ok(VersionCheck::Conflict { expected, actual })
        }
    }
}

/// Classifies a guarded update the database refused to run because the
/// transaction's snapshot is out of date.
async fn resolve_stale_snapshot(
    tx: &Transaction,
    table: Table,
    id: &str,
    expected: i64,
) -> DbResult<VersionCheck> {
    let mut lease = tx.pool().acquire().await?;
    let latest = current_version(&mut *lease, table, id).await?;
    drop(lease);

    match latest {
        None => Err(DbError::not_found(table.entity(), id)),
        Some(actual) if actual != expected => {
            warn!(
                tx = tx.id(),
                table = table.name(),
                id = %id,
                expected,
                actual,
                "Stale snapshot, row changed since it was read"
            );
            Ok(VersionCheck::Conflict { expected, actual })
        }
        Some(_) => {
            warn!(tx = tx.id(), table = table.name(), id = %id, "Stale snapshot, database locked by another writer");
            Err(DbError::Transaction(format!(
                "transaction {} read data another writer has since replaced; start over",
                tx.id()
            )))
        }
    }
}

/// Reads the current version marker of a row.
pub(crate) async fn current_version(
    conn: &mut SqliteConnection,
    table: Table,
    id: &str,
) -> DbResult<Option<i64>> {
    let sql = format!("SELECT version FROM {} WHERE id = ?1", table.name());
    let version = sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(version)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use tracker_core::NewUser;

    async fn database_with_user() -> (Database, String) {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let id = tx
            .users()
            .create(&NewUser {
                username: "ada".into(),
                email: "ada@example.com".into(),
                display_name: "Ada".into(),
                role: Default::default(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (db, id)
    }

    #[tokio::test]
    async fn test_matching_version_is_applied() {
        let (db, id) = database_with_user().await;
        let mut tx = db.begin().await.unwrap();

        let check = compare_and_swap(&mut tx, Table::Users, &id, 1, |set| {
            set.set("display_name", "Ada L.".to_string());
        })
        .await
        .unwrap();

        assert_eq!(check, VersionCheck::Applied { version: 2 });
        assert_eq!(current_version(tx.conn().unwrap(), Table::Users, &id).await.unwrap(), Some(2));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let (db, id) = database_with_user().await;
        let mut tx = db.begin().await.unwrap();

        let check = compare_and_swap(&mut tx, Table::Users, &id, 0, |set| {
            set.set("display_name", "Nobody".to_string());
        })
        .await
        .unwrap();

        assert_eq!(check, VersionCheck::Conflict { expected: 0, actual: 1 });
        let err = check.into_result("User", &id).unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_missing_row_is_not_found() {
        let (db, _) = database_with_user().await;
        let mut tx = db.begin().await.unwrap();

        let err = compare_and_swap(&mut tx, Table::Users, "nope", 1, |set| {
            set.set("display_name", "Ghost".to_string());
        })
        .await
        .unwrap_err();

        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
