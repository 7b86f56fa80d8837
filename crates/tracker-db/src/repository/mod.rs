//! # Repository Module
//!
//! Per-entity data access, always through an open [`Transaction`].
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Service layer                                                         │
//! │       │                                                                 │
//! │       │  let mut tx = db.begin().await?;                               │
//! │       │  tx.reports().search(&criteria, &selection)                    │
//! │       ▼                                                                 │
//! │  ReportRepository<'tx>  (borrows the transaction)                      │
//! │  ├── create(&NewReport)          → id      | Duplicate                 │
//! │  ├── find(id)                    → Report  | NotFound                  │
//! │  ├── update(&Report)             → Report  | ConcurrentModification    │
//! │  ├── delete(id, DeleteMode)      → bool    | NotFound (Strict)         │
//! │  └── search(&criteria, &sel)     → Page    | InvalidArgument           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQL on the transaction's leased connection (program order)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`UserRepository`] - Accounts, avatars, login bookkeeping
//! - [`TopicRepository`] - Topics, logos, moderators
//! - [`ReportRepository`] - Reports, status changes, duplicates
//! - [`PostRepository`] - Posts and attachments
//! - [`NotificationRepository`] - Per-user notices
//!
//! [`Transaction`]: crate::Transaction
//! [`UserRepository`]: user::UserRepository
//! [`TopicRepository`]: topic::TopicRepository
//! [`ReportRepository`]: report::ReportRepository
//! [`PostRepository`]: post::PostRepository
//! [`NotificationRepository`]: notification::NotificationRepository

pub mod notification;
pub mod post;
pub mod report;
pub mod topic;
pub mod user;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracker_core::validation::validate_search_text;
use tracker_core::{Page, Selection, SortKey};

use crate::error::{DbError, DbResult};

/// Tables that carry a version column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Table {
    Users,
    Topics,
    Reports,
    Posts,
    Notifications,
}

impl Table {
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Topics => "topics",
            Table::Reports => "reports",
            Table::Posts => "posts",
            Table::Notifications => "notifications",
        }
    }

    /// Entity name used in error messages.
    pub(crate) const fn entity(&self) -> &'static str {
        match self {
            Table::Users => "User",
            Table::Topics => "Topic",
            Table::Reports => "Report",
            Table::Posts => "Post",
            Table::Notifications => "Notification",
        }
    }
}

/// What `delete` does when the row is already gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Fail with `NotFound`.
    #[default]
    Strict,
    /// Succeed without doing anything.
    IgnoreMissing,
}

/// Loads one row by id.
pub(crate) async fn fetch_by_id<T>(
    conn: &mut SqliteConnection,
    table: Table,
    columns: &str,
    id: &str,
) -> DbResult<Option<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let sql = format!("SELECT {columns} FROM {} WHERE id = ?1", table.name());
    let row = sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Loads one row by id or fails with `NotFound`.
pub(crate) async fn require_by_id<T>(
    conn: &mut SqliteConnection,
    table: Table,
    columns: &str,
    id: &str,
) -> DbResult<T>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    fetch_by_id(conn, table, columns, id)
        .await?
        .ok_or_else(|| DbError::not_found(table.entity(), id))
}

/// Whether a row with this id exists.
pub(crate) async fn exists(conn: &mut SqliteConnection, table: Table, id: &str) -> DbResult<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table.name());
    let found: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(found)
}

/// Fails with `NotFound` naming `table`'s entity and `id` when the row a
/// new record would point at is missing.
pub(crate) async fn require_reference(conn: &mut SqliteConnection, table: Table, id: &str) -> DbResult<()> {
    if exists(conn, table, id).await? {
        Ok(())
    } else {
        Err(DbError::not_found(table.entity(), id))
    }
}

/// Same as [`require_reference`] for optional links; `None` always passes.
pub(crate) async fn require_optional_reference(
    conn: &mut SqliteConnection,
    table: Table,
    id: Option<&str>,
) -> DbResult<()> {
    match id {
        Some(id) => require_reference(conn, table, id).await,
        None => Ok(()),
    }
}

/// Deletes one row by id.
///
/// ## Returns
/// * `Ok(true)` - row removed
/// * `Ok(false)` - row absent and `DeleteMode::IgnoreMissing`
/// * `Err(DbError::NotFound)` - row absent and `DeleteMode::Strict`
pub(crate) async fn delete_by_id(
    conn: &mut SqliteConnection,
    table: Table,
    id: &str,
    mode: DeleteMode,
) -> DbResult<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", table.name());
    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;

    match (result.rows_affected(), mode) {
        (0, DeleteMode::Strict) => Err(DbError::not_found(table.entity(), id)),
        (0, DeleteMode::IgnoreMissing) => Ok(false),
        _ => Ok(true),
    }
}

/// Runs a filtered, ordered, paginated SELECT.
///
/// `filter` appends ` AND <condition>` fragments after `WHERE 1 = 1`; it is
/// called a second time for the COUNT query when the selection asks for a
/// total. The ORDER BY text comes from the sort key's fixed column name.
pub(crate) async fn fetch_page<T, S>(
    conn: &mut SqliteConnection,
    table: Table,
    columns: &str,
    selection: &Selection<S>,
    filter: impl Fn(&mut QueryBuilder<'static, Sqlite>),
) -> DbResult<Page<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    S: SortKey,
{
    let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM {} WHERE 1 = 1", table.name()));
    filter(&mut qb);
    qb.push(" ORDER BY ")
        .push(selection.order_by())
        .push(" LIMIT ")
        .push_bind(i64::from(selection.limit()))
        .push(" OFFSET ")
        .push_bind(selection.offset() as i64);

    let items = qb.build_query_as::<T>().fetch_all(&mut *conn).await?;

    let total = if selection.wants_total() {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE 1 = 1", table.name()));
        filter(&mut qb);
        let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
        Some(count.max(0) as u64)
    } else {
        None
    };

    Ok(Page::new(items, selection, total))
}

/// Counts rows matching a filter.
pub(crate) async fn count_where(
    conn: &mut SqliteConnection,
    table: Table,
    filter: impl FnOnce(&mut QueryBuilder<'static, Sqlite>),
) -> DbResult<u64> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE 1 = 1", table.name()));
    filter(&mut qb);
    let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
    Ok(count.max(0) as u64)
}

/// Validates an optional free-text filter and turns it into a LIKE
/// pattern. Blank text means no filter.
pub(crate) fn search_pattern(text: Option<&str>) -> DbResult<Option<String>> {
    match text {
        Some(text) => Ok(validate_search_text(text)?.map(|needle| contains_pattern(&needle))),
        None => Ok(None),
    }
}

/// LIKE pattern matching `needle` anywhere, with wildcards escaped.
/// Use together with `ESCAPE '\'`.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("crash"), "%crash%");
        assert_eq!(contains_pattern(" 100%_done "), "%100\\%\\_done%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_search_pattern() {
        assert_eq!(search_pattern(None).unwrap(), None);
        assert_eq!(search_pattern(Some("   ")).unwrap(), None);
        assert_eq!(search_pattern(Some(" login ")).unwrap(), Some("%login%".to_string()));
        assert!(matches!(
            search_pattern(Some(&"x".repeat(500))),
            Err(DbError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Table::Reports.name(), "reports");
        assert_eq!(Table::Notifications.entity(), "Notification");
    }
}
