//! # Report Repository
//!
//! Database operations for reports: bugs, hints, proposals and support
//! requests filed against a topic.
//!
//! ## Status Changes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  change_status(id, status, v)                                          │
//! │    open/analyzed/assigned/processing ──► closed_at = NULL              │
//! │    closed                            ──► closed_at = now               │
//! │    duplicate                         ──► rejected, use mark_duplicate  │
//! │                                                                         │
//! │  mark_duplicate(id, of, v)                                             │
//! │    1. of == id?          ──► DbError::SelfReference   (nothing written)│
//! │    2. of exists?  no     ──► DbError::NotFound        (nothing written)│
//! │    3. guarded UPDATE: status = duplicate, duplicate_of = of,           │
//! │                       closed_at = now                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;
use tracker_core::validation::validate_title;
use tracker_core::{
    generate_id, NewReport, Page, Report, ReportCriteria, ReportKind, ReportSeverity, ReportSort,
    ReportStatus, Selection,
};

use super::{
    count_where, delete_by_id, exists, fetch_by_id, fetch_page, require_by_id, require_optional_reference,
    require_reference, search_pattern, DeleteMode, Table,
};
use crate::error::{DbError, DbResult};
use crate::guard;
use crate::transaction::Transaction;

const COLUMNS: &str = "id, topic_id, author_id, title, status, kind, severity, duplicate_of, \
                       created_at, updated_at, closed_at, version";

/// Repository for report database operations.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = db.begin().await?;
/// let report = tx.reports().find(&id).await?;
/// let report = tx
///     .reports()
///     .change_status(&report.id, ReportStatus::Assigned, report.version)
///     .await?;
/// tx.commit().await?;
/// ```
pub struct ReportRepository<'t> {
    tx: &'t mut Transaction,
}

struct ReportFilter {
    topic_id: Option<String>,
    author_id: Option<String>,
    statuses: Vec<ReportStatus>,
    kind: Option<ReportKind>,
    severity: Option<ReportSeverity>,
    pattern: Option<String>,
}

impl ReportFilter {
    fn prepare(criteria: &ReportCriteria) -> DbResult<Self> {
        Ok(ReportFilter {
            topic_id: criteria.topic_id.clone(),
            author_id: criteria.author_id.clone(),
            statuses: criteria.statuses.clone(),
            kind: criteria.kind,
            severity: criteria.severity,
            pattern: search_pattern(criteria.title_contains.as_deref())?,
        })
    }

    fn apply(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        if let Some(topic_id) = &self.topic_id {
            qb.push(" AND topic_id = ").push_bind(topic_id.clone());
        }
        if let Some(author_id) = &self.author_id {
            qb.push(" AND author_id = ").push_bind(author_id.clone());
        }
        if !self.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut list = qb.separated(", ");
            for status in &self.statuses {
                list.push_bind(*status);
            }
            list.push_unseparated(")");
        }
        if let Some(kind) = self.kind {
            qb.push(" AND kind = ").push_bind(kind);
        }
        if let Some(severity) = self.severity {
            qb.push(" AND severity = ").push_bind(severity);
        }
        if let Some(pattern) = &self.pattern {
            qb.push(" AND title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
    }
}

impl<'t> ReportRepository<'t> {
    pub(crate) fn new(tx: &'t mut Transaction) -> Self {
        ReportRepository { tx }
    }

    /// Files a report in status `open`.
    ///
    /// ## Returns
    /// * `Ok(id)` - new report, version 1
    /// * `Err(DbError::NotFound)` - topic or author does not exist
    pub async fn create(&mut self, new: &NewReport) -> DbResult<String> {
        new.validate()?;

        let id = generate_id();
        let now = Utc::now();
        debug!(tx = self.tx.id(), topic_id = %new.topic_id, title = %new.title, "Creating report");

        let conn = self.tx.conn()?;
        require_reference(conn, Table::Topics, &new.topic_id).await?;
        require_optional_reference(conn, Table::Users, new.author_id.as_deref()).await?;
        sqlx::query(
            r#"
            INSERT INTO reports (
                id, topic_id, author_id, title, status, kind, severity,
                duplicate_of, created_at, updated_at, closed_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8, NULL, 1)
            "#,
        )
        .bind(&id)
        .bind(&new.topic_id)
        .bind(new.author_id.as_deref())
        .bind(new.title.trim())
        .bind(ReportStatus::Open)
        .bind(new.kind)
        .bind(new.severity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    pub async fn find(&mut self, id: &str) -> DbResult<Report> {
        require_by_id(self.tx.conn()?, Table::Reports, COLUMNS, id).await
    }

    pub async fn find_optional(&mut self, id: &str) -> DbResult<Option<Report>> {
        fetch_by_id(self.tx.conn()?, Table::Reports, COLUMNS, id).await
    }

    /// Writes title, kind, severity, status and duplicate link.
    ///
    /// `closed_at` follows the status: kept (or set) while closed, cleared
    /// otherwise. A duplicate link is only stored with status `duplicate`.
    ///
    /// ## Returns
    /// * `Ok(Report)` - the stored row, version bumped by one
    /// * `Err(DbError::SelfReference)` - `duplicate_of == id`
    /// * `Err(DbError::InvalidArgument)` - status `duplicate` without a link
    /// * `Err(DbError::NotFound)` - linked report does not exist
    /// * `Err(DbError::ConcurrentModification)` - stale `report.version`
    pub async fn update(&mut self, report: &Report) -> DbResult<Report> {
        validate_title(&report.title)?;

        let duplicate_of = match (report.status, report.duplicate_of.as_deref()) {
            (ReportStatus::Duplicate, Some(of)) => {
                self.check_duplicate_target(&report.id, of).await?;
                Some(of.to_string())
            }
            (ReportStatus::Duplicate, None) => {
                return Err(DbError::InvalidArgument(
                    "a duplicate report must name the original".to_string(),
                ))
            }
            (_, _) => None,
        };

        let now = Utc::now();
        let closed_at = if report.status.is_closed() {
            Some(report.closed_at.unwrap_or(now))
        } else {
            None
        };

        debug!(tx = self.tx.id(), id = %report.id, version = report.version, "Updating report");

        guard::compare_and_swap(self.tx, Table::Reports, &report.id, report.version, |set| {
            set.set("title", report.title.trim().to_string())
                .set("kind", report.kind)
                .set("severity", report.severity)
                .set("status", report.status)
                .set("duplicate_of", duplicate_of)
                .set("closed_at", closed_at)
                .set("updated_at", now);
        })
        .await?
        .into_result(Table::Reports.entity(), &report.id)?;

        require_by_id(self.tx.conn()?, Table::Reports, COLUMNS, &report.id).await
    }

    /// Moves a report to any status except `duplicate`.
    pub async fn change_status(&mut self, id: &str, status: ReportStatus, version: i64) -> DbResult<Report> {
        if status == ReportStatus::Duplicate {
            return Err(DbError::InvalidArgument(
                "use mark_duplicate to close a report as duplicate".to_string(),
            ));
        }

        debug!(tx = self.tx.id(), id = %id, %status, version, "Changing report status");

        let now = Utc::now();
        let closed_at = status.is_closed().then_some(now);

        guard::compare_and_swap(self.tx, Table::Reports, id, version, |set| {
            set.set("status", status)
                .set("duplicate_of", None::<String>)
                .set("closed_at", closed_at)
                .set("updated_at", now);
        })
        .await?
        .into_result(Table::Reports.entity(), id)?;

        require_by_id(self.tx.conn()?, Table::Reports, COLUMNS, id).await
    }

    /// Closes `id` as a duplicate of `original`.
    ///
    /// ## Returns
    /// * `Ok(Report)` - status `duplicate`, version bumped by one
    /// * `Err(DbError::SelfReference)` - `original == id`
    /// * `Err(DbError::NotFound)` - `original` does not exist
    /// * `Err(DbError::ConcurrentModification)` - stale `version`
    pub async fn mark_duplicate(&mut self, id: &str, original: &str, version: i64) -> DbResult<Report> {
        self.check_duplicate_target(id, original).await?;

        debug!(tx = self.tx.id(), id = %id, original = %original, version, "Marking report as duplicate");

        let now = Utc::now();
        let original = original.to_string();

        guard::compare_and_swap(self.tx, Table::Reports, id, version, |set| {
            set.set("status", ReportStatus::Duplicate)
                .set("duplicate_of", Some(original))
                .set("closed_at", Some(now))
                .set("updated_at", now);
        })
        .await?
        .into_result(Table::Reports.entity(), id)?;

        require_by_id(self.tx.conn()?, Table::Reports, COLUMNS, id).await
    }

    async fn check_duplicate_target(&mut self, id: &str, original: &str) -> DbResult<()> {
        if id == original {
            return Err(DbError::self_reference(Table::Reports.entity(), id));
        }
        if !exists(self.tx.conn()?, Table::Reports, original).await? {
            return Err(DbError::not_found(Table::Reports.entity(), original));
        }
        Ok(())
    }

    /// Deletes a report and its posts. Reports marked as its duplicates
    /// are reopened first.
    pub async fn delete(&mut self, id: &str, mode: DeleteMode) -> DbResult<bool> {
        debug!(tx = self.tx.id(), id = %id, ?mode, "Deleting report");
        let conn = self.tx.conn()?;
        reopen_duplicates_of(conn, "SELECT id FROM reports WHERE id = ?2", id).await?;
        delete_by_id(conn, Table::Reports, id, mode).await
    }

    pub async fn search(
        &mut self,
        criteria: &ReportCriteria,
        selection: &Selection<ReportSort>,
    ) -> DbResult<Page<Report>> {
        let filter = ReportFilter::prepare(criteria)?;
        debug!(
            tx = self.tx.id(),
            page = selection.page_index(),
            sort = ?selection.sort(),
            "Searching reports"
        );
        fetch_page(self.tx.conn()?, Table::Reports, COLUMNS, selection, |qb| filter.apply(qb)).await
    }

    pub async fn count(&mut self, criteria: &ReportCriteria) -> DbResult<u64> {
        let filter = ReportFilter::prepare(criteria)?;
        count_where(self.tx.conn()?, Table::Reports, |qb| filter.apply(qb)).await
    }
}

/// Moves every report marked as a duplicate of one of `originals` back to
/// `open`, dropping the link and bumping its version. `originals` is a
/// subquery over `reports` whose only parameter is `?2 = key`.
///
/// Runs before the originals are deleted, so no report is ever left in
/// status `duplicate` without the report it duplicates.
pub(crate) async fn reopen_duplicates_of(
    conn: &mut SqliteConnection,
    originals: &'static str,
    key: &str,
) -> DbResult<u64> {
    let sql = format!(
        "UPDATE reports \
         SET status = ?1, duplicate_of = NULL, closed_at = NULL, updated_at = ?3, \
             version = version + 1 \
         WHERE duplicate_of IN ({originals})"
    );
    let result = sqlx::query(&sql)
        .bind(ReportStatus::Open)
        .bind(key)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() > 0 {
        debug!(reopened = result.rows_affected(), "Reopened duplicates of deleted reports");
    }
    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================
