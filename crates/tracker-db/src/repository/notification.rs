//! # Notification Repository
//!
//! Persisted notices for one recipient each. The event details travel as a
//! JSON document in `payload`.
//!
//! ## Inbox Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  report/post written ──► create(NewNotification)   is_read = false     │
//! │                                                                         │
//! │  inbox page ──► search(NotificationCriteria::inbox(user), sel)         │
//! │  badge      ──► count_unread(user)                                     │
//! │  click      ──► mark_read(id, v)          guarded, version v+1         │
//! │  "read all" ──► mark_all_read(user)       each unread row gets v+1     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;
use tracker_core::{
    generate_id, NewNotification, Notification, NotificationCriteria, NotificationSort, Page,
    Selection,
};

use super::{
    count_where, delete_by_id, fetch_by_id, fetch_page, require_by_id, require_optional_reference,
    require_reference, DeleteMode, Table,
};
use crate::error::DbResult;
use crate::guard;
use crate::transaction::Transaction;

const COLUMNS: &str =
    "id, recipient_id, actor_id, kind, report_id, topic_id, payload, is_read, created_at, version";

/// Repository for notification database operations.
pub struct NotificationRepository<'t> {
    tx: &'t mut Transaction,
}

struct NotificationFilter {
    recipient_id: Option<String>,
    unread_only: bool,
}

impl NotificationFilter {
    fn prepare(criteria: &NotificationCriteria) -> Self {
        NotificationFilter {
            recipient_id: criteria.recipient_id.clone(),
            unread_only: criteria.unread_only,
        }
    }

    fn apply(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        if let Some(recipient_id) = &self.recipient_id {
            qb.push(" AND recipient_id = ").push_bind(recipient_id.clone());
        }
        if self.unread_only {
            qb.push(" AND is_read = 0");
        }
    }
}

impl<'t> NotificationRepository<'t> {
    pub(crate) fn new(tx: &'t mut Transaction) -> Self {
        NotificationRepository { tx }
    }

    /// Records a notification, unread.
    ///
    /// ## Returns
    /// * `Ok(id)` - new notification, version 1
    /// * `Err(DbError::NotFound)` - recipient, actor, report or topic missing
    pub async fn create(&mut self, new: &NewNotification) -> DbResult<String> {
        let payload = serde_json::to_string(&new.payload)?;
        let id = generate_id();
        debug!(
            tx = self.tx.id(),
            recipient_id = %new.recipient_id,
            kind = %new.kind,
            "Creating notification"
        );

        let conn = self.tx.conn()?;
        require_reference(conn, Table::Users, &new.recipient_id).await?;
        require_optional_reference(conn, Table::Users, new.actor_id.as_deref()).await?;
        require_optional_reference(conn, Table::Reports, new.report_id.as_deref()).await?;
        require_optional_reference(conn, Table::Topics, new.topic_id.as_deref()).await?;
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipient_id, actor_id, kind, report_id, topic_id,
                payload, is_read, created_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, 1)
            "#,
        )
        .bind(&id)
        .bind(&new.recipient_id)
        .bind(new.actor_id.as_deref())
        .bind(new.kind)
        .bind(new.report_id.as_deref())
        .bind(new.topic_id.as_deref())
        .bind(payload)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    pub async fn find(&mut self, id: &str) -> DbResult<Notification> {
        require_by_id(self.tx.conn()?, Table::Notifications, COLUMNS, id).await
    }

    pub async fn find_optional(&mut self, id: &str) -> DbResult<Option<Notification>> {
        fetch_by_id(self.tx.conn()?, Table::Notifications, COLUMNS, id).await
    }

    /// Writes the payload and read flag.
    ///
    /// ## Returns
    /// * `Ok(Notification)` - the stored row, version bumped by one
    /// * `Err(DbError::InvalidArgument)` - payload is not JSON
    /// * `Err(DbError::ConcurrentModification)` - stale `notification.version`
    pub async fn update(&mut self, notification: &Notification) -> DbResult<Notification> {
        // Reject text that would not parse back
        notification.payload_value()?;

        debug!(
            tx = self.tx.id(),
            id = %notification.id,
            version = notification.version,
            "Updating notification"
        );

        guard::compare_and_swap(self.tx, Table::Notifications, &notification.id, notification.version, |set| {
            set.set("payload", notification.payload.clone())
                .set("is_read", notification.is_read);
        })
        .await?
        .into_result(Table::Notifications.entity(), &notification.id)?;

        require_by_id(self.tx.conn()?, Table::Notifications, COLUMNS, &notification.id).await
    }

    /// Marks one notification read. Returns the new version.
    pub async fn mark_read(&mut self, id: &str, version: i64) -> DbResult<i64> {
        guard::compare_and_swap(self.tx, Table::Notifications, id, version, |set| {
            set.set("is_read", true);
        })
        .await?
        .into_result(Table::Notifications.entity(), id)
    }

    /// Marks every unread notification of a recipient read, bumping each
    /// row's version. Returns how many changed.
    pub async fn mark_all_read(&mut self, recipient_id: &str) -> DbResult<u64> {
        debug!(tx = self.tx.id(), recipient_id = %recipient_id, "Marking all notifications read");

        let conn = self.tx.conn()?;
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = 1, version = version + 1
            WHERE recipient_id = ?1 AND is_read = 0
            "#,
        )
        .bind(recipient_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_unread(&mut self, recipient_id: &str) -> DbResult<u64> {
        let filter = NotificationFilter {
            recipient_id: Some(recipient_id.to_string()),
            unread_only: true,
        };
        count_where(self.tx.conn()?, Table::Notifications, |qb| filter.apply(qb)).await
    }

    pub async fn delete(&mut self, id: &str, mode: DeleteMode) -> DbResult<bool> {
        delete_by_id(self.tx.conn()?, Table::Notifications, id, mode).await
    }

    pub async fn search(
        &mut self,
        criteria: &NotificationCriteria,
        selection: &Selection<NotificationSort>,
    ) -> DbResult<Page<Notification>> {
        let filter = NotificationFilter::prepare(criteria);
        fetch_page(self.tx.conn()?, Table::Notifications, COLUMNS, selection, |qb| filter.apply(qb)).await
    }
}
