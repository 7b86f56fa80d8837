//! # Topic Repository
//!
//! Database operations for topics: the projects and products reports are
//! filed against.
//!
//! ## Key Operations
//! - CRUD with a unique title
//! - Logo storage (binary, loaded on demand)
//! - Moderator assignment (many users per topic, many topics per user)
//!
//! ## Moderators
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  topics ──┐                                    ┌── users               │
//! │           ▼                                    ▼                       │
//! │        topic_moderators (topic_id, user_id, assigned_at)               │
//! │                                                                         │
//! │  Deleting either side removes the assignment. Assignments carry no     │
//! │  version: adding twice is a no-op, removing twice is a no-op.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;
use tracker_core::validation::validate_title;
use tracker_core::{
    generate_id, Blob, NewTopic, Page, Selection, Topic, TopicCategory, TopicCriteria, TopicSort,
    User,
};

use super::report::reopen_duplicates_of;
use super::{
    count_where, delete_by_id, fetch_by_id, fetch_page, require_by_id, require_optional_reference,
    require_reference, search_pattern, DeleteMode, Table,
};
use crate::error::DbResult;
use crate::guard;
use crate::media::{self, BlobSlot};
use crate::transaction::Transaction;

/// Row projection; the logo is never part of it.
const COLUMNS: &str =
    "id, title, description, category, creator_id, created_at, updated_at, version";

/// Repository for topic database operations.
pub struct TopicRepository<'t> {
    tx: &'t mut Transaction,
}

struct TopicFilter {
    pattern: Option<String>,
    category: Option<TopicCategory>,
    moderated_by: Option<String>,
}

impl TopicFilter {
    fn prepare(criteria: &TopicCriteria) -> DbResult<Self> {
        Ok(TopicFilter {
            pattern: search_pattern(criteria.title_contains.as_deref())?,
            category: criteria.category,
            moderated_by: criteria.moderated_by.clone(),
        })
    }

    fn apply(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        if let Some(pattern) = &self.pattern {
            qb.push(" AND title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
        if let Some(category) = self.category {
            qb.push(" AND category = ").push_bind(category);
        }
        if let Some(user_id) = &self.moderated_by {
            qb.push(" AND id IN (SELECT topic_id FROM topic_moderators WHERE user_id = ")
                .push_bind(user_id.clone())
                .push(")");
        }
    }
}

impl<'t> TopicRepository<'t> {
    pub(crate) fn new(tx: &'t mut Transaction) -> Self {
        TopicRepository { tx }
    }

    /// Opens a topic.
    ///
    /// ## Returns
    /// * `Ok(id)` - new topic, version 1
    /// * `Err(DbError::Duplicate)` - title already used
    /// * `Err(DbError::NotFound)` - `creator_id` names no user
    pub async fn create(&mut self, new: &NewTopic) -> DbResult<String> {
        new.validate()?;

        let id = generate_id();
        let now = Utc::now();
        debug!(tx = self.tx.id(), title = %new.title, "Creating topic");

        let conn = self.tx.conn()?;
        require_optional_reference(conn, Table::Users, new.creator_id.as_deref()).await?;
        sqlx::query(
            r#"
            INSERT INTO topics (
                id, title, description, category, creator_id,
                created_at, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1)
            "#,
        )
        .bind(&id)
        .bind(new.title.trim())
        .bind(&new.description)
        .bind(new.category)
        .bind(new.creator_id.as_deref())
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    pub async fn find(&mut self, id: &str) -> DbResult<Topic> {
        require_by_id(self.tx.conn()?, Table::Topics, COLUMNS, id).await
    }

    pub async fn find_optional(&mut self, id: &str) -> DbResult<Option<Topic>> {
        fetch_by_id(self.tx.conn()?, Table::Topics, COLUMNS, id).await
    }

    pub async fn find_by_title(&mut self, title: &str) -> DbResult<Option<Topic>> {
        let conn = self.tx.conn()?;
        let sql = format!("SELECT {COLUMNS} FROM topics WHERE title = ?1");
        let topic = sqlx::query_as::<_, Topic>(&sql)
            .bind(title.trim())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(topic)
    }

    /// Writes title, description and category, stamping `updated_at`.
    ///
    /// ## Returns
    /// * `Ok(Topic)` - the stored row, version bumped by one
    /// * `Err(DbError::ConcurrentModification)` - stale `topic.version`
    /// * `Err(DbError::Duplicate)` - new title already used
    pub async fn update(&mut self, topic: &Topic) -> DbResult<Topic> {
        validate_title(&topic.title)?;
        debug!(tx = self.tx.id(), id = %topic.id, version = topic.version, "Updating topic");

        let now = Utc::now();
        guard::compare_and_swap(self.tx, Table::Topics, &topic.id, topic.version, |set| {
            set.set("title", topic.title.trim().to_string())
                .set("description", topic.description.clone())
                .set("category", topic.category)
                .set("updated_at", now);
        })
        .await?
        .into_result(Table::Topics.entity(), &topic.id)?;

        require_by_id(self.tx.conn()?, Table::Topics, COLUMNS, &topic.id).await
    }

    /// Deletes a topic together with its reports, their posts and the
    /// moderator assignments. Reports in other topics marked as duplicates
    /// of the deleted reports are reopened.
    pub async fn delete(&mut self, id: &str, mode: DeleteMode) -> DbResult<bool> {
        debug!(tx = self.tx.id(), id = %id, ?mode, "Deleting topic");
        let conn = self.tx.conn()?;
        reopen_duplicates_of(conn, "SELECT id FROM reports WHERE topic_id = ?2", id).await?;
        delete_by_id(conn, Table::Topics, id, mode).await
    }

    pub async fn search(
        &mut self,
        criteria: &TopicCriteria,
        selection: &Selection<TopicSort>,
    ) -> DbResult<Page<Topic>> {
        let filter = TopicFilter::prepare(criteria)?;
        debug!(tx = self.tx.id(), page = selection.page_index(), "Searching topics");
        fetch_page(self.tx.conn()?, Table::Topics, COLUMNS, selection, |qb| filter.apply(qb)).await
    }

    pub async fn count(&mut self, criteria: &TopicCriteria) -> DbResult<u64> {
        let filter = TopicFilter::prepare(criteria)?;
        count_where(self.tx.conn()?, Table::Topics, |qb| filter.apply(qb)).await
    }

    /// Number of reports filed against a topic.
    pub async fn report_count(&mut self, id: &str) -> DbResult<u64> {
        let id = id.to_string();
        count_where(self.tx.conn()?, Table::Reports, move |qb| {
            qb.push(" AND topic_id = ").push_bind(id);
        })
        .await
    }

    /// Replaces or (with `None`) removes the logo. Returns the new version.
    pub async fn set_logo(&mut self, id: &str, version: i64, logo: Option<&Blob>) -> DbResult<i64> {
        media::write_blob(self.tx, BlobSlot::Logo, id, version, logo).await
    }

    pub async fn logo(&mut self, id: &str) -> DbResult<Option<Blob>> {
        media::read_blob(self.tx.conn()?, BlobSlot::Logo, id).await
    }

    // =========================================================================
    // Moderators
    // =========================================================================

    /// Makes a user moderator of a topic.
    ///
    /// ## Returns
    /// * `Ok(true)` - assignment added
    /// * `Ok(false)` - user already moderates the topic
    /// * `Err(DbError::NotFound)` - topic or user does not exist
    pub async fn add_moderator(&mut self, topic_id: &str, user_id: &str) -> DbResult<bool> {
        debug!(tx = self.tx.id(), topic_id = %topic_id, user_id = %user_id, "Adding moderator");

        let conn = self.tx.conn()?;
        require_reference(conn, Table::Topics, topic_id).await?;
        require_reference(conn, Table::Users, user_id).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO topic_moderators (topic_id, user_id, assigned_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (topic_id, user_id) DO NOTHING
            "#,
        )
        .bind(topic_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Removes a moderator assignment. Returns whether one existed.
    pub async fn remove_moderator(&mut self, topic_id: &str, user_id: &str) -> DbResult<bool> {
        debug!(tx = self.tx.id(), topic_id = %topic_id, user_id = %user_id, "Removing moderator");

        let conn = self.tx.conn()?;
        let result = sqlx::query("DELETE FROM topic_moderators WHERE topic_id = ?1 AND user_id = ?2")
            .bind(topic_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Moderators of a topic, ordered by username.
    pub async fn moderators(&mut self, topic_id: &str) -> DbResult<Vec<User>> {
        let conn = self.tx.conn()?;
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT
                u.id, u.username, u.email, u.display_name, u.role,
                u.enabled, u.registered_at, u.last_login_at, u.version
            FROM users u
            INNER JOIN topic_moderators m ON m.user_id = u.id
            WHERE m.topic_id = ?1
            ORDER BY u.username ASC, u.id ASC
            "#,
        )
        .bind(topic_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(users)
    }

    pub async fn is_moderator(&mut self, topic_id: &str, user_id: &str) -> DbResult<bool> {
        let conn = self.tx.conn()?;
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM topic_moderators WHERE topic_id = ?1 AND user_id = ?2)",
        )
        .bind(topic_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(found)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::{Database, DbConfig};
    use tracker_core::{NewReport, NewUser, ReportKind, ReportSeverity};

    fn new_topic(title: &str, category: TopicCategory) -> NewTopic {
        NewTopic {
            title: title.to_string(),
            description: format!("All about {title}"),
            category,
            creator_id: None,
        }
    }

    async fn setup() -> (Database, String) {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let user = tx
            .users()
            .create(&NewUser {
                username: "mod".into(),
                email: "mod@example.com".into(),
                display_name: "Moderator".into(),
                role: Default::default(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (db, user)
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (db, user) = setup().await;
        let mut tx = db.begin().await.unwrap();

        let id = tx
            .topics()
            .create(&NewTopic {
                creator_id: Some(user.clone()),
                ..new_topic("Kernel", TopicCategory::Application)
            })
            .await
            .unwrap();

        let topic = tx.topics().find(&id).await.unwrap();
        assert_eq!(topic.title, "Kernel");
        assert_eq!(topic.category, TopicCategory::Application);
        assert_eq!(topic.creator_id.as_deref(), Some(user.as_str()));
        assert_eq!(topic.version, 1);
        assert_eq!(topic.created_at, topic.updated_at);

        let by_title = tx.topics().find_by_title("Kernel").await.unwrap().unwrap();
        assert_eq!(by_title.id, id);
    }

    #[tokio::test]
    async fn test_duplicate_title() {
        let (db, _) = setup().await;
        let mut tx = db.begin().await.unwrap();
        tx.topics().create(&new_topic("Kernel", TopicCategory::Other)).await.unwrap();

        let err = tx
            .topics()
            .create(&new_topic("Kernel", TopicCategory::Hardware))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Duplicate { ref field, .. } if field == "title"));
    }

    #[tokio::test]
    async fn test_unknown_creator_is_not_found() {
        let (db, _) = setup().await;
        let mut tx = db.begin().await.unwrap();

        let err = tx
            .topics()
            .create(&NewTopic {
                creator_id: Some("no-such-user".into()),
                ..new_topic("Orphan", TopicCategory::Other)
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::NotFound { ref entity, ref id } if entity == "User" && id == "no-such-user"
        ));
    }

    #[tokio::test]
    async fn test_update_and_conflict() {
        let (db, _) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let id = tx.topics().create(&new_topic("Kernel", TopicCategory::Other)).await.unwrap();

        let stale = tx.topics().find(&id).await.unwrap();
        let mut topic = stale.clone();
        topic.description = "Scheduler and memory".into();
        topic.category = TopicCategory::Application;

        let updated = tx.topics().update(&topic).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.category, TopicCategory::Application);
        assert!(updated.updated_at >= updated.created_at);

        assert!(tx.topics().update(&stale).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_moderators() {
        let (db, user) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let id = tx.topics().create(&new_topic("Kernel", TopicCategory::Other)).await.unwrap();
        let other = tx.topics().create(&new_topic("Docs", TopicCategory::Community)).await.unwrap();

        assert!(tx.topics().add_moderator(&id, &user).await.unwrap());
        assert!(!tx.topics().add_moderator(&id, &user).await.unwrap());
        assert!(tx.topics().is_moderator(&id, &user).await.unwrap());
        assert!(!tx.topics().is_moderator(&other, &user).await.unwrap());

        let mods = tx.topics().moderators(&id).await.unwrap();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].username, "mod");

        let moderated = tx
            .topics()
            .search(
                &TopicCriteria {
                    moderated_by: Some(user.clone()),
                    ..Default::default()
                },
                &Selection::new(TopicSort::Title),
            )
            .await
            .unwrap();
        assert_eq!(moderated.items.len(), 1);
        assert_eq!(moderated.items[0].id, id);

        assert!(matches!(
            tx.topics().add_moderator(&id, "ghost").await,
            Err(DbError::NotFound { ref entity, ref id }) if entity == "User" && id == "ghost"
        ));
        assert!(matches!(
            tx.topics().add_moderator("nowhere", &user).await,
            Err(DbError::NotFound { ref entity, ref id }) if entity == "Topic" && id == "nowhere"
        ));

        assert!(tx.topics().remove_moderator(&id, &user).await.unwrap());
        assert!(!tx.topics().remove_moderator(&id, &user).await.unwrap());
        assert!(tx.topics().moderators(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_by_category_and_report_count() {
        let (db, _) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let kernel = tx.topics().create(&new_topic("Kernel", TopicCategory::Application)).await.unwrap();
        tx.topics().create(&new_topic("Forum", TopicCategory::Community)).await.unwrap();
        tx.topics().create(&new_topic("Browser", TopicCategory::Application)).await.unwrap();

        let apps = TopicCriteria {
            category: Some(TopicCategory::Application),
            ..Default::default()
        };
        let page = tx
            .topics()
            .search(&apps, &Selection::new(TopicSort::Title))
            .await
            .unwrap();
        let titles: Vec<_> = page.items.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Browser", "Kernel"]);
        assert_eq!(tx.topics().count(&apps).await.unwrap(), 2);

        for title in ["Panic on boot", "Slow I/O"] {
            tx.reports()
                .create(&NewReport {
                    topic_id: kernel.clone(),
                    author_id: None,
                    title: title.into(),
                    kind: ReportKind::Bug,
                    severity: ReportSeverity::Severe,
                })
                .await
                .unwrap();
        }
        assert_eq!(tx.topics().report_count(&kernel).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_logo_and_delete_cascade() {
        let (db, user) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let id = tx.topics().create(&new_topic("Kernel", TopicCategory::Other)).await.unwrap();
        tx.topics().add_moderator(&id, &user).await.unwrap();

        let svg = Blob::new(b"<svg/>".to_vec(), "image/svg+xml");
        assert_eq!(tx.topics().set_logo(&id, 1, Some(&svg)).await.unwrap(), 2);
        assert_eq!(tx.topics().logo(&id).await.unwrap(), Some(svg));

        assert!(tx.topics().delete(&id, DeleteMode::Strict).await.unwrap());
        assert!(!tx.topics().is_moderator(&id, &user).await.unwrap());
        assert!(tx.users().find_optional(&user).await.unwrap().is_some());
    }
}
