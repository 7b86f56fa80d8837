//! # Post Repository
//!
//! Database operations for posts, the discussion thread under a report.
//! Posts go away with their report; an attachment lives in the post row but
//! is only read on request.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;
use tracker_core::validation::validate_content;
use tracker_core::{generate_id, Blob, NewPost, Page, Post, PostCriteria, PostSort, Selection};

use super::{
    count_where, delete_by_id, fetch_by_id, fetch_page, require_by_id, require_optional_reference,
    require_reference, DeleteMode, Table,
};
use crate::error::DbResult;
use crate::guard;
use crate::media::{self, BlobSlot};
use crate::transaction::Transaction;

const COLUMNS: &str = "id, report_id, author_id, content, created_at, updated_at, version";

/// Repository for post database operations.
pub struct PostRepository<'t> {
    tx: &'t mut Transaction,
}

struct PostFilter {
    report_id: Option<String>,
    author_id: Option<String>,
}

impl PostFilter {
    fn prepare(criteria: &PostCriteria) -> Self {
        PostFilter {
            report_id: criteria.report_id.clone(),
            author_id: criteria.author_id.clone(),
        }
    }

    fn apply(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        if let Some(report_id) = &self.report_id {
            qb.push(" AND report_id = ").push_bind(report_id.clone());
        }
        if let Some(author_id) = &self.author_id {
            qb.push(" AND author_id = ").push_bind(author_id.clone());
        }
    }
}

impl<'t> PostRepository<'t> {
    pub(crate) fn new(tx: &'t mut Transaction) -> Self {
        PostRepository { tx }
    }

    /// Adds a post to a report.
    ///
    /// ## Returns
    /// * `Ok(id)` - new post, version 1
    /// * `Err(DbError::NotFound)` - report or author does not exist
    pub async fn create(&mut self, new: &NewPost) -> DbResult<String> {
        new.validate()?;

        let id = generate_id();
        let now = Utc::now();
        debug!(tx = self.tx.id(), report_id = %new.report_id, "Creating post");

        let conn = self.tx.conn()?;
        require_reference(conn, Table::Reports, &new.report_id).await?;
        require_optional_reference(conn, Table::Users, new.author_id.as_deref()).await?;
        sqlx::query(
            r#"
            INSERT INTO posts (
                id, report_id, author_id, content, created_at, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)
            "#,
        )
        .bind(&id)
        .bind(&new.report_id)
        .bind(new.author_id.as_deref())
        .bind(&new.content)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    pub async fn find(&mut self, id: &str) -> DbResult<Post> {
        require_by_id(self.tx.conn()?, Table::Posts, COLUMNS, id).await
    }

    pub async fn find_optional(&mut self, id: &str) -> DbResult<Option<Post>> {
        fetch_by_id(self.tx.conn()?, Table::Posts, COLUMNS, id).await
    }

    /// Rewrites the body of a post.
    ///
    /// ## Returns
    /// * `Ok(Post)` - the stored row, version bumped by one
    /// * `Err(DbError::ConcurrentModification)` - stale `post.version`
    pub async fn update(&mut self, post: &Post) -> DbResult<Post> {
        validate_content(&post.content)?;
        debug!(tx = self.tx.id(), id = %post.id, version = post.version, "Updating post");

        let now = Utc::now();
        guard::compare_and_swap(self.tx, Table::Posts, &post.id, post.version, |set| {
            set.set("content", post.content.clone()).set("updated_at", now);
        })
        .await?
        .into_result(Table::Posts.entity(), &post.id)?;

        require_by_id(self.tx.conn()?, Table::Posts, COLUMNS, &post.id).await
    }

    pub async fn delete(&mut self, id: &str, mode: DeleteMode) -> DbResult<bool> {
        debug!(tx = self.tx.id(), id = %id, ?mode, "Deleting post");
        delete_by_id(self.tx.conn()?, Table::Posts, id, mode).await
    }

    pub async fn search(
        &mut self,
        criteria: &PostCriteria,
        selection: &Selection<PostSort>,
    ) -> DbResult<Page<Post>> {
        let filter = PostFilter::prepare(criteria);
        fetch_page(self.tx.conn()?, Table::Posts, COLUMNS, selection, |qb| filter.apply(qb)).await
    }

    /// Number of posts in a report's thread.
    pub async fn count_for_report(&mut self, report_id: &str) -> DbResult<u64> {
        let filter = PostFilter::prepare(&PostCriteria::in_report(report_id));
        count_where(self.tx.conn()?, Table::Posts, |qb| filter.apply(qb)).await
    }

    /// Replaces or (with `None`) removes the attachment. Returns the new
    /// version.
    pub async fn set_attachment(
        &mut self,
        id: &str,
        version: i64,
        attachment: Option<&Blob>,
    ) -> DbResult<i64> {
        media::write_blob(self.tx, BlobSlot::Attachment, id, version, attachment).await
    }

    pub async fn attachment(&mut self, id: &str) -> DbResult<Option<Blob>> {
        media::read_blob(self.tx.conn()?, BlobSlot::Attachment, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::{Database, DbConfig};
    use tracker_core::{NewReport, NewTopic, PageSize, ReportKind, ReportSeverity, TopicCategory};

    async fn setup() -> (Database, String) {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let topic = tx
            .topics()
            .create(&NewTopic {
                title: "Kernel".into(),
                description: String::new(),
                category: TopicCategory::Other,
                creator_id: None,
            })
            .await
            .unwrap();
        let report = tx
            .reports()
            .create(&NewReport {
                topic_id: topic,
                author_id: None,
                title: "Crash".into(),
                kind: ReportKind::Bug,
                severity: ReportSeverity::Severe,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (db, report)
    }

    fn new_post(report: &str, content: &str) -> NewPost {
        NewPost {
            report_id: report.to_string(),
            author_id: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let (db, report) = setup().await;
        let mut tx = db.begin().await.unwrap();

        let id = tx.posts().create(&new_post(&report, "First")).await.unwrap();
        let mut post = tx.posts().find(&id).await.unwrap();
        assert_eq!(post.content, "First");
        assert_eq!(post.version, 1);

        post.content = "First, edited".into();
        let updated = tx.posts().update(&post).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.content, "First, edited");
        assert!(tx.posts().update(&post).await.unwrap_err().is_conflict());

        assert!(tx.posts().delete(&id, DeleteMode::Strict).await.unwrap());
        assert!(tx.posts().find_optional(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let (db, report) = setup().await;
        let mut tx = db.begin().await.unwrap();

        let err = tx.posts().create(&new_post(&report, "   ")).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_missing_references_are_named() {
        let (db, report) = setup().await;
        let mut tx = db.begin().await.unwrap();

        let err = tx.posts().create(&new_post("gone", "Hello")).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::NotFound { ref entity, ref id } if entity == "Report" && id == "gone"
        ));

        let err = tx
            .posts()
            .create(&NewPost {
                author_id: Some("nobody".into()),
                ..new_post(&report, "Hello")
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::NotFound { ref entity, ref id } if entity == "User" && id == "nobody"
        ));
    }

    #[tokio::test]
    async fn test_thread_pagination() {
        let (db, report) = setup().await;
        let mut tx = db.begin().await.unwrap();
        for i in 0..12 {
            tx.posts().create(&new_post(&report, &format!("Post {i}"))).await.unwrap();
        }
        assert_eq!(tx.posts().count_for_report(&report).await.unwrap(), 12);

        let selection = Selection::new(PostSort::CreatedAt)
            .page_size(PageSize::Small)
            .with_total(true);
        let first = tx
            .posts()
            .search(&PostCriteria::in_report(&report), &selection)
            .await
            .unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.total_pages(), Some(2));
        assert!(first.has_next());

        let second = tx
            .posts()
            .search(&PostCriteria::in_report(&report), &selection.next())
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(!second.has_next());
        assert!(second.has_previous());
    }

    #[tokio::test]
    async fn test_attachment() {
        let (db, report) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let id = tx.posts().create(&new_post(&report, "Log attached")).await.unwrap();

        let log = Blob::new(b"kernel panic".to_vec(), "text/plain").with_file_name("dmesg.txt");
        assert_eq!(tx.posts().set_attachment(&id, 1, Some(&log)).await.unwrap(), 2);

        let stored = tx.posts().attachment(&id).await.unwrap().unwrap();
        assert_eq!(stored.file_name.as_deref(), Some("dmesg.txt"));
        assert_eq!(stored, log);

        assert!(tx
            .posts()
            .set_attachment(&id, 1, None)
            .await
            .unwrap_err()
            .is_conflict());
    }
}
