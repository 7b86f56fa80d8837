//! Shared fixtures for the integration tests.
//!
//! Every fixture uses a file-backed database in a temporary directory, so
//! several pooled connections see the same data.

#![allow(dead_code)]

use std::time::Duration;

use tempfile::TempDir;
use tracker_core::{NewReport, NewTopic, NewUser, ReportKind, ReportSeverity, TopicCategory, UserRole};
use tracker_db::{Database, DbConfig};

/// Keeps the directory alive as long as the database.
pub struct TestDb {
    pub db: Database,
    pub dir: TempDir,
}

pub fn config(dir: &TempDir) -> DbConfig {
    DbConfig::new(dir.path().join("tracker.db"))
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(5))
}

pub async fn open_with(configure: impl FnOnce(DbConfig) -> DbConfig) -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = Database::open(configure(config(&dir)))
        .await
        .expect("open database");
    TestDb { db, dir }
}

pub async fn open() -> TestDb {
    open_with(|config| config).await
}

pub fn new_user(name: &str) -> NewUser {
    NewUser {
        username: name.to_string(),
        email: format!("{name}@example.com"),
        display_name: name.to_string(),
        role: UserRole::User,
    }
}

/// Creates a topic and returns its id.
pub async fn seed_topic(db: &Database, title: &str) -> String {
    let mut tx = db.begin().await.expect("begin");
    let id = tx
        .topics()
        .create(&NewTopic {
            title: title.to_string(),
            description: String::new(),
            category: TopicCategory::Application,
            creator_id: None,
        })
        .await
        .expect("create topic");
    tx.commit().await.expect("commit");
    id
}

/// Creates a report and returns its id.
pub async fn seed_report(db: &Database, topic_id: &str, title: &str) -> String {
    let mut tx = db.begin().await.expect("begin");
    let id = tx
        .reports()
        .create(&NewReport {
            topic_id: topic_id.to_string(),
            author_id: None,
            title: title.to_string(),
            kind: ReportKind::Bug,
            severity: ReportSeverity::Minor,
        })
        .await
        .expect("create report");
    tx.commit().await.expect("commit");
    id
}
