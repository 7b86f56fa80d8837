//! Optimistic concurrency across separate transactions and connections.

mod common;

use std::sync::Arc;

use tokio::sync::Barrier;
use tracker_core::ReportStatus;
use tracker_db::DbError;

/// Brings a fresh report (version 1) to version 5.
async fn report_at_version_five(db: &tracker_db::Database) -> String {
    let topic = common::seed_topic(db, "Kernel").await;
    let id = common::seed_report(db, &topic, "Scheduler stall").await;

    let mut tx = db.begin().await.unwrap();
    let mut version = 1;
    for status in [
        ReportStatus::Analyzed,
        ReportStatus::Assigned,
        ReportStatus::Processing,
        ReportStatus::Open,
    ] {
        version = tx.reports().change_status(&id, status, version).await.unwrap().version;
    }
    tx.commit().await.unwrap();
    assert_eq!(version, 5);
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_writer_with_same_version_conflicts() {
    let t = common::open().await;
    let id = report_at_version_five(&t.db).await;

    // Both read version 5 inside their own open transactions
    let mut x = t.db.begin().await.unwrap();
    let mut y = t.db.begin().await.unwrap();
    let mut seen_by_x = x.reports().find(&id).await.unwrap();
    let mut seen_by_y = y.reports().find(&id).await.unwrap();
    assert_eq!(seen_by_x.version, 5);
    assert_eq!(seen_by_y.version, 5);

    seen_by_x.title = "Scheduler stall under load".into();
    let written = x.reports().update(&seen_by_x).await.unwrap();
    x.commit().await.unwrap();
    assert_eq!(written.version, 6);

    seen_by_y.title = "Scheduler stall (dup)".into();
    let err = y.reports().update(&seen_by_y).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::ConcurrentModification { expected: 5, actual: 6, .. }
    ));
    assert!(err.is_conflict());
    y.abort(&err).await.unwrap();

    let mut check = t.db.begin().await.unwrap();
    let stored = check.reports().find(&id).await.unwrap();
    assert_eq!(stored.version, 6);
    assert_eq!(stored.title, "Scheduler stall under load");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_writer_starts_over_while_the_winner_is_open() {
    let t = common::open().await;
    let id = report_at_version_five(&t.db).await;

    let mut x = t.db.begin().await.unwrap();
    let mut y = t.db.begin().await.unwrap();
    let seen_by_x = x.reports().find(&id).await.unwrap();
    let seen_by_y = y.reports().find(&id).await.unwrap();

    x.reports()
        .change_status(&id, ReportStatus::Assigned, seen_by_x.version)
        .await
        .unwrap();

    // X holds the write lock but has not committed: nothing newer to report
    let err = y
        .reports()
        .change_status(&id, ReportStatus::Closed, seen_by_y.version)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Transaction(_)));
    y.abort(&err).await.unwrap();

    x.commit().await.unwrap();

    // Starting over sees X's write and fails the version check properly
    let mut retry = t.db.begin().await.unwrap();
    let err = retry
        .reports()
        .change_status(&id, ReportStatus::Closed, seen_by_y.version)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::ConcurrentModification { expected: 5, actual: 6, .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn write_to_another_row_makes_a_reader_start_over() {
    let t = common::open().await;
    let topic = common::seed_topic(&t.db, "Kernel").await;
    let first = common::seed_report(&t.db, &topic, "First").await;
    let second = common::seed_report(&t.db, &topic, "Second").await;

    let mut reader = t.db.begin().await.unwrap();
    let seen = reader.reports().find(&first).await.unwrap();

    let mut other = t.db.begin().await.unwrap();
    other
        .reports()
        .change_status(&second, ReportStatus::Analyzed, 1)
        .await
        .unwrap();
    other.commit().await.unwrap();

    // `first` is unchanged, but the reader's snapshot can no longer write
    let err = reader
        .reports()
        .change_status(&first, ReportStatus::Analyzed, seen.version)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Transaction(_)));
    assert!(!err.is_conflict());

    let err = reader
        .posts()
        .create(&tracker_core::NewPost {
            report_id: first.clone(),
            author_id: None,
            content: "Still there?".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Transaction(_)));
    reader.abort(&err).await.unwrap();

    let mut fresh = t.db.begin().await.unwrap();
    let report = fresh
        .reports()
        .change_status(&first, ReportStatus::Analyzed, seen.version)
        .await
        .unwrap();
    assert_eq!(report.version, 2);
    fresh.commit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn exactly_one_concurrent_writer_wins() {
    const WRITERS: usize = 8;

    let t = common::open_with(|c| c.max_connections(WRITERS as u32)).await;
    let topic = common::seed_topic(&t.db, "Kernel").await;
    let id = common::seed_report(&t.db, &topic, "Race").await;

    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for n in 0..WRITERS {
        let db = t.db.clone();
        let id = id.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            let status = if n % 2 == 0 { ReportStatus::Assigned } else { ReportStatus::Analyzed };
            barrier.wait().await;
            db.transaction(|tx| {
                Box::pin(async move { tx.reports().change_status(&id, status, 1).await })
            })
            .await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(report) => {
                assert_eq!(report.version, 2);
                wins += 1;
            }
            Err(DbError::ConcurrentModification { expected: 1, actual: 2, .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(conflicts, WRITERS - 1);

    let mut tx = t.db.begin().await.unwrap();
    assert_eq!(tx.reports().find(&id).await.unwrap().version, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_of_deleted_row_is_not_found() {
    let t = common::open().await;
    let topic = common::seed_topic(&t.db, "Kernel").await;
    let id = common::seed_report(&t.db, &topic, "Gone").await;

    let mut tx = t.db.begin().await.unwrap();
    let stale = tx.reports().find(&id).await.unwrap();
    tx.rollback().await.unwrap();

    let mut tx = t.db.begin().await.unwrap();
    tx.reports().delete(&id, tracker_db::DeleteMode::Strict).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = t.db.begin().await.unwrap();
    let err = tx.reports().update(&stale).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
    assert!(!err.is_retryable());
}
