//! Transaction lifecycle, durability, pagination and lazy media against a
//! file-backed database.

mod common;

use std::sync::Arc;

use tracker_core::{Blob, PageSize, ReportCriteria, ReportSort, Selection};
use tracker_db::{Database, DbError, TransactionState};

#[tokio::test]
async fn committed_transaction_cannot_be_reused() {
    let t = common::open().await;

    let mut tx = t.db.begin().await.unwrap();
    tx.users().create(&common::new_user("ada")).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(tx.state(), TransactionState::Committed);

    assert!(matches!(
        tx.users().find_by_username("ada").await,
        Err(DbError::Transaction(_))
    ));
    assert!(matches!(tx.commit().await, Err(DbError::Transaction(_))));

    let err = DbError::InvalidArgument("late".into());
    assert!(matches!(tx.abort(&err).await, Err(DbError::Transaction(_))));
}

#[tokio::test]
async fn aborted_work_is_invisible() {
    let t = common::open().await;

    let mut tx = t.db.begin().await.unwrap();
    tx.users().create(&common::new_user("grace")).await.unwrap();
    let reason = DbError::InvalidArgument("validation failed later".into());
    tx.abort(&reason).await.unwrap();
    assert_eq!(tx.state(), TransactionState::Aborted);

    let mut tx = t.db.begin().await.unwrap();
    assert!(tx.users().find_by_username("grace").await.unwrap().is_none());
}

#[tokio::test]
async fn scoped_transaction_is_all_or_nothing() {
    let t = common::open().await;
    let topic = common::seed_topic(&t.db, "Kernel").await;

    // Second insert fails on the unknown author; the first must vanish too
    let topic_id = topic.clone();
    let err = t
        .db
        .transaction(|tx| {
            Box::pin(async move {
                tx.reports()
                    .create(&tracker_core::NewReport {
                        topic_id: topic_id.clone(),
                        author_id: None,
                        title: "Kept?".into(),
                        kind: Default::default(),
                        severity: Default::default(),
                    })
                    .await?;
                tx.reports()
                    .create(&tracker_core::NewReport {
                        topic_id,
                        author_id: Some("ghost".into()),
                        title: "Broken".into(),
                        kind: Default::default(),
                        severity: Default::default(),
                    })
                    .await
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));

    let mut tx = t.db.begin().await.unwrap();
    assert_eq!(tx.reports().count(&ReportCriteria::in_topic(&topic)).await.unwrap(), 0);
}

#[tokio::test]
async fn data_survives_reopen() {
    let t = common::open().await;
    let id = {
        let mut tx = t.db.begin().await.unwrap();
        let id = tx.users().create(&common::new_user("linus")).await.unwrap();
        tx.commit().await.unwrap();
        id
    };
    t.db.close().await;

    let reopened = Database::open(common::config(&t.dir)).await.unwrap();
    let mut tx = reopened.begin().await.unwrap();
    assert_eq!(tx.users().find(&id).await.unwrap().username, "linus");
}

#[tokio::test]
async fn pages_partition_the_result_deterministically() {
    let t = common::open().await;
    let topic = common::seed_topic(&t.db, "Kernel").await;
    for i in 0..23 {
        common::seed_report(&t.db, &topic, &format!("Report {i:02}")).await;
    }

    // Every report shares kind, so only the id decides the order
    let selection = Selection::new(ReportSort::Kind)
        .descending()
        .page_size(PageSize::Small)
        .with_total(true);

    let collect = |db: Database| async move {
        let mut tx = db.begin().await.unwrap();
        let mut ids = Vec::new();
        let mut current = selection;
        loop {
            let page = tx
                .reports()
                .search(&ReportCriteria::default(), &current)
                .await
                .unwrap();
            assert_eq!(page.total, Some(23));
            assert_eq!(page.total_pages(), Some(3));
            let last = !page.has_next();
            ids.extend(page.items.into_iter().map(|r| r.id));
            if last {
                break;
            }
            current = current.next();
        }
        ids
    };

    let first = collect(t.db.clone()).await;
    let second = collect(t.db.clone()).await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 23);

    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(first, sorted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn media_store_loads_lazily_outside_transactions() {
    let t = common::open().await;

    let mut tx = t.db.begin().await.unwrap();
    let id = tx.users().create(&common::new_user("ada")).await.unwrap();
    let avatar = Blob::new(vec![1, 2, 3, 4], "image/png");
    tx.users().set_avatar(&id, 1, Some(&avatar)).await.unwrap();

    // Nothing is read until get(), so an uncommitted avatar is not seen later
    let lazy = Arc::new(t.db.media().avatar(&id));
    assert!(!lazy.is_present());
    tx.commit().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let lazy = lazy.clone();
        handles.push(tokio::spawn(async move { lazy.get().await.cloned() }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Some(avatar.clone()));
    }
    assert!(lazy.is_present());

    let missing = t.db.media().logo("no-such-topic");
    assert!(matches!(missing.get().await, Err(DbError::NotFound { .. })));
    assert!(!missing.is_present());

    let no_attachment = t.db.media().attachment("no-such-post");
    assert!(no_attachment.get().await.is_err());
}
