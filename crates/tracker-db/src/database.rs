//! # Database Handle
//!
//! Entry point for the service and media layers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database (Clone, no global state)                                      │
//! │   ├── begin()            → Transaction  (lease + BEGIN)                 │
//! │   ├── transaction(f)     → commit on Ok, abort on Err                   │
//! │   ├── acquire()/release  → raw Lease for ad-hoc reads                   │
//! │   └── media()            → MediaStore   (Lazy blobs, no transaction)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;

use tracing::{error, info};

use crate::config::DbConfig;
use crate::error::DbResult;
use crate::media::MediaStore;
use crate::migrations;
use crate::pool::{ConnectionPool, Lease, PoolStats};
use crate::transaction::Transaction;

/// Future returned by a [`Database::transaction`] body.
pub type TransactionFuture<'t, T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send + 't>>;

/// Main database handle.
///
/// Cloning is cheap; every clone shares one pool.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::open(DbConfig::from_env()?).await?;
///
/// let mut tx = db.begin().await?;
/// let page = tx.reports().search(&ReportCriteria::in_topic(&topic), &selection).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Builds the pool and brings the schema up to date.
    ///
    /// ## What This Does
    /// 1. Configures the (lazy) connection pool
    /// 2. Runs embedded migrations if `run_migrations` is set
    ///
    /// ## Returns
    /// * `Ok(Database)` - ready-to-use handle
    /// * `Err(DbError::Config)` - invalid configuration
    /// * `Err(DbError::Migration)` - schema could not be applied
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        let pool = ConnectionPool::open(&config)?;
        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        info!(path = %config.database_path.display(), "Database ready");
        Ok(db)
    }

    /// Applies pending migrations.
    ///
    /// Called by `open` unless disabled in the configuration.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(self.pool.inner()).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Starts a unit of work on its own leased connection.
    ///
    /// ## Returns
    /// * `Ok(Transaction)` - in state `Open`
    /// * `Err(DbError::OutOfConnections)` - pool exhausted for the whole timeout
    pub async fn begin(&self) -> DbResult<Transaction> {
        let inner = self.pool.begin().await?;
        Ok(Transaction::new(inner, self.pool.clone()))
    }

    /// Runs `body` inside a transaction.
    ///
    /// Commits when the body returns `Ok`, aborts when it returns `Err`.
    /// The body's error is returned unchanged; a failing commit yields
    /// `DbError::Transaction`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let report_id = db
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             let id = tx.reports().create(&new_report).await?;
    ///             tx.posts().create(&first_post(&id)).await?;
    ///             Ok(id)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(&self, body: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> TransactionFuture<'t, T> + Send,
        T: Send,
    {
        let mut tx = self.begin().await?;
        let outcome = body(&mut tx).await;

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if tx.is_open() {
                    if let Err(rollback_err) = tx.abort(&e).await {
                        error!(tx = tx.id(), error = %rollback_err, "Transaction rollback failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Leases a raw connection, for reads that need no transaction.
    pub async fn acquire(&self) -> DbResult<Lease> {
        self.pool.acquire().await
    }

    /// Hands a lease back. Same as dropping it.
    pub fn release(&self, lease: Lease) {
        self.pool.release(lease);
    }

    /// Lazy access to avatars, logos and attachments.
    pub fn media(&self) -> MediaStore {
        MediaStore::new(self.pool.clone())
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Closes the pool. Later operations fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Checks that a query can run.
    pub async fn health_check(&self) -> bool {
        self.pool.health_check().await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::transaction::TransactionState;
    use tracker_core::NewUser;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            display_name: name.to_string(),
            role: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_transaction_helper_commits_on_ok() {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();

        let id = db
            .transaction(|tx| Box::pin(async move { tx.users().create(&new_user("ada")).await }))
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        assert_eq!(tx.users().find(&id).await.unwrap().username, "ada");
    }

    #[tokio::test]
    async fn test_transaction_helper_rolls_back_on_err() {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();

        let err = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.users().create(&new_user("grace")).await?;
                    Err::<(), _>(DbError::InvalidArgument("changed my mind".into()))
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));

        let mut tx = db.begin().await.unwrap();
        assert!(tx.users().find_by_username("grace").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_releases_connection() {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.users().create(&new_user("linus")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);

        // The single in-memory connection must be free again
        let lease = db.acquire().await.unwrap();
        db.release(lease);
    }

    #[tokio::test]
    async fn test_finished_transaction_rejects_work() {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);

        assert!(matches!(
            tx.users().create(&new_user("late")).await,
            Err(DbError::Transaction(_))
        ));
        assert!(matches!(tx.commit().await, Err(DbError::Transaction(_))));
        assert!(matches!(tx.rollback().await, Err(DbError::Transaction(_))));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let db = Database::open(DbConfig::in_memory()).await.unwrap();

        {
            let mut tx = db.begin().await.unwrap();
            tx.users().create(&new_user("ghost")).await.unwrap();
        }

        let mut tx = db.begin().await.unwrap();
        assert!(tx.users().find_by_username("ghost").await.unwrap().is_none());
    }
}
