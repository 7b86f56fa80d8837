//! # Transactions
//!
//! A unit of work bound to one leased connection.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Transaction State Machine                            │
//! │                                                                         │
//! │  Database::begin() ── lease conn + BEGIN ──► Open                      │
//! │                                               │                         │
//! │            ┌──────────────────┬──────────────┼──────────────────┐      │
//! │            ▼                  ▼              ▼                  ▼      │
//! │        commit() ok       commit() err    rollback()        abort()     │
//! │            │                  │              │                  │      │
//! │            ▼                  ▼              ▼                  ▼      │
//! │        Committed           Aborted       RolledBack          Aborted   │
//! │                                                                         │
//! │  Every terminal state has returned the connection to the pool.         │
//! │  Any further use fails with DbError::Transaction.                      │
//! │  Dropping an Open transaction rolls it back.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::{Sqlite, SqliteConnection};
use tracing::{debug, error, warn};

use crate::error::{DbError, DbResult};
use crate::pool::ConnectionPool;
use crate::repository::notification::NotificationRepository;
use crate::repository::post::PostRepository;
use crate::repository::report::ReportRepository;
use crate::repository::topic::TopicRepository;
use crate::repository::user::UserRepository;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Where a transaction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransactionState::Open => "open",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(text)
    }
}

/// Handle through which repositories issue statements.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = db.begin().await?;
/// let id = tx.reports().create(&new_report).await?;
/// tx.posts().create(&first_post(&id)).await?;
/// tx.commit().await?;
/// ```
pub struct Transaction {
    id: u64,
    inner: Option<sqlx::Transaction<'static, Sqlite>>,
    state: TransactionState,
    // Reads committed state when this transaction's snapshot is stale
    pool: ConnectionPool,
}

impl Transaction {
    pub(crate) fn new(inner: sqlx::Transaction<'static, Sqlite>, pool: ConnectionPool) -> Self {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(tx = id, "Transaction opened");
        Transaction {
            id,
            inner: Some(inner),
            state: TransactionState::Open,
            pool,
        }
    }

    /// Process-unique number, used in log lines.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    pub(crate) fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// The leased connection, while the transaction is open.
    pub(crate) fn conn(&mut self) -> DbResult<&mut SqliteConnection> {
        let (id, state) = (self.id, self.state);
        match self.inner.as_mut() {
            Some(inner) if state == TransactionState::Open => Ok(&mut **inner),
            _ => Err(DbError::Transaction(format!("transaction {id} is {state}"))),
        }
    }

    fn take_open(&mut self) -> DbResult<sqlx::Transaction<'static, Sqlite>> {
        match self.inner.take() {
            Some(inner) if self.state == TransactionState::Open => Ok(inner),
            other => {
                self.inner = other;
                Err(DbError::Transaction(format!(
                    "transaction {} is {}",
                    self.id, self.state
                )))
            }
        }
    }

    /// Makes all statements of this transaction durable.
    ///
    /// ## Returns
    /// * `Ok(())` - committed, connection released
    /// * `Err(DbError::Transaction)` - not open, or the database refused the
    ///   commit; in the latter case the work is rolled back and the
    ///   connection released
    pub async fn commit(&mut self) -> DbResult<()> {
        let inner = self.take_open()?;
        match inner.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(tx = self.id, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                // sqlx rolls back a transaction whose COMMIT failed when it is dropped
                self.state = TransactionState::Aborted;
                warn!(tx = self.id, error = %e, "Commit failed, transaction rolled back");
                Err(DbError::Transaction(format!("commit failed: {e}")))
            }
        }
    }

    /// Discards every statement of this transaction.
    pub async fn rollback(&mut self) -> DbResult<()> {
        let inner = self.take_open()?;
        self.state = TransactionState::RolledBack;
        inner.rollback().await.map_err(|e| {
            error!(tx = self.id, error = %e, "Rollback failed");
            DbError::Transaction(format!("rollback failed: {e}"))
        })?;
        debug!(tx = self.id, "Transaction rolled back");
        Ok(())
    }

    /// Rolls back because the unit of work failed.
    ///
    /// Same effect as `rollback`, recorded as `Aborted` and logged with the
    /// reason.
    pub async fn abort(&mut self, reason: &DbError) -> DbResult<()> {
        let inner = self.take_open()?;
        self.state = TransactionState::Aborted;
        warn!(tx = self.id, reason = %reason, "Aborting transaction");
        inner.rollback().await.map_err(|e| {
            error!(tx = self.id, error = %e, "Rollback after abort failed");
            DbError::Transaction(format!("rollback failed: {e}"))
        })
    }

    pub fn users(&mut self) -> UserRepository<'_> {
        UserRepository::new(self)
    }

    pub fn topics(&mut self) -> TopicRepository<'_> {
        TopicRepository::new(self)
    }

    pub fn reports(&mut self) -> ReportRepository<'_> {
        ReportRepository::new(self)
    }

    pub fn posts(&mut self) -> PostRepository<'_> {
        PostRepository::new(self)
    }

    pub fn notifications(&mut self) -> NotificationRepository<'_> {
        NotificationRepository::new(self)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.inner.is_some() && self.state == TransactionState::Open {
            // The sqlx transaction queues a ROLLBACK before its connection
            // goes back to the pool
            warn!(tx = self.id, "Transaction dropped while open, rolling back");
        }
    }
}
