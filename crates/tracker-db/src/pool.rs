//! # Connection Pool
//!
//! Bounded pool of SQLite connections shared by every request worker.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Connection Pool                                    │
//! │                                                                         │
//! │  ConnectionPool::open(config)  ← no connection opened yet (lazy)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │ ... │ │ConnN│       │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ acquire(): idle conn is pinged first, dead ones are replaced   │
//! │       ▼                                                                 │
//! │  Worker A ──► Lease(Conn1)   Worker B ──► Lease(Conn2)                 │
//! │  Worker C ──► waits ≤ acquire_timeout ──► OutOfConnections            │
//! │                                                                         │
//! │  Dropping a Lease hands the connection back (exactly once).            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so readers don't block
//! the writer and the writer doesn't block readers. Writers still serialize;
//! `busy_timeout` makes a second writer wait instead of failing at once.

use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};

/// A connection on loan from the pool.
///
/// Owned by exactly one holder; dropping it returns the connection.
pub type Lease = PoolConnection<Sqlite>;

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Physical connections currently open.
    pub size: u32,
    /// Open connections not leased to anyone.
    pub idle: usize,
    /// Configured upper bound.
    pub max: u32,
}

/// Bounded, thread-safe connection pool.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    pool: SqlitePool,
    acquire_timeout: Duration,
    max_connections: u32,
}

impl ConnectionPool {
    /// Configures the pool without opening any connection.
    ///
    /// ## What This Does
    /// 1. Validates the configuration
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys, busy timeout
    /// 3. Builds a lazy pool: connections are established on first demand,
    ///    up to `max_connections`, and pinged before being handed out
    pub fn open(config: &DbConfig) -> DbResult<Self> {
        config.validate()?;

        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Configuring connection pool"
        );

        let base_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::Config(e.to_string()))?
        } else {
            SqliteConnectOptions::new().filename(&config.database_path)
        };

        let mut connect_options = base_options
            // Enforce referential integrity; SQLite ships with it off
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        if !config.is_in_memory() {
            // WAL: readers don't block writers, writers don't block readers
            connect_options = connect_options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            // Liveness check on every checkout; a dead connection is closed
            // and a fresh one opened in its place
            .test_before_acquire(true)
            .connect_lazy_with(connect_options);

        Ok(ConnectionPool {
            pool,
            acquire_timeout: config.acquire_timeout,
            max_connections: config.max_connections,
        })
    }

    /// Leases a connection, waiting at most the acquire timeout.
    ///
    /// ## Returns
    /// * `Ok(Lease)` - exclusive connection; drop it (or call `release`) to return it
    /// * `Err(DbError::OutOfConnections)` - nothing became free in time
    pub async fn acquire(&self) -> DbResult<Lease> {
        let lease = self
            .pool
            .acquire()
            .await
            .map_err(|e| DbError::from_acquire(e, self.acquire_timeout))?;

        debug!(size = self.pool.size(), idle = self.pool.num_idle(), "Connection leased");
        Ok(lease)
    }

    /// Returns a leased connection to the pool.
    ///
    /// Equivalent to dropping the lease; taking it by value makes a second
    /// release impossible.
    pub fn release(&self, lease: Lease) {
        drop(lease);
        debug!(idle = self.pool.num_idle(), "Connection released");
    }

    /// Starts a database transaction on a freshly leased connection.
    pub(crate) async fn begin(&self) -> DbResult<sqlx::Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DbError::from_acquire(e, self.acquire_timeout))
    }

    /// Current occupancy.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.max_connections,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// The underlying sqlx pool, for migrations and ad-hoc diagnostics.
    pub fn inner(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Closes every connection. Waits for outstanding leases to come back;
    /// later `acquire` calls fail.
    pub async fn close(&self) {
        info!("Closing connection pool");
        self.pool.close().await;
    }

    /// Checks that a connection can be leased and can execute a query.
    pub async fn health_check(&self) -> bool {
        match self.acquire().await {
            Ok(mut lease) => sqlx::query("SELECT 1").execute(&mut *lease).await.is_ok(),
            Err(_) => false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_is_lazy() {
        let pool = ConnectionPool::open(&DbConfig::in_memory().min_connections(0)).unwrap();
        assert_eq!(pool.stats().size, 0);

        let lease = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().size, 1);
        pool.release(lease);
    }

    #[tokio::test]
    async fn test_health_check() {
        let pool = ConnectionPool::open(&DbConfig::in_memory()).unwrap();
        assert!(pool.health_check().await);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let config = DbConfig::in_memory().acquire_timeout(Duration::from_millis(100));
        let pool = ConnectionPool::open(&config).unwrap();

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(
            err,
            DbError::OutOfConnections { timeout } if timeout == Duration::from_millis(100)
        ));

        pool.release(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let pool = ConnectionPool::open(&DbConfig::in_memory()).unwrap();
        pool.close().await;
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire().await, Err(DbError::Store(_))));
        assert!(!pool.health_check().await);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ConnectionPool::open(&DbConfig::new("x.db").max_connections(0)).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
