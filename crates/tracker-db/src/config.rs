//! # Database Configuration
//!
//! Pool sizing, timeouts and the database location.
//!
//! Configuration is built in code (builder methods) or loaded from
//! environment variables with fallback to defaults.
//!
//! | Variable                         | Default           |
//! |----------------------------------|-------------------|
//! | `TRACKER_DATABASE_PATH`          | `./tracker.db`    |
//! | `TRACKER_DB_MAX_CONNECTIONS`     | `10`              |
//! | `TRACKER_DB_ACQUIRE_TIMEOUT_MS`  | `5000`            |
//! | `TRACKER_DB_IDLE_TIMEOUT_SECS`   | `600`             |
//! | `TRACKER_DB_BUSY_TIMEOUT_MS`     | `5000`            |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DbError, DbResult};

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tracker/tracker.db")
///     .max_connections(8)
///     .acquire_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Upper bound of physical connections.
    /// Default: 10
    pub max_connections: u32,

    /// Connections opened eagerly. Anything above is established on demand.
    /// Default: 0
    pub min_connections: u32,

    /// How long `acquire` waits for a free connection before failing with
    /// `OutOfConnections`.
    /// Default: 5 seconds
    pub acquire_timeout: Duration,

    /// Idle timeout before closing a connection above `min_connections`.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Maximum lifetime of one physical connection.
    /// Default: 30 minutes
    pub max_lifetime: Option<Duration>,

    /// How long SQLite waits on a locked database before giving up.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on open.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on open.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// Every SQLite connection to `:memory:` sees its own database, so the
    /// pool is pinned to one connection that never expires.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: None,
            max_lifetime: None,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Whether this points at a private in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> DbResult<Self> {
        let defaults = DbConfig::new("./tracker.db");

        let config = DbConfig {
            database_path: env::var("TRACKER_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            max_connections: parse_var("TRACKER_DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),

            acquire_timeout: parse_var("TRACKER_DB_ACQUIRE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.acquire_timeout),

            idle_timeout: parse_var("TRACKER_DB_IDLE_TIMEOUT_SECS")?
                .map(|secs: u64| Some(Duration::from_secs(secs)))
                .unwrap_or(defaults.idle_timeout),

            busy_timeout: parse_var("TRACKER_DB_BUSY_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.busy_timeout),

            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pool cannot honour.
    pub fn validate(&self) -> DbResult<()> {
        if self.max_connections == 0 {
            return Err(DbError::Config("max_connections must be at least 1".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(DbError::Config("acquire_timeout must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str) -> DbResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DbError::Config(format!("invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}
