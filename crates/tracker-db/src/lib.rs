//! # tracker-db: Persistence Core for the Bug Tracker
//!
//! Pooled SQLite access, explicit transactions, per-entity repositories with
//! optimistic concurrency, and lazy loading of binary payloads.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bug Tracker Data Flow                            │
//! │                                                                         │
//! │  Service layer (HTTP handlers, jobs)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   tracker-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Transaction  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │───►│ ├ users()     │    │  (embedded)  │  │   │
//! │  │   │               │    │ ├ topics()    │    │              │  │   │
//! │  │   │ SqlitePool    │    │ ├ reports()   │    │ 001_init.sql │  │   │
//! │  │   │ Leases        │    │ ├ posts()     │    └──────────────┘  │   │
//! │  │   │ media() ─ Lazy│    │ └ notifs()    │  ── guard.rs (CAS)   │   │
//! │  │   └───────────────┘    └───────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SQLite Database (WAL mode)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Pool and database settings, environment loading
//! - [`pool`] - Connection pool, leases
//! - [`database`] - Main handle, transaction helper
//! - [`transaction`] - Unit of work and its state machine
//! - [`guard`] - Version-checked updates
//! - [`repository`] - Per-entity data access
//! - [`lazy`] - Deferred, memoized values
//! - [`media`] - Lazy binary payloads
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tracker_core::{ReportCriteria, ReportSort, Selection, PageSize};
//! use tracker_db::{Database, DbConfig};
//!
//! let db = Database::open(DbConfig::new("tracker.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let page = tx
//!     .reports()
//!     .search(
//!         &ReportCriteria::default().unresolved(),
//!         &Selection::new(ReportSort::CreatedAt).page_size(PageSize::Normal).descending(),
//!     )
//!     .await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod database;
pub mod error;
pub mod guard;
pub mod lazy;
pub mod media;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod transaction;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::DbConfig;
pub use database::{Database, TransactionFuture};
pub use error::{DbError, DbResult};
pub use guard::VersionCheck;
pub use lazy::{loader, Lazy, Loader};
pub use media::MediaStore;
pub use pool::{ConnectionPool, Lease, PoolStats};
pub use repository::DeleteMode;
pub use transaction::{Transaction, TransactionState};

// Repository re-exports for convenience
pub use repository::notification::NotificationRepository;
pub use repository::post::PostRepository;
pub use repository::report::ReportRepository;
pub use repository::topic::TopicRepository;
pub use repository::user::UserRepository;
