//! # User Repository
//!
//! Database operations for user accounts.
//!
//! ## Key Operations
//! - Registration with unique username and email
//! - Profile updates under the version guard
//! - Login bookkeeping
//! - Avatar storage (binary, loaded on demand)
//!
//! ## Account Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create(NewUser) ──► users row, version 1                              │
//! │       │                                                                 │
//! │       ├── record_login(id, v)   last_login_at = now, version v+1       │
//! │       ├── update(&user)         profile fields, version v+1            │
//! │       ├── set_avatar(id, v, ..) avatar blob,     version v+1           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  delete(id) ──► posts/reports keep their text, author_id = NULL        │
//! │                 notifications of the user are removed                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;
use tracker_core::validation::{validate_display_name, validate_email, validate_username};
use tracker_core::{generate_id, Blob, NewUser, Page, Selection, User, UserCriteria, UserRole, UserSort};

use super::{count_where, delete_by_id, fetch_by_id, fetch_page, require_by_id, search_pattern, DeleteMode, Table};
use crate::error::DbResult;
use crate::guard;
use crate::media::{self, BlobSlot};
use crate::transaction::Transaction;

/// Row projection; the avatar is never part of it.
const COLUMNS: &str =
    "id, username, email, display_name, role, enabled, registered_at, last_login_at, version";

/// Repository for user database operations.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = db.begin().await?;
///
/// let id = tx.users().create(&new_user).await?;
/// let user = tx.users().find(&id).await?;
/// tx.users().record_login(&id, user.version).await?;
///
/// tx.commit().await?;
/// ```
pub struct UserRepository<'t> {
    tx: &'t mut Transaction,
}

/// Search criteria with the free text already validated.
struct UserFilter {
    pattern: Option<String>,
    role: Option<UserRole>,
    enabled: Option<bool>,
}

impl UserFilter {
    fn prepare(criteria: &UserCriteria) -> DbResult<Self> {
        Ok(UserFilter {
            pattern: search_pattern(criteria.name_contains.as_deref())?,
            role: criteria.role,
            enabled: criteria.enabled,
        })
    }

    fn apply(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        if let Some(pattern) = &self.pattern {
            qb.push(" AND (username LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR display_name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\')");
        }
        if let Some(role) = self.role {
            qb.push(" AND role = ").push_bind(role);
        }
        if let Some(enabled) = self.enabled {
            qb.push(" AND enabled = ").push_bind(enabled);
        }
    }
}

impl<'t> UserRepository<'t> {
    pub(crate) fn new(tx: &'t mut Transaction) -> Self {
        UserRepository { tx }
    }

    /// Registers a user.
    ///
    /// ## Returns
    /// * `Ok(id)` - new account, enabled, version 1
    /// * `Err(DbError::Duplicate)` - username or email already taken
    /// * `Err(DbError::InvalidArgument)` - malformed field
    pub async fn create(&mut self, new: &NewUser) -> DbResult<String> {
        new.validate()?;

        let id = generate_id();
        debug!(tx = self.tx.id(), username = %new.username, "Creating user");

        let conn = self.tx.conn()?;
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, display_name, role,
                enabled, registered_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, 1)
            "#,
        )
        .bind(&id)
        .bind(new.username.trim())
        .bind(new.email.trim())
        .bind(new.display_name.trim())
        .bind(new.role)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    /// Gets a user by ID, failing with `NotFound` when absent.
    pub async fn find(&mut self, id: &str) -> DbResult<User> {
        require_by_id(self.tx.conn()?, Table::Users, COLUMNS, id).await
    }

    /// Gets a user by ID.
    pub async fn find_optional(&mut self, id: &str) -> DbResult<Option<User>> {
        fetch_by_id(self.tx.conn()?, Table::Users, COLUMNS, id).await
    }

    pub async fn find_by_username(&mut self, username: &str) -> DbResult<Option<User>> {
        let conn = self.tx.conn()?;
        let sql = format!("SELECT {COLUMNS} FROM users WHERE username = ?1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username.trim())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(&mut self, email: &str) -> DbResult<Option<User>> {
        let conn = self.tx.conn()?;
        let sql = format!("SELECT {COLUMNS} FROM users WHERE email = ?1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email.trim())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(user)
    }

    /// Writes the profile fields of `user` (username, email, display name,
    /// role, enabled flag).
    ///
    /// `user.version` must be the version the caller read.
    ///
    /// ## Returns
    /// * `Ok(User)` - the stored row, version bumped by one
    /// * `Err(DbError::ConcurrentModification)` - someone else wrote first
    /// * `Err(DbError::NotFound)` - user was deleted
    pub async fn update(&mut self, user: &User) -> DbResult<User> {
        validate_username(&user.username)?;
        validate_email(&user.email)?;
        validate_display_name(&user.display_name)?;

        debug!(tx = self.tx.id(), id = %user.id, version = user.version, "Updating user");

        guard::compare_and_swap(self.tx, Table::Users, &user.id, user.version, |set| {
            set.set("username", user.username.trim().to_string())
                .set("email", user.email.trim().to_string())
                .set("display_name", user.display_name.trim().to_string())
                .set("role", user.role)
                .set("enabled", user.enabled);
        })
        .await?
        .into_result(Table::Users.entity(), &user.id)?;

        require_by_id(self.tx.conn()?, Table::Users, COLUMNS, &user.id).await
    }

    /// Stamps `last_login_at` with the current time.
    ///
    /// ## Returns
    /// The user's new version.
    pub async fn record_login(&mut self, id: &str, version: i64) -> DbResult<i64> {
        let now = Utc::now();
        guard::compare_and_swap(self.tx, Table::Users, id, version, |set| {
            set.set("last_login_at", now);
        })
        .await?
        .into_result(Table::Users.entity(), id)
    }

    /// Replaces or (with `None`) removes the avatar.
    ///
    /// ## Returns
    /// The user's new version.
    pub async fn set_avatar(&mut self, id: &str, version: i64, avatar: Option<&Blob>) -> DbResult<i64> {
        media::write_blob(self.tx, BlobSlot::Avatar, id, version, avatar).await
    }

    /// Reads the avatar inside this transaction.
    pub async fn avatar(&mut self, id: &str) -> DbResult<Option<Blob>> {
        media::read_blob(self.tx.conn()?, BlobSlot::Avatar, id).await
    }

    /// Deletes a user. Reports, topics and posts they wrote stay, without an
    /// author.
    pub async fn delete(&mut self, id: &str, mode: DeleteMode) -> DbResult<bool> {
        debug!(tx = self.tx.id(), id = %id, ?mode, "Deleting user");
        delete_by_id(self.tx.conn()?, Table::Users, id, mode).await
    }

    /// Lists users matching `criteria`, one page at a time.
    pub async fn search(
        &mut self,
        criteria: &UserCriteria,
        selection: &Selection<UserSort>,
    ) -> DbResult<Page<User>> {
        let filter = UserFilter::prepare(criteria)?;
        debug!(
            tx = self.tx.id(),
            page = selection.page_index(),
            sort = ?selection.sort(),
            "Searching users"
        );
        fetch_page(self.tx.conn()?, Table::Users, COLUMNS, selection, |qb| filter.apply(qb)).await
    }

    /// Counts users matching `criteria`.
    pub async fn count(&mut self, criteria: &UserCriteria) -> DbResult<u64> {
        let filter = UserFilter::prepare(criteria)?;
        count_where(self.tx.conn()?, Table::Users, |qb| filter.apply(qb)).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
