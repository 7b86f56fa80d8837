//! # Media Store
//!
//! Binary payloads (avatars, topic logos, post attachments) live in the
//! same rows as their owners but are never selected with them. They are read
//! on demand, either inside a transaction through the owning repository or,
//! for the media-serving layer, through [`MediaStore`] which needs no
//! transaction at all.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET /avatar/{user}                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.media().avatar(user) ──► Lazy<Option<Blob>>   (no I/O yet)         │
//! │       │                                                                 │
//! │       ▼  .get().await                                                   │
//! │  lease connection ─► SELECT avatar, avatar_mime ─► release             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqliteConnection;
use tracing::debug;
use tracker_core::Blob;

use crate::error::{DbError, DbResult};
use crate::guard::{self, VersionCheck};
use crate::lazy::Lazy;
use crate::pool::ConnectionPool;
use crate::repository::Table;
use crate::transaction::Transaction;

/// Where one kind of binary payload is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlobSlot {
    Avatar,
    Logo,
    Attachment,
}

impl BlobSlot {
    const fn table(&self) -> Table {
        match self {
            BlobSlot::Avatar => Table::Users,
            BlobSlot::Logo => Table::Topics,
            BlobSlot::Attachment => Table::Posts,
        }
    }

    /// (data column, mime column, file name column)
    const fn columns(&self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            BlobSlot::Avatar => ("avatar", "avatar_mime", None),
            BlobSlot::Logo => ("logo", "logo_mime", None),
            BlobSlot::Attachment => ("attachment", "attachment_mime", Some("attachment_name")),
        }
    }
}

/// Reads a payload.
///
/// ## Returns
/// * `Ok(Some(blob))` - payload stored
/// * `Ok(None)` - owner exists but has no payload
/// * `Err(DbError::NotFound)` - owner row absent
pub(crate) async fn read_blob(
    conn: &mut SqliteConnection,
    slot: BlobSlot,
    id: &str,
) -> DbResult<Option<Blob>> {
    let table = slot.table();
    let (data, mime, name) = slot.columns();
    let sql = format!(
        "SELECT {data}, {mime}, {} FROM {} WHERE id = ?1",
        name.unwrap_or("NULL"),
        table.name()
    );

    let row: Option<(Option<Vec<u8>>, Option<String>, Option<String>)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let (bytes, mime_type, file_name) = row.ok_or_else(|| DbError::not_found(table.entity(), id))?;

    Ok(bytes.map(|bytes| Blob {
        bytes,
        mime_type: mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
        file_name,
    }))
}

/// Replaces (or clears, with `None`) a payload under the version guard.
/// Returns the owner's new version.
pub(crate) async fn write_blob(
    tx: &mut Transaction,
    slot: BlobSlot,
    id: &str,
    expected_version: i64,
    blob: Option<&Blob>,
) -> DbResult<i64> {
    let table = slot.table();
    let (data, mime, name) = slot.columns();

    let bytes = blob.map(|b| b.bytes.clone());
    let mime_type = blob.map(|b| b.mime_type.clone());
    let file_name = blob.and_then(|b| b.file_name.clone());

    debug!(
        table = table.name(),
        id = %id,
        size = blob.map(|b| b.len()).unwrap_or(0),
        "Writing binary payload"
    );

    let check: VersionCheck = guard::compare_and_swap(tx, table, id, expected_version, |set| {
        set.set(data, bytes).set(mime, mime_type);
        if let Some(name) = name {
            set.set(name, file_name);
        }
    })
    .await?;

    check.into_result(table.entity(), id)
}

/// Transaction-free access to binary payloads, for the media-serving layer.
#[derive(Debug, Clone)]
pub struct MediaStore {
    pool: ConnectionPool,
}

impl MediaStore {
    pub(crate) fn new(pool: ConnectionPool) -> Self {
        MediaStore { pool }
    }

    /// A user's avatar, loaded on first `get`.
    pub fn avatar(&self, user_id: &str) -> Lazy<Option<Blob>> {
        self.lazy(BlobSlot::Avatar, user_id)
    }

    /// A topic's logo, loaded on first `get`.
    pub fn logo(&self, topic_id: &str) -> Lazy<Option<Blob>> {
        self.lazy(BlobSlot::Logo, topic_id)
    }

    /// A post's attachment, loaded on first `get`.
    pub fn attachment(&self, post_id: &str) -> Lazy<Option<Blob>> {
        self.lazy(BlobSlot::Attachment, post_id)
    }

    fn lazy(&self, slot: BlobSlot, id: &str) -> Lazy<Option<Blob>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Lazy::deferred(move || {
            let pool = pool.clone();
            let id = id.clone();
            async move {
                let mut lease = pool.acquire().await?;
                read_blob(&mut *lease, slot, &id).await
            }
        })
    }
}
