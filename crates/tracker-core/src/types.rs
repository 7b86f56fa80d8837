//! # Domain Types
//!
//! Entities persisted by the bug tracker.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌────────────┐  │
//! │  │    User     │   │    Topic    │   │   Report    │   │    Post    │  │
//! │  │ ─────────── │   │ ─────────── │   │ ─────────── │   │ ────────── │  │
//! │  │ username    │◄──│ creator_id  │◄──│ topic_id    │◄──│ report_id  │  │
//! │  │ email       │   │ title       │   │ status      │   │ content    │  │
//! │  │ role        │   │ category    │   │ duplicate_of│   │ (attach.)  │  │
//! │  │ (avatar)    │   │ (logo)      │   │ severity    │   │            │  │
//! │  └─────────────┘   └─────────────┘   └─────────────┘   └────────────┘  │
//! │                                                                         │
//! │  ┌──────────────┐  Every row: id (UUID v4) + version (i64, starts 1)   │
//! │  │ Notification │  Binary payloads (in parens) are loaded lazily       │
//! │  └──────────────┘  and never travel with the owning row.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

/// Generates the textual form shared by serde, sqlx and the UI for a
/// unit-only enum.
macro_rules! text_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// All variants, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Returns the stored text form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(CoreError::InvalidValue {
                        field: $field,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

// =============================================================================
// Enumerations
// =============================================================================

/// Access level of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Developer,
    Administrator,
}

text_enum!(UserRole, "user role", {
    User => "user",
    Developer => "developer",
    Administrator => "administrator",
});

/// Area a topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TopicCategory {
    Application,
    Community,
    Hardware,
    Service,
    #[default]
    Other,
}

text_enum!(TopicCategory, "topic category", {
    Application => "application",
    Community => "community",
    Hardware => "hardware",
    Service => "service",
    Other => "other",
});

/// Lifecycle state of a report.
///
/// ```text
/// Open ──► Analyzed ──► Assigned ──► Processing ──► Closed
///   │                                                  ▲
///   └──────────────► Duplicate (duplicate_of set) ─────┘ (both are closed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Open,
    Analyzed,
    Assigned,
    Processing,
    Duplicate,
    Closed,
}

text_enum!(ReportStatus, "report status", {
    Open => "open",
    Analyzed => "analyzed",
    Assigned => "assigned",
    Processing => "processing",
    Duplicate => "duplicate",
    Closed => "closed",
});

impl ReportStatus {
    /// Closed and duplicate reports no longer need work.
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, ReportStatus::Closed | ReportStatus::Duplicate)
    }
}

/// What kind of feedback a report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    #[default]
    Bug,
    Hint,
    Proposal,
    Support,
}

text_enum!(ReportKind, "report kind", {
    Bug => "bug",
    Hint => "hint",
    Proposal => "proposal",
    Support => "support",
});

/// How badly a report affects users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReportSeverity {
    #[default]
    Minor,
    Relevant,
    Severe,
    Critical,
}

text_enum!(ReportSeverity, "report severity", {
    Minor => "minor",
    Relevant => "relevant",
    Severe => "severe",
    Critical => "critical",
});

/// Event that produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReportCreated,
    ReportUpdated,
    PostCreated,
    ModeratorAssigned,
}

text_enum!(NotificationKind, "notification kind", {
    ReportCreated => "report_created",
    ReportUpdated => "report_updated",
    PostCreated => "post_created",
    ModeratorAssigned => "moderator_assigned",
});

// =============================================================================
// User
// =============================================================================

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Login name, unique.
    pub username: String,

    /// Contact address, unique.
    pub email: String,

    /// Name shown next to posts.
    pub display_name: String,

    pub role: UserRole,

    /// Disabled accounts keep their content but cannot act.
    pub enabled: bool,

    #[ts(as = "String")]
    pub registered_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub last_login_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency marker.
    pub version: i64,
}

/// Fields required to register a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
}

// =============================================================================
// Topic
// =============================================================================

/// A project or product that reports are filed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Topic {
    pub id: String,

    /// Display title, unique.
    pub title: String,

    pub description: String,

    pub category: TopicCategory,

    /// `None` once the creating account is deleted.
    pub creator_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    pub version: i64,
}

/// Fields required to open a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTopic {
    pub title: String,
    pub description: String,
    pub category: TopicCategory,
    pub creator_id: Option<String>,
}

// =============================================================================
// Report
// =============================================================================

/// A bug report, hint, proposal or support request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Report {
    pub id: String,
    pub topic_id: String,
    pub author_id: Option<String>,
    pub title: String,
    pub status: ReportStatus,
    pub kind: ReportKind,
    pub severity: ReportSeverity,

    /// Set only while `status == Duplicate`; never equal to `id`.
    pub duplicate_of: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    pub version: i64,
}

/// Fields required to file a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub topic_id: String,
    pub author_id: Option<String>,
    pub title: String,
    pub kind: ReportKind,
    pub severity: ReportSeverity,
}

// =============================================================================
// Post
// =============================================================================

/// A comment on a report, optionally with an attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Post {
    pub id: String,
    pub report_id: String,
    pub author_id: Option<String>,
    pub content: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Fields required to write a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub report_id: String,
    pub author_id: Option<String>,
    pub content: String,
}

// =============================================================================
// Notification
// =============================================================================

/// A persisted notice for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub actor_id: Option<String>,
    pub kind: NotificationKind,
    pub report_id: Option<String>,
    pub topic_id: Option<String>,

    /// Event details as a JSON document.
    pub payload: String,

    pub is_read: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    pub version: i64,
}

impl Notification {
    /// Parses the stored payload.
    pub fn payload_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Fields required to record a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient_id: String,
    pub actor_id: Option<String>,
    pub kind: NotificationKind,
    pub report_id: Option<String>,
    pub topic_id: Option<String>,
    pub payload: serde_json::Value,
}

// =============================================================================
// Binary content
// =============================================================================

/// Binary content stored next to a row (avatar, logo, attachment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Original file name; only attachments keep one.
    pub file_name: Option<String>,
}

impl Blob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Blob {
            bytes,
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
