//! # Sort Keys
//!
//! Per-entity allow-lists of sortable columns. A key that is not listed
//! here cannot be expressed, so nothing a caller types ends up in SQL.
//!
//! Enum columns are stored as text. Their keys map to a `CASE` rank in
//! declaration order (severity minor → critical, status open → closed)
//! rather than the raw column, which would sort alphabetically.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::selection::SortKey;

macro_rules! sort_keys {
    (
        $(#[$meta:meta])*
        $ty:ident for $entity:literal {
            $($variant:ident => ($name:literal, $column:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
        #[ts(export)]
        #[serde(rename_all = "snake_case")]
        pub enum $ty {
            $($variant),+
        }

        impl SortKey for $ty {
            const ENTITY: &'static str = $entity;

            fn all() -> &'static [Self] {
                &[$($ty::$variant),+]
            }

            fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }

            fn column(&self) -> &'static str {
                match self {
                    $($ty::$variant => $column),+
                }
            }
        }
    };
}

sort_keys! {
    /// Sortable user columns.
    UserSort for "user" {
        Username => ("username", "username"),
        DisplayName => ("display_name", "display_name"),
        Role => ("role", "CASE role WHEN 'user' THEN 0 WHEN 'developer' THEN 1 WHEN 'administrator' THEN 2 END"),
        RegisteredAt => ("registered_at", "registered_at"),
        LastLoginAt => ("last_login_at", "last_login_at"),
    }
}

sort_keys! {
    /// Sortable topic columns.
    TopicSort for "topic" {
        Title => ("title", "title"),
        Category => (
            "category",
            "CASE category WHEN 'application' THEN 0 WHEN 'community' THEN 1 WHEN 'hardware' THEN 2 \
             WHEN 'service' THEN 3 WHEN 'other' THEN 4 END"
        ),
        CreatedAt => ("created_at", "created_at"),
        UpdatedAt => ("updated_at", "updated_at"),
    }
}

sort_keys! {
    /// Sortable report columns.
    ReportSort for "report" {
        Title => ("title", "title"),
        Status => (
            "status",
            "CASE status WHEN 'open' THEN 0 WHEN 'analyzed' THEN 1 WHEN 'assigned' THEN 2 \
             WHEN 'processing' THEN 3 WHEN 'duplicate' THEN 4 WHEN 'closed' THEN 5 END"
        ),
        Kind => (
            "kind",
            "CASE kind WHEN 'bug' THEN 0 WHEN 'hint' THEN 1 WHEN 'proposal' THEN 2 WHEN 'support' THEN 3 END"
        ),
        Severity => (
            "severity",
            "CASE severity WHEN 'minor' THEN 0 WHEN 'relevant' THEN 1 WHEN 'severe' THEN 2 WHEN 'critical' THEN 3 END"
        ),
        CreatedAt => ("created_at", "created_at"),
        UpdatedAt => ("updated_at", "updated_at"),
    }
}

sort_keys! {
    /// Sortable post columns. Threads read oldest first.
    PostSort for "post" {
        CreatedAt => ("created_at", "created_at"),
        UpdatedAt => ("updated_at", "updated_at"),
    }
}

sort_keys! {
    /// Sortable notification columns.
    NotificationSort for "notification" {
        CreatedAt => ("created_at", "created_at"),
        Kind => (
            "kind",
            "CASE kind WHEN 'report_created' THEN 0 WHEN 'report_updated' THEN 1 WHEN 'post_created' THEN 2 \
             WHEN 'moderator_assigned' THEN 3 END"
        ),
        Read => ("read", "is_read"),
    }
}
