//! # Validation Module
//!
//! Field checks applied to new and updated entities before they reach SQL.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Web frontend                                                 │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Repository write paths (Rust)                                │
//! │  └── THIS MODULE: required fields, lengths, shapes                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL and CHECK constraints                                    │
//! │  ├── UNIQUE constraints (username, email, topic title)                 │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tracker_core::validation::{validate_email, validate_username};
//!
//! validate_username("ada_l").unwrap();
//! validate_email("ada@example.com").unwrap();
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::{NewPost, NewReport, NewTopic, NewUser};

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 32;

/// Longest accepted display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 100;

/// Longest accepted email address (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;

/// Longest accepted topic or report title.
pub const MAX_TITLE_LEN: usize = 200;

/// Longest accepted post body.
pub const MAX_CONTENT_LEN: usize = 65_536;

/// Longest accepted free-text search needle.
pub const MAX_SEARCH_LEN: usize = 100;

fn required<'a>(field: &'static str, value: &'a str, max: usize) -> CoreResult<&'a str> {
    let value = value.trim();

    if value.is_empty() {
        return Err(CoreError::Required { field });
    }

    if value.chars().count() > max {
        return Err(CoreError::TooLong { field, max });
    }

    Ok(value)
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a login name.
///
/// ## Rules
/// - 1 to 32 characters
/// - ASCII letters, digits, `-`, `_` and `.` only
///
/// ## Example
/// ```rust
/// use tracker_core::validation::validate_username;
///
/// assert!(validate_username("grace.hopper").is_ok());
/// assert!(validate_username("").is_err());
/// assert!(validate_username("has space").is_err());
/// ```
pub fn validate_username(username: &str) -> CoreResult<()> {
    let username = required("username", username, MAX_USERNAME_LEN)?;

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(CoreError::InvalidFormat {
            field: "username",
            reason: "only letters, digits, '-', '_' and '.' are allowed".to_string(),
        });
    }

    Ok(())
}

/// Validates an email address.
///
/// Only the shape `local@domain` is checked; deliverability is not.
pub fn validate_email(email: &str) -> CoreResult<()> {
    let email = required("email", email, MAX_EMAIL_LEN)?;

    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(())
        }
        _ => Err(CoreError::InvalidFormat {
            field: "email",
            reason: "expected local@domain".to_string(),
        }),
    }
}

pub fn validate_display_name(name: &str) -> CoreResult<()> {
    required("display name", name, MAX_DISPLAY_NAME_LEN).map(|_| ())
}

/// Validates a topic or report title.
pub fn validate_title(title: &str) -> CoreResult<()> {
    required("title", title, MAX_TITLE_LEN).map(|_| ())
}

/// Validates a post body.
pub fn validate_content(content: &str) -> CoreResult<()> {
    required("content", content, MAX_CONTENT_LEN).map(|_| ())
}

/// Validates a free-text search needle.
///
/// ## Returns
/// The trimmed needle; `None` when it is blank (no filtering).
pub fn validate_search_text(text: &str) -> CoreResult<Option<String>> {
    let text = text.trim();

    if text.chars().count() > MAX_SEARCH_LEN {
        return Err(CoreError::TooLong {
            field: "search text",
            max: MAX_SEARCH_LEN,
        });
    }

    Ok((!text.is_empty()).then(|| text.to_string()))
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates an entity identifier.
///
/// ## Example
/// ```rust
/// use tracker_core::validation::validate_id;
///
/// assert!(validate_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_id("not-a-uuid").is_err());
/// ```
pub fn validate_id(id: &str) -> CoreResult<()> {
    if id.trim().is_empty() {
        return Err(CoreError::Required { field: "id" });
    }

    uuid::Uuid::parse_str(id).map_err(|_| CoreError::InvalidFormat {
        field: "id",
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Entity Validators
// =============================================================================

impl NewUser {
    pub fn validate(&self) -> CoreResult<()> {
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        validate_display_name(&self.display_name)
    }
}

impl NewTopic {
    pub fn validate(&self) -> CoreResult<()> {
        validate_title(&self.title)
    }
}

impl NewReport {
    pub fn validate(&self) -> CoreResult<()> {
        validate_title(&self.title)
    }
}

impl NewPost {
    pub fn validate(&self) -> CoreResult<()> {
        validate_content(&self.content)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
