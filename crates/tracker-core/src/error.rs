//! # Error Types
//!
//! Domain-specific error types for tracker-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tracker-core errors (this file)                                       │
//! │  └── CoreError        - Rejected page requests, enum text, field input │
//! │                                                                         │
//! │  tracker-db errors (separate crate)                                    │
//! │  └── DbError          - Persistence failures (the full taxonomy)       │
//! │                                                                         │
//! │  Flow: CoreError → DbError::InvalidArgument → service layer            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (entity, offending value)
//! 3. Errors are enum variants, never String

use thiserror::Error;

/// Core domain errors.
///
/// These are raised while turning caller input (page controls, sort
/// parameters) into typed values, before any database work happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Sort key is not on the entity's allow-list.
    ///
    /// ## When This Occurs
    /// - UI sends `?sort=password_hash`
    /// - Typo in a column name
    ///
    /// The key is never interpolated into SQL; parsing stops here.
    #[error("Cannot sort {entity} by '{key}', allowed: {allowed:?}")]
    InvalidSortKey {
        entity: &'static str,
        key: String,
        allowed: Vec<&'static str>,
    },

    /// Page size is not one of the enumerated sizes.
    #[error("Page size {0} is not allowed (use 10, 20 or 50)")]
    InvalidPageSize(u32),

    /// Sort direction text was neither ascending nor descending.
    #[error("Invalid sort direction: '{0}'")]
    InvalidDirection(String),

    /// Enum text did not match any known variant.
    #[error("Invalid {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },

    /// A required field is empty.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// A field exceeds its maximum length (in characters).
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// A field has the wrong shape.
    #[error("Invalid {field} format: {reason}")]
    InvalidFormat { field: &'static str, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidPageSize(33);
        assert_eq!(err.to_string(), "Page size 33 is not allowed (use 10, 20 or 50)");

        let err = CoreError::InvalidSortKey {
            entity: "report",
            key: "secret".to_string(),
            allowed: vec!["title", "status"],
        };
        assert_eq!(
            err.to_string(),
            "Cannot sort report by 'secret', allowed: [\"title\", \"status\"]"
        );
    }
}
