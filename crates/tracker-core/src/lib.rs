//! # tracker-core: Pure Domain Types for the Bug Tracker
//!
//! This crate holds everything about the tracker's data that can be decided
//! without touching a database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bug Tracker Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Web frontend / service layer (external)            │   │
//! │  │    pager controls ──► Selection,  filters ──► *Criteria         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ tracker-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ selection │  │   sort    │  │ criteria  │  │   │
//! │  │   │  Report   │  │ Selection │  │ allow-    │  │ filters   │  │   │
//! │  │   │  User ... │  │ Page<T>   │  │ lists     │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  tracker-db (Persistence Core)                  │   │
//! │  │        pool, transactions, version guard, repositories          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities and their enums
//! - [`selection`] - Page request and page result
//! - [`sort`] - Sortable columns per entity
//! - [`criteria`] - Search filters per entity
//! - [`validation`] - Field checks for new entities
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tracker_core::{PageSize, ReportSort, Selection};
//!
//! let selection = Selection::new(ReportSort::CreatedAt)
//!     .page(2)
//!     .page_size(PageSize::Normal)
//!     .descending();
//!
//! assert_eq!(selection.offset(), 40);
//! assert_eq!(selection.limit(), 20);
//! assert_eq!(selection.order_by(), "created_at DESC, id ASC");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod criteria;
pub mod error;
pub mod selection;
pub mod sort;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use criteria::*;
pub use error::{CoreError, CoreResult};
pub use selection::{Page, PageSize, Selection, SortDirection, SortKey};
pub use sort::*;
pub use types::*;

/// Generates a new entity identifier (UUID v4).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
