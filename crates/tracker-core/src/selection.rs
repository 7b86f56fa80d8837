//! # Selection (pagination + sorting)
//!
//! The page request every repository `search` accepts.
//!
//! ## Translation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UI pager: page 3 of "20 per page", sorted by title ↓                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Selection { page: 2, page_size: Normal, sort: Title, Descending }     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ORDER BY title DESC, id ASC   LIMIT 20   OFFSET 40                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pages are zero-based. The trailing `id ASC` makes the order total, so a
//! non-unique sort column still paginates deterministically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Page Size
// =============================================================================

/// Allowed page sizes. Result sets are bounded by the largest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PageSize {
    /// 10 rows.
    Small,
    /// 20 rows.
    #[default]
    Normal,
    /// 50 rows.
    Huge,
}

impl PageSize {
    pub const ALL: [PageSize; 3] = [PageSize::Small, PageSize::Normal, PageSize::Huge];

    /// Number of rows per page.
    #[inline]
    pub const fn size(&self) -> u32 {
        match self {
            PageSize::Small => 10,
            PageSize::Normal => 20,
            PageSize::Huge => 50,
        }
    }
}

impl TryFrom<u32> for PageSize {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PageSize::ALL
            .into_iter()
            .find(|size| size.size() == value)
            .ok_or(CoreError::InvalidPageSize(value))
    }
}

// =============================================================================
// Sort Direction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// SQL keyword for ORDER BY.
    #[inline]
    pub const fn sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }

    pub const fn reversed(&self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

impl FromStr for SortDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            _ => Err(CoreError::InvalidDirection(s.to_string())),
        }
    }
}

// =============================================================================
// Sort Key
// =============================================================================

/// A column an entity may be ordered by.
///
/// Implementors are closed enums (see [`crate::sort`]); `column()` returns a
/// compile-time constant, which is the only text that reaches the ORDER BY
/// clause.
pub trait SortKey: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Entity name used in error messages.
    const ENTITY: &'static str;

    /// Every allowed key.
    fn all() -> &'static [Self];

    /// Public name, as accepted from callers.
    fn name(&self) -> &'static str;

    /// Column the key maps to.
    fn column(&self) -> &'static str;

    /// Looks a caller-supplied name up in the allow-list.
    fn parse(name: &str) -> CoreResult<Self> {
        let wanted = name.trim();
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoreError::InvalidSortKey {
                entity: Self::ENTITY,
                key: name.to_string(),
                allowed: Self::all().iter().map(|key| key.name()).collect(),
            })
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Immutable page request: which page, how big, ordered how, and whether the
/// caller wants the total row count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<S: SortKey> {
    page: u32,
    page_size: PageSize,
    sort: S,
    direction: SortDirection,
    with_total: bool,
}

impl<S: SortKey> Selection<S> {
    /// First page, normal size, ascending, no total.
    pub fn new(sort: S) -> Self {
        Selection {
            page: 0,
            page_size: PageSize::default(),
            sort,
            direction: SortDirection::default(),
            with_total: false,
        }
    }

    /// Builds a selection from raw pager parameters.
    ///
    /// ## Example
    /// ```rust
    /// use tracker_core::{ReportSort, Selection};
    ///
    /// let selection = Selection::<ReportSort>::parse(2, 20, "title", "desc").unwrap();
    /// assert_eq!(selection.offset(), 40);
    /// assert_eq!(selection.limit(), 20);
    /// ```
    pub fn parse(page: u32, page_size: u32, sort: &str, direction: &str) -> CoreResult<Self> {
        Ok(Selection::new(S::parse(sort)?)
            .page(page)
            .page_size(PageSize::try_from(page_size)?)
            .direction(direction.parse()?))
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn descending(self) -> Self {
        self.direction(SortDirection::Descending)
    }

    pub fn with_total(mut self, with_total: bool) -> Self {
        self.with_total = with_total;
        self
    }

    /// Same request, one page further.
    pub fn next(self) -> Self {
        let page = self.page.saturating_add(1);
        self.page(page)
    }

    #[inline]
    pub fn page_index(&self) -> u32 {
        self.page
    }

    #[inline]
    pub fn size(&self) -> PageSize {
        self.page_size
    }

    #[inline]
    pub fn sort(&self) -> S {
        self.sort
    }

    #[inline]
    pub fn sort_direction(&self) -> SortDirection {
        self.direction
    }

    #[inline]
    pub fn wants_total(&self) -> bool {
        self.with_total
    }

    /// Rows to skip: `page * page_size`.
    #[inline]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.page_size.size())
    }

    /// Rows to return: `page_size`.
    #[inline]
    pub fn limit(&self) -> u32 {
        self.page_size.size()
    }

    /// ORDER BY body, ties broken by id ascending.
    pub fn order_by(&self) -> String {
        let column = self.sort.column();
        if column == "id" {
            format!("id {}", self.direction.sql())
        } else {
            format!("{} {}, id ASC", column, self.direction.sql())
        }
    }
}

// =============================================================================
// Page
// =============================================================================

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Zero-based page index.
    pub page: u32,
    pub page_size: u32,
    /// Total matching rows; present only when the selection asked for it.
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new<S: SortKey>(items: Vec<T>, selection: &Selection<S>, total: Option<u64>) -> Self {
        Page {
            items,
            page: selection.page_index(),
            page_size: selection.limit(),
            total,
        }
    }

    /// Number of pages, when the total is known. An empty result is one page.
    pub fn total_pages(&self) -> Option<u64> {
        let size = u64::from(self.page_size.max(1));
        self.total.map(|total| total.div_ceil(size).max(1))
    }

    /// Whether a following page exists. Without a total this is a guess
    /// based on whether the current page is full.
    pub fn has_next(&self) -> bool {
        match self.total {
            Some(total) => {
                (u64::from(self.page) + 1) * u64::from(self.page_size) < total
            }
            None => self.items.len() as u64 == u64::from(self.page_size),
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
