//! Paginated results.

use crate::row::Row;

/// A page of results that knows the total row count.
#[derive(Debug, Clone, PartialEq)]
pub struct LengthAwarePaginator {
    /// Rows of the current page.
    pub items: Vec<Row>,
    /// Total number of rows matched by the query.
    pub total: u64,
    /// Page size.
    pub per_page: u64,
    /// 1-based page number.
    pub current_page: u64,
    /// Last page number (at least 1).
    pub last_page: u64,
}

impl LengthAwarePaginator {
    /// Creates a paginator and computes the last page.
    #[must_use]
    pub fn new(items: Vec<Row>, total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = if per_page == 0 {
            1
        } else {
            total.div_ceil(per_page).max(1)
        };
        Self {
            items,
            total,
            per_page,
            current_page: current_page.max(1),
            last_page,
        }
    }

    /// Returns `true` when pages follow the current one.
    #[must_use]
    pub const fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    /// Returns `true` when the page has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A page of results that only knows whether another page exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Paginator {
    /// Rows of the current page.
    pub items: Vec<Row>,
    /// Page size.
    pub per_page: u64,
    /// 1-based page number.
    pub current_page: u64,
    /// `true` when at least one more row exists.
    pub has_more: bool,
}

impl Paginator {
    /// Builds a page from `per_page + 1` fetched rows.
    #[must_use]
    pub fn new(mut items: Vec<Row>, per_page: u64, current_page: u64) -> Self {
        let per = usize::try_from(per_page).unwrap_or(usize::MAX);
        let has_more = items.len() > per;
        items.truncate(per);
        Self {
            items,
            per_page,
            current_page: current_page.max(1),
            has_more,
        }
    }
}
