//! Query parameter types for API handlers.

use serde::Deserialize;

/// Page size used when `limit` is absent.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Largest page a client may request.
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Pagination parameters (`?limit=&offset=`).
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    /// `limit` clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
    }

    /// `offset` clamped to non-negative.
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
