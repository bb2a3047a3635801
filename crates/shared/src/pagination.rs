//! Page/limit pagination utilities.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default page size when none is requested.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: i64 = 500;

/// Highest page number accepted from a caller.
pub const MAX_PAGE: i64 = 1_000_000;

/// Requested page lies beyond `MAX_PAGE`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Page {0} is out of range (maximum {MAX_PAGE})")]
pub struct PageOutOfRange(pub i64);

/// A normalized 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Builds a page request, clamping out-of-range values.
    ///
    /// Pages are clamped to `1..=MAX_PAGE`; limits to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Like [`PageRequest::new`], but rejects pages past `MAX_PAGE` instead of clamping.
    pub fn checked(page: Option<i64>, limit: Option<i64>) -> Result<Self, PageOutOfRange> {
        match page {
            Some(p) if p > MAX_PAGE => Err(PageOutOfRange(p)),
            _ => Ok(Self::new(page, limit)),
        }
    }

    /// Row offset for SQL `OFFSET`. Never negative.
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit.max(0))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A page of results with the total row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total: i64, items: Vec<T>) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total,
            items,
        }
    }

    /// Whether more rows exist past this page.
    pub fn has_more(&self) -> bool {
        self.page.saturating_mul(self.limit) < self.total
    }
}
