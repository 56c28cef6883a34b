//! Bidirectional cursor traversal.

use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

use crate::cursor::{Cursor, CursorError};
use crate::store::{DirectoryEntry, DirectoryStore};

/// Default rows per page.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Traversal direction relative to the supplied cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Rows after the boundary.
    #[default]
    Next,
    /// Rows before the boundary.
    Prev,
}

impl FromStr for Direction {
    type Err = std::convert::Infallible;

    /// Parses the `dir` query parameter; anything that is not `prev` means
    /// forward.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "prev" => Direction::Prev,
            _ => Direction::Next,
        })
    }
}

/// Pagination failure.
#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    /// The supplied cursor token is not one we issued.
    #[error(transparent)]
    InvalidCursor(#[from] CursorError),

    /// The underlying store failed.
    #[error("directory store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PaginationError {
    /// Wrap a store-level error.
    pub fn store(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        PaginationError::Store {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

/// One page of directory rows plus traversal metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CursorPage<R> {
    /// The page's rows, always in ascending sort order.
    pub rows: Vec<R>,
    pub has_next: bool,
    pub has_prev: bool,
    /// Token addressing the page after this one, when `has_next`.
    pub next_cursor: Option<String>,
    /// Token addressing the page before this one, when `has_prev`.
    pub prev_cursor: Option<String>,
    /// Best-effort 1-based position of this page.
    pub current_page: u64,
    /// Total number of pages, at least 1.
    pub page_count: u64,
    pub total_count: u64,
    pub page_size: u32,
}

/// Keyset paginator over a [`DirectoryStore`].
pub struct CursorPaginator<S> {
    store: S,
    page_size: u32,
}

impl<S: DirectoryStore> CursorPaginator<S> {
    /// Create a paginator with the default page size.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetch the page addressed by `cursor` and `direction`.
    ///
    /// No cursor means the first page; `direction` is ignored without a
    /// cursor.
    ///
    /// # Errors
    ///
    /// Fails on an undecodable cursor or a store failure.
    pub async fn page(
        &self,
        cursor: Option<&str>,
        direction: Direction,
    ) -> Result<CursorPage<S::Row>, PaginationError> {
        let total_count = self.store.total_count().await?;
        let page_count = total_count.div_ceil(u64::from(self.page_size)).max(1);
        let fetch = self.page_size + 1;

        let (rows, has_next, has_prev) = match cursor {
            None => {
                let fetched = self.store.first_rows(fetch).await?;
                let (rows, overflow) = self.truncate(fetched);
                (rows, overflow, false)
            }
            Some(token) => {
                let boundary = Cursor::decode(token)?;
                debug!(?boundary, ?direction, "resuming from cursor");
                match direction {
                    Direction::Next => {
                        let fetched = self.store.rows_after(&boundary, fetch).await?;
                        let (rows, overflow) = self.truncate(fetched);
                        let has_prev = !rows.is_empty();
                        (rows, overflow, has_prev)
                    }
                    Direction::Prev => {
                        let fetched = self.store.rows_before(&boundary, fetch).await?;
                        let (mut rows, overflow) = self.truncate(fetched);
                        // fetched descending; present ascending
                        rows.reverse();
                        let has_next = !rows.is_empty();
                        (rows, has_next, overflow)
                    }
                }
            }
        };

        let next_cursor = if has_next {
            rows.last().map(|row| cursor_for(row).encode())
        } else {
            None
        };
        let prev_cursor = if has_prev {
            rows.first().map(|row| cursor_for(row).encode())
        } else {
            None
        };

        let current_page = match rows.first() {
            Some(first) => {
                let leading = self.store.prefix_count(&cursor_for(first)).await?;
                leading.div_ceil(u64::from(self.page_size)).max(1)
            }
            None => 1,
        };

        Ok(CursorPage {
            rows,
            has_next,
            has_prev,
            next_cursor,
            prev_cursor,
            current_page,
            page_count,
            total_count,
            page_size: self.page_size,
        })
    }

    /// Drop the probe row: `page_size + 1` rows were requested, so more
    /// than `page_size` back means another page exists in the fetch
    /// direction.
    fn truncate(&self, mut fetched: Vec<S::Row>) -> (Vec<S::Row>, bool) {
        if fetched.len() > self.page_size as usize {
            fetched.truncate(self.page_size as usize);
            (fetched, true)
        } else {
            (fetched, false)
        }
    }
}

fn cursor_for<R: DirectoryEntry>(row: &R) -> Cursor {
    Cursor::new(row.sort_key(), row.id())
}
