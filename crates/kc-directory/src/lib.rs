//! # kc-directory
//!
//! Opaque-cursor, keyset-based pagination over the member directory.
//!
//! Rows are addressed by their position in the stable total order
//! `(sort_key, id)` rather than by offset, so pages stay consistent while
//! the directory changes underneath and deep pages stay cheap. The cursor
//! token round-trips the boundary row exactly; "which page am I on" is
//! estimated with an index-friendly prefix count instead of an OFFSET
//! scan.
//!
//! [`CursorPaginator`] implements the traversal over any
//! [`DirectoryStore`]; [`PgDirectoryStore`] is the Postgres implementation
//! and [`MemoryDirectory`] backs the property tests.

pub mod cursor;
pub mod paginator;
pub mod store;

pub use cursor::Cursor;
pub use paginator::{CursorPage, CursorPaginator, Direction, PaginationError, DEFAULT_PAGE_SIZE};
pub use store::{DirectoryEntry, DirectoryStore, MemberRow, MemoryDirectory, PgDirectoryStore};
