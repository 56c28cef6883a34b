//! Directory row storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::cursor::Cursor;
use crate::paginator::PaginationError;

/// A row that can take part in keyset pagination.
pub trait DirectoryEntry {
    /// The row's numeric ID (tie-breaker within equal sort keys).
    fn id(&self) -> i64;
    /// The row's sort key.
    fn sort_key(&self) -> &str;
}

/// A member-directory listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRow {
    pub id: i64,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl DirectoryEntry for MemberRow {
    fn id(&self) -> i64 {
        self.id
    }

    fn sort_key(&self) -> &str {
        &self.username
    }
}

/// Ordered row access for the paginator.
///
/// Implementations must present rows in ascending `(sort_key, id)` order,
/// except [`rows_before`](DirectoryStore::rows_before), which returns the
/// slice closest to the boundary in *descending* order (the paginator
/// reverses it back).
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// The row type served by this store.
    type Row: DirectoryEntry + Clone + Send + Sync;

    /// The first `limit` rows.
    async fn first_rows(&self, limit: u32) -> Result<Vec<Self::Row>, PaginationError>;

    /// Up to `limit` rows strictly after the boundary, ascending.
    async fn rows_after(
        &self,
        boundary: &Cursor,
        limit: u32,
    ) -> Result<Vec<Self::Row>, PaginationError>;

    /// Up to `limit` rows strictly before the boundary, descending.
    async fn rows_before(
        &self,
        boundary: &Cursor,
        limit: u32,
    ) -> Result<Vec<Self::Row>, PaginationError>;

    /// How many rows sort at or before the boundary: `sort_key` strictly
    /// less, or equal with `id <=`.
    async fn prefix_count(&self, boundary: &Cursor) -> Result<u64, PaginationError>;

    /// Total number of rows.
    async fn total_count(&self) -> Result<u64, PaginationError>;
}

// --- Postgres --------------------------------------------------------------

/// Postgres-backed [`DirectoryStore`] over the `member_directory` view.
///
/// All four access paths ride the composite index on `(username, id)`.
#[derive(Clone)]
pub struct PgDirectoryStore {
    pool: PgPool,
}

impl PgDirectoryStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_from(row: &sqlx::postgres::PgRow) -> Result<MemberRow, PaginationError> {
        Ok(MemberRow {
            id: row.try_get("id").map_err(PaginationError::store)?,
            username: row.try_get("username").map_err(PaginationError::store)?,
            name: row.try_get("name").map_err(PaginationError::store)?,
            affiliation: row.try_get("affiliation").map_err(PaginationError::store)?,
            avatar_url: row.try_get("avatar_url").map_err(PaginationError::store)?,
        })
    }
}

#[async_trait]
impl DirectoryStore for PgDirectoryStore {
    type Row = MemberRow;

    async fn first_rows(&self, limit: u32) -> Result<Vec<MemberRow>, PaginationError> {
        let rows = sqlx::query(
            "SELECT id, username, name, affiliation, avatar_url \
             FROM member_directory ORDER BY username, id LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(PaginationError::store)?;
        rows.iter().map(Self::row_from).collect()
    }

    async fn rows_after(
        &self,
        boundary: &Cursor,
        limit: u32,
    ) -> Result<Vec<MemberRow>, PaginationError> {
        let rows = sqlx::query(
            "SELECT id, username, name, affiliation, avatar_url \
             FROM member_directory \
             WHERE (username, id) > ($1, $2) \
             ORDER BY username, id LIMIT $3",
        )
        .bind(&boundary.sort_key)
        .bind(boundary.id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(PaginationError::store)?;
        rows.iter().map(Self::row_from).collect()
    }

    async fn rows_before(
        &self,
        boundary: &Cursor,
        limit: u32,
    ) -> Result<Vec<MemberRow>, PaginationError> {
        let rows = sqlx::query(
            "SELECT id, username, name, affiliation, avatar_url \
             FROM member_directory \
             WHERE (username, id) < ($1, $2) \
             ORDER BY username DESC, id DESC LIMIT $3",
        )
        .bind(&boundary.sort_key)
        .bind(boundary.id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(PaginationError::store)?;
        rows.iter().map(Self::row_from).collect()
    }

    async fn prefix_count(&self, boundary: &Cursor) -> Result<u64, PaginationError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM member_directory \
             WHERE username < $1 OR (username = $1 AND id <= $2)",
        )
        .bind(&boundary.sort_key)
        .bind(boundary.id)
        .fetch_one(&self.pool)
        .await
        .map_err(PaginationError::store)?;
        let n: i64 = row.try_get("n").map_err(PaginationError::store)?;
        Ok(n.max(0) as u64)
    }

    async fn total_count(&self) -> Result<u64, PaginationError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM member_directory")
            .fetch_one(&self.pool)
            .await
            .map_err(PaginationError::store)?;
        let n: i64 = row.try_get("n").map_err(PaginationError::store)?;
        Ok(n.max(0) as u64)
    }
}

// --- In-memory -------------------------------------------------------------

/// In-memory [`DirectoryStore`] used by the pagination tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    rows: Vec<MemberRow>,
}

impl MemoryDirectory {
    /// Create a directory from arbitrary rows; they are sorted into
    /// `(username, id)` order.
    #[must_use]
    pub fn new(mut rows: Vec<MemberRow>) -> Self {
        rows.sort_by(|a, b| (&a.username, a.id).cmp(&(&b.username, b.id)));
        Self { rows }
    }

    fn key(row: &MemberRow) -> (&str, i64) {
        (row.username.as_str(), row.id)
    }

    fn boundary_key(boundary: &Cursor) -> (&str, i64) {
        (boundary.sort_key.as_str(), boundary.id)
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    type Row = MemberRow;

    async fn first_rows(&self, limit: u32) -> Result<Vec<MemberRow>, PaginationError> {
        Ok(self.rows.iter().take(limit as usize).cloned().collect())
    }

    async fn rows_after(
        &self,
        boundary: &Cursor,
        limit: u32,
    ) -> Result<Vec<MemberRow>, PaginationError> {
        let boundary = Self::boundary_key(boundary);
        Ok(self
            .rows
            .iter()
            .filter(|row| Self::key(row) > boundary)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn rows_before(
        &self,
        boundary: &Cursor,
        limit: u32,
    ) -> Result<Vec<MemberRow>, PaginationError> {
        let boundary = Self::boundary_key(boundary);
        Ok(self
            .rows
            .iter()
            .rev()
            .filter(|row| Self::key(row) < boundary)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn prefix_count(&self, boundary: &Cursor) -> Result<u64, PaginationError> {
        let boundary = Self::boundary_key(boundary);
        Ok(self
            .rows
            .iter()
            .filter(|row| Self::key(row) <= boundary)
            .count() as u64)
    }

    async fn total_count(&self) -> Result<u64, PaginationError> {
        Ok(self.rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, username: &str) -> MemberRow {
        MemberRow {
            id,
            username: username.to_string(),
            name: format!("Member {username}"),
            affiliation: None,
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn memory_directory_sorts_on_construction() {
        let directory = MemoryDirectory::new(vec![row(2, "zed"), row(1, "amy"), row(3, "amy")]);
        let rows = directory.first_rows(10).await.unwrap();
        let usernames: Vec<_> = rows.iter().map(|r| (r.username.as_str(), r.id)).collect();
        assert_eq!(usernames, vec![("amy", 1), ("amy", 3), ("zed", 2)]);
    }

    #[tokio::test]
    async fn rows_before_is_descending_from_the_boundary() {
        let directory =
            MemoryDirectory::new(vec![row(1, "a"), row(2, "b"), row(3, "c"), row(4, "d")]);
        let rows = directory
            .rows_before(&Cursor::new("d", 4), 2)
            .await
            .unwrap();
        let usernames: Vec<_> = rows.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(usernames, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn prefix_count_includes_the_boundary_row() {
        let directory = MemoryDirectory::new(vec![row(1, "a"), row(2, "b"), row(3, "c")]);
        assert_eq!(directory.prefix_count(&Cursor::new("b", 2)).await.unwrap(), 2);
        // same username, lower id is not counted past the boundary
        assert_eq!(directory.prefix_count(&Cursor::new("b", 1)).await.unwrap(), 1);
    }
}
