use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::StoreError, models::comment::Comment, store::query::SortKey};

/// Conjunctive filter for flat scans. Never recursive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    /// Restrict to direct children of this comment.
    pub parent_id: Option<Uuid>,
    /// Text-relevance clause over `content`. Already trimmed and non-empty.
    pub search: Option<String>,
}

/// Normalized pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

/// What a snapshot will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Reads only. Sees one point-in-time state of the table.
    Read,
    /// Reads followed by a delete. Rows read are protected from concurrent
    /// writers until commit, so replies cannot slip in under them.
    Write,
}

/// One open transaction over the comment table.
///
/// Every read made through the same snapshot observes the same forest, so a
/// closure expanded level by level is never torn by a concurrent delete.
/// Dropping a snapshot without calling `commit` rolls it back.
#[async_trait]
pub trait Snapshot: Send {
    async fn get_by_id(&mut self, id: Uuid) -> Result<Comment, StoreError>;

    /// Direct children of every id in `ids`, fetched as one batch and capped at
    /// `limit` rows.
    async fn find_children(
        &mut self,
        ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<Comment>, StoreError>;

    /// Removes every listed row and returns how many existed. Descendants of
    /// listed rows are removed by the cascade as well.
    async fn delete_by_ids(&mut self, ids: &[Uuid]) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Durable storage of comment rows.
///
/// Implementations must keep the forest invariant: `insert` only accepts a
/// parent that is visible inside its own transaction, so no insert can close
/// a cycle or leave a dangling parent.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Persists a new comment and returns it with its assigned id and timestamps.
    async fn insert(&self, parent_id: Option<Uuid>, content: &str) -> Result<Comment, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Comment, StoreError>;

    /// Filtered, sorted, paginated scan for the listing endpoint.
    async fn scan(
        &self,
        filter: &ScanFilter,
        sort: SortKey,
        page: Page,
    ) -> Result<Vec<Comment>, StoreError>;

    /// Opens a transaction for multi-statement tree operations.
    async fn snapshot(&self, mode: SnapshotMode) -> Result<Box<dyn Snapshot>, StoreError>;
}

/// A foreign key violation on insert means the parent vanished before commit.
pub(crate) fn map_insert_error(err: sqlx::Error, parent_id: Option<Uuid>) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound(format!(
                "Parent comment {} not found",
                parent_id.map(|p| p.to_string()).unwrap_or_default()
            ));
        }
    }
    StoreError::from(err)
}
