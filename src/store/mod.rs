// src/store/mod.rs

//! Hierarchical comment store.
//!
//! `CommentStore` is the only entry point callers use. It delegates to the
//! tree operations (closure and cascade) and to the query service (flat
//! listings), both of which talk to a [`NodeRepository`].

#[cfg(test)]
mod fake;
pub mod postgres;
pub mod query;
pub mod repository;
pub mod sqlite;
pub mod tree;

use std::{future::Future, sync::Arc, time::Duration};

use uuid::Uuid;

use crate::{config::Config, error::StoreError, models::comment::Comment};

pub use query::{ListQuery, SortKey};
pub use repository::{NodeRepository, Snapshot, SnapshotMode};

/// Bounds applied to every store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Deadline for a single operation, closure and delete included.
    pub operation_timeout: Duration,
    /// Largest subtree a fetch or delete may touch.
    pub max_subtree_nodes: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            max_subtree_nodes: 10_000,
        }
    }
}

impl From<&Config> for StoreLimits {
    fn from(config: &Config) -> Self {
        Self {
            operation_timeout: config.operation_timeout,
            max_subtree_nodes: config.max_subtree_nodes,
        }
    }
}

/// Shared handle to the comment store. Cheap to clone.
///
/// Dropping the future of any operation cancels it; an open transaction is
/// rolled back when its connection is returned to the pool.
#[derive(Clone)]
pub struct CommentStore {
    repo: Arc<dyn NodeRepository>,
    limits: StoreLimits,
}

impl CommentStore {
    pub fn new(repo: Arc<dyn NodeRepository>, limits: StoreLimits) -> Self {
        Self { repo, limits }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.limits.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout = ?self.limits.operation_timeout, "store operation timed out");
                Err(StoreError::ResourceExceeded(format!(
                    "{op} did not finish within {:?}",
                    self.limits.operation_timeout
                )))
            }
        }
    }

    /// Creates a root (`parent_id = None`) or a reply.
    pub async fn create_comment(
        &self,
        parent_id: Option<Uuid>,
        content: &str,
    ) -> Result<Comment, StoreError> {
        let comment = self
            .bounded("create_comment", self.repo.insert(parent_id, content))
            .await?;
        tracing::info!(id = %comment.id, parent = ?comment.parent_id, "comment created");
        Ok(comment)
    }

    pub async fn get_comment(&self, id: Uuid) -> Result<Comment, StoreError> {
        self.bounded("get_comment", self.repo.get_by_id(id)).await
    }

    /// The comment and all of its descendants, oldest first.
    pub async fn fetch_subtree(&self, root_id: Uuid) -> Result<Vec<Comment>, StoreError> {
        self.bounded(
            "fetch_subtree",
            tree::fetch_subtree(self.repo.as_ref(), root_id, self.limits.max_subtree_nodes),
        )
        .await
    }

    /// Flat listing; never fails on zero matches.
    pub async fn list_comments(&self, query: &ListQuery) -> Result<Vec<Comment>, StoreError> {
        self.bounded("list_comments", query::list(self.repo.as_ref(), query))
            .await
    }

    /// Removes the comment and its whole subtree atomically. Returns the number
    /// of comments removed.
    pub async fn delete_subtree(&self, root_id: Uuid) -> Result<u64, StoreError> {
        let deleted = self
            .bounded(
                "delete_subtree",
                tree::delete_subtree(self.repo.as_ref(), root_id, self.limits.max_subtree_nodes),
            )
            .await?;
        tracing::info!(root = %root_id, deleted, "subtree deleted");
        Ok(deleted)
    }
}
