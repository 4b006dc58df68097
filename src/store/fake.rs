//! In-memory repository for unit tests. Trusts whatever rows it is given,
//! corrupt ones included.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::comment::Comment,
    store::{
        query::SortKey,
        repository::{NodeRepository, Page, ScanFilter, Snapshot, SnapshotMode},
    },
};

pub(crate) fn row(id: Uuid, parent_id: Option<Uuid>, age_secs: i64) -> Comment {
    let at = Utc::now() - chrono::Duration::seconds(age_secs);
    Comment {
        id,
        parent_id,
        content: format!("comment {id}"),
        created_at: at,
        updated_at: at,
    }
}

#[derive(Default)]
pub(crate) struct FakeRepo {
    rows: Arc<Mutex<Vec<Comment>>>,
    child_calls: Arc<AtomicUsize>,
    children_read: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    child_delay: Option<Duration>,
}

impl FakeRepo {
    pub(crate) fn with_rows(rows: Vec<Comment>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            ..Self::default()
        }
    }

    /// Every `find_children` call sleeps this long first.
    pub(crate) fn slow_children(mut self, delay: Duration) -> Self {
        self.child_delay = Some(delay);
        self
    }

    pub(crate) fn ids(&self) -> Vec<Uuid> {
        self.rows.lock().unwrap().iter().map(|c| c.id).collect()
    }

    pub(crate) fn child_calls(&self) -> usize {
        self.child_calls.load(Ordering::SeqCst)
    }

    /// Total rows handed out by `find_children`.
    pub(crate) fn children_read(&self) -> usize {
        self.children_read.load(Ordering::SeqCst)
    }

    pub(crate) fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

/// Copies the rows when opened; deletes are staged and only reach the shared
/// rows on commit.
struct FakeSnapshot {
    view: Vec<Comment>,
    deleted: Vec<Uuid>,
    rows: Arc<Mutex<Vec<Comment>>>,
    child_calls: Arc<AtomicUsize>,
    children_read: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    child_delay: Option<Duration>,
}

#[async_trait]
impl Snapshot for FakeSnapshot {
    async fn get_by_id(&mut self, id: Uuid) -> Result<Comment, StoreError> {
        self.view
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn find_children(
        &mut self,
        ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<Comment>, StoreError> {
        self.child_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.child_delay {
            tokio::time::sleep(delay).await;
        }
        let children: Vec<Comment> = self
            .view
            .iter()
            .filter(|c| c.parent_id.is_some_and(|p| ids.contains(&p)))
            .take(limit)
            .cloned()
            .collect();
        self.children_read.fetch_add(children.len(), Ordering::SeqCst);
        Ok(children)
    }

    async fn delete_by_ids(&mut self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let before = self.view.len();
        self.view.retain(|c| !ids.contains(&c.id));
        self.deleted.extend_from_slice(ids);
        Ok((before - self.view.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.rows
            .lock()
            .unwrap()
            .retain(|c| !self.deleted.contains(&c.id));
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl NodeRepository for FakeRepo {
    async fn insert(&self, parent_id: Option<Uuid>, _content: &str) -> Result<Comment, StoreError> {
        let comment = row(Uuid::now_v7(), parent_id, 0);
        self.rows.lock().unwrap().push(comment.clone());
        Ok(comment)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Comment, StoreError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn scan(&self, _: &ScanFilter, _: SortKey, _: Page) -> Result<Vec<Comment>, StoreError> {
        Ok(Vec::new())
    }

    async fn snapshot(&self, _mode: SnapshotMode) -> Result<Box<dyn Snapshot>, StoreError> {
        Ok(Box::new(FakeSnapshot {
            view: self.rows.lock().unwrap().clone(),
            deleted: Vec::new(),
            rows: Arc::clone(&self.rows),
            child_calls: Arc::clone(&self.child_calls),
            children_read: Arc::clone(&self.children_read),
            commits: Arc::clone(&self.commits),
            child_delay: self.child_delay,
        }))
    }
}
