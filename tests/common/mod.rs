// tests/common/mod.rs
#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use comment_tree::{
    db::Database,
    error::StoreError,
    models::comment::Comment,
    store::{
        NodeRepository, Snapshot, SnapshotMode, SortKey,
        repository::{Page, ScanFilter},
    },
};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// File-backed SQLite database, so that more than one connection sees the
/// same data.
pub struct FileDatabase {
    pub database: Database,
    path: PathBuf,
}

impl FileDatabase {
    pub async fn open() -> Self {
        let path = std::env::temp_dir().join(format!("comment-tree-{}.db", Uuid::new_v4()));
        let database = Database::connect(&format!("sqlite://{}", path.display()), 4)
            .await
            .expect("Failed to open file database");

        database
            .migrate()
            .await
            .expect("Failed to migrate database");

        Self { database, path }
    }

    pub async fn remove(self) {
        self.database.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Something another client does while a tree operation sits between two
/// levels of its closure.
pub enum Interference {
    /// Delete these rows and commit.
    Delete(Vec<Uuid>),
    /// Start a reply under this parent and leave it running.
    Reply(Uuid),
}

type PendingReply = Arc<Mutex<Option<JoinHandle<Result<Comment, StoreError>>>>>;

/// Repository wrapper that fires one `Interference` right after the first
/// `find_children` of the first snapshot it opens, and can stall commits.
pub struct Interfering {
    inner: Arc<dyn NodeRepository>,
    action: Mutex<Option<Interference>>,
    commit_delay: Option<Duration>,
    reply: PendingReply,
}

impl Interfering {
    pub fn new(inner: Arc<dyn NodeRepository>) -> Self {
        Self {
            inner,
            action: Mutex::new(None),
            commit_delay: None,
            reply: Arc::new(Mutex::new(None)),
        }
    }

    pub fn between_levels(self, action: Interference) -> Self {
        *self.action.lock().unwrap() = Some(action);
        self
    }

    pub fn stall_commit(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    /// The reply started by `Interference::Reply`, if it fired.
    pub fn take_reply(&self) -> Option<JoinHandle<Result<Comment, StoreError>>> {
        self.reply.lock().unwrap().take()
    }
}

struct InterferingSnapshot {
    inner: Box<dyn Snapshot>,
    repo: Arc<dyn NodeRepository>,
    action: Option<Interference>,
    commit_delay: Option<Duration>,
    reply: PendingReply,
}

#[async_trait]
impl Snapshot for InterferingSnapshot {
    async fn get_by_id(&mut self, id: Uuid) -> Result<Comment, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn find_children(
        &mut self,
        ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<Comment>, StoreError> {
        let children = self.inner.find_children(ids, limit).await?;

        match self.action.take() {
            Some(Interference::Delete(victims)) => {
                let mut other = self.repo.snapshot(SnapshotMode::Write).await?;
                other.delete_by_ids(&victims).await?;
                other.commit().await?;
            }
            Some(Interference::Reply(parent)) => {
                let repo = Arc::clone(&self.repo);
                let handle =
                    tokio::spawn(async move { repo.insert(Some(parent), "late reply").await });
                // Let the reply reach the database and block there.
                tokio::time::sleep(Duration::from_millis(100)).await;
                *self.reply.lock().unwrap() = Some(handle);
            }
            None => {}
        }

        Ok(children)
    }

    async fn delete_by_ids(&mut self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.inner.delete_by_ids(ids).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.commit().await
    }
}

#[async_trait]
impl NodeRepository for Interfering {
    async fn insert(&self, parent_id: Option<Uuid>, content: &str) -> Result<Comment, StoreError> {
        self.inner.insert(parent_id, content).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Comment, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn scan(
        &self,
        filter: &ScanFilter,
        sort: SortKey,
        page: Page,
    ) -> Result<Vec<Comment>, StoreError> {
        self.inner.scan(filter, sort, page).await
    }

    async fn snapshot(&self, mode: SnapshotMode) -> Result<Box<dyn Snapshot>, StoreError> {
        let action = self.action.lock().unwrap().take();
        let inner = self.inner.snapshot(mode).await?;
        Ok(Box::new(InterferingSnapshot {
            inner,
            repo: Arc::clone(&self.inner),
            action,
            commit_delay: self.commit_delay,
            reply: Arc::clone(&self.reply),
        }))
    }
}
