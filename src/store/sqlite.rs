use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::comment::{Comment, validate_content},
    store::{
        query::SortKey,
        repository::{
            NodeRepository, Page, ScanFilter, Snapshot, SnapshotMode, map_insert_error,
        },
    },
};

const COLUMNS: &str = "id, parent_id, content, created_at, updated_at";

/// SQLite caps bound parameters per statement; frontiers and delete sets are
/// split into chunks of this size.
const BIND_CHUNK: usize = 500;

/// SQLite-backed repository, used for embedded deployments and tests.
///
/// Search is a case-insensitive substring match (`LIKE`).
#[derive(Debug, Clone)]
pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so that lexical order in
/// SQL matches chronological order.
fn sortable_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Escapes `LIKE` wildcards so the term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

async fn fetch_by_id(conn: &mut SqliteConnection, id: Uuid) -> Result<Comment, StoreError> {
    sqlx::query_as::<_, Comment>(&format!("SELECT {COLUMNS} FROM comments WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Comment {id} not found")))
}

async fn fetch_children(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
    limit: usize,
) -> Result<Vec<Comment>, StoreError> {
    let mut children = Vec::new();

    for chunk in ids.chunks(BIND_CHUNK) {
        let remaining = limit.saturating_sub(children.len());
        if remaining == 0 {
            break;
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM comments WHERE parent_id IN ("
        ));
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        qb.push(" LIMIT ")
            .push_bind(i64::try_from(remaining).unwrap_or(i64::MAX));

        children.extend(qb.build_query_as::<Comment>().fetch_all(&mut *conn).await?);
    }

    Ok(children)
}

async fn delete_rows(conn: &mut SqliteConnection, ids: &[Uuid]) -> Result<u64, StoreError> {
    // SQLite applies ON DELETE CASCADE row by row and does not count the
    // cascaded rows, so count up front on the same connection.
    let mut existing: i64 = 0;
    for chunk in ids.chunks(BIND_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM comments WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        existing += qb.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;
    }

    for chunk in ids.chunks(BIND_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM comments WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        qb.build().execute(&mut *conn).await?;
    }

    Ok(existing as u64)
}

/// A single SQLite transaction. In WAL mode the first read pins the snapshot
/// that every later read in the transaction sees.
struct SqliteSnapshot {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl Snapshot for SqliteSnapshot {
    async fn get_by_id(&mut self, id: Uuid) -> Result<Comment, StoreError> {
        fetch_by_id(&mut self.tx, id).await
    }

    async fn find_children(
        &mut self,
        ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<Comment>, StoreError> {
        fetch_children(&mut self.tx, ids, limit).await
    }

    async fn delete_by_ids(&mut self, ids: &[Uuid]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        delete_rows(&mut self.tx, ids).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    async fn insert(&self, parent_id: Option<Uuid>, content: &str) -> Result<Comment, StoreError> {
        validate_content(content)?;

        // IMMEDIATE takes the write lock before the parent check, so a
        // concurrent subtree delete either finishes first or waits for us.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        if let Some(pid) = parent_id {
            sqlx::query_scalar::<_, i32>("SELECT 1 FROM comments WHERE id = ?")
                .bind(pid)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("Parent comment {pid} not found")))?;
        }

        let now = sortable_timestamp(Utc::now());
        let comment = sqlx::query_as::<_, Comment>(&format!(
            r#"
            INSERT INTO comments (id, parent_id, content, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(parent_id)
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, parent_id))?;

        tx.commit().await.map_err(|e| map_insert_error(e, parent_id))?;

        Ok(comment)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Comment, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut conn, id).await
    }

    async fn scan(
        &self,
        filter: &ScanFilter,
        sort: SortKey,
        page: Page,
    ) -> Result<Vec<Comment>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM comments WHERE 1 = 1"
        ));

        if let Some(pid) = filter.parent_id {
            qb.push(" AND parent_id = ").push_bind(pid);
        }
        if let Some(term) = &filter.search {
            qb.push(" AND content LIKE ")
                .push_bind(like_pattern(term))
                .push(" ESCAPE '\\'");
        }

        qb.push(" ORDER BY ").push(sort.order_by());
        qb.push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let comments = qb.build_query_as::<Comment>().fetch_all(&self.pool).await?;
        Ok(comments)
    }

    async fn snapshot(&self, mode: SnapshotMode) -> Result<Box<dyn Snapshot>, StoreError> {
        let tx = match mode {
            SnapshotMode::Read => self.pool.begin().await?,
            // A deferred transaction that has already read cannot upgrade to a
            // writer once someone else commits, so lock first.
            SnapshotMode::Write => self.pool.begin_with("BEGIN IMMEDIATE").await?,
        };
        Ok(Box::new(SqliteSnapshot { tx }))
    }
}
