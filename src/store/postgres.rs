use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
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

/// PostgreSQL-backed repository.
///
/// Search uses the english full-text configuration, matching the GIN index
/// created by the migration.
#[derive(Debug, Clone)]
pub struct PgNodeRepository {
    pool: PgPool,
}

impl PgNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn fetch_by_id(
    conn: &mut PgConnection,
    id: Uuid,
    lock_rows: bool,
) -> Result<Comment, StoreError> {
    let lock = if lock_rows { " FOR UPDATE" } else { "" };
    sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COLUMNS} FROM comments WHERE id = $1{lock}"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("Comment {id} not found")))
}

/// Tree reads inside one transaction.
///
/// Read snapshots run at REPEATABLE READ, so every level is read from the
/// same database snapshot. Write snapshots stay at READ COMMITTED and lock
/// each row they return with `FOR UPDATE`: a reply to a locked row waits on
/// its `FOR SHARE` parent check until the delete commits and then finds the
/// parent gone, and a reply committed before the lock is seen by the next
/// level's statement.
struct PgSnapshot {
    tx: Transaction<'static, Postgres>,
    lock_rows: bool,
}

#[async_trait]
impl Snapshot for PgSnapshot {
    async fn get_by_id(&mut self, id: Uuid) -> Result<Comment, StoreError> {
        fetch_by_id(&mut self.tx, id, self.lock_rows).await
    }

    async fn find_children(
        &mut self,
        ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<Comment>, StoreError> {
        if ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let lock = if self.lock_rows { " FOR UPDATE" } else { "" };
        let children = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COLUMNS} FROM comments WHERE parent_id = ANY($1) LIMIT $2{lock}"
        ))
        .bind(ids.to_vec())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(children)
    }

    async fn delete_by_ids(&mut self, ids: &[Uuid]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        // Referential actions run after the statement, so the count covers
        // every listed row.
        let deleted = sqlx::query("DELETE FROM comments WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        Ok(deleted)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl NodeRepository for PgNodeRepository {
    async fn insert(&self, parent_id: Option<Uuid>, content: &str) -> Result<Comment, StoreError> {
        validate_content(content)?;

        let mut tx = self.pool.begin().await?;

        if let Some(pid) = parent_id {
            // FOR SHARE blocks a concurrent delete of the parent until we commit.
            sqlx::query_scalar::<_, i32>("SELECT 1 FROM comments WHERE id = $1 FOR SHARE")
                .bind(pid)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("Parent comment {pid} not found")))?;
        }

        let now = Utc::now().trunc_subsecs(6);
        let comment = sqlx::query_as::<_, Comment>(&format!(
            r#"
            INSERT INTO comments (id, parent_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
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
        fetch_by_id(&mut conn, id, false).await
    }

    async fn scan(
        &self,
        filter: &ScanFilter,
        sort: SortKey,
        page: Page,
    ) -> Result<Vec<Comment>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {COLUMNS} FROM comments WHERE 1 = 1"
        ));

        if let Some(pid) = filter.parent_id {
            qb.push(" AND parent_id = ").push_bind(pid);
        }
        if let Some(term) = &filter.search {
            qb.push(" AND to_tsvector('english', content) @@ plainto_tsquery('english', ")
                .push_bind(term.clone())
                .push(")");
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
        let snapshot = match mode {
            SnapshotMode::Read => PgSnapshot {
                tx: self
                    .pool
                    .begin_with("BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY")
                    .await?,
                lock_rows: false,
            },
            SnapshotMode::Write => PgSnapshot {
                tx: self.pool.begin().await?,
                lock_rows: true,
            },
        };
        Ok(Box::new(snapshot))
    }
}
