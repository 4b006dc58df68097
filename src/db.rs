// src/db.rs

use std::{str::FromStr, sync::Arc, time::Duration};

use sqlx::{
    PgPool, SqlitePool,
    postgres::PgPoolOptions,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::store::{
    NodeRepository, postgres::PgNodeRepository, sqlite::SqliteNodeRepository,
};

/// Process-wide connection pool. Created once in `main`, injected into the
/// repository, and closed on shutdown.
#[derive(Debug, Clone)]
pub enum Database {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Database {
    /// Picks the backend from the URL scheme.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(3))
                .connect(url)
                .await?;
            return Ok(Database::Postgres(pool));
        }

        if url == "sqlite::memory:" {
            return Self::in_memory().await;
        }

        if url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(url)?
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal);
            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(3))
                .connect_with(options)
                .await?;
            return Ok(Database::Sqlite(pool));
        }

        Err(sqlx::Error::Configuration(
            format!("unsupported database url scheme: {url}").into(),
        ))
    }

    /// Private in-memory SQLite database.
    ///
    /// Each SQLite connection to `:memory:` sees its own database, so the pool
    /// is pinned to one connection that never expires.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Database::Sqlite(pool))
    }

    /// Applies the embedded migrations for the selected backend.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        match self {
            Database::Postgres(pool) => sqlx::migrate!("./migrations/postgres").run(pool).await,
            Database::Sqlite(pool) => sqlx::migrate!("./migrations/sqlite").run(pool).await,
        }
    }

    pub fn repository(&self) -> Arc<dyn NodeRepository> {
        match self {
            Database::Postgres(pool) => Arc::new(PgNodeRepository::new(pool.clone())),
            Database::Sqlite(pool) => Arc::new(SqliteNodeRepository::new(pool.clone())),
        }
    }

    pub async fn close(&self) {
        match self {
            Database::Postgres(pool) => pool.close().await,
            Database::Sqlite(pool) => pool.close().await,
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Database::Postgres(_) => "postgres",
            Database::Sqlite(_) => "sqlite",
        }
    }
}
