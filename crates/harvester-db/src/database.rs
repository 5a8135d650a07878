use std::sync::Arc;

use harvester_core::AppError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::config::QueueDbConfig;
use crate::queue_repository::SqliteWorkQueue;

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS urls (
        url TEXT PRIMARY KEY,
        status TEXT NOT NULL CHECK (status IN ('pending', 'leased', 'processed', 'failed')),
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        leased_at REAL,
        first_seen REAL NOT NULL,
        updated_at REAL NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_urls_status_updated ON urls(status, updated_at)"#,
];

/// Central database facade: owns the connection pool and the write lock,
/// runs migrations, and vends queue handles.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Database {
    /// Open (creating if needed) the SQLite file at `config.path`.
    pub async fn connect(config: &QueueDbConfig) -> Result<Self, AppError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        let db = Self::from_pool(pool);
        if config.wal {
            db.enable_wal().await;
        }
        Ok(db)
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Switch to WAL journaling. Failure leaves the default journal in place.
    async fn enable_wal(&self) {
        match sqlx::query_scalar::<_, String>("PRAGMA journal_mode=WAL")
            .fetch_one(&self.pool)
            .await
        {
            Ok(mode) if mode.eq_ignore_ascii_case("wal") => {
                tracing::debug!("SQLite WAL journaling enabled");
            }
            Ok(mode) => {
                tracing::warn!(%mode, "SQLite refused WAL journaling; using default mode");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Unable to enable SQLite WAL journaling; falling back to default mode"
                );
            }
        }
    }

    /// Create the queue table and indexes.
    pub async fn migrate(&self) -> Result<(), AppError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        }
        Ok(())
    }

    /// Get a [`SqliteWorkQueue`] backed by this pool. All handles share one
    /// write lock.
    pub fn queue(&self) -> SqliteWorkQueue {
        SqliteWorkQueue::new(self.pool.clone(), Arc::clone(&self.write_lock))
    }

    /// Current journal mode, lower-cased.
    pub async fn journal_mode(&self) -> Result<String, AppError> {
        sqlx::query_scalar::<_, String>("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await
            .map(|mode| mode.to_lowercase())
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
