use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use harvester_core::error::AppError;
use harvester_core::queue::{QueueRecord, QueueStats, UrlStatus};
use harvester_core::work_queue::{WorkQueue, dedupe_urls};

/// SQLite-backed work queue.
///
/// Every mutation takes the shared write lock and runs in one transaction,
/// so a lease's select and mark can never interleave with another writer.
#[derive(Clone)]
pub struct SqliteWorkQueue {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteWorkQueue {
    pub fn new(pool: SqlitePool, write_lock: Arc<Mutex<()>>) -> Self {
        Self { pool, write_lock }
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

/// Timestamps are stored as fractional Unix seconds.
fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

fn from_epoch_seconds(seconds: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64).unwrap_or_default()
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct UrlRow {
    url: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    leased_at: Option<f64>,
    first_seen: f64,
    updated_at: f64,
}

impl From<UrlRow> for QueueRecord {
    fn from(row: UrlRow) -> Self {
        QueueRecord {
            url: row.url,
            status: row.status.parse().unwrap_or(UrlStatus::Pending),
            attempts: row.attempts.max(0) as u32,
            last_error: row.last_error,
            leased_at: row.leased_at.map(from_epoch_seconds),
            first_seen: from_epoch_seconds(row.first_seen),
            updated_at: from_epoch_seconds(row.updated_at),
        }
    }
}

impl WorkQueue for SqliteWorkQueue {
    async fn admit(&self, urls: &[String]) -> Result<u64, AppError> {
        let unique = dedupe_urls(urls);
        if unique.is_empty() {
            return Ok(0);
        }
        let now = epoch_seconds(Utc::now());

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut inserted = 0;
        for url in &unique {
            let result = sqlx::query(
                r#"
                INSERT INTO urls (url, status, first_seen, updated_at)
                VALUES (?, 'pending', ?, ?)
                ON CONFLICT(url) DO NOTHING
                "#,
            )
            .bind(url)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            if result.rows_affected() > 0 {
                inserted += 1;
                continue;
            }

            sqlx::query(
                r#"
                UPDATE urls
                SET status = 'pending', attempts = 0, last_error = NULL,
                    leased_at = NULL, updated_at = ?
                WHERE url = ? AND status != 'processed'
                "#,
            )
            .bind(now)
            .bind(url)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(inserted)
    }

    async fn lease(&self, limit: usize, lease_duration: Duration) -> Result<Vec<String>, AppError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = epoch_seconds(Utc::now());

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let urls: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT url FROM urls
            WHERE status = 'pending'
               OR (status = 'leased' AND (? - leased_at) >= ?)
            ORDER BY updated_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(lease_duration.as_secs_f64())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        for url in &urls {
            sqlx::query(
                r#"
                UPDATE urls
                SET status = 'leased', leased_at = ?, updated_at = ?
                WHERE url = ?
                "#,
            )
            .bind(now)
            .bind(now)
            .bind(url)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(urls)
    }

    async fn ack_success(&self, url: &str) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            UPDATE urls
            SET status = 'processed', leased_at = NULL, last_error = NULL, updated_at = ?
            WHERE url = ?
            "#,
        )
        .bind(epoch_seconds(Utc::now()))
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn ack_fail(&self, url: &str, error: &str, max_attempts: u32) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            UPDATE urls
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= ? THEN 'failed' ELSE 'pending' END,
                last_error = ?,
                leased_at = NULL,
                updated_at = ?
            WHERE url = ?
            "#,
        )
        .bind(i64::from(max_attempts))
        .bind(error)
        .bind(epoch_seconds(Utc::now()))
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn is_processed(&self, url: &str) -> Result<bool, AppError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM urls WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(status.as_deref() == Some(UrlStatus::Processed.as_str()))
    }

    async fn stats(&self) -> Result<QueueStats, AppError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM urls GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match status.parse::<UrlStatus>() {
                Ok(status) => stats.add(status, count.max(0) as u64),
                Err(e) => tracing::warn!(error = %e, count, "Ignoring rows with unknown status"),
            }
        }
        Ok(stats)
    }

    async fn get(&self, url: &str) -> Result<Option<QueueRecord>, AppError> {
        let row = sqlx::query_as::<_, UrlRow>(
            r#"
            SELECT url, status, attempts, last_error, leased_at, first_seen, updated_at
            FROM urls WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }
}
