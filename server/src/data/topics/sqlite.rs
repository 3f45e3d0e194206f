//! SQLite storage backend
//!
//! One table per topic, named `q_<topic>`, holding `("offset", data,
//! created_at)` rows. The tail is measured by counting rows, so the whole
//! count-then-insert sequence runs inside one transaction under a per-topic
//! mutex; offsets come out dense and 0-based. The per-topic mutex only
//! serializes appends within this process; multi-process deployments would
//! need a database-level sequence instead.
//!
//! A missing topic surfaces from SQLite as a `no such table: q_<topic>`
//! error, which is mapped to [`StorageError::TopicNotFound`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::Mutex as AsyncMutex;

use super::backend::{Storage, valid_topic_name};
use super::error::StorageError;

use crate::core::constants::{SQLITE_BUSY_TIMEOUT_SECS, SQLITE_MAX_CONNECTIONS};

/// SQLite storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
    /// Per-topic append serialization for the count-then-insert sequence
    append_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SqliteStorage {
    /// Open (or create) the database file and build the connection pool.
    pub async fn init(db_path: &Path) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS));

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        tracing::debug!(path = %db_path.display(), "SqliteStorage initialized");
        Ok(Self {
            pool,
            append_locks: Mutex::new(HashMap::new()),
        })
    }

    fn append_lock(&self, topic: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.append_locks.lock();
        Arc::clone(locks.entry(topic.to_string()).or_default())
    }

    /// Table identifier for a topic. Topic names reach this backend already
    /// validated by the registry, but the alphabet is re-checked here since
    /// the name is spliced into SQL.
    fn table_name(topic: &str) -> Result<String, StorageError> {
        if !valid_topic_name(topic) {
            return Err(StorageError::Backend(format!(
                "invalid topic name '{topic}'"
            )));
        }
        Ok(format!("q_{topic}"))
    }

    fn map_table_error(topic: &str, table: &str, err: sqlx::Error) -> StorageError {
        let msg = err.to_string();
        if msg.contains(&format!("no such table: {table}")) {
            StorageError::TopicNotFound(topic.to_string())
        } else {
            StorageError::Backend(msg)
        }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create(&self, topic: &str) -> Result<(), StorageError> {
        let table = Self::table_name(topic)?;
        let ddl = format!(
            r#"CREATE TABLE IF NOT EXISTS "{table}" (
                "offset"   INTEGER PRIMARY KEY,
                data       BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )"#
        );
        let _ = sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn append(&self, topic: &str, records: &[Vec<u8>]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        let table = Self::table_name(topic)?;

        let lock = self.append_lock(topic);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{table}""#))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Self::map_table_error(topic, &table, e))?;

        let insert = format!(r#"INSERT INTO "{table}" ("offset", data) VALUES (?, ?)"#);
        for (i, record) in records.iter().enumerate() {
            let _ = sqlx::query(&insert)
                .bind(count + i as i64)
                .bind(record.as_slice())
                .execute(&mut *tx)
                .await
                .map_err(|e| Self::map_table_error(topic, &table, e))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn read(
        &self,
        topic: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        let table = Self::table_name(topic)?;
        let query = format!(
            r#"SELECT data FROM "{table}" WHERE "offset" >= ? ORDER BY "offset" ASC LIMIT ?"#
        );
        sqlx::query_scalar(&query)
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::map_table_error(topic, &table, e))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("SQLite pool closed");
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_storage() -> (tempfile::TempDir, SqliteStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::init(&dir.path().join("test.db"))
            .await
            .unwrap();
        (dir, storage)
    }

    fn rec(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_append_to_missing_topic_fails() {
        let (_dir, storage) = make_storage().await;
        let err = storage.append("nope", &[rec("a")]).await.unwrap_err();
        assert!(matches!(err, StorageError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn test_read_from_missing_topic_fails() {
        let (_dir, storage) = make_storage().await;
        let err = storage.read("nope", 0, 10).await.unwrap_err();
        assert!(matches!(err, StorageError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (_dir, storage) = make_storage().await;
        storage.create("t").await.unwrap();
        storage.append("t", &[rec("a")]).await.unwrap();
        storage.create("t").await.unwrap();
        assert_eq!(storage.read("t", 0, 10).await.unwrap(), vec![rec("a")]);
    }

    #[tokio::test]
    async fn test_offsets_are_dense_across_appends() {
        let (_dir, storage) = make_storage().await;
        storage.create("t").await.unwrap();
        storage.append("t", &[rec("a"), rec("b")]).await.unwrap();
        storage.append("t", &[rec("c")]).await.unwrap();

        let all = storage.read("t", 0, 100).await.unwrap();
        assert_eq!(all, vec![rec("a"), rec("b"), rec("c")]);
        // Offset 2 is exactly the third record
        assert_eq!(storage.read("t", 2, 10).await.unwrap(), vec![rec("c")]);
    }

    #[tokio::test]
    async fn test_read_windowing() {
        let (_dir, storage) = make_storage().await;
        storage.create("t").await.unwrap();
        let records: Vec<Vec<u8>> = (0..5).map(|i| rec(&i.to_string())).collect();
        storage.append("t", &records).await.unwrap();

        assert_eq!(
            storage.read("t", 1, 2).await.unwrap(),
            vec![rec("1"), rec("2")]
        );
        assert!(storage.read("t", 5, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_append_on_missing_topic_is_ok() {
        let (_dir, storage) = make_storage().await;
        storage.append("t", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let (_dir, storage) = make_storage().await;
        storage.create("a").await.unwrap();
        storage.create("b").await.unwrap();
        storage.append("a", &[rec("x")]).await.unwrap();
        assert!(storage.read("b", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_name_never_reaches_sql() {
        let (_dir, storage) = make_storage().await;
        let err = storage.create("bad name; --").await.unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_dir, storage) = make_storage().await;
        storage.health_check().await.unwrap();
    }
}
