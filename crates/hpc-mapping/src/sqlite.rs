//! SQLite-backed mapping store: transactional per-key upsert, safe across processes.

use async_trait::async_trait;
use hpc_types::{MappingStore, MappingStoreError};
use rusqlite::OptionalExtension;
use std::path::Path;

pub struct SqliteMappingStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteMappingStore {
    /// Open (or create) the mapping database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MappingStoreError> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| MappingStoreError::Other(e.to_string()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, MappingStoreError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| MappingStoreError::Other(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self, MappingStoreError> {
        // Other processes may hold the write lock briefly.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| MappingStoreError::Other(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS task_mappings (
                task_id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| MappingStoreError::Other(e.to_string()))?;

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, MappingStoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MappingStoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| MappingStoreError::Other(e.to_string()))
    }
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn put(&self, task_id: &str, job_id: &str) -> Result<(), MappingStoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO task_mappings (task_id, job_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(task_id) DO UPDATE SET job_id = excluded.job_id, updated_at = excluded.updated_at",
                rusqlite::params![task_id, job_id, now],
            )
        })?;
        tracing::debug!(task_id = %task_id, job_id = %job_id, "task mapping upserted");
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<String>, MappingStoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT job_id FROM task_mappings WHERE task_id = ?1",
                rusqlite::params![task_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
    }
}
