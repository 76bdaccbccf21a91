//! SQLite storage layer -- connection pool, schema, task collection.
//!
//! The task collection is persisted as a single named entry in a key-value
//! table: one JSON array holding every ScheduledTask. A second entry carries
//! the last-check timestamp used for restart recovery. Callers always re-read
//! the collection before acting on it; nothing is cached across wake-ups.

pub mod schema;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;
use tracing::warn;

use crate::scheduler::ScheduledTask;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Named entry holding the JSON array of scheduled tasks.
const TASKS_KEY: &str = "scheduled_scrape_tasks";

/// Named entry holding the ISO-8601 timestamp of the last due-task check.
const LAST_CHECK_KEY: &str = "last_task_check";

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Handle to the persisted task collection.
///
/// `load` and `save` are each atomic; `update` additionally holds an
/// in-process mutex across the whole read-modify-write cycle so concurrent
/// mutators (executions finishing, API edits) cannot drop each other's
/// changes. Distinct processes sharing the database file remain
/// last-writer-wins.
#[derive(Clone)]
pub struct TaskStore {
    pool: Pool,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl TaskStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Load every scheduled task. Missing or corrupt data loads as an empty
    /// collection; corruption is logged, never fatal.
    pub async fn load(&self) -> Result<Vec<ScheduledTask>> {
        self.read_tasks()
    }

    /// Overwrite the whole persisted collection.
    pub async fn save(&self, tasks: &[ScheduledTask]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_tasks(tasks)
    }

    /// Read-modify-write the collection under the store mutex.
    ///
    /// The closure sees the freshest persisted state and its return value is
    /// handed back after the write lands.
    pub async fn update<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<ScheduledTask>) -> T,
    {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.read_tasks()?;
        let out = mutate(&mut tasks);
        self.write_tasks(&tasks)?;
        Ok(out)
    }

    /// Timestamp of the last completed due-task check, if any.
    pub async fn last_check(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.pool.get()?;
        let raw = kv_get(&conn, LAST_CHECK_KEY)?;
        match raw {
            None => Ok(None),
            Some(text) => match DateTime::parse_from_rfc3339(&text) {
                Ok(dt) => Ok(Some(dt.with_timezone(&Utc))),
                Err(e) => {
                    warn!(error = %e, "last-check timestamp unreadable, ignoring");
                    Ok(None)
                }
            },
        }
    }

    /// Persist the last-check timestamp.
    pub async fn set_last_check(&self, at: DateTime<Utc>) -> Result<()> {
        let conn = self.pool.get()?;
        kv_set(&conn, LAST_CHECK_KEY, &at.to_rfc3339())
    }

    fn read_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let conn = self.pool.get()?;
        let raw = kv_get(&conn, TASKS_KEY)?;
        match raw {
            None => Ok(Vec::new()),
            Some(text) => match serde_json::from_str(&text) {
                Ok(tasks) => Ok(tasks),
                Err(e) => {
                    warn!(error = %e, "task collection corrupt, starting empty");
                    Ok(Vec::new())
                }
            },
        }
    }

    fn write_tasks(&self, tasks: &[ScheduledTask]) -> Result<()> {
        let conn = self.pool.get()?;
        let text = serde_json::to_string(tasks).context("failed to serialize task collection")?;
        kv_set(&conn, TASKS_KEY, &text)
    }
}

fn kv_get(conn: &rusqlite::Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(value)
}

fn kv_set(conn: &rusqlite::Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, value],
    )
    .with_context(|| format!("failed to write kv entry '{key}'"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskSpec;
    use chrono::Duration;

    fn test_store() -> (TaskStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let pool = open_pool(path.to_str().unwrap()).unwrap();
        (TaskStore::new(pool), dir)
    }

    fn sample_task(retailer: &str) -> ScheduledTask {
        ScheduledTask::create(TaskSpec {
            retailer: retailer.to_string(),
            source_url: "https://shop.example/deals".to_string(),
            div_selector: ".product-grid".to_string(),
            update_frequency: 30,
            priority: Some(7),
        })
        .unwrap()
    }

    #[test]
    fn test_load_missing_is_empty() {
        let (store, _dir) = test_store();
        let tasks = tokio_test::block_on(store.load()).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (store, _dir) = test_store();
        let mut task = sample_task("example");
        task.last_run = Some(Utc::now() - Duration::minutes(5));

        tokio_test::block_on(store.save(std::slice::from_ref(&task))).unwrap();
        let loaded = tokio_test::block_on(store.load()).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, task.id);
        assert_eq!(loaded[0].retailer, "example");
        assert_eq!(loaded[0].priority, 7);
        assert_eq!(loaded[0].last_run, task.last_run);
    }

    #[test]
    fn test_corrupt_collection_loads_empty() {
        let (store, _dir) = test_store();
        let conn = store.pool.get().unwrap();
        kv_set(&conn, TASKS_KEY, "{not json[").unwrap();

        let tasks = tokio_test::block_on(store.load()).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_update_applies_mutation() {
        let (store, _dir) = test_store();
        tokio_test::block_on(store.save(&[sample_task("a"), sample_task("b")])).unwrap();

        let removed = tokio_test::block_on(store.update(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.retailer != "a");
            before - tasks.len()
        }))
        .unwrap();

        assert_eq!(removed, 1);
        let loaded = tokio_test::block_on(store.load()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].retailer, "b");
    }

    #[test]
    fn test_last_check_round_trip() {
        let (store, _dir) = test_store();
        assert!(tokio_test::block_on(store.last_check()).unwrap().is_none());

        let at = Utc::now();
        tokio_test::block_on(store.set_last_check(at)).unwrap();
        let loaded = tokio_test::block_on(store.last_check()).unwrap().unwrap();
        // RFC 3339 keeps sub-second precision, so the instant survives intact.
        assert_eq!(loaded, at);
    }

    #[test]
    fn test_unreadable_last_check_is_none() {
        let (store, _dir) = test_store();
        let conn = store.pool.get().unwrap();
        kv_set(&conn, LAST_CHECK_KEY, "yesterday-ish").unwrap();

        assert!(tokio_test::block_on(store.last_check()).unwrap().is_none());
    }
}
