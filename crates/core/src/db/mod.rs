use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::errors::{Result, SidebarError};

pub mod conversations;
pub mod prompts;
pub mod retry;
pub mod schema;
pub mod transfer;

pub use conversations::{
    Conversation, ConversationDraft, ConversationStats, ConversationUpdate, HistoryManager,
};
pub use prompts::{Prompt, PromptDraft, PromptManager, PromptUpdate, PromptVariable};
pub use retry::RetryPolicy;
pub use transfer::{ImportFailure, ImportSummary, MergeStrategy};

/// Kept short so lock contention surfaces as `SQLITE_BUSY` and goes through
/// the retry backoff
const BUSY_TIMEOUT: Duration = Duration::from_millis(25);

/// Handle to the on-disk store
///
/// Owns the single SQLite connection. The connection is opened (and migrated)
/// eagerly by [`Db::open`] and reopened lazily whenever it has been closed or
/// stops answering, so callers never observe a stale handle.
pub struct Db {
    path:    PathBuf,
    version: u32,
    conn:    Mutex<Option<Connection>>,
}

impl Db {
    /// Open the store at `path`, migrating it to `version`
    pub async fn open(path: impl Into<PathBuf>, version: u32) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SidebarError::OpenError(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = open_connection(&path, version)?;
        info!(path = %path.display(), version, "Opened local store");

        Ok(Self {
            path,
            version,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Drop the live connection; the next operation reopens it
    pub async fn close(&self) {
        if self.conn.lock().await.take().is_some() {
            debug!(path = %self.path.display(), "Closed local store connection");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Run `f` against a live connection on the blocking pool
    ///
    /// The connection is moved into the blocking task and put back once `f`
    /// returns. It is reopened first when it has been closed or stops
    /// answering. A panicking task leaves the handle closed.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = self.conn.lock().await;
        let current = guard.take();
        let path = self.path.clone();
        let version = self.version;

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let mut conn = match current {
                Some(conn) if is_usable(&conn) => conn,
                stale => {
                    if stale.is_some() {
                        warn!(path = %path.display(), "Store connection unusable, reopening");
                    }
                    match open_connection(&path, version) {
                        Ok(conn) => conn,
                        Err(err) => return (None, Err(err)),
                    }
                },
            };
            let result = f(&mut conn);
            (Some(conn), result)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Store task failed: {}", e))?;

        *guard = conn;
        result
    }

    /// Run `f` through the retry executor against a live connection
    ///
    /// Every attempt re-checks the handle, so a connection dropped between
    /// attempts is reopened rather than reused.
    pub(crate) async fn execute<T, F>(&self, policy: &RetryPolicy, f: F) -> Result<T>
    where
        F: Fn(&mut Connection) -> Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        retry::run_with_retry(policy, || {
            let f = Arc::clone(&f);
            self.with_conn(move |conn| f(conn))
        })
        .await
    }
}

fn open_connection(path: &Path, version: u32) -> Result<Connection> {
    let mut conn = Connection::open(path).map_err(|e| {
        SidebarError::OpenError(format!("{}: {}", path.display(), e))
    })?;

    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;

    schema::migrate(&mut conn, version)?;
    Ok(conn)
}

fn is_usable(conn: &Connection) -> bool {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
}

/// Rewrite the multi-entry tag index rows for one record
///
/// `table` is one of the fixed `*_tags` tables from the schema.
pub(crate) fn write_tag_index(
    conn: &Connection,
    table: &'static str,
    record_id: i64,
    tags: &[String],
) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE record_id = ?1", table),
        params![record_id],
    )?;

    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} (record_id, position, tag) VALUES (?1, ?2, ?3)",
        table
    ))?;
    for (position, tag) in tags.iter().enumerate() {
        stmt.execute(params![record_id, position as i64, tag])?;
    }
    Ok(())
}

/// Current time in epoch milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Decode a JSON text column inside a row mapper
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Both collections behind one shared connection
///
/// This is what hosts construct: one per profile, passed to the command
/// registry and the bridge.
pub struct LocalStore {
    db:          Arc<Db>,
    pub history: HistoryManager,
    pub prompts: PromptManager,
}

impl LocalStore {
    /// Open the store described by `config`
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let db = Arc::new(Db::open(&config.db_path, config.schema_version).await?);
        Ok(Self::with_db(db, config.retry))
    }

    /// Wrap an already opened handle
    pub fn with_db(db: Arc<Db>, retry: RetryPolicy) -> Self {
        Self {
            history: HistoryManager::new(Arc::clone(&db), retry),
            prompts: PromptManager::new(Arc::clone(&db), retry),
            db,
        }
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("store.db");

        let db = Db::open(&path, schema::CURRENT_VERSION).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.version(), schema::CURRENT_VERSION);
        assert!(db.is_open().await);
    }

    #[tokio::test]
    async fn test_reopens_after_close() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path().join("store.db"), schema::CURRENT_VERSION)
            .await
            .unwrap();

        db.close().await;
        assert!(!db.is_open().await);

        let version = db.with_conn(|conn| schema::user_version(conn)).await.unwrap();
        assert_eq!(version, schema::CURRENT_VERSION);
        assert!(db.is_open().await);
    }

    #[tokio::test]
    async fn test_open_rejects_newer_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        Db::open(&path, schema::CURRENT_VERSION).await.unwrap();

        let result = Db::open(&path, 1).await;
        assert!(matches!(result, Err(SidebarError::OpenError(_))));
    }

    #[tokio::test]
    async fn test_write_tag_index_replaces_rows() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path().join("store.db"), schema::CURRENT_VERSION)
            .await
            .unwrap();

        let tags = db
            .with_conn(|conn| {
                write_tag_index(conn, "prompt_tags", 1, &["a".into(), "b".into()])?;
                write_tag_index(conn, "prompt_tags", 1, &["c".into()])?;
                let mut stmt =
                    conn.prepare("SELECT tag FROM prompt_tags WHERE record_id = 1 ORDER BY position")?;
                let tags = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(tags)
            })
            .await
            .unwrap();

        assert_eq!(tags, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_panicking_task_closes_handle() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path().join("store.db"), schema::CURRENT_VERSION)
            .await
            .unwrap();

        let err = db
            .with_conn(|_conn| -> Result<()> { panic!("boom") })
            .await
            .unwrap_err();
        assert_eq!(err.category(), "other");
        assert!(err.to_string().starts_with("Store task failed"));
        assert!(!db.is_open().await);

        let version = db.with_conn(|conn| schema::user_version(conn)).await.unwrap();
        assert_eq!(version, schema::CURRENT_VERSION);
    }

    fn hold_write_lock(path: &Path) -> Connection {
        let blocker = Connection::open(path).unwrap();
        blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();
        blocker
    }

    #[tokio::test]
    async fn test_lock_contention_backs_off_instead_of_blocking() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let db = Arc::new(Db::open(&path, schema::CURRENT_VERSION).await.unwrap());
        let store = LocalStore::with_db(db, RetryPolicy::default());

        let _blocker = hold_write_lock(&path);

        let started = std::time::Instant::now();
        let err = store
            .prompts
            .save_prompt(PromptDraft::new("Locked", "waits"))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.category(), "database");
        // Two backoff sleeps (100 + 200 ms) plus three short busy waits
        assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_retry_succeeds_once_lock_is_released() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let db = Arc::new(Db::open(&path, schema::CURRENT_VERSION).await.unwrap());
        let store = LocalStore::with_db(db, RetryPolicy::default());

        let blocker = hold_write_lock(&path);
        let release = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            blocker.execute_batch("COMMIT").unwrap();
        });

        let saved = store
            .prompts
            .save_prompt(PromptDraft::new("Eventually", "saved"))
            .await
            .unwrap();
        release.join().unwrap();

        assert!(saved.id > 0);
        assert_eq!(store.prompts.get_prompt(saved.id).await.unwrap(), Some(saved));
    }
}
