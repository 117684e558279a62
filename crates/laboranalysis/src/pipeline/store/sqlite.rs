//! `SQLite`-backed queue store.
//!
//! Every stage is a collection inside one logical database; documents are kept
//! as canonical JSON so structural matching is a plain text comparison.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::pipeline::order::OrderDocument;
use crate::pipeline::queue::{QueueStore, StoreError};
use crate::pipeline::stage::Stage;
use crate::pipeline::transition::TransferOutcome;

const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    database_name TEXT NOT NULL,
    collection TEXT NOT NULL,
    document TEXT NOT NULL,
    enqueued_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_orders_collection ON orders (database_name, collection);

CREATE TABLE IF NOT EXISTS order_attempts (
    database_name TEXT NOT NULL,
    collection TEXT NOT NULL,
    document TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (database_name, collection, document)
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const INSERT_ORDER: &str =
    "INSERT INTO orders (database_name, collection, document) VALUES (?1, ?2, ?3)";

const DELETE_ONE_ORDER: &str = "DELETE FROM orders WHERE id = (\
     SELECT id FROM orders \
     WHERE database_name = ?1 AND collection = ?2 AND document = ?3 \
     ORDER BY id LIMIT 1)";

const ORDER_EXISTS: &str = "SELECT EXISTS(\
     SELECT 1 FROM orders WHERE database_name = ?1 AND collection = ?2 AND document = ?3)";

/// Queue store persisted in a `SQLite` file.
///
/// Create with [`SqliteQueueStore::open`] for a file-backed store or
/// [`SqliteQueueStore::in_memory`] for tests.
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
    database: String,
}

impl SqliteQueueStore {
    /// Open or create the store at `path`, scoping every collection to
    /// `database`.
    pub fn open(path: &Path, database: impl Into<String>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn, database.into())
    }

    pub fn in_memory(database: impl Into<String>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, database.into())
    }

    fn initialize(conn: Connection, database: String) -> Result<Self, StoreError> {
        // Stage workers run as separate processes against one file.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            database,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl std::fmt::Debug for SqliteQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteQueueStore")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl QueueStore for SqliteQueueStore {
    fn list_all(&self, stage: Stage) -> Result<Vec<OrderDocument>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document FROM orders \
             WHERE database_name = ?1 AND collection = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![self.database, stage.collection()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (row_id, raw) = row?;
            match OrderDocument::from_json(&raw) {
                Ok(document) => documents.push(document),
                Err(err) => warn!(
                    row_id,
                    stage = %stage,
                    error = %err,
                    "skipping stored document that is not a JSON object"
                ),
            }
        }
        Ok(documents)
    }

    fn enqueue(&self, stage: Stage, document: &OrderDocument) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        conn.execute(
            INSERT_ORDER,
            params![self.database, stage.collection(), document.canonical()],
        )?;
        Ok(())
    }

    fn remove(&self, stage: Stage, document: &OrderDocument) -> Result<bool, StoreError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute(
            DELETE_ONE_ORDER,
            params![self.database, stage.collection(), document.canonical()],
        )?;
        Ok(deleted > 0)
    }

    fn contains(&self, stage: Stage, document: &OrderDocument) -> Result<bool, StoreError> {
        let conn = self.lock_conn()?;
        let exists = conn.query_row(
            ORDER_EXISTS,
            params![self.database, stage.collection(), document.canonical()],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(exists)
    }

    /// Insert and delete inside one transaction, so a crash leaves the order in
    /// exactly one queue. Like the two-step move, only identified orders are
    /// skipped when the destination already holds them.
    fn transfer(
        &self,
        from: Stage,
        to: Stage,
        document: &OrderDocument,
    ) -> Result<TransferOutcome, StoreError> {
        let canonical = document.canonical();
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let already_there = document.id().is_some()
            && tx.query_row(
                ORDER_EXISTS,
                params![self.database, to.collection(), canonical],
                |row| row.get::<_, bool>(0),
            )?;
        if !already_there {
            tx.execute(
                INSERT_ORDER,
                params![self.database, to.collection(), canonical],
            )?;
        }
        let deleted = tx.execute(
            DELETE_ONE_ORDER,
            params![self.database, from.collection(), canonical],
        )?;
        tx.commit()?;

        Ok(TransferOutcome {
            enqueued: !already_there,
            removed: deleted > 0,
        })
    }

    fn record_attempt(&self, stage: Stage, document: &OrderDocument) -> Result<u32, StoreError> {
        let canonical = document.canonical();
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO order_attempts (database_name, collection, document, attempts) \
             VALUES (?1, ?2, ?3, 1) \
             ON CONFLICT(database_name, collection, document) \
             DO UPDATE SET attempts = attempts + 1, last_attempt_at = datetime('now')",
            params![self.database, stage.collection(), canonical],
        )?;
        let attempts = conn
            .query_row(
                "SELECT attempts FROM order_attempts \
                 WHERE database_name = ?1 AND collection = ?2 AND document = ?3",
                params![self.database, stage.collection(), canonical],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(attempts.unwrap_or(1))
    }

    fn clear_attempts(&self, stage: Stage, document: &OrderDocument) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM order_attempts \
             WHERE database_name = ?1 AND collection = ?2 AND document = ?3",
            params![self.database, stage.collection(), document.canonical()],
        )?;
        Ok(())
    }

    fn depth(&self, stage: Stage) -> Result<usize, StoreError> {
        let conn = self.lock_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE database_name = ?1 AND collection = ?2",
            params![self.database, stage.collection()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
