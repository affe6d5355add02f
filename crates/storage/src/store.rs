//! Checkpoint store contract and the SQLite implementation.

use crate::{Checkpoint, CheckpointId, CheckpointSummary, Error, Result, RunId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a connection waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistence for suspended runs.
///
/// Implementations must be safe to share between coordinator instances:
/// [`take`](CheckpointStore::take) is the single atomic consume-on-read that
/// gives resumption its at-most-once guarantee.
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint under a fresh id.
    fn save(&self, checkpoint: &Checkpoint) -> Result<CheckpointId>;

    /// Read a checkpoint without consuming it.
    fn load(&self, id: &CheckpointId) -> Result<Checkpoint>;

    /// Mark a checkpoint as used. Fails with `NotFound` if unknown or already consumed.
    fn consume(&self, id: &CheckpointId) -> Result<()>;

    /// Load and consume in one atomic step.
    fn take(&self, id: &CheckpointId) -> Result<Checkpoint>;

    /// Checkpoints still waiting for a decision, oldest first.
    fn pending(&self) -> Result<Vec<CheckpointSummary>>;
}

/// SQLite-backed checkpoint store.
///
/// Consumed rows are kept (with `consumed_at` set) as an audit trail.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create a checkpoint store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory checkpoint store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                consumed_at TEXT,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_pending
                ON checkpoints(consumed_at, created_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Unavailable("connection lock poisoned".into()))
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<CheckpointId> {
        let id = CheckpointId::generate();
        self.conn()?.execute(
            "INSERT INTO checkpoints (id, run_id, tool_name, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                checkpoint.run_id.to_string(),
                checkpoint.pending_call.tool_name,
                checkpoint.created_at.to_rfc3339(),
                serde_json::to_string(checkpoint)?,
            ],
        )?;
        tracing::debug!(checkpoint_id = %id, run_id = %checkpoint.run_id, "checkpoint saved");
        Ok(id)
    }

    fn load(&self, id: &CheckpointId) -> Result<Checkpoint> {
        let data: Option<String> = self
            .conn()?
            .query_row(
                "SELECT data FROM checkpoints WHERE id = ?1 AND consumed_at IS NULL",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let data = data.ok_or_else(|| Error::NotFound(id.clone()))?;
        Ok(serde_json::from_str(&data)?)
    }

    fn consume(&self, id: &CheckpointId) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE checkpoints SET consumed_at = ?2 WHERE id = ?1 AND consumed_at IS NULL",
            params![id.as_str(), Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(id.clone()));
        }
        Ok(())
    }

    fn take(&self, id: &CheckpointId) -> Result<Checkpoint> {
        // One statement: SQLite serializes writers, so across processes only
        // one UPDATE can flip consumed_at for a given row.
        let data: Option<String> = self
            .conn()?
            .query_row(
                "UPDATE checkpoints SET consumed_at = ?2
                 WHERE id = ?1 AND consumed_at IS NULL
                 RETURNING data",
                params![id.as_str(), Utc::now().to_rfc3339()],
                |row| row.get(0),
            )
            .optional()?;

        let data = data.ok_or_else(|| Error::NotFound(id.clone()))?;
        tracing::debug!(checkpoint_id = %id, "checkpoint consumed");
        Ok(serde_json::from_str(&data)?)
    }

    fn pending(&self) -> Result<Vec<CheckpointSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, tool_name, created_at FROM checkpoints
             WHERE consumed_at IS NULL ORDER BY created_at",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, run_id, tool_name, created_at) = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable checkpoint row");
                    continue;
                }
            };
            let parsed = (
                run_id.parse::<RunId>(),
                created_at.parse::<DateTime<Utc>>(),
            );
            let (Ok(run_id), Ok(created_at)) = parsed else {
                tracing::warn!(checkpoint_id = %id, "skipping checkpoint with corrupt run id or timestamp");
                continue;
            };
            summaries.push(CheckpointSummary {
                id: id.into(),
                run_id,
                tool_name,
                created_at,
            });
        }

        Ok(summaries)
    }
}
