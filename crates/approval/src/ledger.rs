//! SQLite-backed approval ledger.
//!
//! The ledger is the gateway the CLI uses: `run` submits into it, an
//! operator records decisions with `decide`, and any process polling the
//! same file picks them up.

use crate::request::deadline;
use crate::{
    ApprovalGateway, ApprovalRequest, ApprovalRequestId, Decision, Error, RecordDecision, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A request that is still waiting for a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: ApprovalRequestId,
    pub request: ApprovalRequest,
    pub submitted_at: DateTime<Utc>,
}

/// Approval gateway persisted in SQLite.
pub struct LedgerGateway {
    conn: Mutex<Connection>,
    expire_after: Option<Duration>,
}

impl LedgerGateway {
    /// Open or create a ledger at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Answer requests still pending after `ttl` with a rejection.
    pub fn with_expiry(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS approval_requests (
                id TEXT PRIMARY KEY,
                tool_name TEXT NOT NULL,
                arguments TEXT NOT NULL,
                checkpoint_id TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                decided_at TEXT,
                approved INTEGER,
                feedback TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_approval_requests_checkpoint
                ON approval_requests(checkpoint_id);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            expire_after: None,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Unavailable("ledger lock poisoned".into()))
    }

    /// Requests without a decision, oldest first.
    pub fn pending(&self) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, tool_name, arguments, checkpoint_id, submitted_at
             FROM approval_requests WHERE decided_at IS NULL ORDER BY submitted_at",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, tool_name, arguments, checkpoint_id, submitted_at) = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable ledger row");
                    continue;
                }
            };
            let parsed = (
                serde_json::from_str::<serde_json::Value>(&arguments),
                submitted_at.parse::<DateTime<Utc>>(),
            );
            let (Ok(arguments), Ok(submitted_at)) = parsed else {
                tracing::warn!(approval_request_id = %id, "skipping request with corrupt arguments or timestamp");
                continue;
            };
            entries.push(LedgerEntry {
                id: id.into(),
                request: ApprovalRequest {
                    tool_name,
                    arguments,
                    checkpoint_id,
                },
                submitted_at,
            });
        }

        Ok(entries)
    }

    /// The request submitted for a checkpoint, if any.
    pub fn request_for_checkpoint(&self, checkpoint_id: &str) -> Result<Option<ApprovalRequestId>> {
        let id: Option<String> = self
            .conn()?
            .query_row(
                "SELECT id FROM approval_requests WHERE checkpoint_id = ?1
                 ORDER BY submitted_at DESC LIMIT 1",
                [checkpoint_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(ApprovalRequestId::from))
    }

    fn read_decision(conn: &Connection, id: &ApprovalRequestId) -> Result<Option<Decision>> {
        let row = conn
            .query_row(
                "SELECT checkpoint_id, decided_at, approved, feedback
                 FROM approval_requests WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<bool>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((checkpoint_id, decided_at, approved, feedback)) = row else {
            return Err(Error::NotFound(id.to_string()));
        };
        Ok(decided_at.map(|_| Decision {
            approval_request_id: id.clone(),
            approved: approved.unwrap_or(false),
            feedback,
            correlation: Some(checkpoint_id),
        }))
    }

    /// Write a decision if none exists yet; returns whether this call won.
    fn write_decision(
        conn: &Connection,
        id: &ApprovalRequestId,
        approved: bool,
        feedback: Option<&str>,
    ) -> Result<bool> {
        let updated = conn.execute(
            "UPDATE approval_requests SET decided_at = ?2, approved = ?3, feedback = ?4
             WHERE id = ?1 AND decided_at IS NULL",
            params![id.as_str(), Utc::now().to_rfc3339(), approved, feedback],
        )?;
        Ok(updated == 1)
    }
}

#[async_trait]
impl ApprovalGateway for LedgerGateway {
    async fn submit(&self, request: &ApprovalRequest) -> Result<ApprovalRequestId> {
        let id = ApprovalRequestId::generate();
        self.conn()?.execute(
            "INSERT INTO approval_requests (id, tool_name, arguments, checkpoint_id, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                request.tool_name,
                serde_json::to_string(&request.arguments)?,
                request.checkpoint_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tracing::info!(
            approval_request_id = %id,
            tool = %request.tool_name,
            checkpoint_id = %request.checkpoint_id,
            "approval requested"
        );
        Ok(id)
    }

    async fn fetch_decision(&self, id: &ApprovalRequestId) -> Result<Option<Decision>> {
        let conn = self.conn()?;
        if let Some(decision) = Self::read_decision(&conn, id)? {
            return Ok(Some(decision));
        }

        let submitted_at: String = conn
            .query_row(
                "SELECT submitted_at FROM approval_requests WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let submitted_at: DateTime<Utc> = submitted_at
            .parse()
            .map_err(|e| Error::Unavailable(format!("corrupt ledger timestamp: {e}")))?;

        let expired =
            deadline(submitted_at, self.expire_after).is_some_and(|at| Utc::now() >= at);
        if !expired {
            return Ok(None);
        }

        if Self::write_decision(&conn, id, false, Some(crate::EXPIRED_FEEDBACK))? {
            tracing::warn!(approval_request_id = %id, "approval request expired");
        }
        Self::read_decision(&conn, id)
    }
}

impl RecordDecision for LedgerGateway {
    fn record(
        &self,
        id: &ApprovalRequestId,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<Decision> {
        let conn = self.conn()?;
        if !Self::write_decision(&conn, id, approved, feedback.as_deref())? {
            // Either unknown or already answered; read_decision tells which.
            return match Self::read_decision(&conn, id)? {
                Some(_) => Err(Error::AlreadyDecided(id.to_string())),
                None => Err(Error::NotFound(id.to_string())),
            };
        }
        tracing::info!(approval_request_id = %id, approved, "decision recorded");
        Self::read_decision(&conn, id)?.ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
