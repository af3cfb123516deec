use std::collections::HashSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::fingerprint::HunkFingerprint;

/// Errors that can occur while persisting decisions.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("invalid decision status: {0}")]
    InvalidStatus(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Review status of a hunk. `Unknown` is the absence of a stored decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStatus {
    Unknown,
    Skipped,
    Accepted,
}

/// A stored decision: what the reviewer chose and when (unix milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub status: DecisionStatus,
    pub timestamp: i64,
}

/// SQLite-backed persistent decision map, keyed by hunk fingerprint.
///
/// One store per repository. Timestamps are strictly monotonic so that a
/// burst of recorded decisions (whole-file accept) still has a well-defined
/// most-recent entry for undo.
pub struct DecisionStore {
    conn: Connection,
    last_timestamp: i64,
}

impl DecisionStore {
    /// Open or create the decision store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS decisions (
                fingerprint TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;
        let last_timestamp: i64 =
            conn.query_row("SELECT COALESCE(MAX(timestamp), 0) FROM decisions", [], |row| {
                row.get(0)
            })?;
        Ok(Self {
            conn,
            last_timestamp,
        })
    }

    /// Look up a hunk's status; `Unknown` when nothing is stored.
    pub fn status(&self, fingerprint: HunkFingerprint) -> Result<DecisionStatus> {
        Ok(self
            .decision(fingerprint)?
            .map_or(DecisionStatus::Unknown, |d| d.status))
    }

    /// Full stored decision for a hunk, if any.
    pub fn decision(&self, fingerprint: HunkFingerprint) -> Result<Option<Decision>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, timestamp FROM decisions WHERE fingerprint = ?1")?;
        let row: Option<(String, i64)> = stmt
            .query_row(params![fingerprint.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        match row {
            None => Ok(None),
            Some((status, timestamp)) => Ok(Some(Decision {
                status: status_from_str(&status)?,
                timestamp,
            })),
        }
    }

    /// Record a decision for a hunk, stamping it with the next timestamp.
    /// Recording `Unknown` clears the entry instead.
    pub fn record(&mut self, fingerprint: HunkFingerprint, status: DecisionStatus) -> Result<()> {
        if status == DecisionStatus::Unknown {
            return self.clear(fingerprint);
        }
        let timestamp = self.next_timestamp();
        self.conn.execute(
            "INSERT OR REPLACE INTO decisions (fingerprint, status, timestamp)
             VALUES (?1, ?2, ?3)",
            params![fingerprint.to_string(), status_to_str(status), timestamp],
        )?;
        Ok(())
    }

    /// Remove the decision for one hunk, returning it to `Unknown`.
    pub fn clear(&mut self, fingerprint: HunkFingerprint) -> Result<()> {
        self.conn.execute(
            "DELETE FROM decisions WHERE fingerprint = ?1",
            params![fingerprint.to_string()],
        )?;
        Ok(())
    }

    /// Remove every decision for the repository.
    pub fn forget_all(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM decisions", [])?;
        Ok(())
    }

    /// Drop stored decisions whose hunks have vanished from the current
    /// snapshot, unless they are accepted: an accepted decision survives
    /// until `forget_all`.
    pub fn prune(&mut self, live: &HashSet<HunkFingerprint>) -> Result<()> {
        let live: HashSet<String> = live.iter().map(|fp| fp.to_string()).collect();
        let stale: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT fingerprint FROM decisions WHERE status != 'accepted'")?;
            stmt.query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|fp| !live.contains(fp))
                .collect()
        };
        for fingerprint in stale {
            self.conn.execute(
                "DELETE FROM decisions WHERE fingerprint = ?1",
                params![fingerprint],
            )?;
        }
        Ok(())
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }
}

fn status_to_str(status: DecisionStatus) -> &'static str {
    match status {
        DecisionStatus::Unknown => "unknown",
        DecisionStatus::Skipped => "skipped",
        DecisionStatus::Accepted => "accepted",
    }
}

fn status_from_str(s: &str) -> Result<DecisionStatus> {
    match s {
        "skipped" => Ok(DecisionStatus::Skipped),
        "accepted" => Ok(DecisionStatus::Accepted),
        other => Err(StoreError::InvalidStatus(other.to_owned())),
    }
}
