//! SQLite-backed storage.
//!
//! Provides persistent storage for:
//! - The key-value table the recovery records live in
//! - Finished task timings
//! - Closed interruption spans

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::data_dir;
use super::store::RecoveryStore;
use crate::error::StoreError;
use crate::interruption::InterruptionSpan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSessionRecord {
    pub id: i64,
    pub task_id: Option<String>,
    pub planned_duration_secs: u64,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
}

impl TaskSessionRecord {
    /// Positive when the task ran past its planned duration.
    pub fn overtime_ms(&self) -> i64 {
        self.elapsed_ms as i64 - self.planned_duration_secs.saturating_mul(1000) as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptionRecord {
    pub id: String,
    pub task_id: Option<String>,
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// SQLite database for recovery records and history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/dayline/dayline.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open_at(&dir.join("dayline.db"))
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_sessions (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id               TEXT,
                planned_duration_secs INTEGER NOT NULL,
                elapsed_ms            INTEGER NOT NULL,
                started_at            TEXT NOT NULL,
                stopped_at            TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS interruptions (
                id          TEXT PRIMARY KEY,
                task_id     TEXT,
                reason      TEXT,
                started_at  TEXT NOT NULL,
                ended_at    TEXT NOT NULL,
                duration_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_task_sessions_stopped_at ON task_sessions(stopped_at);
            CREATE INDEX IF NOT EXISTS idx_interruptions_started_at ON interruptions(started_at);",
        )?;
        Ok(())
    }

    // ── History ──────────────────────────────────────────────────────

    /// Record a finished task timing.
    pub fn record_task_session(
        &self,
        task_id: Option<&str>,
        planned_duration_secs: u64,
        elapsed_ms: u64,
        started_at: DateTime<Utc>,
        stopped_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO task_sessions (task_id, planned_duration_secs, elapsed_ms, started_at, stopped_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task_id,
                planned_duration_secs as i64,
                elapsed_ms as i64,
                started_at.to_rfc3339(),
                stopped_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Task timings stopped at or after `since`, oldest first.
    pub fn task_sessions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TaskSessionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, planned_duration_secs, elapsed_ms, started_at, stopped_at
             FROM task_sessions
             WHERE stopped_at >= ?1
             ORDER BY stopped_at ASC",
        )?;
        let rows = stmt.query_map(params![since.to_rfc3339()], |row| {
            Ok(TaskSessionRecord {
                id: row.get(0)?,
                task_id: row.get(1)?,
                planned_duration_secs: row.get::<_, i64>(2)?.max(0) as u64,
                elapsed_ms: row.get::<_, i64>(3)?.max(0) as u64,
                started_at: parse_ts(row.get::<_, String>(4)?, 4)?,
                stopped_at: parse_ts(row.get::<_, String>(5)?, 5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Record a closed interruption. Open spans are rejected.
    pub fn record_interruption(&self, span: &InterruptionSpan) -> Result<(), StoreError> {
        let Some(ended_at) = span.ended_at_wall_clock else {
            return Err(StoreError::QueryFailed(format!(
                "interruption {} is still open",
                span.id
            )));
        };
        self.conn.execute(
            "INSERT OR REPLACE INTO interruptions (id, task_id, reason, started_at, ended_at, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                span.id,
                span.task_id,
                span.reason,
                span.started_at_wall_clock.to_rfc3339(),
                ended_at.to_rfc3339(),
                span.duration_ms(ended_at) as i64,
            ],
        )?;
        Ok(())
    }

    /// Interruptions that started at or after `since`, oldest first.
    pub fn interruptions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InterruptionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, reason, started_at, ended_at, duration_ms
             FROM interruptions
             WHERE started_at >= ?1
             ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map(params![since.to_rfc3339()], |row| {
            Ok(InterruptionRecord {
                id: row.get(0)?,
                task_id: row.get(1)?,
                reason: row.get(2)?,
                started_at: parse_ts(row.get::<_, String>(3)?, 3)?,
                ended_at: parse_ts(row.get::<_, String>(4)?, 4)?,
                duration_ms: row.get::<_, i64>(5)?.max(0) as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Key-value ────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete a value from the kv store. Missing keys are fine.
    pub fn kv_delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl RecoveryStore for Database {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.kv_get(key)
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv_set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.kv_delete(key)
    }
}

fn parse_ts(raw: String, column: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_delete("test").unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_delete("test").unwrap();
    }

    #[test]
    fn task_sessions_are_filtered_by_stop_time() {
        let db = Database::open_memory().unwrap();
        db.record_task_session(Some("a"), 1500, 1_000_000, at(8, 0), at(8, 20))
            .unwrap();
        db.record_task_session(None, 600, 900_000, at(9, 0), at(9, 15))
            .unwrap();

        let all = db.task_sessions_since(at(0, 0)).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].task_id.as_deref(), Some("a"));
        assert_eq!(all[1].overtime_ms(), 300_000);

        let later = db.task_sessions_since(at(9, 0)).unwrap();
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn interruptions_roundtrip() {
        let db = Database::open_memory().unwrap();
        let mut span = InterruptionSpan::open(Some("phone".into()), Some("a".into()), at(10, 0));
        assert!(db.record_interruption(&span).is_err());

        span.ended_at_wall_clock = Some(at(10, 0) + TimeDelta::minutes(7));
        db.record_interruption(&span).unwrap();

        let rows = db.interruptions_since(at(0, 0)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_ms, 7 * 60 * 1000);
        assert_eq!(rows[0].reason.as_deref(), Some("phone"));
    }
}
