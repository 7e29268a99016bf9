//! SQLite-based snapshot storage and phase history.
//!
//! Provides persistent storage for:
//! - Timer snapshots, one per identity, in a key-value table
//! - Completed phases and the statistics derived from them

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::data_dir;
use super::migrations;
use super::snapshot::{PhaseRecord, Snapshot, SnapshotStore};
use crate::error::{DatabaseError, Result};
use crate::identity::Identity;
use crate::timer::Phase;

const SNAPSHOT_KEY_PREFIX: &str = "timer_state:";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub work_sessions: u64,
    pub focus_secs: u64,
    pub break_sessions: u64,
    pub break_secs: u64,
    /// Phases that completed while no process was running.
    pub retroactive: u64,
}

/// SQLite database for snapshots and history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/focusroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("focusroom.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Record a completed phase.
    pub fn insert_phase(&self, identity: &Identity, record: &PhaseRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO phase_history (identity, phase, duration_secs, completed_at, retroactive)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                identity.as_str(),
                record.phase.as_str(),
                record.duration_secs,
                record.completed_at.to_rfc3339(),
                record.retroactive,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Stats for phases completed on the current UTC day.
    pub fn stats_today(&self, identity: &Identity) -> Result<Stats> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.stats_since(identity, &format!("{today}T00:00:00+00:00"))
    }

    pub fn stats_all(&self, identity: &Identity) -> Result<Stats> {
        self.stats_since(identity, "")
    }

    /// Stats for phases whose RFC 3339 `completed_at` sorts at or after `since`.
    fn stats_since(&self, identity: &Identity, since: &str) -> Result<Stats> {
        let mut stmt = self.conn.prepare(
            "SELECT phase, COUNT(*), COALESCE(SUM(duration_secs), 0), COALESCE(SUM(retroactive), 0)
             FROM phase_history
             WHERE identity = ?1 AND completed_at >= ?2
             GROUP BY phase",
        )?;

        let mut stats = Stats::default();
        let rows = stmt.query_map(params![identity.as_str(), since], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        for row in rows {
            let (phase, count, secs, retroactive) = row?;
            stats.retroactive += retroactive;
            match phase.as_str() {
                "work" => {
                    stats.work_sessions += count;
                    stats.focus_secs += secs;
                }
                "break" => {
                    stats.break_sessions += count;
                    stats.break_secs += secs;
                }
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Most recent completed phases for `identity`, newest first.
    pub fn recent_phases(&self, identity: &Identity, limit: usize) -> Result<Vec<PhaseRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT phase, duration_secs, completed_at, retroactive
             FROM phase_history
             WHERE identity = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![identity.as_str(), limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (phase, duration_secs, completed_at, retroactive) = row?;
            let phase = match phase.as_str() {
                "work" => Phase::Work,
                "break" => Phase::Break,
                other => {
                    tracing::warn!(phase = other, "Skipping history row with unknown phase");
                    continue;
                }
            };
            let Ok(completed_at) = DateTime::parse_from_rfc3339(&completed_at) else {
                continue;
            };
            records.push(PhaseRecord {
                phase,
                duration_secs,
                completed_at: completed_at.with_timezone(&Utc),
                retroactive,
            });
        }
        Ok(records)
    }

    pub fn clear_history(&self, identity: &Identity) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM phase_history WHERE identity = ?1",
            params![identity.as_str()],
        )?;
        Ok(removed)
    }

    fn snapshot_key(identity: &Identity) -> String {
        format!("{SNAPSHOT_KEY_PREFIX}{identity}")
    }
}

impl SnapshotStore for Database {
    fn get(&self, identity: &Identity) -> Result<Option<Snapshot>> {
        Ok(self
            .kv_get(&Self::snapshot_key(identity))?
            .and_then(|raw| Snapshot::decode(&raw)))
    }

    fn put(&self, identity: &Identity, snapshot: &Snapshot) -> Result<()> {
        self.kv_set(&Self::snapshot_key(identity), &snapshot.encode()?)
    }

    fn delete(&self, identity: &Identity) -> Result<()> {
        self.kv_delete(&Self::snapshot_key(identity))
    }

    fn record_phase(&self, identity: &Identity, record: &PhaseRecord) -> Result<()> {
        self.insert_phase(identity, record).map(|_| ())
    }
}
