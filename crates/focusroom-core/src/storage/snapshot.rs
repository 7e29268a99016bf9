//! Snapshot persistence surface.
//!
//! A [`Snapshot`] is the timer state as of one wall-clock instant. The engine
//! writes one per identity on every tick and every command; on startup the
//! reconciler replays the time elapsed since `captured_at_ms`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::timer::{Phase, TimerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Epoch milliseconds of the write; `None` while paused.
    pub captured_at_ms: Option<i64>,
    /// Remaining seconds as of `captured_at_ms`.
    pub duration_secs: u64,
    pub phase: Phase,
    pub running: bool,
    #[serde(default)]
    pub completed_work_sessions: u64,
}

impl Snapshot {
    /// Capture `state`. The anchor is only kept while running.
    pub fn capture(state: &TimerState, now_ms: i64) -> Self {
        Self::capture_with_duration(state, state.remaining_secs, now_ms)
    }

    /// Like [`Snapshot::capture`] but with an explicit remaining duration.
    pub fn capture_with_duration(state: &TimerState, duration_secs: u64, now_ms: i64) -> Self {
        Self {
            captured_at_ms: state.running.then_some(now_ms),
            duration_secs,
            phase: state.phase,
            running: state.running,
            completed_work_sessions: state.completed_work_sessions,
        }
    }

    /// Decode a stored payload. Anything malformed reads as absent.
    pub fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "Discarding malformed timer snapshot");
                None
            }
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One completed phase, appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub duration_secs: u64,
    pub completed_at: DateTime<Utc>,
    /// Completed while no process was observing the timer.
    pub retroactive: bool,
}

/// Keyed persistence for timer snapshots.
///
/// Implementations must be durable across process restarts for anything
/// other than tests. There is at most one writer per identity.
pub trait SnapshotStore {
    /// Read the last snapshot for `identity`.
    ///
    /// Malformed payloads should come back as `Ok(None)`.
    fn get(&self, identity: &Identity) -> Result<Option<Snapshot>>;

    fn put(&self, identity: &Identity, snapshot: &Snapshot) -> Result<()>;

    fn delete(&self, identity: &Identity) -> Result<()>;

    /// Append a completed phase to the history. Stores without a history
    /// ignore it.
    fn record_phase(&self, _identity: &Identity, _record: &PhaseRecord) -> Result<()> {
        Ok(())
    }
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    fn get(&self, identity: &Identity) -> Result<Option<Snapshot>> {
        (**self).get(identity)
    }

    fn put(&self, identity: &Identity, snapshot: &Snapshot) -> Result<()> {
        (**self).put(identity, snapshot)
    }

    fn delete(&self, identity: &Identity) -> Result<()> {
        (**self).delete(identity)
    }

    fn record_phase(&self, identity: &Identity, record: &PhaseRecord) -> Result<()> {
        (**self).record_phase(identity, record)
    }
}

/// In-process store holding encoded payloads, like the SQLite kv table does.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<Identity, String>>,
    history: Mutex<Vec<(Identity, PhaseRecord)>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw payload as-is, bypassing encoding.
    pub fn put_raw(&self, identity: &Identity, raw: &str) {
        self.lock_entries()
            .insert(identity.clone(), raw.to_string());
    }

    /// Number of phases recorded for `identity`.
    pub fn history_len(&self, identity: &Identity) -> usize {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(id, _)| id == identity)
            .count()
    }

    pub fn history(&self, identity: &Identity) -> Vec<PhaseRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(id, _)| id == identity)
            .map(|(_, record)| record.clone())
            .collect()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<Identity, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, identity: &Identity) -> Result<Option<Snapshot>> {
        Ok(self
            .lock_entries()
            .get(identity)
            .and_then(|raw| Snapshot::decode(raw)))
    }

    fn put(&self, identity: &Identity, snapshot: &Snapshot) -> Result<()> {
        let raw = snapshot.encode()?;
        self.lock_entries().insert(identity.clone(), raw);
        Ok(())
    }

    fn delete(&self, identity: &Identity) -> Result<()> {
        self.lock_entries().remove(identity);
        Ok(())
    }

    fn record_phase(&self, identity: &Identity, record: &PhaseRecord) -> Result<()> {
        self.history
            .lock()
            .map_err(|_| CoreError::Custom("phase history lock poisoned".into()))?
            .push((identity.clone(), record.clone()));
        Ok(())
    }
}
