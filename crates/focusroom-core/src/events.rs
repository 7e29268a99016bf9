use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Every state change in the session engine produces an Event.
/// The CLI prints them; the driver streams them to its subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        work_secs: u64,
        at: DateTime<Utc>,
    },
    BreakSkipped {
        work_secs: u64,
        at: DateTime<Utc>,
    },
    /// A phase ran out. `retroactive` is set when it ran out while no
    /// process was observing the timer.
    PhaseCompleted {
        phase: Phase,
        next_phase: Phase,
        next_duration_secs: u64,
        long_break: bool,
        completed_work_sessions: u64,
        retroactive: bool,
        at: DateTime<Utc>,
    },
    /// Stored snapshot was deleted; the cadence counter starts over.
    SessionCleared {
        at: DateTime<Utc>,
    },
    StateSnapshot {
        identity: String,
        phase: Phase,
        running: bool,
        remaining_secs: u64,
        total_secs: u64,
        clock: String,
        progress_pct: f64,
        completed_work_sessions: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn is_phase_completed(&self) -> bool {
        matches!(self, Event::PhaseCompleted { .. })
    }
}

/// Epoch milliseconds to a UTC timestamp, clamping unrepresentable values
/// to the epoch.
pub fn at_ms(epoch_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
