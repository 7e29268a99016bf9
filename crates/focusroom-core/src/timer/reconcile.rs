//! Startup reconciliation.
//!
//! Turns the last persisted [`Snapshot`] plus the current wall-clock time into
//! the state the timer would be in had the process been watching the whole
//! time. At most one phase transition is applied: a gap spanning several
//! phase lengths still counts as a single lapsed phase.

use serde::{Deserialize, Serialize};

use super::config::SessionConfig;
use super::machine::{PhaseTransition, TimerState};
use crate::storage::Snapshot;

/// How the initial state was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No snapshot; brand new timer.
    Fresh,
    /// Paused snapshot restored verbatim.
    Restored,
    /// Still inside the running phase.
    Resumed { elapsed_secs: u64 },
    /// The running phase ran out while unobserved.
    Lapsed { transition: PhaseTransition },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciled {
    pub state: TimerState,
    pub outcome: ReconcileOutcome,
}

/// Whole seconds between `captured_at_ms` and `now_ms`; a clock that moved
/// backwards counts as no time at all.
pub fn elapsed_secs(captured_at_ms: i64, now_ms: i64) -> u64 {
    let delta = now_ms.saturating_sub(captured_at_ms);
    if delta <= 0 {
        0
    } else {
        (delta / 1000) as u64
    }
}

pub fn reconcile(snapshot: Option<&Snapshot>, config: &SessionConfig, now_ms: i64) -> Reconciled {
    let Some(snap) = snapshot else {
        return Reconciled {
            state: TimerState::fresh(config),
            outcome: ReconcileOutcome::Fresh,
        };
    };

    let mut state = TimerState {
        phase: snap.phase,
        remaining_secs: snap.duration_secs,
        running: false,
        completed_work_sessions: snap.completed_work_sessions,
    };

    let captured_at_ms = match snap.captured_at_ms {
        Some(at) if snap.running => at,
        _ => {
            return Reconciled {
                state,
                outcome: ReconcileOutcome::Restored,
            }
        }
    };

    let elapsed = elapsed_secs(captured_at_ms, now_ms);
    if elapsed < snap.duration_secs {
        state.remaining_secs = snap.duration_secs - elapsed;
        state.running = true;
        return Reconciled {
            state,
            outcome: ReconcileOutcome::Resumed {
                elapsed_secs: elapsed,
            },
        };
    }

    let transition = state.complete_phase(config);
    Reconciled {
        state,
        outcome: ReconcileOutcome::Lapsed { transition },
    }
}
