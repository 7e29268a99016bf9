//! Phase state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Work --(remaining hits 0)--> Break --(remaining hits 0)--> Work
//!   ^                            |
//!   +--------(skip_break)--------+
//! ```
//!
//! Every phase boundary leaves the machine paused; the caller must toggle it
//! back on. `reset` returns to a paused Work phase but keeps the completed
//! work-session counter, so the long-break cadence survives resets.

use serde::{Deserialize, Serialize};

use super::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Work,
    Break,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Work => "work",
            Phase::Break => "break",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed phase and the phase it handed over to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Phase that just completed.
    pub from: Phase,
    pub to: Phase,
    /// Full length of the phase entered.
    pub next_duration_secs: u64,
    /// Only meaningful when `to` is Break.
    pub long_break: bool,
    /// Counter value after the transition.
    pub completed_work_sessions: u64,
}

/// Live timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub phase: Phase,
    pub remaining_secs: u64,
    pub running: bool,
    pub completed_work_sessions: u64,
}

impl TimerState {
    /// Paused Work phase at full length with no completed sessions.
    pub fn fresh(config: &SessionConfig) -> Self {
        Self {
            phase: Phase::Work,
            remaining_secs: config.work_secs(),
            running: false,
            completed_work_sessions: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Nominal length of the current phase under `config`.
    pub fn phase_duration(&self, config: &SessionConfig) -> u64 {
        match self.phase {
            Phase::Work => config.work_secs(),
            Phase::Break => config.break_secs(self.completed_work_sessions),
        }
    }

    /// 0.0 .. 100.0 progress within the current phase.
    pub fn progress_pct(&self, config: &SessionConfig) -> f64 {
        let total = self.phase_duration(config);
        if total == 0 {
            return 0.0;
        }
        let done = total.saturating_sub(self.remaining_secs);
        (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Remaining time rendered as `MM:SS`.
    pub fn clock(&self) -> String {
        format!("{:02}:{:02}", self.remaining_secs / 60, self.remaining_secs % 60)
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Complete the current phase and enter the next one, paused.
    pub fn complete_phase(&mut self, config: &SessionConfig) -> PhaseTransition {
        let from = self.phase;
        let (to, next_duration_secs, long_break) = match from {
            Phase::Work => {
                self.completed_work_sessions += 1;
                let long = config.is_long_break(self.completed_work_sessions);
                (Phase::Break, config.break_secs(self.completed_work_sessions), long)
            }
            Phase::Break => (Phase::Work, config.work_secs(), false),
        };
        self.phase = to;
        self.remaining_secs = next_duration_secs;
        self.running = false;
        PhaseTransition {
            from,
            to,
            next_duration_secs,
            long_break,
            completed_work_sessions: self.completed_work_sessions,
        }
    }

    /// Count down one second. Returns `true` when the phase has run out.
    pub fn countdown(&mut self) -> bool {
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        self.remaining_secs == 0
    }

    /// Jump from Break straight to a paused Work phase.
    ///
    /// Returns `false` (and changes nothing) outside Break.
    pub fn skip_break(&mut self, config: &SessionConfig) -> bool {
        if self.phase != Phase::Break {
            return false;
        }
        self.phase = Phase::Work;
        self.remaining_secs = config.work_secs();
        self.running = false;
        true
    }

    pub fn reset(&mut self, config: &SessionConfig) {
        self.phase = Phase::Work;
        self.remaining_secs = config.work_secs();
        self.running = false;
    }

    /// Flip `running`, returning the new value.
    pub fn toggle_run(&mut self) -> bool {
        self.running = !self.running;
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg() -> SessionConfig {
        SessionConfig::new(1500, 300, 900, 4).unwrap()
    }

    fn run_out(state: &mut TimerState) -> PhaseTransition {
        while !state.countdown() {}
        state.complete_phase(&cfg())
    }

    #[test]
    fn work_completion_enters_paused_break() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        state.running = true;
        let t = run_out(&mut state);
        assert_eq!(t.from, Phase::Work);
        assert_eq!(t.to, Phase::Break);
        assert_eq!(state.phase, Phase::Break);
        assert_eq!(state.remaining_secs, 300);
        assert!(!state.running);
        assert_eq!(state.completed_work_sessions, 1);
    }

    #[test]
    fn break_completion_keeps_counter() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        run_out(&mut state);
        state.running = true;
        let t = run_out(&mut state);
        assert_eq!(t.to, Phase::Work);
        assert_eq!(state.remaining_secs, 1500);
        assert!(!state.running);
        assert_eq!(state.completed_work_sessions, 1);
    }

    #[test]
    fn fourth_work_session_earns_long_break() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        for _ in 0..3 {
            run_out(&mut state);
            run_out(&mut state);
        }
        let t = run_out(&mut state);
        assert!(t.long_break);
        assert_eq!(state.phase, Phase::Break);
        assert_eq!(state.remaining_secs, 900);
        assert_eq!(state.completed_work_sessions, 4);
    }

    #[test]
    fn skip_break_in_work_is_noop() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        state.running = true;
        state.remaining_secs = 1234;
        let before = state;
        assert!(!state.skip_break(&config));
        assert_eq!(state, before);
    }

    #[test]
    fn skip_break_returns_to_paused_work() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        run_out(&mut state);
        state.running = true;
        assert!(state.skip_break(&config));
        assert_eq!(state.phase, Phase::Work);
        assert_eq!(state.remaining_secs, 1500);
        assert!(!state.running);
        assert_eq!(state.completed_work_sessions, 1);
    }

    #[test]
    fn reset_is_idempotent_and_keeps_counter() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        run_out(&mut state);
        state.running = true;
        state.reset(&config);
        let once = state;
        state.reset(&config);
        assert_eq!(state, once);
        assert_eq!(state.phase, Phase::Work);
        assert_eq!(state.remaining_secs, 1500);
        assert!(!state.running);
        assert_eq!(state.completed_work_sessions, 1);
    }

    #[test]
    fn toggle_only_touches_running() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        assert!(state.toggle_run());
        assert!(!state.toggle_run());
        assert_eq!(state.remaining_secs, 1500);
        assert_eq!(state.phase, Phase::Work);
    }

    #[test]
    fn progress_and_clock() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        assert_eq!(state.progress_pct(&config), 0.0);
        assert_eq!(state.clock(), "25:00");
        state.remaining_secs = 750;
        assert!((state.progress_pct(&config) - 50.0).abs() < f64::EPSILON);
        assert_eq!(state.clock(), "12:30");
    }

    #[test]
    fn progress_clamps_when_remaining_exceeds_duration() {
        let config = cfg();
        let mut state = TimerState::fresh(&config);
        state.remaining_secs = 5000;
        assert_eq!(state.progress_pct(&config), 0.0);
    }

    proptest! {
        #[test]
        fn cadence_counts_every_work_phase(
            work in 1u64..120,
            short in 1u64..60,
            long in 1u64..60,
            cycles in 1u64..8,
            n in 1u64..40,
        ) {
            let config = SessionConfig::new(work, short, long, cycles).unwrap();
            let mut state = TimerState::fresh(&config);
            for i in 1..=n {
                state.remaining_secs = 0;
                let t = state.complete_phase(&config);
                prop_assert_eq!(t.from, Phase::Work);
                prop_assert_eq!(state.completed_work_sessions, i);
                let expected = if i % cycles == 0 { long } else { short };
                prop_assert_eq!(state.remaining_secs, expected);
                prop_assert_eq!(t.long_break, i % cycles == 0);
                state.complete_phase(&config);
            }
            prop_assert_eq!(state.completed_work_sessions, n);
        }
    }
}
