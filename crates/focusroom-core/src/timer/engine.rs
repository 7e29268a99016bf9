//! Session engine implementation.
//!
//! The engine owns the live [`TimerState`] for one identity and writes every
//! change through to a [`SnapshotStore`]. It does not use internal threads:
//! the caller (or the [`driver`](super::driver)) invokes `tick()` once per
//! second while the timer is running.
//!
//! ## Usage
//!
//! ```ignore
//! let (mut engine, lapsed) = SessionEngine::open(identity, config, store, notifier, now_ms())?;
//! engine.toggle_run(now_ms())?;
//! // Once per second:
//! engine.tick(now_ms())?; // Returns Some(Event::PhaseCompleted) at a boundary
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::machine::{Phase, PhaseTransition, TimerState};
use super::reconcile::{elapsed_secs, reconcile, ReconcileOutcome, Reconciled};
use crate::error::Result;
use crate::events::{at_ms, Event};
use crate::identity::Identity;
use crate::notify::Notifier;
use crate::storage::{PhaseRecord, Snapshot, SnapshotStore};

/// A tick arriving this many whole seconds after the last anchor was late
/// (scheduler delay or suspend); it resynchronizes from the anchor instead of
/// counting down by one.
pub const STALL_RESYNC_SECS: u64 = 2;

/// Gaps at least this long are logged as a suspend rather than jitter.
const SUSPEND_WARN_SECS: u64 = 60;

/// User-facing operations on a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCommand {
    ToggleRun,
    /// Toggle only if paused.
    Start,
    /// Toggle only if running.
    Pause,
    Reset,
    SkipBreak,
    Clear,
    Status,
}

/// Focus-session engine for one identity.
pub struct SessionEngine<S, N> {
    identity: Identity,
    config: SessionConfig,
    state: TimerState,
    store: S,
    notifier: N,
    /// Last snapshot written (or read at open).
    last_snapshot: Option<Snapshot>,
}

impl<S: SnapshotStore, N: Notifier> SessionEngine<S, N> {
    /// Open the engine for `identity`, reconciling against its stored snapshot.
    ///
    /// An unreadable snapshot is treated as absent. When the stored phase ran
    /// out while unobserved, the transition is applied, the notifier fires,
    /// the new paused state is persisted and the completion event returned.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting a lapsed transition fails.
    pub fn open(
        identity: Identity,
        config: SessionConfig,
        store: S,
        notifier: N,
        now_ms: i64,
    ) -> Result<(Self, Option<Event>)> {
        let snapshot = match store.get(&identity) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(identity = %identity, error = %err, "Failed to read timer snapshot; starting fresh");
                None
            }
        };

        let Reconciled { state, outcome } = reconcile(snapshot.as_ref(), &config, now_ms);
        info!(
            identity = %identity,
            ?outcome,
            phase = %state.phase,
            remaining_secs = state.remaining_secs,
            "Session reconciled"
        );

        let mut engine = Self {
            identity,
            config,
            state,
            store,
            notifier,
            last_snapshot: snapshot,
        };

        let event = match outcome {
            ReconcileOutcome::Lapsed { transition } => {
                Some(engine.finish_phase(transition, true, now_ms)?)
            }
            ReconcileOutcome::Resumed { elapsed_secs: elapsed } => {
                // Move the in-memory anchor to the last whole second so the
                // first tick is not taken for a stall. The stored anchor is
                // left as written.
                let remaining_secs = engine.state.remaining_secs;
                engine.last_snapshot = engine.last_snapshot.map(|stored| Snapshot {
                    captured_at_ms: stored
                        .captured_at_ms
                        .map(|at| at.saturating_add(elapsed as i64 * 1000)),
                    duration_secs: remaining_secs,
                    ..stored
                });
                None
            }
            _ => None,
        };
        Ok((engine, event))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Build a full state snapshot event.
    pub fn status(&self, now_ms: i64) -> Event {
        Event::StateSnapshot {
            identity: self.identity.to_string(),
            phase: self.state.phase,
            running: self.state.running,
            remaining_secs: self.state.remaining_secs,
            total_secs: self.state.phase_duration(&self.config),
            clock: self.state.clock(),
            progress_pct: self.state.progress_pct(&self.config),
            completed_work_sessions: self.state.completed_work_sessions,
            at: at_ms(now_ms),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Dispatch a [`SessionCommand`]. `None` means the command was a no-op.
    pub fn apply(&mut self, command: SessionCommand, now_ms: i64) -> Result<Option<Event>> {
        match command {
            SessionCommand::ToggleRun => self.toggle_run(now_ms).map(Some),
            SessionCommand::Start => self.start(now_ms),
            SessionCommand::Pause => self.pause(now_ms),
            SessionCommand::Reset => self.reset(now_ms).map(Some),
            SessionCommand::SkipBreak => self.skip_break(now_ms),
            SessionCommand::Clear => self.clear(now_ms).map(Some),
            SessionCommand::Status => Ok(Some(self.status(now_ms))),
        }
    }

    pub fn toggle_run(&mut self, now_ms: i64) -> Result<Event> {
        let running = self.state.toggle_run();
        self.persist(now_ms)?;
        info!(
            identity = %self.identity,
            running,
            phase = %self.state.phase,
            remaining_secs = self.state.remaining_secs,
            "Timer toggled"
        );
        let (phase, remaining_secs, at) =
            (self.state.phase, self.state.remaining_secs, at_ms(now_ms));
        Ok(if running {
            Event::TimerStarted {
                phase,
                remaining_secs,
                at,
            }
        } else {
            Event::TimerPaused {
                phase,
                remaining_secs,
                at,
            }
        })
    }

    pub fn start(&mut self, now_ms: i64) -> Result<Option<Event>> {
        if self.state.running {
            return Ok(None); // Already running.
        }
        self.toggle_run(now_ms).map(Some)
    }

    pub fn pause(&mut self, now_ms: i64) -> Result<Option<Event>> {
        if !self.state.running {
            return Ok(None);
        }
        self.toggle_run(now_ms).map(Some)
    }

    /// Back to a paused, full-length Work phase. The completed-session
    /// counter is kept.
    pub fn reset(&mut self, now_ms: i64) -> Result<Event> {
        self.state.reset(&self.config);
        self.persist(now_ms)?;
        info!(identity = %self.identity, "Timer reset");
        Ok(Event::TimerReset {
            work_secs: self.config.work_secs(),
            at: at_ms(now_ms),
        })
    }

    /// Leave Break for a paused Work phase. No-op during Work.
    pub fn skip_break(&mut self, now_ms: i64) -> Result<Option<Event>> {
        if !self.state.skip_break(&self.config) {
            debug!(identity = %self.identity, "Skip ignored outside break");
            return Ok(None);
        }
        self.persist(now_ms)?;
        info!(identity = %self.identity, "Break skipped");
        Ok(Some(Event::BreakSkipped {
            work_secs: self.config.work_secs(),
            at: at_ms(now_ms),
        }))
    }

    /// Delete the stored snapshot and start over, including the cadence
    /// counter.
    pub fn clear(&mut self, now_ms: i64) -> Result<Event> {
        self.store.delete(&self.identity)?;
        self.state = TimerState::fresh(&self.config);
        self.last_snapshot = None;
        info!(identity = %self.identity, "Session cleared");
        Ok(Event::SessionCleared { at: at_ms(now_ms) })
    }

    /// Advance one second. Call once per second while running.
    ///
    /// Returns `Some(Event::PhaseCompleted)` when the phase runs out.
    pub fn tick(&mut self, now_ms: i64) -> Result<Option<Event>> {
        if !self.state.running {
            return Ok(None);
        }

        let anchor = self.last_snapshot.and_then(|s| s.captured_at_ms);
        if let Some(anchor) = anchor {
            let gap = elapsed_secs(anchor, now_ms);
            if gap >= STALL_RESYNC_SECS {
                if gap >= SUSPEND_WARN_SECS {
                    warn!(identity = %self.identity, gap_secs = gap, "Tick gap detected; resynchronizing");
                } else {
                    debug!(identity = %self.identity, gap_secs = gap, "Late tick; resynchronizing");
                }
                return self.resync(now_ms);
            }
        }

        let before = self.state.remaining_secs;
        self.put(Snapshot::capture_with_duration(&self.state, before, now_ms))?;
        debug!(identity = %self.identity, remaining_secs = before, "Tick");

        let previous = self.state;
        if self.state.countdown() {
            let transition = self.state.complete_phase(&self.config);
            return self.finish_phase_or_restore(transition, false, previous, now_ms);
        }
        Ok(None)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Re-run reconciliation against the last written snapshot.
    fn resync(&mut self, now_ms: i64) -> Result<Option<Event>> {
        let Some(snapshot) = self.last_snapshot else {
            return Ok(None);
        };
        let previous = self.state;
        let Reconciled { state, outcome } = reconcile(Some(&snapshot), &self.config, now_ms);
        self.state = state;
        match outcome {
            ReconcileOutcome::Lapsed { transition } => {
                self.finish_phase_or_restore(transition, true, previous, now_ms)
            }
            _ => {
                self.persist(now_ms)?;
                Ok(None)
            }
        }
    }

    /// Like [`Self::finish_phase`], but a failed write puts `previous` back so
    /// the next tick retries the boundary.
    fn finish_phase_or_restore(
        &mut self,
        transition: PhaseTransition,
        retroactive: bool,
        previous: TimerState,
        now_ms: i64,
    ) -> Result<Option<Event>> {
        match self.finish_phase(transition, retroactive, now_ms) {
            Ok(event) => Ok(Some(event)),
            Err(err) => {
                self.state = previous;
                Err(err)
            }
        }
    }

    /// Side effects of a completed phase. The new state is persisted first so
    /// a failed write leaves nothing behind and a later open retries the
    /// whole transition.
    fn finish_phase(
        &mut self,
        transition: PhaseTransition,
        retroactive: bool,
        now_ms: i64,
    ) -> Result<Event> {
        info!(
            identity = %self.identity,
            from = %transition.from,
            to = %transition.to,
            completed_work_sessions = transition.completed_work_sessions,
            long_break = transition.long_break,
            retroactive,
            "Phase completed"
        );

        self.persist(now_ms)?;

        if let Err(err) = self.notifier.notify(&transition) {
            warn!(identity = %self.identity, error = %err, "Phase notification failed");
        }

        let record = PhaseRecord {
            phase: transition.from,
            duration_secs: self.completed_phase_secs(&transition),
            completed_at: at_ms(now_ms),
            retroactive,
        };
        if let Err(err) = self.store.record_phase(&self.identity, &record) {
            warn!(identity = %self.identity, error = %err, "Failed to record phase history");
        }

        Ok(Event::PhaseCompleted {
            phase: transition.from,
            next_phase: transition.to,
            next_duration_secs: transition.next_duration_secs,
            long_break: transition.long_break,
            completed_work_sessions: transition.completed_work_sessions,
            retroactive,
            at: at_ms(now_ms),
        })
    }

    fn completed_phase_secs(&self, transition: &PhaseTransition) -> u64 {
        match transition.from {
            Phase::Work => self.config.work_secs(),
            Phase::Break => self.config.break_secs(transition.completed_work_sessions),
        }
    }

    fn persist(&mut self, now_ms: i64) -> Result<()> {
        self.put(Snapshot::capture(&self.state, now_ms))
    }

    fn put(&mut self, snapshot: Snapshot) -> Result<()> {
        self.store.put(&self.identity, &snapshot)?;
        self.last_snapshot = Some(snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::storage::MemorySnapshotStore;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Arc;

    const T: i64 = 1_700_000_000_000;

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    impl Notifier for CountingNotifier {
        fn notify(&self, _t: &PhaseTransition) -> std::result::Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenNotifier;

    impl Notifier for BrokenNotifier {
        fn notify(&self, _t: &PhaseTransition) -> std::result::Result<(), NotifyError> {
            Err(NotifyError::Unavailable("no audio device".into()))
        }
    }

    type TestEngine = SessionEngine<Arc<MemorySnapshotStore>, Arc<CountingNotifier>>;

    /// Memory store whose put fails once, after `fail_in` successful puts.
    struct FlakyStore {
        inner: MemorySnapshotStore,
        fail_in: AtomicI64,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemorySnapshotStore::new(),
                fail_in: AtomicI64::new(-1),
            }
        }

        fn fail_after(&self, puts: i64) {
            self.fail_in.store(puts, Ordering::SeqCst);
        }
    }

    impl SnapshotStore for FlakyStore {
        fn get(&self, identity: &Identity) -> Result<Option<Snapshot>> {
            self.inner.get(identity)
        }

        fn put(&self, identity: &Identity, snapshot: &Snapshot) -> Result<()> {
            if self.fail_in.fetch_sub(1, Ordering::SeqCst) == 0 {
                return Err(crate::error::DatabaseError::Locked.into());
            }
            self.inner.put(identity, snapshot)
        }

        fn delete(&self, identity: &Identity) -> Result<()> {
            self.inner.delete(identity)
        }

        fn record_phase(&self, identity: &Identity, record: &PhaseRecord) -> Result<()> {
            self.inner.record_phase(identity, record)
        }
    }

    fn cfg() -> SessionConfig {
        SessionConfig::new(1500, 300, 900, 4).unwrap()
    }

    fn open_at(
        store: &Arc<MemorySnapshotStore>,
        notifier: &Arc<CountingNotifier>,
        now: i64,
    ) -> (TestEngine, Option<Event>) {
        SessionEngine::open(
            Identity::guest(),
            cfg(),
            Arc::clone(store),
            Arc::clone(notifier),
            now,
        )
        .unwrap()
    }

    /// Tick once per second from `start`, returning the time after the last tick.
    fn tick_through(engine: &mut TestEngine, start: i64, ticks: u64) -> i64 {
        let mut now = start;
        for _ in 0..ticks {
            now += 1_000;
            engine.tick(now).unwrap();
        }
        now
    }

    #[test]
    fn toggle_persists_anchor_only_while_running() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);

        engine.toggle_run(T).unwrap();
        let snap = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(snap.captured_at_ms, Some(T));
        assert!(snap.running);
        assert_eq!(snap.duration_secs, 1500);

        engine.toggle_run(T + 500).unwrap();
        let snap = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(snap.captured_at_ms, None);
        assert!(!snap.running);
    }

    #[test]
    fn tick_persists_value_before_decrement() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();

        engine.tick(T + 1_000).unwrap();
        assert_eq!(engine.state().remaining_secs, 1499);
        let snap = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(snap.captured_at_ms, Some(T + 1_000));
        assert_eq!(snap.duration_secs, 1500);
    }

    #[test]
    fn tick_while_paused_does_nothing() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        assert!(engine.tick(T + 1_000).unwrap().is_none());
        assert_eq!(engine.state().remaining_secs, 1500);
        assert!(store.get(&Identity::guest()).unwrap().is_none());
    }

    #[test]
    fn four_work_phases_end_in_long_break() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);

        let mut now = T;
        for round in 1..=4u64 {
            engine.toggle_run(now).unwrap();
            now = tick_through(&mut engine, now, 1500);
            assert_eq!(engine.state().phase, Phase::Break);
            assert_eq!(engine.state().completed_work_sessions, round);
            assert!(!engine.is_running());
            if round < 4 {
                assert_eq!(engine.state().remaining_secs, 300);
                engine.toggle_run(now).unwrap();
                now = tick_through(&mut engine, now, 300);
                assert_eq!(engine.state().phase, Phase::Work);
            }
        }
        assert_eq!(engine.state().remaining_secs, 900);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 7);
        assert_eq!(store.history_len(&Identity::guest()), 7);

        let snap = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(snap.phase, Phase::Break);
        assert!(!snap.running);
        assert_eq!(snap.duration_secs, 900);
        assert_eq!(snap.completed_work_sessions, 4);
    }

    #[test]
    fn completion_event_reports_transition() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();
        let mut now = T;
        let mut last = None;
        for _ in 0..1500 {
            now += 1_000;
            last = engine.tick(now).unwrap();
        }
        match last {
            Some(Event::PhaseCompleted {
                phase,
                next_phase,
                next_duration_secs,
                retroactive,
                ..
            }) => {
                assert_eq!(phase, Phase::Work);
                assert_eq!(next_phase, Phase::Break);
                assert_eq!(next_duration_secs, 300);
                assert!(!retroactive);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn reopen_resumes_running_timer() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();
        drop(engine);

        let (engine, event) = open_at(&store, &notifier, T + 300_000);
        assert!(event.is_none());
        assert!(engine.is_running());
        assert_eq!(engine.state().remaining_secs, 1200);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lapsed_reopen_notifies_once_and_is_not_reapplied() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();
        drop(engine);

        let (engine, event) = open_at(&store, &notifier, T + 3_600_000);
        assert!(matches!(
            event,
            Some(Event::PhaseCompleted {
                retroactive: true,
                ..
            })
        ));
        assert_eq!(engine.state().phase, Phase::Break);
        assert_eq!(engine.state().completed_work_sessions, 1);
        assert!(!engine.is_running());
        drop(engine);

        let (engine, event) = open_at(&store, &notifier, T + 7_200_000);
        assert!(event.is_none());
        assert_eq!(engine.state().completed_work_sessions, 1);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
        assert_eq!(store.history_len(&Identity::guest()), 1);
        assert!(store.history(&Identity::guest())[0].retroactive);
    }

    #[test]
    fn failing_notifier_does_not_block_transition() {
        let store = Arc::new(MemorySnapshotStore::new());
        let state = TimerState {
            phase: Phase::Work,
            remaining_secs: 600,
            running: true,
            completed_work_sessions: 0,
        };
        store
            .put(&Identity::guest(), &Snapshot::capture(&state, T))
            .unwrap();

        let (engine, event) = SessionEngine::open(
            Identity::guest(),
            cfg(),
            Arc::clone(&store),
            BrokenNotifier,
            T + 900_000,
        )
        .unwrap();
        assert!(event.is_some());
        assert_eq!(engine.state().phase, Phase::Break);
        assert_eq!(engine.state().completed_work_sessions, 1);
        let snap = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(snap.phase, Phase::Break);
    }

    #[test]
    fn malformed_snapshot_opens_fresh() {
        let store = Arc::new(MemorySnapshotStore::new());
        store.put_raw(&Identity::guest(), "\u{0}garbage");
        let notifier = Arc::new(CountingNotifier::default());
        let (engine, event) = open_at(&store, &notifier, T);
        assert!(event.is_none());
        assert_eq!(*engine.state(), TimerState::fresh(&cfg()));
    }

    #[test]
    fn skip_break_outside_break_is_noop() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();
        let before = *engine.state();
        let snap_before = store.get(&Identity::guest()).unwrap();
        assert!(engine.skip_break(T + 10).unwrap().is_none());
        assert_eq!(*engine.state(), before);
        assert_eq!(store.get(&Identity::guest()).unwrap(), snap_before);
    }

    #[test]
    fn reset_twice_matches_once_and_keeps_counter() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();
        let now = tick_through(&mut engine, T, 1500);
        assert_eq!(engine.state().completed_work_sessions, 1);

        engine.reset(now).unwrap();
        let once = *engine.state();
        engine.reset(now + 1).unwrap();
        assert_eq!(*engine.state(), once);
        assert_eq!(once.phase, Phase::Work);
        assert_eq!(once.remaining_secs, 1500);
        assert!(!once.running);
        assert_eq!(once.completed_work_sessions, 1);
    }

    #[test]
    fn clear_wipes_counter_and_snapshot() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();
        let now = tick_through(&mut engine, T, 1500);
        engine.clear(now).unwrap();
        assert_eq!(*engine.state(), TimerState::fresh(&cfg()));
        assert!(store.get(&Identity::guest()).unwrap().is_none());
    }

    #[test]
    fn stalled_tick_resynchronizes_from_anchor() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();

        assert!(engine.tick(T + 60_000).unwrap().is_none());
        assert_eq!(engine.state().remaining_secs, 1440);
        assert!(engine.is_running());
        let snap = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(snap.captured_at_ms, Some(T + 60_000));
        assert_eq!(snap.duration_secs, 1440);
    }

    #[test]
    fn stalled_tick_past_boundary_completes_phase() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();

        let event = engine.tick(T + 2_000_000).unwrap();
        assert!(matches!(
            event,
            Some(Event::PhaseCompleted {
                retroactive: true,
                ..
            })
        ));
        assert_eq!(engine.state().phase, Phase::Break);
        assert!(!engine.is_running());
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_reports_progress() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();
        tick_through(&mut engine, T, 150);
        match engine.status(T) {
            Event::StateSnapshot {
                remaining_secs,
                total_secs,
                clock,
                progress_pct,
                ..
            } => {
                assert_eq!(remaining_secs, 1350);
                assert_eq!(total_secs, 1500);
                assert_eq!(clock, "22:30");
                assert!((progress_pct - 10.0).abs() < 1e-9);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn failed_lapse_write_leaves_no_side_effects() {
        let store = Arc::new(FlakyStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let running = TimerState {
            phase: Phase::Work,
            remaining_secs: 600,
            running: true,
            completed_work_sessions: 0,
        };
        store
            .put(&Identity::guest(), &Snapshot::capture(&running, T))
            .unwrap();
        store.fail_after(0);

        let open = |now| {
            SessionEngine::open(
                Identity::guest(),
                cfg(),
                Arc::clone(&store),
                Arc::clone(&notifier),
                now,
            )
        };
        assert!(open(T + 900_000).is_err());
        assert_eq!(notifier.0.load(Ordering::SeqCst), 0);
        assert_eq!(store.inner.history_len(&Identity::guest()), 0);

        let (engine, event) = open(T + 901_000).unwrap();
        assert!(event.is_some());
        assert_eq!(engine.state().completed_work_sessions, 1);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.history_len(&Identity::guest()), 1);
    }

    #[test]
    fn failed_boundary_write_is_retried_on_next_tick() {
        let store = Arc::new(FlakyStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = SessionEngine::open(
            Identity::guest(),
            cfg(),
            Arc::clone(&store),
            Arc::clone(&notifier),
            T,
        )
        .unwrap();
        engine.toggle_run(T).unwrap();
        let mut now = T;
        for _ in 0..1499 {
            now += 1_000;
            engine.tick(now).unwrap();
        }
        assert_eq!(engine.state().remaining_secs, 1);

        // The pre-tick write succeeds, the boundary write fails.
        store.fail_after(1);
        now += 1_000;
        assert!(engine.tick(now).is_err());
        assert_eq!(engine.state().phase, Phase::Work);
        assert_eq!(engine.state().remaining_secs, 1);
        assert!(engine.is_running());
        assert_eq!(notifier.0.load(Ordering::SeqCst), 0);
        assert_eq!(store.inner.history_len(&Identity::guest()), 0);

        now += 1_000;
        let event = engine.tick(now).unwrap();
        assert!(matches!(event, Some(Event::PhaseCompleted { .. })));
        assert_eq!(engine.state().phase, Phase::Break);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.history_len(&Identity::guest()), 1);
    }

    #[test]
    fn first_tick_after_resumed_open_counts_down() {
        let store = Arc::new(MemorySnapshotStore::new());
        let running = TimerState {
            phase: Phase::Work,
            remaining_secs: 600,
            running: true,
            completed_work_sessions: 0,
        };
        store
            .put(&Identity::guest(), &Snapshot::capture(&running, T))
            .unwrap();
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T + 300_500);
        assert_eq!(engine.state().remaining_secs, 300);
        // Stored anchor untouched by the open.
        let stored = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(stored.captured_at_ms, Some(T));

        engine.tick(T + 301_000).unwrap();
        assert_eq!(engine.state().remaining_secs, 299);
        let snap = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(snap.captured_at_ms, Some(T + 301_000));
        assert_eq!(snap.duration_secs, 300);
    }

    #[test]
    fn late_tick_catches_up_from_anchor() {
        let store = Arc::new(MemorySnapshotStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let (mut engine, _) = open_at(&store, &notifier, T);
        engine.toggle_run(T).unwrap();

        engine.tick(T + 2_000).unwrap();
        assert_eq!(engine.state().remaining_secs, 1498);
        engine.tick(T + 3_000).unwrap();
        assert_eq!(engine.state().remaining_secs, 1497);
        let snap = store.get(&Identity::guest()).unwrap().unwrap();
        assert_eq!(snap.captured_at_ms, Some(T + 3_000));
        assert_eq!(snap.duration_secs, 1498);
    }
}
