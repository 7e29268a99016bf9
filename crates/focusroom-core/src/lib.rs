//! # Focusroom Core Library
//!
//! This library provides the session engine behind the `focusroom` CLI: a
//! work/break countdown that survives process restarts.
//!
//! ## Architecture
//!
//! - **Timer**: phase state machine, restart reconciler, cancellable ticker
//!   and the async driver that serializes ticks with user commands
//! - **Storage**: SQLite snapshot and phase-history storage plus TOML-based
//!   configuration
//! - **Notify**: phase-completion notification sinks
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: owns the timer state for one identity
//! - [`reconcile`]: derives the current state from a stored snapshot
//! - [`Database`]: snapshot and statistics persistence
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod identity;
pub mod notify;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, NotifyError};
pub use events::Event;
pub use identity::Identity;
pub use notify::{NoopNotifier, Notifier, TerminalBell};
pub use storage::{
    Config, Database, MemorySnapshotStore, PhaseRecord, Snapshot, SnapshotStore, Stats,
};
pub use timer::{
    reconcile, spawn_session, Phase, PhaseTransition, ReconcileOutcome, SessionCommand,
    SessionConfig, SessionEngine, SessionHandle, TimerState,
};
