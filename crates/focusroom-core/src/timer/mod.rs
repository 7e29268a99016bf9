mod config;
pub mod driver;
mod engine;
mod machine;
pub mod reconcile;
mod ticker;

pub use config::SessionConfig;
pub use driver::{now_ms, spawn_session, SessionHandle, EVENT_BUFFER};
pub use engine::{SessionCommand, SessionEngine, STALL_RESYNC_SECS};
pub use machine::{Phase, PhaseTransition, TimerState};
pub use reconcile::{reconcile, ReconcileOutcome, Reconciled};
pub use ticker::{Tick, Ticker, TICK_PERIOD};
