//! Async session driver.
//!
//! Moves a [`SessionEngine`] into a single tokio task so that ticks and user
//! commands are applied one at a time. The task keeps a [`Ticker`] alive
//! exactly while the timer is running and tears it down on pause, at phase
//! boundaries, and on shutdown.

use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::engine::{SessionCommand, SessionEngine};
use super::machine::TimerState;
use super::ticker::{Tick, Ticker};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::notify::Notifier;
use crate::storage::SnapshotStore;

const COMMAND_BUFFER: usize = 16;

/// Events beyond this many unread ones are dropped.
pub const EVENT_BUFFER: usize = 64;

struct Request {
    command: SessionCommand,
    reply: oneshot::Sender<Result<TimerState>>,
}

/// Handle to a running session task.
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Apply `command` and return the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionClosed`] if the task has exited, or the
    /// persistence error raised while applying the command.
    pub async fn send(&self, command: SessionCommand) -> Result<TimerState> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| CoreError::SessionClosed)?;
        rx.await.map_err(|_| CoreError::SessionClosed)?
    }

    pub async fn status(&self) -> Result<TimerState> {
        self.send(SessionCommand::Status).await
    }

    /// Close the command channel and wait for the task to finish. The ticker
    /// is cancelled before the task exits; nothing is written afterwards.
    pub async fn shutdown(self) {
        let Self { requests, task } = self;
        drop(requests);
        if let Err(err) = task.await {
            warn!(error = %err, "Session task ended abnormally");
        }
    }
}

/// Spawn the session task. Events produced by commands and ticks, plus a
/// `StateSnapshot` after every tick, are sent to the returned receiver. The
/// channel holds [`EVENT_BUFFER`] events; a reader that falls behind loses
/// the newest ones instead of stalling the countdown.
pub fn spawn_session<S, N>(
    engine: SessionEngine<S, N>,
    period: Duration,
) -> (SessionHandle, mpsc::Receiver<Event>)
where
    S: SnapshotStore + Send + 'static,
    N: Notifier + Send + 'static,
{
    let (requests, request_rx) = mpsc::channel(COMMAND_BUFFER);
    let (events, event_rx) = mpsc::channel(EVENT_BUFFER);
    let task = tokio::spawn(drive(engine, request_rx, events, period));
    (SessionHandle { requests, task }, event_rx)
}

type LiveTicker = Option<(Ticker, mpsc::Receiver<Tick>)>;

async fn drive<S, N>(
    mut engine: SessionEngine<S, N>,
    mut requests: mpsc::Receiver<Request>,
    events: mpsc::Sender<Event>,
    period: Duration,
) where
    S: SnapshotStore,
    N: Notifier,
{
    let mut ticker: LiveTicker = None;
    sync_ticker(&engine, &mut ticker, period);

    loop {
        tokio::select! {
            biased;
            request = requests.recv() => {
                let Some(Request { command, reply }) = request else {
                    break;
                };
                let result = engine.apply(command, now_ms()).map(|event| {
                    if let Some(event) = event {
                        if command != SessionCommand::Status {
                            emit(&events, event);
                        }
                    }
                    *engine.state()
                });
                let _ = reply.send(result);
            }
            tick = next_tick(&mut ticker) => {
                if tick.is_none() {
                    // Ticker task is gone; sync_ticker respawns it if still running.
                    ticker = None;
                } else {
                    let now = now_ms();
                    match engine.tick(now) {
                        Ok(Some(event)) => emit(&events, event),
                        Ok(None) => {}
                        Err(err) => warn!(error = %err, "Failed to persist tick"),
                    }
                    emit(&events, engine.status(now));
                }
            }
        }
        sync_ticker(&engine, &mut ticker, period);
    }

    if let Some((mut live, _)) = ticker.take() {
        live.cancel();
    }
    debug!(identity = %engine.identity(), "Session task stopped");
}

fn emit(events: &mpsc::Sender<Event>, event: Event) {
    match events.try_send(event) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(event)) => {
            if matches!(event, Event::StateSnapshot { .. }) {
                debug!("Event receiver full; dropping state snapshot");
            } else {
                warn!(?event, "Event receiver full; dropping event");
            }
        }
    }
}

fn sync_ticker<S, N>(engine: &SessionEngine<S, N>, ticker: &mut LiveTicker, period: Duration)
where
    S: SnapshotStore,
    N: Notifier,
{
    match (engine.is_running(), ticker.is_some()) {
        (true, false) => *ticker = Some(Ticker::spawn(period)),
        (false, true) => {
            if let Some((mut live, _)) = ticker.take() {
                live.cancel();
            }
        }
        _ => {}
    }
}

async fn next_tick(ticker: &mut LiveTicker) -> Option<Tick> {
    match ticker {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
