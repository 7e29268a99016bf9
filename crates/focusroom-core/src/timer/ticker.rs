//! Cancellable one-second ticker.
//!
//! The ticker is a tokio task that sends a [`Tick`] every period until it is
//! cancelled or its receiver goes away. The first tick arrives one full
//! period after spawning.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default cadence of the countdown.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const TICK_BUFFER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based sequence number within this ticker.
    pub seq: u64,
}

pub struct Ticker {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn a ticker on the current tokio runtime.
    pub fn spawn(period: Duration) -> (Self, mpsc::Receiver<Tick>) {
        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut seq = 0u64;
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        seq += 1;
                        if tx.send(Tick { seq }).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(ticks = seq, "Ticker stopped");
        });

        (
            Self {
                shutdown,
                task: Some(task),
            },
            rx,
        )
    }

    /// Stop ticking. Safe to call more than once.
    pub fn cancel(&mut self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Cancel and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}
