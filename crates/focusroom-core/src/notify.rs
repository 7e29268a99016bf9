//! Phase-completion alerts.
//!
//! The engine calls [`Notifier::notify`] exactly once per completed phase,
//! including phases that completed while no process was running. Errors are
//! logged by the engine and otherwise ignored.

use std::io::Write;
use std::sync::Arc;

use crate::error::NotifyError;
use crate::timer::PhaseTransition;

pub trait Notifier {
    fn notify(&self, transition: &PhaseTransition) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, transition: &PhaseTransition) -> Result<(), NotifyError> {
        (**self).notify(transition)
    }
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _transition: &PhaseTransition) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl Notifier for TerminalBell {
    fn notify(&self, transition: &PhaseTransition) -> Result<(), NotifyError> {
        let mut err = std::io::stderr().lock();
        write!(err, "\x07")?;
        err.flush()?;
        tracing::debug!(from = %transition.from, to = %transition.to, "Rang terminal bell");
        Ok(())
    }
}
