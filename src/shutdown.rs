//! Interruptible sleeping.
//!
//! Every wait in the pipeline (stability poll interval, settle delay,
//! politeness delay) goes through a [`Sleeper`]. The production sleeper
//! blocks on a shutdown channel with a timeout, so a shutdown request wakes
//! all sleepers at once instead of waiting out the current delay.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Returned by [`Sleeper::sleep`] when shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("shutdown requested")]
pub struct Interrupted;

pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}

/// Receiving half of the shutdown channel. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

/// Sending half. Dropping it (or calling [`ShutdownTrigger::trigger`]) wakes
/// every [`ShutdownSignal`] clone.
pub struct ShutdownTrigger {
    tx: Mutex<Option<Sender<()>>>,
}

impl ShutdownSignal {
    pub fn new() -> (ShutdownTrigger, ShutdownSignal) {
        let (tx, rx) = crossbeam_channel::bounded(0);
        (
            ShutdownTrigger {
                tx: Mutex::new(Some(tx)),
            },
            ShutdownSignal { rx },
        )
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self {
            rx: crossbeam_channel::never(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(
            self.rx.try_recv(),
            Ok(()) | Err(crossbeam_channel::TryRecvError::Disconnected)
        )
    }
}

impl Sleeper for ShutdownSignal {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        if duration.is_zero() {
            return if self.is_triggered() { Err(Interrupted) } else { Ok(()) };
        }
        match self.rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(Interrupted),
        }
    }
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

/// Route Ctrl+C to a fresh shutdown signal. The first press stops the run
/// at the next wait; sessions still close their pages and the window in
/// flight is persisted.
pub fn install_ctrlc() -> anyhow::Result<ShutdownSignal> {
    let (trigger, signal) = ShutdownSignal::new();
    ctrlc::set_handler(move || {
        eprintln!("\nShutdown requested, finishing current page...");
        trigger.trigger();
    })?;
    Ok(signal)
}
