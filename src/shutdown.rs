//! Operator cancellation signal.
//!
//! A `watch` channel flipped to `true` on Ctrl-C. Actions poll
//! [`Shutdown::is_triggered`] between statements and race
//! [`Shutdown::triggered`] against their sleeps.

use tokio::sync::watch;
use tracing::{debug, warn};

/// Receiving side of the cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side of the cancellation signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a linked trigger/receiver pair.
    pub fn channel() -> (ShutdownTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Self { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_trigger, shutdown) = Self::channel();
        shutdown
    }

    /// Install a Ctrl-C listener on the current runtime.
    ///
    /// The first interrupt fires the signal; a second one exits the process
    /// immediately with status 130, for when a statement is hung.
    pub fn listen_for_ctrl_c() -> Self {
        let (trigger, shutdown) = Self::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received");
                trigger.trigger();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("second interrupt received, exiting immediately");
                std::process::exit(130);
            }
        });
        shutdown
    }

    /// Whether the operator has asked to stop.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the operator asks to stop.
    ///
    /// Stays pending forever if the trigger is dropped without firing.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl ShutdownTrigger {
    /// Signal every receiver.
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(true);
    }
}
