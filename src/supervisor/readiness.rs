//! One-shot readiness handshake
//!
//! The X server raises [`READINESS_SIGNAL`] at the compositor once it is
//! done round-tripping with it during startup. Until then the window manager
//! connection must not be used.

use serde::Serialize;
use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::launcher::READINESS_SIGNAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    Unarmed,
    Armed,
    Fired,
}

enum Watch {
    Unarmed,
    Armed(Signal),
    Fired,
}

/// Readiness signal subscription with an explicit lifecycle.
///
/// Signals raised while not armed are never observed by a later
/// subscription.
pub struct ReadinessWatcher {
    watch: Watch,
}

impl Default for ReadinessWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadinessWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessWatcher")
            .field("state", &self.state())
            .finish()
    }
}

impl ReadinessWatcher {
    pub fn new() -> Self {
        Self {
            watch: Watch::Unarmed,
        }
    }

    pub fn state(&self) -> ReadinessState {
        match self.watch {
            Watch::Unarmed => ReadinessState::Unarmed,
            Watch::Armed(_) => ReadinessState::Armed,
            Watch::Fired => ReadinessState::Fired,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.watch, Watch::Armed(_))
    }

    /// Subscribe to the readiness signal.
    ///
    /// # Panics
    ///
    /// If the watcher is already armed.
    pub fn arm(&mut self) -> std::io::Result<()> {
        assert!(!self.is_armed(), "readiness watcher armed twice");

        let subscription = signal(SignalKind::from_raw(READINESS_SIGNAL as i32))?;
        self.watch = Watch::Armed(subscription);
        Ok(())
    }

    /// Drop the subscription, if any.
    pub fn disarm(&mut self) {
        self.watch = Watch::Unarmed;
    }

    /// Replace whatever subscription exists with a fresh one.
    pub fn rearm(&mut self) -> std::io::Result<()> {
        self.disarm();
        self.arm()
    }

    /// Mark the handshake as done. Returns false if nothing was armed.
    pub fn fire(&mut self) -> bool {
        if !self.is_armed() {
            return false;
        }
        self.watch = Watch::Fired;
        true
    }

    /// Resolves when the readiness signal arrives. Never resolves while
    /// not armed.
    pub async fn signalled(&mut self) {
        if let Watch::Armed(subscription) = &mut self.watch {
            if subscription.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}
