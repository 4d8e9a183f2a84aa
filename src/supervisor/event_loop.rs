//! Driving the supervisor from the compositor's event loop

use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};

use super::{ExitStatus, Supervisor};
use crate::launcher::{ChannelFactory, ProcessSpawner};
use crate::supervisor::api::{Compositor, PendingSpawn};

/// What a call to [`Supervisor::dispatch`] handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Readiness,
    ChildSignal,
    SpawnRequest,
    /// Every [`super::SpawnRequests`] handle was dropped
    RequestsClosed,
}

enum Wake {
    Readiness,
    Child,
    Request(Option<PendingSpawn>),
}

impl<C, F, S> Supervisor<C, F, S>
where
    C: Compositor,
    F: ChannelFactory,
    S: ProcessSpawner,
{
    /// Wait for the next event and handle it.
    ///
    /// The readiness signal is looked at before child exits, so a server
    /// that signals and then dies is reported loaded before exited.
    pub async fn dispatch(&mut self) -> Dispatched {
        let wake = tokio::select! {
            biased;
            _ = self.readiness.signalled() => Wake::Readiness,
            _ = self.child_signals.recv() => Wake::Child,
            pending = self.requests.recv(), if self.requests_open => Wake::Request(pending),
        };

        match wake {
            Wake::Readiness => {
                self.handle_readiness();
                Dispatched::Readiness
            }
            Wake::Child => {
                self.handle_child_signal();
                Dispatched::ChildSignal
            }
            Wake::Request(Some(PendingSpawn { request, reply })) => {
                let result = self.spawn(
                    &request.display,
                    request.abstract_fd.as_ref().map(|fd| fd.as_fd()),
                    request.unix_fd.as_fd(),
                );
                if reply.send(result).is_err() {
                    tracing::debug!("Spawn requester went away before the reply");
                }
                Dispatched::SpawnRequest
            }
            Wake::Request(None) => {
                tracing::debug!("Spawn request queue closed");
                self.requests_open = false;
                Dispatched::RequestsClosed
            }
        }
    }

    /// Dispatch until the request queue is closed and no X server is left.
    pub async fn run(&mut self) {
        while self.requests_open || self.helper.is_some() {
            self.dispatch().await;
        }
        tracing::info!("Xwayland supervisor stopped");
    }

    /// A SIGCHLD arrived. Reap the X server if it is the one that exited.
    ///
    /// Returns whether the exit handler ran.
    pub fn handle_child_signal(&mut self) -> bool {
        let Some(pid) = self.pid() else {
            return false;
        };

        let status = match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => ExitStatus::Exited(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => ExitStatus::Signaled(sig as i32),
            Ok(_) => return false,
            Err(Errno::ECHILD) => {
                tracing::warn!(%pid, "Xwayland was reaped elsewhere");
                ExitStatus::Unknown
            }
            Err(e) => {
                tracing::warn!(%pid, "waitpid failed: {}", e);
                return false;
            }
        };

        self.handle_exit(status);
        true
    }
}
