//! Seams towards the host compositor and its xwayland module

use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use nix::unistd::Pid;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::{Error, Result};

/// The host compositor
pub trait Compositor: Sized {
    /// Wayland client object owned by the compositor's display
    type Client;
    /// The xwayland module loaded into this compositor
    type Api: XwaylandApi<Self>;

    /// Load the xwayland module into the compositor.
    fn load_xwayland(&self) -> std::io::Result<()>;

    /// Capability object of the loaded module, if it exposes one.
    fn xwayland_api(&self) -> Option<Arc<Self::Api>>;

    /// Turn the compositor end of a socket into a client of its display.
    fn create_client(&self, socket: OwnedFd) -> std::io::Result<Self::Client>;

    /// Current configuration. Read again for every spawn.
    fn config(&self) -> Config;
}

/// Capability object of the xwayland module
pub trait XwaylandApi<C: Compositor> {
    /// Per-compositor xwayland object
    type Handle;

    fn get(&self, compositor: &C) -> Option<Self::Handle>;

    /// Start accepting X connections. Whenever the module needs an X server
    /// it submits a request through `requests`.
    fn listen(&self, handle: &Self::Handle, requests: SpawnRequests) -> std::io::Result<()>;

    /// The X server finished initializing. `wm_fd` is the compositor end
    /// of the window manager connection; the module owns it from now on.
    fn xserver_loaded(&self, handle: &Self::Handle, client: &C::Client, wm_fd: OwnedFd);

    fn xserver_exited(&self, handle: &Self::Handle, status: ExitStatus);
}

/// How the X server terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ExitStatus {
    Exited(i32),
    /// Killed by the given signal number
    Signaled(i32),
    /// Reaped by someone else
    Unknown,
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {}", code),
            ExitStatus::Signaled(sig) => write!(f, "signal {}", sig),
            ExitStatus::Unknown => f.write_str("unknown status"),
        }
    }
}

/// One request for an X server
///
/// The listening sockets stay with the module, which keeps accepting on
/// them after the server exits. The supervisor only borrows them for the
/// duration of the spawn.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub display: String,
    /// Listening socket in the abstract namespace
    pub abstract_fd: Option<Arc<OwnedFd>>,
    /// Listening socket on the filesystem
    pub unix_fd: Arc<OwnedFd>,
}

#[derive(Debug)]
pub(crate) struct PendingSpawn {
    pub(crate) request: SpawnRequest,
    pub(crate) reply: oneshot::Sender<Result<Pid>>,
}

/// Sending side of the spawn request queue, handed to the xwayland module
#[derive(Debug, Clone)]
pub struct SpawnRequests {
    tx: mpsc::UnboundedSender<PendingSpawn>,
}

impl SpawnRequests {
    pub(crate) fn new(tx: mpsc::UnboundedSender<PendingSpawn>) -> Self {
        Self { tx }
    }

    /// Queue a request. The receiver resolves once the supervisor has
    /// handled it.
    pub fn send(&self, request: SpawnRequest) -> Result<oneshot::Receiver<Result<Pid>>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PendingSpawn { request, reply })
            .map_err(|_| Error::SupervisorGone)?;
        Ok(rx)
    }

    /// Queue a request and wait for the pid.
    pub async fn spawn(&self, request: SpawnRequest) -> Result<Pid> {
        self.send(request)?.await.map_err(|_| Error::SupervisorGone)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
