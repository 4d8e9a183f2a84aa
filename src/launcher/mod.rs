//! X server launching
//!
//! Creates the two channels the X server talks to the compositor over,
//! builds its command line and starts it.

mod argv;
pub mod channel;
pub mod process;

pub use argv::{command_line, XserverArgs, MAX_ARGS};
pub use channel::{Channel, ChannelError, ChannelFactory, ChannelPair, SocketPairFactory};
pub use process::{CommandSpawner, ProcessSpawner, SpawnPlan};

use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};

use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::config::XwaylandSection;
use crate::{Error, Result};

/// Environment variable announcing the Wayland connection descriptor
pub const WAYLAND_SOCKET_ENV: &str = "WAYLAND_SOCKET";

/// Signal the X server raises at its parent once it is initialized.
/// It only does so when the signal is ignored at startup.
pub const READINESS_SIGNAL: Signal = Signal::SIGUSR1;

/// A started X server, as seen from the compositor
#[derive(Debug)]
pub struct LaunchedServer {
    pub pid: Pid,
    /// Compositor end of the Wayland connection
    pub display: OwnedFd,
    /// Compositor end of the window manager connection
    pub wm: OwnedFd,
}

/// Channel creation and process start for one X server
#[derive(Debug, Default)]
pub struct Launcher<F = SocketPairFactory, S = CommandSpawner> {
    channels: F,
    spawner: S,
}

impl<F: ChannelFactory, S: ProcessSpawner> Launcher<F, S> {
    pub fn new(channels: F, spawner: S) -> Self {
        Self { channels, spawner }
    }

    /// Start an X server for `display`.
    ///
    /// `unix_fd` and `abstract_fd` are the compositor's listening sockets;
    /// the server gets them at the same descriptor numbers.
    pub fn launch(
        &mut self,
        display: &str,
        abstract_fd: Option<BorrowedFd<'_>>,
        unix_fd: BorrowedFd<'_>,
        config: &XwaylandSection,
    ) -> Result<LaunchedServer> {
        let wayland = self.create_channel(Channel::Display)?;
        let wm = self.create_channel(Channel::WindowManager)?;

        let server_path = config
            .resolve_server_path()
            .inspect_err(|e| tracing::error!("{}", e))?;

        let args = XserverArgs {
            server_path: &server_path,
            display,
            unix_fd: unix_fd.as_raw_fd(),
            wm_fd: wm.child.as_raw_fd(),
            abstract_fd: abstract_fd.map(|fd| fd.as_raw_fd()),
            disable_access_control: config.disable_access_control,
        };
        let argv = args.build();

        let mut inherit_fds = vec![wayland.child.as_raw_fd(), wm.child.as_raw_fd()];
        inherit_fds.extend(abstract_fd.map(|fd| fd.as_raw_fd()));
        inherit_fds.push(unix_fd.as_raw_fd());

        let plan = SpawnPlan {
            program: server_path.clone(),
            env: vec![(
                WAYLAND_SOCKET_ENV.into(),
                wayland.child.as_raw_fd().to_string().into(),
            )],
            argv,
            inherit_fds,
            ignore_signals: vec![READINESS_SIGNAL],
        };

        let pid = self.spawner.spawn(&plan).map_err(|source| {
            let command = command_line(&plan.argv);
            tracing::error!(%command, "Failed to launch Xwayland: {}", source);
            Error::Spawn { command, source }
        })?;

        let display_name = display;
        tracing::info!(
            %pid,
            display = display_name,
            path = %server_path.display(),
            "Spawned Xwayland"
        );

        // Only the server holds the child ends from here on.
        drop(wayland.child);
        drop(wm.child);

        Ok(LaunchedServer {
            pid,
            display: wayland.parent,
            wm: wm.parent,
        })
    }

    fn create_channel(&mut self, channel: Channel) -> Result<ChannelPair> {
        self.channels.create_pair(channel).map_err(|e| {
            tracing::error!("{}", e);
            Error::from(e)
        })
    }
}
