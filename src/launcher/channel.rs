//! Socket pairs connecting the compositor and the X server

use std::fmt;
use std::os::fd::OwnedFd;

use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use thiserror::Error;

/// Which of the two per-spawn channels is meant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Wayland connection, the X server is a client on it
    Display,
    /// X11 window manager connection, the compositor is the WM on it
    WindowManager,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Display => f.write_str("wl connection"),
            Channel::WindowManager => f.write_str("X wm connection"),
        }
    }
}

/// Socket pair creation failed
#[derive(Error, Debug)]
#[error("{channel} socketpair failed: {source}")]
pub struct ChannelError {
    pub channel: Channel,
    #[source]
    pub source: std::io::Error,
}

/// Both ends of a freshly created channel. Both are close-on-exec.
#[derive(Debug)]
pub struct ChannelPair {
    /// End kept by the compositor
    pub parent: OwnedFd,
    /// End handed to the X server
    pub child: OwnedFd,
}

/// Creates channel pairs
pub trait ChannelFactory {
    fn create_pair(&mut self, channel: Channel) -> Result<ChannelPair, ChannelError>;
}

/// `socketpair(AF_UNIX, SOCK_STREAM | SOCK_CLOEXEC)`
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketPairFactory;

impl ChannelFactory for SocketPairFactory {
    fn create_pair(&mut self, channel: Channel) -> Result<ChannelPair, ChannelError> {
        let (parent, child) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::SOCK_CLOEXEC,
        )
        .map_err(|errno| ChannelError {
            channel,
            source: errno.into(),
        })?;

        Ok(ChannelPair { parent, child })
    }
}
