//! Error types for the Xwayland launcher

use nix::unistd::Pid;
use thiserror::Error;

use crate::launcher::ChannelError;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Fork, child setup or exec of the X server failed
    #[error("Failed to launch Xwayland ({command}): {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("X server not found: {0}")]
    ServerNotFound(String),

    #[error("X server already running (pid {0})")]
    AlreadyRunning(Pid),

    #[error("Failed to load the xwayland module: {0}")]
    ModuleLoad(#[source] std::io::Error),

    #[error("Failed to get the xwayland module API")]
    MissingApi,

    #[error("Failed to get the xwayland object")]
    MissingHandle,

    #[error("Failed to listen for X connections: {0}")]
    Listen(#[source] std::io::Error),

    #[error("Failed to subscribe to {signal}: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Supervisor is no longer accepting spawn requests")]
    SupervisorGone,
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;
