//! Xwayland launcher
//!
//! Starts the Xwayland server on behalf of a Wayland compositor, connects it
//! to the compositor over a Wayland channel and an X window manager channel,
//! and reports when the server is ready and when it exits.
//!
//! The compositor plugs in through the [`Compositor`] and [`XwaylandApi`]
//! traits and drives a [`Supervisor`] from its tokio event loop.

pub mod config;
pub mod launcher;
pub mod supervisor;

mod error;

pub use config::{Config, XwaylandSection};
pub use error::{Error, Result};
pub use launcher::Launcher;
pub use supervisor::{
    Compositor, Dispatched, ExitStatus, SpawnRequest, SpawnRequests, Supervisor, SupervisorStatus,
    XwaylandApi,
};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber for the launcher's logs.
///
/// `RUST_LOG` is honored when set; otherwise launcher logs default to
/// `debug`. Does nothing if the host already installed a global subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("xwayland_launcher=debug"));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::info!("Xwayland launcher logging initialized");
    }
}
