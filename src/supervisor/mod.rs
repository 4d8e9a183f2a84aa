//! Xwayland supervision
//!
//! A [`Supervisor`] is loaded once per compositor. It hands the xwayland
//! module a [`SpawnRequests`] queue, starts an X server for every request,
//! reports the server's readiness and exit back to the module, and re-arms
//! the readiness handshake for the next server.

mod api;
mod event_loop;
mod readiness;

pub use api::{Compositor, ExitStatus, SpawnRequest, SpawnRequests, XwaylandApi};
pub use event_loop::Dispatched;
pub use readiness::{ReadinessState, ReadinessWatcher};

use std::os::fd::{BorrowedFd, OwnedFd};
use std::sync::Arc;

use nix::unistd::Pid;
use serde::Serialize;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

use crate::launcher::{ChannelFactory, CommandSpawner, Launcher, ProcessSpawner, SocketPairFactory};
use crate::{Error, Result};

use api::PendingSpawn;

type Handle<C> = <<C as Compositor>::Api as XwaylandApi<C>>::Handle;

/// The X server currently being watched
#[derive(Debug)]
struct Helper {
    pid: Pid,
    /// Compositor end of the window manager connection, until it is handed
    /// to the module on readiness
    wm: Option<OwnedFd>,
}

/// Snapshot of the supervisor for the host
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStatus {
    pub pid: Option<i32>,
    pub readiness: ReadinessState,
    pub client_connected: bool,
    pub wm_channel_held: bool,
}

/// Owns the lifecycle of one X server at a time
pub struct Supervisor<C: Compositor, F = SocketPairFactory, S = CommandSpawner> {
    compositor: Arc<C>,
    api: Arc<C::Api>,
    handle: Handle<C>,
    launcher: Launcher<F, S>,

    helper: Option<Helper>,
    client: Option<C::Client>,
    readiness: ReadinessWatcher,

    requests: mpsc::UnboundedReceiver<PendingSpawn>,
    requests_open: bool,
    child_signals: Signal,
}

impl<C: Compositor> Supervisor<C> {
    /// Load the xwayland module into `compositor` and start supervising.
    pub fn load(compositor: Arc<C>) -> Result<Self> {
        Self::load_with(compositor, Launcher::default())
    }
}

impl<C, F, S> Supervisor<C, F, S>
where
    C: Compositor,
    F: ChannelFactory,
    S: ProcessSpawner,
{
    /// Like [`Supervisor::load`], with a custom launcher.
    pub fn load_with(compositor: Arc<C>, launcher: Launcher<F, S>) -> Result<Self> {
        compositor.load_xwayland().map_err(|e| {
            tracing::error!("Failed to load the xwayland module: {}", e);
            Error::ModuleLoad(e)
        })?;

        let api = compositor.xwayland_api().ok_or_else(|| {
            tracing::error!("Failed to get the xwayland module API");
            Error::MissingApi
        })?;

        let handle = api.get(&compositor).ok_or_else(|| {
            tracing::error!("Failed to get the xwayland object");
            Error::MissingHandle
        })?;

        let child_signals = signal(SignalKind::child()).map_err(|source| Error::Signal {
            signal: "SIGCHLD",
            source,
        })?;

        let (tx, requests) = mpsc::unbounded_channel();
        let mut supervisor = Self {
            compositor,
            api,
            handle,
            launcher,
            helper: None,
            client: None,
            readiness: ReadinessWatcher::new(),
            requests,
            requests_open: true,
            child_signals,
        };

        // On failure the supervisor is dropped here and the module's end of
        // the request queue goes dead with it.
        supervisor
            .api
            .listen(&supervisor.handle, SpawnRequests::new(tx))
            .map_err(|e| {
                tracing::error!("Failed to listen for X connections: {}", e);
                Error::Listen(e)
            })?;

        supervisor.readiness.arm().map_err(|source| Error::Signal {
            signal: "SIGUSR1",
            source,
        })?;

        tracing::info!("Xwayland supervisor loaded");
        Ok(supervisor)
    }

    /// Start an X server on `display`.
    pub fn spawn(
        &mut self,
        display: &str,
        abstract_fd: Option<BorrowedFd<'_>>,
        unix_fd: BorrowedFd<'_>,
    ) -> Result<Pid> {
        if let Some(helper) = &self.helper {
            tracing::warn!(pid = %helper.pid, "Xwayland already running, not spawning another");
            return Err(Error::AlreadyRunning(helper.pid));
        }

        let config = self.compositor.config();
        let server = self
            .launcher
            .launch(display, abstract_fd, unix_fd, &config.xwayland)?;

        match self.compositor.create_client(server.display) {
            Ok(client) => self.client = Some(client),
            Err(e) => {
                tracing::error!(pid = %server.pid, "Failed to create the Xwayland client: {}", e)
            }
        }

        // Watched from here on; its exit goes through handle_exit.
        self.helper = Some(Helper {
            pid: server.pid,
            wm: Some(server.wm),
        });

        Ok(server.pid)
    }

    /// The X server raised the readiness signal.
    ///
    /// Returns whether the signal was consumed.
    pub fn handle_readiness(&mut self) -> bool {
        if !self.readiness.is_armed() {
            return false;
        }

        let Some(helper) = self.helper.as_mut() else {
            tracing::warn!("Readiness signal without a running Xwayland, ignoring");
            return false;
        };
        let Some(client) = self.client.as_ref() else {
            tracing::warn!(pid = %helper.pid, "Xwayland signalled readiness without a client");
            return false;
        };
        let Some(wm) = helper.wm.take() else {
            return false;
        };

        tracing::info!(pid = %helper.pid, "Xwayland ready");
        self.api.xserver_loaded(&self.handle, client, wm);
        self.readiness.fire();
        true
    }

    /// The X server terminated.
    pub fn handle_exit(&mut self, status: ExitStatus) {
        let pid = self.helper.take().map(|helper| helper.pid);
        tracing::info!(?pid, %status, "Xwayland exited");

        self.api.xserver_exited(&self.handle, status);

        if let Err(e) = self.readiness.rearm() {
            tracing::error!("Failed to re-arm the readiness signal: {}", e);
        }

        self.client = None;
    }

    pub fn pid(&self) -> Option<Pid> {
        self.helper.as_ref().map(|helper| helper.pid)
    }

    pub fn client(&self) -> Option<&C::Client> {
        self.client.as_ref()
    }

    pub fn readiness(&self) -> ReadinessState {
        self.readiness.state()
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            pid: self.pid().map(Pid::as_raw),
            readiness: self.readiness.state(),
            client_connected: self.client.is_some(),
            wm_channel_held: self
                .helper
                .as_ref()
                .is_some_and(|helper| helper.wm.is_some()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::launcher::testing::{CountingChannels, RecordingSpawner};
    use crate::launcher::{Channel, ChannelFactory, SocketPairFactory};
    use std::io::Read;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    type TestSupervisor = Supervisor<FakeCompositor, CountingChannels, RecordingSpawner>;

    struct Fixture {
        compositor: Arc<FakeCompositor>,
        channels: CountingChannels,
        spawner: RecordingSpawner,
        unix: OwnedFd,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                compositor: Arc::new(FakeCompositor::with_api(FakeApi::default())),
                channels: CountingChannels::default(),
                spawner: RecordingSpawner::default(),
                unix: SocketPairFactory.create_pair(Channel::Display).unwrap().parent,
            }
        }

        fn load(&self) -> TestSupervisor {
            Supervisor::load_with(
                self.compositor.clone(),
                Launcher::new(self.channels.clone(), self.spawner.clone()),
            )
            .unwrap()
        }

        fn spawn(&self, supervisor: &mut TestSupervisor) -> Result<Pid> {
            supervisor.spawn(":0", None, self.unix.as_fd())
        }

        fn events(&self) -> Vec<ApiEvent> {
            self.compositor.api().events()
        }
    }

    fn load_error(compositor: FakeCompositor) -> Error {
        match Supervisor::load(Arc::new(compositor)) {
            Ok(_) => panic!("load should fail"),
            Err(e) => e,
        }
    }

    #[tokio::test]
    async fn test_load_listens_and_arms() {
        let fixture = Fixture::new();
        let supervisor = fixture.load();

        assert_eq!(fixture.events(), vec![ApiEvent::Listening]);
        assert_eq!(supervisor.readiness(), ReadinessState::Armed);
        assert!(supervisor.pid().is_none());
        assert!(supervisor.client().is_none());
    }

    #[tokio::test]
    async fn test_load_module_failure() {
        let compositor = FakeCompositor {
            fail_load: true,
            ..FakeCompositor::with_api(FakeApi::default())
        };
        let api = compositor.api();

        assert!(matches!(load_error(compositor), Error::ModuleLoad(_)));
        assert!(api.events().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_api() {
        assert!(matches!(
            load_error(FakeCompositor::default()),
            Error::MissingApi
        ));
    }

    #[tokio::test]
    async fn test_load_missing_handle() {
        let compositor = FakeCompositor::with_api(FakeApi {
            no_handle: true,
            ..Default::default()
        });
        let api = compositor.api();

        assert!(matches!(load_error(compositor), Error::MissingHandle));
        assert!(api.events().is_empty());
    }

    #[tokio::test]
    async fn test_load_listen_failure() {
        let compositor = FakeCompositor::with_api(FakeApi {
            fail_listen: true,
            ..Default::default()
        });
        let api = compositor.api();

        assert!(matches!(load_error(compositor), Error::Listen(_)));
        assert!(api.events().is_empty());
        assert!(api.requests.lock().is_none());
    }

    #[tokio::test]
    async fn test_spawn_wraps_display_channel() {
        let fixture = Fixture::new();
        let mut supervisor = fixture.load();

        let pid = fixture.spawn(&mut supervisor).unwrap();

        assert_eq!(supervisor.pid(), Some(pid));
        assert_eq!(*fixture.channels.created.lock(), 2);
        assert_eq!(fixture.spawner.plans.lock().len(), 1);

        let status = supervisor.status();
        assert!(status.client_connected);
        assert!(status.wm_channel_held);
        assert_eq!(status.pid, Some(pid.as_raw()));

        // Nothing but the compositor holds the display channel now.
        let client = supervisor.client.take().unwrap();
        let mut buf = Vec::new();
        assert_eq!(UnixStream::from(client.socket).read_to_end(&mut buf).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawn_while_running_is_rejected() {
        let fixture = Fixture::new();
        let mut supervisor = fixture.load();

        let pid = fixture.spawn(&mut supervisor).unwrap();
        assert!(matches!(
            fixture.spawn(&mut supervisor),
            Err(Error::AlreadyRunning(p)) if p == pid
        ));
        assert_eq!(fixture.spawner.plans.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_failure_starts_nothing() {
        let mut fixture = Fixture::new();
        fixture.channels.fail_on = Some(Channel::WindowManager);
        let mut supervisor = fixture.load();

        assert!(matches!(fixture.spawn(&mut supervisor), Err(Error::Channel(_))));
        assert!(fixture.spawner.plans.lock().is_empty());
        assert!(supervisor.pid().is_none());
        assert!(supervisor.client().is_none());
        assert_eq!(supervisor.readiness(), ReadinessState::Armed);
    }

    #[tokio::test]
    async fn test_sequential_cycles() {
        let fixture = Fixture::new();
        let mut supervisor = fixture.load();

        for _ in 0..3 {
            assert_eq!(supervisor.readiness(), ReadinessState::Armed);
            fixture.spawn(&mut supervisor).unwrap();

            assert!(supervisor.handle_readiness());
            assert_eq!(supervisor.readiness(), ReadinessState::Fired);
            assert!(!supervisor.status().wm_channel_held);
            assert!(!supervisor.handle_readiness());

            supervisor.handle_exit(ExitStatus::Exited(0));
            assert_eq!(supervisor.readiness(), ReadinessState::Armed);
            assert!(supervisor.client().is_none());
            assert!(supervisor.pid().is_none());
        }

        assert_eq!(
            fixture.events(),
            vec![
                ApiEvent::Listening,
                ApiEvent::Loaded { client: 1 },
                ApiEvent::Exited(ExitStatus::Exited(0)),
                ApiEvent::Loaded { client: 2 },
                ApiEvent::Exited(ExitStatus::Exited(0)),
                ApiEvent::Loaded { client: 3 },
                ApiEvent::Exited(ExitStatus::Exited(0)),
            ]
        );
        assert_eq!(fixture.compositor.api().wm_fds.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_exit_before_readiness() {
        let fixture = Fixture::new();
        let mut supervisor = fixture.load();

        fixture.spawn(&mut supervisor).unwrap();
        supervisor.handle_exit(ExitStatus::Signaled(nix::libc::SIGSEGV));

        assert_eq!(supervisor.readiness(), ReadinessState::Armed);
        assert_eq!(
            fixture.events(),
            vec![
                ApiEvent::Listening,
                ApiEvent::Exited(ExitStatus::Signaled(nix::libc::SIGSEGV)),
            ]
        );

        fixture.spawn(&mut supervisor).unwrap();
        assert!(supervisor.handle_readiness());
        assert_eq!(
            fixture.events().last(),
            Some(&ApiEvent::Loaded { client: 2 })
        );
    }

    #[tokio::test]
    async fn test_readiness_without_helper_is_ignored() {
        let fixture = Fixture::new();
        let mut supervisor = fixture.load();

        assert!(!supervisor.handle_readiness());
        assert_eq!(supervisor.readiness(), ReadinessState::Armed);
        assert_eq!(fixture.events(), vec![ApiEvent::Listening]);
    }

    #[tokio::test]
    async fn test_status_shape() {
        let fixture = Fixture::new();
        let supervisor = fixture.load();

        let json = serde_json::to_value(supervisor.status()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "pid": null,
                "readiness": "armed",
                "clientConnected": false,
                "wmChannelHeld": false,
            })
        );
    }
}
