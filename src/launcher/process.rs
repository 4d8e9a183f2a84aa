//! Starting the X server process
//!
//! Descriptors are never duplicated. The child keeps the parent's descriptor
//! numbers, and close-on-exec is cleared on exactly the descriptors listed in
//! the plan, after fork and before exec.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::Pid;

/// Everything needed to start one process
#[derive(Debug, Clone)]
pub struct SpawnPlan {
    pub program: PathBuf,
    /// Full argument vector, `argv[0]` included
    pub argv: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    /// Descriptors that must survive exec
    pub inherit_fds: Vec<RawFd>,
    /// Signals set to ignored in the child
    pub ignore_signals: Vec<Signal>,
}

/// Starts processes from a plan
pub trait ProcessSpawner {
    fn spawn(&mut self, plan: &SpawnPlan) -> std::io::Result<Pid>;
}

/// Spawner backed by [`std::process::Command`]
///
/// Exec failures are reported back to the parent by `Command::spawn`, and
/// the failed child is reaped there.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandSpawner;

impl ProcessSpawner for CommandSpawner {
    fn spawn(&mut self, plan: &SpawnPlan) -> std::io::Result<Pid> {
        let mut cmd = Command::new(&plan.program);
        if let Some(arg0) = plan.argv.first() {
            cmd.arg0(arg0);
        }
        cmd.args(plan.argv.iter().skip(1));
        cmd.envs(plan.env.iter().map(|(k, v)| (k, v)));

        let inherit_fds = plan.inherit_fds.clone();
        let ignore_signals = plan.ignore_signals.clone();

        // SAFETY: the closure only calls fcntl(2) and sigaction(2), both
        // async-signal-safe, and does not allocate.
        unsafe {
            cmd.pre_exec(move || {
                for &fd in &inherit_fds {
                    fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
                }
                for &sig in &ignore_signals {
                    signal(sig, SigHandler::SigIgn)?;
                }
                Ok(())
            });
        }

        let child = cmd.spawn()?;
        // The child is reaped by the supervisor's process watch, not by std.
        Ok(Pid::from_raw(child.id() as i32))
    }
}
