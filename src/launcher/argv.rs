//! X server command line

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::Path;

/// Slots in the argument vector, counting the terminating null of `execv`
pub const MAX_ARGS: usize = 13;

const FIXED_ARGS: usize = 9;
const LISTEN_ARGS: usize = 2;
const ACCESS_CONTROL_ARGS: usize = 1;

const _: () = assert!(FIXED_ARGS + LISTEN_ARGS + ACCESS_CONTROL_ARGS < MAX_ARGS);

/// Inputs of the X server command line
#[derive(Debug, Clone)]
pub struct XserverArgs<'a> {
    pub server_path: &'a Path,
    pub display: &'a str,
    /// Listening socket on the filesystem display path
    pub unix_fd: RawFd,
    /// Child end of the window manager channel
    pub wm_fd: RawFd,
    /// Listening socket in the abstract namespace, if the compositor has one
    pub abstract_fd: Option<RawFd>,
    pub disable_access_control: bool,
}

impl XserverArgs<'_> {
    /// Build the argument vector, `argv[0]` included.
    pub fn build(&self) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::with_capacity(MAX_ARGS - 1);

        argv.push(self.server_path.as_os_str().to_owned());
        argv.push(self.display.into());
        argv.extend(
            [
                "-rootless".to_string(),
                "-core".to_string(),
                "-listen".to_string(),
                self.unix_fd.to_string(),
                "-wm".to_string(),
                self.wm_fd.to_string(),
                "-terminate".to_string(),
            ]
            .map(OsString::from),
        );

        match self.abstract_fd {
            Some(fd) => {
                argv.push("-listen".into());
                argv.push(fd.to_string().into());
            }
            None => {
                argv.push("-nolisten".into());
                argv.push("local".into());
            }
        }

        if self.disable_access_control {
            argv.push("-ac".into());
        }

        assert!(argv.len() < MAX_ARGS);
        argv
    }
}

/// Render an argument vector the way it would be typed in a shell, for logs
pub fn command_line(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
