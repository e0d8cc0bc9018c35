//! Session processes started on a PTY slave.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::debug;

use gosh_core::error::{Error, Result};
use gosh_core::platform::{LaunchSpec, ProcessExit, ProcessLauncher, ProcessSignal, SessionProcess};

use super::pty::PtySlave;

/// Starts processes with the PTY slave as controlling terminal and stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessLauncher;

impl ProcessLauncher<PtySlave> for OsProcessLauncher {
    type Process = OsProcess;

    fn launch(&self, slave: PtySlave, spec: &LaunchSpec) -> Result<OsProcess> {
        let tty = slave.into_owned_fd();
        let clone_err = |e: std::io::Error| Error::Pty {
            message: format!("failed to duplicate pty slave: {}", e),
        };
        let stdin = tty.try_clone().map_err(clone_err)?;
        let stdout = tty.try_clone().map_err(clone_err)?;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .env_clear()
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&spec.cwd)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(tty))
            .kill_on_drop(true);
        if let Some(gid) = spec.gid {
            cmd.gid(gid);
        }
        if let Some(uid) = spec.uid {
            cmd.uid(uid);
        }

        // SAFETY: only async-signal-safe calls between fork and exec.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|e| Error::Process {
            message: format!("cannot start {}: {}", spec.program.display(), e),
        })?;
        let pid = child.id();
        debug!(pid, program = %spec.program.display(), "Spawned process");

        Ok(OsProcess {
            child,
            pid,
            exit: None,
        })
    }
}

/// A process started by [`OsProcessLauncher`].
#[derive(Debug)]
pub struct OsProcess {
    child: Child,
    pid: Option<u32>,
    exit: Option<ProcessExit>,
}

impl OsProcess {
    fn record(&mut self, status: ExitStatus) -> ProcessExit {
        let exit = ProcessExit {
            code: status.code(),
            signal: status.signal(),
        };
        self.exit = Some(exit);
        exit
    }
}

#[async_trait]
impl SessionProcess for OsProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn signal(&mut self, signal: ProcessSignal) -> Result<()> {
        let (Some(pid), None) = (self.pid, self.exit) else {
            return Ok(());
        };
        let signal = match signal {
            ProcessSignal::Interrupt => Signal::SIGINT,
            ProcessSignal::Hangup => Signal::SIGHUP,
            ProcessSignal::Kill => Signal::SIGKILL,
        };
        kill(Pid::from_raw(pid as i32), signal).map_err(|e| Error::Process {
            message: format!("failed to send {:?} to {}: {}", signal, pid, e),
        })
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let status = self.child.wait().await.map_err(|e| Error::Process {
            message: format!("failed to wait for process: {}", e),
        })?;
        Ok(self.record(status))
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit));
        }
        let status = self.child.try_wait().map_err(|e| Error::Process {
            message: format!("failed to check process: {}", e),
        })?;
        Ok(status.map(|status| self.record(status)))
    }
}
