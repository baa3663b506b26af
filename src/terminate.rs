/// Forced termination of the server process, keyed by PID.
///
/// Unix children are spawned as their own process group leader, so killing
/// the group also takes down any launcher script's descendants.
use std::io;

/// Terminate a process (and its children) by process identity.
pub trait Terminator: Send + Sync {
    fn terminate(&self, pid: u32) -> io::Result<()>;
}

/// SIGKILL to the child's process group. An already-gone group is success.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

#[cfg(unix)]
impl Terminator for SignalTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => {
                tracing::info!(pid, "sent SIGKILL to server process group");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                tracing::debug!(pid, "server process group already gone");
                Ok(())
            }
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

/// taskkill's exit code when no process matches the PID.
#[cfg(not(unix))]
const TASKKILL_NOT_FOUND: i32 = 128;

/// `taskkill /T /F` by PID; the tree flag covers the launcher's children.
#[cfg(not(unix))]
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskkillTerminator;

#[cfg(not(unix))]
impl Terminator for TaskkillTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()?;
        if status.success() {
            tracing::info!(pid, "taskkill terminated server process tree");
            Ok(())
        } else if status.code() == Some(TASKKILL_NOT_FOUND) {
            tracing::debug!(pid, "server process already gone");
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "taskkill exited with {:?} for pid {}",
                status.code(),
                pid
            )))
        }
    }
}

/// The terminator for the current platform.
pub fn platform_default() -> Box<dyn Terminator> {
    #[cfg(unix)]
    {
        Box::new(SignalTerminator)
    }

    #[cfg(not(unix))]
    {
        Box::new(TaskkillTerminator)
    }
}
