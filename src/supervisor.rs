/// Process supervisor: owns the one server child process and its pipes.
///
/// All operations take `&self`, so callers can share a supervisor through an
/// `Arc`. `is_running` reports whether a handle is held; it does not query
/// the OS, so a server that died on its own still counts as running until
/// `stop()` is called. `is_running`, `pid` and `status` read a small process
/// record instead of the handle, so they answer immediately during a stop.
use crate::channel::{self, CommandResponse, SendError};
use crate::config::{ConfigError, SupervisorConfig};
use crate::output::Shared;
use crate::reader::{self, ReaderExit};
use crate::shutdown;
use crate::terminate::{self, Terminator};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// The live child process and the endpoints the supervisor owns.
pub(crate) struct ServerHandle {
    pub(crate) child: Child,
    pub(crate) pid: u32,
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) reader: JoinHandle<ReaderExit>,
    pub(crate) started_at: DateTime<Utc>,
}

/// What status queries see of the held process.
#[derive(Debug, Clone, Copy)]
struct ProcessInfo {
    pid: u32,
    started_at: DateTime<Utc>,
    stopping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    /// A process was already held; nothing was spawned.
    AlreadyRunning { pid: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: u32 },
    /// No process was held; nothing happened.
    NotRunning,
}

/// Point-in-time view of the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub running: bool,
    /// A stop is in progress; the process is still held.
    pub stopping: bool,
    pub pid: Option<u32>,
    pub ready: bool,
    pub reader_alive: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub buffered_lines: usize,
    pub dropped_lines: u64,
}

/// Errors from process lifecycle operations.
#[derive(Debug)]
pub enum SupervisorError {
    /// The launch primitive failed; no process is held.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// Forced termination failed; the process is still held.
    Terminate { pid: u32, source: std::io::Error },
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::Spawn { command, source } => {
                write!(f, "failed to spawn server `{}`: {}", command, source)
            }
            SupervisorError::Terminate { pid, source } => {
                write!(f, "failed to terminate server pid {}: {}", pid, source)
            }
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupervisorError::Spawn { source, .. } => Some(source),
            SupervisorError::Terminate { source, .. } => Some(source),
        }
    }
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    pattern: Regex,
    shared: Arc<Shared>,
    handle: Mutex<Option<ServerHandle>>,
    process: StdMutex<Option<ProcessInfo>>,
    in_flight: Mutex<()>,
    terminator: Box<dyn Terminator>,
}

impl ProcessSupervisor {
    /// Validate `config` and build an idle supervisor.
    pub fn new(config: SupervisorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pattern = config.ready_pattern()?;
        let shared = Arc::new(Shared::new(config.output.capacity));
        Ok(Self {
            config,
            pattern,
            shared,
            handle: Mutex::new(None),
            process: StdMutex::new(None),
            in_flight: Mutex::new(()),
            terminator: terminate::platform_default(),
        })
    }

    /// Replace the platform terminator.
    #[allow(dead_code)]
    pub fn with_terminator(mut self, terminator: impl Terminator + 'static) -> Self {
        self.terminator = Box::new(terminator);
        self
    }

    fn process(&self) -> MutexGuard<'_, Option<ProcessInfo>> {
        self.process.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the server unless one is already held.
    pub async fn start(&self) -> Result<StartOutcome, SupervisorError> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.as_ref() {
            tracing::info!(pid = handle.pid, "server is already running");
            return Ok(StartOutcome::AlreadyRunning { pid: handle.pid });
        }

        let server = &self.config.server;
        let spawn_err = |source| SupervisorError::Spawn {
            command: server.command.clone(),
            source,
        };

        tracing::info!(
            command = %server.command,
            args = ?server.args,
            working_dir = %server.working_dir.display(),
            "spawning server"
        );

        let mut cmd = Command::new(&server.command);
        cmd.args(&server.args)
            .current_dir(&server.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0); // Own group so termination reaches launcher children

        let mut child = cmd.spawn().map_err(spawn_err)?;
        let pid = match child_pid(&child) {
            Ok(pid) => pid,
            Err(e) => {
                let _ = child.start_kill();
                return Err(spawn_err(e));
            }
        };

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.start_kill();
                return Err(spawn_err(std::io::Error::other(
                    "child output pipes were not captured",
                )));
            }
        };
        let stdin = child.stdin.take();

        self.shared.reset_for_start();
        let reader = reader::spawn(stdout, stderr, self.shared.clone(), self.pattern.clone());

        let started_at = Utc::now();
        *guard = Some(ServerHandle {
            child,
            pid,
            stdin,
            reader,
            started_at,
        });
        *self.process() = Some(ProcessInfo {
            pid,
            started_at,
            stopping: false,
        });
        tracing::info!(pid, "server process started");
        Ok(StartOutcome::Started { pid })
    }

    /// Stop the held server. Succeeds trivially when nothing is held.
    pub async fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.as_mut() else {
            tracing::info!("server is not running");
            return Ok(StopOutcome::NotRunning);
        };
        let pid = handle.pid;
        self.set_stopping(true);

        if let Err(e) = shutdown::shutdown(
            handle,
            &self.shared,
            &self.config.shutdown,
            self.terminator.as_ref(),
        )
        .await
        {
            self.set_stopping(false);
            return Err(e);
        }

        *guard = None;
        *self.process() = None;
        tracing::info!(pid, "server has been stopped");
        Ok(StopOutcome::Stopped { pid })
    }

    fn set_stopping(&self, stopping: bool) {
        if let Some(info) = self.process().as_mut() {
            info.stopping = stopping;
        }
    }

    /// True while a process handle is held, including during a stop.
    pub fn is_running(&self) -> bool {
        self.process().is_some()
    }

    /// Readiness gate is open and the reader can still deliver output.
    pub fn is_ready(&self) -> bool {
        let state = self.shared.lock();
        state.ready && state.reader_alive
    }

    #[allow(dead_code)]
    pub fn pid(&self) -> Option<u32> {
        self.process().map(|p| p.pid)
    }

    /// Wait for the readiness banner. Returns `false` on timeout or if the
    /// reader exits first.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.shared.ready_set().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.shared.lock();
                if state.ready {
                    return state.reader_alive;
                }
                if !state.reader_alive {
                    return false;
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_ready();
            }
        }
    }

    /// Send one console command and collect its response.
    pub async fn send(&self, command: &str) -> Result<CommandResponse, SendError> {
        if !self.shared.is_ready() {
            tracing::info!(command, "server is not ready to receive commands");
            return Err(SendError::NotReady);
        }
        let command = channel::normalize_command(command)?;
        let _in_flight = self.in_flight.try_lock().map_err(|_| {
            tracing::info!(command, "rejecting command, another is in flight");
            SendError::Busy
        })?;

        if self.process().map_or(true, |p| p.stopping) {
            return Err(SendError::NotRunning);
        }
        let sent_at = {
            let mut guard = self.handle.lock().await;
            let handle = guard.as_mut().ok_or(SendError::NotRunning)?;
            if !self.shared.reader_alive() {
                tracing::warn!(pid = handle.pid, "output reader has exited");
                return Err(SendError::OutputClosed);
            }
            let Some(stdin) = handle.stdin.as_mut() else {
                tracing::error!(pid = handle.pid, "cannot send command, stdin is not available");
                return Err(SendError::StdinUnavailable);
            };
            if let Err(e) = channel::write_command(stdin, command).await {
                tracing::error!(pid = handle.pid, error = %e, "failed to write command");
                handle.stdin = None;
                return Err(SendError::StdinUnavailable);
            }
            tracing::info!(command, "command sent");
            tokio::time::Instant::now()
        };

        let response =
            channel::collect_response(&self.shared, &self.config.command, sent_at).await;
        if response == CommandResponse::Timeout {
            tracing::warn!(command, "no output received from server command");
        }
        Ok(response)
    }

    /// Drain everything currently buffered, independent of any command.
    pub fn get_buffered_output(&self) -> Vec<String> {
        self.shared.drain()
    }

    pub fn status(&self) -> SupervisorStatus {
        let process = *self.process();
        let state = self.shared.lock();
        SupervisorStatus {
            running: process.is_some(),
            stopping: process.is_some_and(|p| p.stopping),
            pid: process.map(|p| p.pid),
            ready: state.ready,
            reader_alive: state.reader_alive,
            started_at: process.map(|p| p.started_at),
            buffered_lines: state.buffer.len(),
            dropped_lines: state.buffer.dropped(),
        }
    }
}

/// A child polled to completion no longer reports a PID; terminating PID 0
/// would signal the supervisor's own process group.
fn child_pid(child: &Child) -> std::io::Result<u32> {
    child
        .id()
        .ok_or_else(|| std::io::Error::other("child exited before its pid was read"))
}
