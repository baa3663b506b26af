/// Shutdown sequence for a held server process.
///
/// 1. Write the stop directive straight to stdin (no readiness or timeout logic).
/// 2. Wait up to the grace period for a cooperative exit.
/// 3. Terminate by PID through the configured `Terminator`, then reap. This runs
///    even after a cooperative exit: a launcher script can exit on `stop` while
///    the real server it started keeps running in the same process group.
/// 4. Close stdin, let the reader drain to EOF, raise the stop signal, and join
///    the reader with a bounded wait.
use crate::channel::write_command;
use crate::config::ShutdownConfig;
use crate::output::Shared;
use crate::supervisor::{ServerHandle, SupervisorError};
use crate::terminate::Terminator;
use tokio::time::timeout;

/// Run the sequence against `handle`. On error the handle is left usable so
/// the caller can retry; on success it is ready to be dropped.
pub(crate) async fn shutdown(
    handle: &mut ServerHandle,
    shared: &Shared,
    config: &ShutdownConfig,
    terminator: &dyn Terminator,
) -> Result<(), SupervisorError> {
    let pid = handle.pid;
    tracing::info!(pid, stop_command = %config.stop_command, "stopping server");

    match handle.stdin.as_mut() {
        Some(stdin) => {
            if let Err(e) = write_command(stdin, &config.stop_command).await {
                tracing::warn!(pid, error = %e, "failed to write stop directive");
            }
        }
        None => tracing::warn!(pid, "stdin unavailable, skipping stop directive"),
    }

    let exited = match timeout(config.grace_period(), handle.child.wait()).await {
        Ok(Ok(status)) => {
            tracing::info!(pid, ?status, "server exited within grace period");
            true
        }
        Ok(Err(e)) => {
            tracing::warn!(pid, error = %e, "failed to wait on server process");
            false
        }
        Err(_) => {
            tracing::warn!(
                pid,
                grace_ms = config.grace_period_ms,
                "server still running after grace period"
            );
            false
        }
    };

    terminator
        .terminate(pid)
        .map_err(|e| SupervisorError::Terminate { pid, source: e })?;

    // Already-reaped children return their cached status immediately.
    let reaped = match timeout(config.reap_timeout(), handle.child.wait()).await {
        Ok(Ok(status)) => {
            if !exited {
                tracing::info!(pid, ?status, "server terminated");
            }
            true
        }
        Ok(Err(e)) => {
            tracing::warn!(pid, error = %e, "failed to reap server process");
            false
        }
        Err(_) => {
            tracing::warn!(pid, "server not reaped after forced termination");
            false
        }
    };

    handle.stdin = None;

    // With the process group gone its pipes reach EOF on their own; raising
    // the stop signal first could skip lines still sitting in the pipes.
    if !reaped {
        shared.request_stop();
    }
    let joined = timeout(config.reader_join_timeout(), &mut handle.reader).await;
    shared.request_stop();

    match joined {
        Ok(Ok(exit)) => tracing::debug!(pid, ?exit, "output reader joined"),
        Ok(Err(e)) => {
            tracing::warn!(pid, error = %e, "output reader task failed");
            shared.mark_reader_exited();
        }
        Err(_) => {
            tracing::warn!(pid, "output reader did not finish in time, aborting it");
            handle.reader.abort();
            shared.mark_reader_exited();
        }
    }

    Ok(())
}
