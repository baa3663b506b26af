/// Output reader: drains the child's stdout and stderr into the shared buffer
/// and opens the readiness gate when the banner shows up.
///
/// The two pipes are merged here with `select!`; the merged stream counts as
/// closed once both halves hit EOF. The stop signal is checked between reads
/// only, so a pending read is never interrupted by it.
use crate::output::Shared;
use regex::Regex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// Why the reader loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Both streams reached EOF.
    Closed,
    /// The stop signal was observed between reads.
    Stopped,
    /// A read failed; no retry is attempted.
    Failed,
}

/// Spawn the reader task for one process lifetime.
pub fn spawn<O, E>(
    stdout: O,
    stderr: E,
    shared: Arc<Shared>,
    pattern: Regex,
) -> JoinHandle<ReaderExit>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let exit = run(stdout, stderr, &shared, &pattern).await;
        shared.mark_reader_exited();
        tracing::debug!(?exit, "output reader exiting");
        exit
    })
}

async fn run<O, E>(stdout: O, stderr: E, shared: &Shared, pattern: &Regex) -> ReaderExit
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out = BufReader::new(stdout);
    let mut err = BufReader::new(stderr);
    // Partial lines survive a lost `select!` race in these buffers.
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        if shared.stop_requested() {
            return ReaderExit::Stopped;
        }

        let (stream, result) = tokio::select! {
            r = out.read_until(b'\n', &mut out_buf), if out_open => ("stdout", r),
            r = err.read_until(b'\n', &mut err_buf), if err_open => ("stderr", r),
        };
        let (open, buf) = if stream == "stdout" {
            (&mut out_open, &mut out_buf)
        } else {
            (&mut err_open, &mut err_buf)
        };

        match result {
            Ok(n) => {
                if !buf.is_empty() {
                    handle_line(&take_line(buf), shared, pattern);
                }
                if n == 0 {
                    tracing::debug!(stream, "child stream closed");
                    *open = false;
                }
            }
            Err(e) => {
                tracing::warn!(stream, error = %e, "error reading child output");
                return ReaderExit::Failed;
            }
        }
    }

    ReaderExit::Closed
}

/// Decode one raw line. Invalid UTF-8 (Latin-1 chat, plugin output) is
/// replaced rather than treated as a stream failure.
fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    line
}

fn handle_line(line: &str, shared: &Shared, pattern: &Regex) {
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        tracing::debug!(line = trimmed, "server output");
        if !shared.push_line(trimmed.to_string()) {
            tracing::trace!("output buffer full, dropping line");
        }
    }

    // Matched against the raw line, independent of buffer fullness.
    if pattern.is_match(line) && shared.mark_ready() {
        tracing::info!("server is ready");
    }
}
