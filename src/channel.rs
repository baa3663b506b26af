/// Command channel: write one operator command to the server's stdin and
/// collect whatever the server logs in response.
///
/// There is no correlation token in the console protocol. Whatever lands in
/// the output buffer during the window is attributed to this command, so a
/// late line from an earlier command can show up here.
use crate::config::CommandConfig;
use crate::output::Shared;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

/// Result of a command that was actually written to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    /// Lines drained from the buffer, first-seen order, exact duplicates removed.
    Output(Vec<String>),
    /// Nothing was logged within the timeout. Not a fault.
    Timeout,
}

/// Reasons a command was rejected before (or instead of) reaching the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The readiness banner has not been seen yet.
    NotReady,
    /// The stdin pipe is missing or a write to it failed.
    StdinUnavailable,
    /// Another command is still collecting its response.
    Busy,
    /// No server process is held.
    NotRunning,
    /// The output reader has exited; nothing can answer.
    OutputClosed,
    /// The command contains a line break and would be split in two.
    InvalidCommand,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::NotReady => write!(f, "server is not ready to receive commands"),
            SendError::StdinUnavailable => write!(f, "server stdin is not available"),
            SendError::Busy => write!(f, "another command is still in flight"),
            SendError::NotRunning => write!(f, "server is not running"),
            SendError::OutputClosed => write!(f, "server output stream has closed"),
            SendError::InvalidCommand => write!(f, "command must be a single line"),
        }
    }
}

impl std::error::Error for SendError {}

/// Reject commands with embedded line breaks; a trailing newline is fine.
pub fn normalize_command(command: &str) -> Result<&str, SendError> {
    let command = command.trim_end_matches(['\r', '\n']);
    if command.contains(['\r', '\n']) {
        return Err(SendError::InvalidCommand);
    }
    Ok(command)
}

/// Write `command` plus a newline and flush.
pub async fn write_command<W>(stdin: &mut W, command: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = String::with_capacity(command.len() + 1);
    line.push_str(command);
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

/// Poll the buffer for a response to a command written at `sent_at`.
///
/// Sampling starts after the settle delay. The first non-empty drain is
/// returned right away; the timeout runs from `sent_at`.
pub async fn collect_response(
    shared: &Shared,
    config: &CommandConfig,
    sent_at: Instant,
) -> CommandResponse {
    let deadline = sent_at + config.timeout();
    tokio::time::sleep_until(sent_at + config.settle_delay()).await;

    let mut collected: Vec<String> = Vec::new();
    loop {
        for line in shared.drain() {
            if !collected.contains(&line) {
                collected.push(line);
            }
        }
        if !collected.is_empty() {
            return CommandResponse::Output(collected);
        }

        let now = Instant::now();
        if now >= deadline {
            return CommandResponse::Timeout;
        }
        tokio::time::sleep(config.poll_interval().min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_config() -> CommandConfig {
        CommandConfig {
            settle_delay_ms: 50,
            timeout_ms: 400,
            poll_interval_ms: 10,
        }
    }

    #[test]
    fn test_normalize_strips_trailing_newline() {
        assert_eq!(normalize_command("list\n"), Ok("list"));
        assert_eq!(normalize_command("list\r\n"), Ok("list"));
        assert_eq!(normalize_command("say hi"), Ok("say hi"));
    }

    #[test]
    fn test_normalize_rejects_embedded_newline() {
        assert_eq!(
            normalize_command("say hi\nop someone"),
            Err(SendError::InvalidCommand)
        );
    }

    #[tokio::test]
    async fn test_write_command_appends_newline() {
        let mut sink: Vec<u8> = Vec::new();
        write_command(&mut sink, "list").await.unwrap();
        assert_eq!(sink, b"list\n");
    }

    #[tokio::test]
    async fn test_collect_dedupes_in_first_seen_order() {
        let shared = Shared::new(16);
        for line in ["b", "a", "b", "c", "a"] {
            shared.push_line(line.to_string());
        }

        let response = collect_response(&shared, &fast_config(), Instant::now()).await;
        assert_eq!(
            response,
            CommandResponse::Output(vec!["b".to_string(), "a".to_string(), "c".to_string()])
        );
        assert!(shared.drain().is_empty());
    }

    #[tokio::test]
    async fn test_collect_returns_on_first_output() {
        let shared = Arc::new(Shared::new(16));
        let pusher = shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            pusher.push_line("late line".to_string());
        });

        let start = std::time::Instant::now();
        let response = collect_response(&shared, &fast_config(), Instant::now()).await;
        assert_eq!(response, CommandResponse::Output(vec!["late line".to_string()]));
        assert!(start.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_collect_times_out_when_silent() {
        let shared = Shared::new(16);
        let start = std::time::Instant::now();
        let response = collect_response(&shared, &fast_config(), Instant::now()).await;
        assert_eq!(response, CommandResponse::Timeout);

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_collect_waits_out_settle_delay() {
        let shared = Shared::new(16);
        shared.push_line("already there".to_string());

        let start = std::time::Instant::now();
        let response = collect_response(&shared, &fast_config(), Instant::now()).await;
        assert_eq!(
            response,
            CommandResponse::Output(vec!["already there".to_string()])
        );
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
