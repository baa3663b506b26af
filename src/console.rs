/// Interactive operator console: read a line, forward it to the server,
/// print what comes back.
///
/// Built-ins: `exit`/`quit`, `:output` (drain buffered output), `:status`,
/// and `tp <player> <x> <y> <z>` / `tp <player> <target>`.
use crate::channel::CommandResponse;
use crate::commands::{self, TeleportError};
use crate::signals::ShutdownSignal;
use crate::supervisor::{ProcessSupervisor, SupervisorStatus};
use chrono::Utc;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Empty,
    Exit,
    Output,
    Status,
    Teleport(Result<String, TeleportError>),
    Send(String),
}

/// Why the console loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator typed `exit` or `quit`.
    Exit,
    /// Input reached EOF.
    InputClosed,
    Signal(ShutdownSignal),
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return ConsoleCommand::Exit;
    }
    match line {
        ":output" => return ConsoleCommand::Output,
        ":status" => return ConsoleCommand::Status,
        _ => {}
    }
    if let Some(args) = line.strip_prefix("tp ") {
        return ConsoleCommand::Teleport(commands::parse_teleport_args(args));
    }
    ConsoleCommand::Send(line.to_string())
}

/// Run the console until `exit`, EOF, or `shutdown` resolves.
///
/// The server is left running; stopping it is the caller's job.
pub async fn run<R, W, S>(
    supervisor: &ProcessSupervisor,
    input: R,
    out: &mut W,
    shutdown: S,
) -> std::io::Result<ConsoleExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ShutdownSignal>,
{
    tokio::pin!(shutdown);
    let mut lines = input.lines();

    loop {
        out.write_all(b"Enter command: ").await?;
        out.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            signal = &mut shutdown => {
                tracing::info!(%signal, "shutdown signal received");
                out.write_all(b"\n").await?;
                return Ok(ConsoleExit::Signal(signal));
            }
        };
        let Some(line) = line else {
            return Ok(ConsoleExit::InputClosed);
        };

        match parse_line(&line) {
            ConsoleCommand::Empty => {}
            ConsoleCommand::Exit => return Ok(ConsoleExit::Exit),
            ConsoleCommand::Output => {
                print_server_lines(out, &supervisor.get_buffered_output()).await?;
            }
            ConsoleCommand::Status => {
                let status = supervisor.status();
                out.write_all(format_status(&status).as_bytes()).await?;
            }
            ConsoleCommand::Teleport(Ok(command)) | ConsoleCommand::Send(command) => {
                // The response window can run for seconds; don't sit out a signal.
                tokio::select! {
                    result = send_and_print(supervisor, &command, out) => result?,
                    signal = &mut shutdown => {
                        tracing::info!(%signal, "shutdown signal received during command");
                        out.write_all(b"\n").await?;
                        return Ok(ConsoleExit::Signal(signal));
                    }
                }
            }
            ConsoleCommand::Teleport(Err(e)) => {
                out.write_all(format!("Invalid teleport: {e}\n").as_bytes())
                    .await?;
            }
        }
    }
}

async fn send_and_print<W>(
    supervisor: &ProcessSupervisor,
    command: &str,
    out: &mut W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match supervisor.send(command).await {
        Ok(CommandResponse::Output(lines)) => print_server_lines(out, &lines).await?,
        Ok(CommandResponse::Timeout) => {
            out.write_all(b"No output received from server command.\n")
                .await?
        }
        Err(e) => out.write_all(format!("Command not sent: {e}\n").as_bytes()).await?,
    }
    // Anything that trickled in after the response window.
    print_server_lines(out, &supervisor.get_buffered_output()).await
}

async fn print_server_lines<W>(out: &mut W, lines: &[String]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for line in lines {
        out.write_all(format!("[Server]: {line}\n").as_bytes())
            .await?;
    }
    out.flush().await
}

pub fn format_status(status: &SupervisorStatus) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut text = format!(
        "running: {}\nready: {}\nreader alive: {}\n",
        yes_no(status.running),
        yes_no(status.ready),
        yes_no(status.reader_alive),
    );
    if status.stopping {
        text.push_str("stopping: yes\n");
    }
    if let Some(pid) = status.pid {
        text.push_str(&format!("pid: {pid}\n"));
    }
    if let Some(started_at) = status.started_at {
        let uptime = Utc::now().signed_duration_since(started_at);
        text.push_str(&format!(
            "started: {} (up {}s)\n",
            started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            uptime.num_seconds()
        ));
    }
    text.push_str(&format!(
        "buffered lines: {} (dropped {})\n",
        status.buffered_lines, status.dropped_lines
    ));
    text
}
