mod channel;
mod commands;
mod config;
mod console;
mod output;
mod reader;
mod shutdown;
mod signals;
mod supervisor;
mod terminate;

use clap::Parser;
use config::SupervisorConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use supervisor::{ProcessSupervisor, StartOutcome, StopOutcome};
use tracing_subscriber::EnvFilter;

/// Run a game server as a supervised child process and drive its console:
/// start it, wait for the readiness banner, forward operator commands, and
/// shut it down cleanly.
#[derive(Parser, Debug)]
#[command(name = "mcsup", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "mcsup.toml")]
    config: PathBuf,

    /// Server working directory (overrides config)
    #[arg(long)]
    server_dir: Option<PathBuf>,

    /// Command response timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// How long to wait for the readiness banner before opening the console
    #[arg(long, default_value_t = 300)]
    ready_timeout_secs: u64,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (server output lines, reader state)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<SupervisorConfig, config::ConfigError> {
    let mut config = SupervisorConfig::load(&cli.config)?;
    if let Some(dir) = &cli.server_dir {
        config.server.working_dir = dir.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.command.timeout_ms = timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match resolve_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        println!("mcsup v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        println!("{config:#?}");
        return ExitCode::SUCCESS;
    }

    let supervisor = match ProcessSupervisor::new(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match supervisor.start().await {
        Ok(StartOutcome::Started { pid }) => {
            println!("Server started (pid {pid}), waiting for it to finish booting...");
        }
        Ok(StartOutcome::AlreadyRunning { pid }) => {
            println!("Server already running (pid {pid})");
        }
        Err(e) => {
            tracing::error!(error = %e, "server failed to start");
            return ExitCode::FAILURE;
        }
    }

    let ready_timeout = Duration::from_secs(cli.ready_timeout_secs);
    if supervisor.wait_until_ready(ready_timeout).await {
        println!("Server is ready.");
    } else {
        tracing::warn!(
            timeout_secs = cli.ready_timeout_secs,
            "server did not report ready; commands will be rejected until it does"
        );
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let console_result =
        console::run(&supervisor, stdin, &mut stdout, signals::wait_for_shutdown()).await;
    if let Err(e) = &console_result {
        tracing::error!(error = %e, "console I/O failed");
    }

    let code = match supervisor.stop().await {
        Ok(StopOutcome::Stopped { pid }) => {
            println!("Server has been stopped (pid {pid}).");
            ExitCode::SUCCESS
        }
        Ok(StopOutcome::NotRunning) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "failed to stop the server");
            ExitCode::FAILURE
        }
    };
    println!("Running: {}", supervisor.is_running());

    if console_result.is_err() {
        return ExitCode::FAILURE;
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["mcsup"]);
        assert_eq!(cli.config, PathBuf::from("mcsup.toml"));
        assert_eq!(cli.ready_timeout_secs, 300);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcsup.toml");
        std::fs::write(&path, "[server]\ncommand = \"sh\"\n").unwrap();

        let cli = Cli::parse_from([
            "mcsup",
            "--config",
            path.to_str().unwrap(),
            "--server-dir",
            "/srv/minecraft",
            "--timeout-ms",
            "8000",
        ]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.server.command, "sh");
        assert_eq!(config.server.working_dir, PathBuf::from("/srv/minecraft"));
        assert_eq!(config.command.timeout_ms, 8000);
    }

    #[test]
    fn test_cli_override_validated() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "mcsup",
            "--config",
            dir.path().join("none.toml").to_str().unwrap(),
            "--timeout-ms",
            "100",
        ]);
        // Default settle delay (500ms) no longer fits in the window.
        assert!(resolve_config(&cli).is_err());
    }
}
