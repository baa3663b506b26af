use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Banner printed by a vanilla/Paper server once the world is loaded.
pub const DEFAULT_READY_PATTERN: &str =
    r#"\[.*?\] \[Server thread/INFO\]: Done \(.*?\)! For help, type "help""#;

/// Top-level configuration loaded from mcsup.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct SupervisorConfig {
    pub server: ServerConfig,
    pub readiness: ReadinessConfig,
    pub output: OutputConfig,
    pub command: CommandConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Regex matched against every raw log line; first hit opens the gate.
    pub pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub settle_delay_ms: u64,
    /// Measured from the stdin write, settle delay included.
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub stop_command: String,
    /// Wait for a cooperative exit before forcing termination.
    pub grace_period_ms: u64,
    pub reap_timeout_ms: u64,
    pub reader_join_timeout_ms: u64,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "java".to_string(),
            args: vec![
                "-Xmx2G".to_string(),
                "-jar".to_string(),
                "server.jar".to_string(),
                "nogui".to_string(),
            ],
            working_dir: PathBuf::from("./server"),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_READY_PATTERN.to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { capacity: 128 }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            timeout_ms: 5000,
            poll_interval_ms: 100,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            stop_command: "stop".to_string(),
            grace_period_ms: 5000,
            reap_timeout_ms: 5000,
            reader_join_timeout_ms: 5000,
        }
    }
}

impl CommandConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn reap_timeout(&self) -> Duration {
        Duration::from_millis(self.reap_timeout_ms)
    }

    pub fn reader_join_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_join_timeout_ms)
    }
}

/// Errors produced while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// The readiness pattern is not a valid regex.
    Pattern { source: regex::Error },
    /// A value is out of range.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Pattern { source } => {
                write!(f, "invalid readiness pattern: {}", source)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Pattern { source } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let config: SupervisorConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and compile the readiness pattern once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.command.trim().is_empty() {
            return Err(ConfigError::Invalid("server.command is empty".to_string()));
        }
        if self.output.capacity == 0 {
            return Err(ConfigError::Invalid(
                "output.capacity must be greater than 0".to_string(),
            ));
        }
        if self.command.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "command.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.command.settle_delay_ms > self.command.timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "command.settle_delay_ms ({}) exceeds command.timeout_ms ({})",
                self.command.settle_delay_ms, self.command.timeout_ms
            )));
        }
        self.ready_pattern()?;
        Ok(())
    }

    pub fn ready_pattern(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.readiness.pattern).map_err(|e| ConfigError::Pattern { source: e })
    }
}
