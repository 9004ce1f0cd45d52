//! Configuration for the probe.
//!
//! Supports command-line arguments and an optional TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "mselect")]
#[command(version = "0.1.0")]
#[command(about = "An interactive probe for multistream-select negotiation", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen for one inbound connection instead of dialing
    #[arg(short = 'l', long)]
    pub listen: bool,

    /// Echo outbound and inbound payloads with directional markers
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Host to dial, or the port to listen on with --listen
    pub target: String,

    /// Port to dial (dial mode only)
    pub port: Option<u16>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session-related configuration
#[derive(Debug, Deserialize, Default)]
pub struct SessionSection {
    /// Echo payloads with directional markers
    #[serde(default)]
    pub verbose: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// How the connection is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Dial a remote peer.
    Dial { host: String, port: u16 },
    /// Accept exactly one inbound connection.
    Listen { port: u16 },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub verbose: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let mode = if cli.listen {
            let port = cli
                .target
                .parse()
                .map_err(|_| ConfigError::InvalidPort(cli.target.clone()))?;
            Mode::Listen { port }
        } else {
            let port = cli.port.ok_or(ConfigError::MissingPort)?;
            Mode::Dial {
                host: cli.target,
                port,
            }
        };

        Ok(Config {
            mode,
            verbose: cli.verbose || toml_config.session.verbose,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidPort(String),
    MissingPort,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidPort(value) => {
                write!(f, "Invalid listen port '{}'", value)
            }
            ConfigError::MissingPort => {
                write!(f, "usage: mselect <host> <port>, or mselect -l <port>")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
