//! Exporter configuration.
//!
//! Settings are layered, lowest priority first: built-in defaults, an
//! optional config file (`--config`), `OLICENSE_*` environment variables,
//! then command-line flags. The merged settings are validated into an
//! [`ExporterConfig`]; any problem is a [`ConfigError`] and the exporter
//! does not start.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

const ENV_PREFIX: &str = "OLICENSE";

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "olicense-exporter", version)]
#[command(about = "Prometheus exporter for OLicense Server status output")]
#[command(after_help = "Examples:\n  \
    olicense-exporter --status-file /var/run/olicense/status.json\n  \
    olicense-exporter --poll-interval 30 -- olicense-status --json")]
pub struct Args {
    /// Path to a TOML, YAML or JSON config file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to serve metrics on [default: 0.0.0.0]
    #[arg(long, value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Port to serve metrics on [default: 9877]
    #[arg(short = 'p', long, value_name = "PORT")]
    pub listen_port: Option<u16>,

    /// HTTP path of the metrics endpoint [default: /metrics]
    #[arg(long, value_name = "PATH")]
    pub metrics_path: Option<String>,

    /// Seconds between the starts of two scrapes [default: 15]
    #[arg(short = 'i', long, value_name = "SECONDS")]
    pub poll_interval: Option<f64>,

    /// Read status from this file on every scrape
    #[arg(short = 'f', long, value_name = "PATH")]
    pub status_file: Option<PathBuf>,

    /// Seconds a single status read may take before it is abandoned [default: 30]
    #[arg(long, value_name = "SECONDS")]
    pub command_timeout: Option<f64>,

    /// Log level: error, warn, info, debug, trace or off [default: info]
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Status command and its arguments, run without a shell
    #[arg(last = true, value_name = "COMMAND")]
    pub status_command: Vec<String>,
}

/// Errors that prevent the exporter from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no status source configured: set either status_command or status_file")]
    NoSource,

    #[error("both status_command and status_file are set: choose one")]
    BothSources,

    #[error("status_command is empty")]
    EmptyCommand,

    #[error("poll_interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),

    #[error("command_timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("listen_port must be between 0 and 65535, got {0}")]
    InvalidPort(i64),

    #[error("cannot listen on {address}:{port}: {reason}")]
    InvalidListenAddress {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("metrics_path must start with '/', got {0:?}")]
    InvalidMetricsPath(String),

    #[error("unknown log_level {0:?}")]
    InvalidLogLevel(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// A status command given either as one string or as an argument list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Argv(Vec<String>),
    Line(String),
}

impl CommandLine {
    fn into_argv(self) -> Vec<String> {
        match self {
            CommandLine::Argv(argv) => argv,
            CommandLine::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Merged, not yet validated settings.
#[derive(Debug, Clone, Deserialize)]
struct Settings {
    listen_address: String,
    listen_port: i64,
    metrics_path: String,
    poll_interval: f64,
    status_command: Option<CommandLine>,
    status_file: Option<PathBuf>,
    command_timeout: f64,
    log_level: String,
}

/// Where status output comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSourceConfig {
    Command { program: String, args: Vec<String> },
    File(PathBuf),
}

/// Validated exporter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    pub listen_addr: SocketAddr,
    pub metrics_path: String,
    pub poll_interval: Duration,
    pub source: StatusSourceConfig,
    pub command_timeout: Duration,
    pub log_level: LevelFilter,
}

impl ExporterConfig {
    /// Load configuration for the given command line.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        Self::load_with_env(args, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(args: &Args, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("listen_address", "0.0.0.0")?
            .set_default("listen_port", 9877_i64)?
            .set_default("metrics_path", "/metrics")?
            .set_default("poll_interval", 15.0)?
            .set_default("command_timeout", 30.0)?
            .set_default("log_level", "info")?;

        if let Some(path) = &args.config {
            builder = builder.add_source(File::from(path.as_path()));
        }

        builder = builder
            .add_source(
                env.try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("status_command"),
            )
            .set_override_option("listen_address", args.listen_address.clone())?
            .set_override_option("listen_port", args.listen_port.map(i64::from))?
            .set_override_option("metrics_path", args.metrics_path.clone())?
            .set_override_option("poll_interval", args.poll_interval)?
            .set_override_option("command_timeout", args.command_timeout)?
            .set_override_option("log_level", args.log_level.clone())?
            .set_override_option(
                "status_file",
                args.status_file.as_deref().map(path_string),
            )?;

        if !args.status_command.is_empty() {
            builder = builder.set_override("status_command", args.status_command.clone())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        Self::validate(settings)
    }

    fn validate(settings: Settings) -> Result<Self, ConfigError> {
        let source = match (settings.status_command, settings.status_file) {
            (Some(_), Some(_)) => return Err(ConfigError::BothSources),
            (None, None) => return Err(ConfigError::NoSource),
            (None, Some(path)) => StatusSourceConfig::File(path),
            (Some(command), None) => {
                let mut argv = command.into_argv().into_iter();
                let program = argv
                    .next()
                    .filter(|p| !p.trim().is_empty())
                    .ok_or(ConfigError::EmptyCommand)?;
                StatusSourceConfig::Command {
                    program,
                    args: argv.collect(),
                }
            }
        };

        let poll_interval = positive_seconds(settings.poll_interval)
            .ok_or(ConfigError::InvalidInterval(settings.poll_interval))?;
        let command_timeout = positive_seconds(settings.command_timeout)
            .ok_or(ConfigError::InvalidTimeout(settings.command_timeout))?;

        let port = u16::try_from(settings.listen_port)
            .map_err(|_| ConfigError::InvalidPort(settings.listen_port))?;
        let listen_addr = resolve_listen_addr(&settings.listen_address, port)?;

        if !settings.metrics_path.starts_with('/') {
            return Err(ConfigError::InvalidMetricsPath(settings.metrics_path));
        }

        let log_level = LevelFilter::from_str(settings.log_level.trim())
            .map_err(|_| ConfigError::InvalidLogLevel(settings.log_level.clone()))?;

        Ok(Self {
            listen_addr,
            metrics_path: settings.metrics_path,
            poll_interval,
            source,
            command_timeout,
            log_level,
        })
    }
}

fn positive_seconds(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

fn resolve_listen_addr(address: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidListenAddress {
        address: address.to_string(),
        port,
        reason,
    };

    // Bare IPv6 addresses need brackets to be paired with a port.
    let host = address.trim().trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse() {
        return Ok(SocketAddr::new(ip, port));
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("name resolved to no addresses".to_string()))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
