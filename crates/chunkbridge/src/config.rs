// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Adapter configuration.
//!
//! Loaded from TOML, or JSON when the file has a `.json` extension.
//! Every section except `[tcp_rx]` and `[data_tx]` has defaults.

use crate::protocol::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_BUFFER_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Adapter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Environment name stamped on status records.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Capacity of the queue between TCP readers and the routing hub.
    #[serde(default = "default_shared_queue_capacity")]
    pub shared_queue_capacity: usize,

    /// Producer side.
    pub tcp_rx: TcpRxConfig,

    /// Subscriber side.
    pub data_tx: DataTxConfig,

    #[serde(default)]
    pub reporting: ReportingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// TCP listener for producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpRxConfig {
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Bytes requested per socket read.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Largest accepted `transportLength`.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

/// WebSocket listener for data subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTxConfig {
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Per-type queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Subscriber poll timeout (milliseconds).
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Period of per-subscriber depth records (milliseconds).
    #[serde(default = "default_interval_ms")]
    pub stats_interval_ms: u64,
}

/// WebSocket listener for status records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_reporting_port")]
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Capacity of the record channel and of the `SystemInfo` queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Period of route sampling (milliseconds).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default = "default_true")]
    pub log_to_console: bool,

    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default = "default_log_file")]
    pub file_path: PathBuf,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::Invalid(format!("Unknown log level '{}'", other))),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, <LogLevel as TryFrom<String>>::Error> {
        s.parse()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Warning => "warning",
            other => other.as_filter(),
        };
        f.write_str(name)
    }
}

fn default_environment() -> String {
    "chunkbridge".to_string()
}

fn default_shared_queue_capacity() -> usize {
    1024
}

fn default_bind_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_queue_capacity() -> usize {
    100
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_reporting_port() -> u16 {
    10011
}

fn default_true() -> bool {
    true
}

fn default_log_file() -> PathBuf {
    PathBuf::from("chunkbridge.log")
}

impl TcpRxConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            bind_address: default_bind_address(),
            read_buffer_size: default_read_buffer_size(),
            max_frame_size: default_max_frame_size(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

impl DataTxConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            bind_address: default_bind_address(),
            queue_capacity: default_queue_capacity(),
            poll_timeout_ms: default_poll_timeout_ms(),
            stats_interval_ms: default_interval_ms(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_reporting_port(),
            bind_address: default_bind_address(),
            queue_capacity: default_queue_capacity(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl ReportingConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            log_to_console: true,
            log_to_file: false,
            file_path: default_log_file(),
        }
    }
}

impl AdapterConfig {
    /// Configuration with defaults everywhere except the two required ports.
    pub fn new(tcp_port: u16, data_port: u16) -> Self {
        Self {
            environment: default_environment(),
            shared_queue_capacity: default_shared_queue_capacity(),
            tcp_rx: TcpRxConfig::new(tcp_port),
            data_tx: DataTxConfig::new(data_port),
            reporting: ReportingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = if is_json(path) {
            Self::from_json(&content)?
        } else {
            Self::from_toml(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.trim().is_empty() {
            return Err(ConfigError::Invalid("Environment name is empty".into()));
        }
        if self.shared_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "shared_queue_capacity must be greater than 0".into(),
            ));
        }

        if self.tcp_rx.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "tcp_rx.read_buffer_size must be greater than 0".into(),
            ));
        }
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&self.tcp_rx.max_frame_size) {
            return Err(ConfigError::Invalid(format!(
                "tcp_rx.max_frame_size must be in {}..={} (got {})",
                MIN_FRAME_SIZE, MAX_FRAME_SIZE, self.tcp_rx.max_frame_size
            )));
        }

        if self.data_tx.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "data_tx.queue_capacity must be greater than 0".into(),
            ));
        }
        if self.data_tx.poll_timeout_ms == 0 || self.data_tx.stats_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "data_tx timeouts must be greater than 0".into(),
            ));
        }

        if self.reporting.enabled {
            if self.reporting.queue_capacity == 0 {
                return Err(ConfigError::Invalid(
                    "reporting.queue_capacity must be greater than 0".into(),
                ));
            }
            if self.reporting.interval_ms == 0 {
                return Err(ConfigError::Invalid(
                    "reporting.interval_ms must be greater than 0".into(),
                ));
            }
        }

        let mut ports = vec![("tcp_rx", self.tcp_rx.port), ("data_tx", self.data_tx.port)];
        if self.reporting.enabled {
            ports.push(("reporting", self.reporting.port));
        }
        for (i, (name_a, port_a)) in ports.iter().enumerate() {
            // 0 is an ephemeral port, never a collision
            if *port_a == 0 {
                continue;
            }
            if let Some((name_b, _)) = ports[i + 1..].iter().find(|(_, p)| p == port_a) {
                return Err(ConfigError::Invalid(format!(
                    "{} and {} share port {}",
                    name_a, name_b, port_a
                )));
            }
        }

        if self.logging.log_to_file && self.logging.file_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.file_path is empty but log_to_file is set".into(),
            ));
        }

        Ok(())
    }

    /// Sample configuration written by `gen-config`.
    pub fn sample() -> Self {
        Self::new(10010, 10012)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
