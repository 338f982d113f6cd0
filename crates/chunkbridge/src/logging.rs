// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging setup.
//!
//! A `tracing_subscriber` registry with an `EnvFilter` and one fmt layer per
//! enabled output. `RUST_LOG`, when set, overrides the configured level.

use crate::config::{LogLevel, LoggingConfig};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to install subscriber: {0}")]
    SetSubscriber(String),
}

/// Filter for `level`, unless `RUST_LOG` says otherwise.
pub fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Install the global subscriber described by `config`.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let console = config
        .log_to_console
        .then(|| fmt::layer().with_target(false));

    let file = if config.log_to_file {
        let writer = open_log_file(config)?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(writer)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(config.level))
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| LoggingError::SetSubscriber(e.to_string()))
}

fn open_log_file(config: &LoggingConfig) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file_path)
        .map_err(|source| LoggingError::OpenFile {
            path: config.file_path.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LoggingConfig {
            log_to_file: true,
            file_path: dir.path().join("adapter.log"),
            ..Default::default()
        };

        open_log_file(&config).expect("create");
        std::fs::write(&config.file_path, "first\n").expect("write");
        open_log_file(&config).expect("reopen");

        let content = std::fs::read_to_string(&config.file_path).expect("read");
        assert_eq!(content, "first\n");
    }

    #[test]
    fn test_open_log_file_missing_directory() {
        let config = LoggingConfig {
            log_to_file: true,
            file_path: PathBuf::from("/nonexistent/dir/adapter.log"),
            ..Default::default()
        };
        assert!(matches!(
            open_log_file(&config),
            Err(LoggingError::OpenFile { .. })
        ));
    }
}
