// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunk protocol adapter CLI
//!
//! # Usage
//!
//! ```bash
//! # Run with a configuration file
//! chunkbridge --config chunkbridge.toml
//!
//! # Override the configured log level
//! chunkbridge --config chunkbridge.toml --log-level debug
//!
//! # Generate / check a configuration file
//! chunkbridge gen-config --output chunkbridge.toml
//! chunkbridge validate --config chunkbridge.toml
//!
//! # Stream a JSON document to a running adapter
//! chunkbridge send --to 127.0.0.1:10010 --file temperature.json --fragment-size 64
//! ```

use chunkbridge::config::LoggingConfig;
use chunkbridge::{fragment_message, logging, Adapter, AdapterConfig, LogLevel};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Chunk protocol adapter
#[derive(Parser, Debug)]
#[command(name = "chunkbridge")]
#[command(about = "Reassemble chunked JSON from TCP and republish it per type over WebSocket")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "chunkbridge.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warning, error)
    #[arg(long)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "chunkbridge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Fragment a JSON file and stream it to a running adapter
    Send {
        /// Adapter producer address
        #[arg(short, long)]
        to: SocketAddr,

        /// JSON document to send
        #[arg(short, long)]
        file: PathBuf,

        /// Body bytes per fragment
        #[arg(long, default_value = "256")]
        fragment_size: usize,

        /// Session number stamped on every fragment
        #[arg(long, default_value = "1")]
        session: u32,

        /// Number of times to send the document
        #[arg(long, default_value = "1")]
        count: u32,

        /// Pause between two documents (milliseconds)
        #[arg(long, default_value = "0")]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        init_cli_logging(args.log_level)?;
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
            Commands::Send {
                to,
                file,
                fragment_size,
                session,
                count,
                interval_ms,
            } => {
                cmd_send(
                    to,
                    file,
                    fragment_size,
                    session,
                    count,
                    Duration::from_millis(interval_ms),
                )
                .await
            }
        };
    }

    let mut config = AdapterConfig::from_file(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging)?;

    info!("Chunk adapter v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", args.config.display());

    let adapter = Adapter::new(config)?;
    let config = adapter.config();
    info!(
        "Environment: {} (queue capacity {}, reporting {})",
        config.environment,
        config.data_tx.queue_capacity,
        if config.reporting.enabled { "on" } else { "off" }
    );
    let handle = adapter.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.shutdown();

    for route in handle.data_hub().snapshots() {
        info!(
            "  {}: {} routed, {} dropped, {} delivered ({:.1} msg/s)",
            route.type_key,
            route.messages_routed,
            route.messages_dropped,
            route.messages_delivered,
            route.messages_per_second()
        );
    }

    handle.join().await?;
    Ok(())
}

fn init_cli_logging(level: Option<LogLevel>) -> Result<(), logging::LoggingError> {
    logging::init(&LoggingConfig {
        level: level.unwrap_or(LogLevel::Info),
        ..Default::default()
    })
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = AdapterConfig::sample().to_toml()?;

    let content = format!(
        r#"# Chunk adapter configuration
# Generated by chunkbridge gen-config

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match AdapterConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Environment: {}", config.environment);
            println!("Producers:   tcp://{}", config.tcp_rx.socket_addr());
            println!("Subscribers: ws://{}/DataTypes/<TypeKey>", config.data_tx.socket_addr());
            if config.reporting.enabled {
                println!(
                    "Reporting:   ws://{}/DataTypes/SystemInfo",
                    config.reporting.socket_addr()
                );
            } else {
                println!("Reporting:   disabled");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

async fn cmd_send(
    to: SocketAddr,
    file: PathBuf,
    fragment_size: usize,
    session: u32,
    count: u32,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let document = std::fs::read(&file)?;
    serde_json::from_slice::<serde_json::Value>(&document)?;

    let frames = fragment_message(session, &document, fragment_size)?;
    let mut stream = tokio::net::TcpStream::connect(to).await?;
    info!(
        "Sending {} ({} bytes, {} fragments) to {} x{}",
        file.display(),
        document.len(),
        frames.len(),
        to,
        count
    );

    for i in 0..count {
        for frame in &frames {
            stream.write_all(frame).await?;
        }
        if i + 1 < count && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
    stream.flush().await?;
    stream.shutdown().await?;

    println!("Sent {} document(s) to {}", count, to);
    Ok(())
}
