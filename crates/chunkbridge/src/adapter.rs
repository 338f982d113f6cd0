// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Adapter runtime.
//!
//! Wires the pipeline together:
//!
//! ```text
//! producers ──tcp──▶ acceptor ──shared queue──▶ data hub ──▶ /DataTypes/<T>
//!                                                   │
//!                     subscriber writers ─records─▶ reporter ──▶ reporting hub
//! ```

use crate::acceptor::{ConnectionSettings, TcpAcceptor};
use crate::config::{AdapterConfig, ConfigError};
use crate::endpoint::{self, EndpointState};
use crate::hub::RoutingHub;
use crate::session::SessionSettings;
use crate::telemetry::{TelemetryReporter, TelemetrySink};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {role} listener on {addr}: {source}")]
    Bind {
        role: &'static str,
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A configured, not yet started adapter.
#[derive(Debug)]
pub struct Adapter {
    config: AdapterConfig,
}

impl Adapter {
    /// Validate `config` and create the adapter.
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Bind every listener, then spawn the pipeline tasks.
    ///
    /// Nothing is spawned if a bind fails.
    pub async fn start(self) -> Result<AdapterHandle, AdapterError> {
        let config = self.config;

        let tcp_listener = bind("tcp_rx", config.tcp_rx.socket_addr()).await?;
        let data_listener = bind("data_tx", config.data_tx.socket_addr()).await?;
        let reporting_listener = if config.reporting.enabled {
            Some(bind("reporting", config.reporting.socket_addr()).await?)
        } else {
            None
        };

        let tcp_addr = tcp_listener.local_addr()?;
        let data_addr = data_listener.local_addr()?;
        let reporting_addr = reporting_listener
            .as_ref()
            .map(|l| l.local_addr())
            .transpose()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (documents_tx, documents_rx) = mpsc::channel(config.shared_queue_capacity);
        let data_hub = Arc::new(RoutingHub::new("data", config.data_tx.queue_capacity));
        let mut tasks = Vec::new();

        let (telemetry, reporting_hub) = match reporting_listener {
            Some(listener) => {
                let reporting_hub = Arc::new(RoutingHub::new(
                    "reporting",
                    config.reporting.queue_capacity,
                ));
                let (sink, records) = TelemetrySink::channel(
                    config.environment.as_str(),
                    config.reporting.queue_capacity,
                );

                let reporter = TelemetryReporter::new(
                    records,
                    Arc::clone(&reporting_hub),
                    Arc::clone(&data_hub),
                    config.environment.as_str(),
                    config.reporting.interval(),
                );
                tasks.push(tokio::spawn(reporter.run(shutdown_rx.clone())));

                let state = Arc::new(EndpointState::new(
                    Arc::clone(&reporting_hub),
                    SessionSettings {
                        poll_timeout: config.data_tx.poll_timeout(),
                        stats_interval: config.reporting.interval(),
                    },
                    None,
                    shutdown_rx.clone(),
                ));
                tasks.push(spawn_endpoint(listener, state));

                (Some(sink), Some(reporting_hub))
            }
            None => {
                info!("Reporting disabled");
                (None, None)
            }
        };

        let data_state = Arc::new(EndpointState::new(
            Arc::clone(&data_hub),
            SessionSettings {
                poll_timeout: config.data_tx.poll_timeout(),
                stats_interval: config.data_tx.stats_interval(),
            },
            telemetry,
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_endpoint(data_listener, data_state));

        tasks.push(tokio::spawn(
            Arc::clone(&data_hub).run(documents_rx, shutdown_rx.clone()),
        ));

        let acceptor = TcpAcceptor::new(
            tcp_listener,
            ConnectionSettings {
                read_buffer_size: config.tcp_rx.read_buffer_size,
                max_frame_size: config.tcp_rx.max_frame_size,
            },
            documents_tx,
            shutdown_rx,
        );
        tasks.push(tokio::spawn(acceptor.run()));

        info!(
            "Adapter '{}' started: tcp {} -> ws {}{}",
            config.environment,
            tcp_addr,
            data_addr,
            reporting_addr
                .map(|a| format!(", reporting ws {}", a))
                .unwrap_or_default()
        );

        Ok(AdapterHandle {
            tcp_addr,
            data_addr,
            reporting_addr,
            data_hub,
            reporting_hub,
            shutdown: shutdown_tx,
            tasks,
        })
    }
}

/// Handle to a running adapter.
#[derive(Debug)]
pub struct AdapterHandle {
    tcp_addr: SocketAddr,
    data_addr: SocketAddr,
    reporting_addr: Option<SocketAddr>,
    data_hub: Arc<RoutingHub>,
    reporting_hub: Option<Arc<RoutingHub>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl AdapterHandle {
    /// Bound producer address.
    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    /// Bound data subscriber address.
    pub fn data_addr(&self) -> SocketAddr {
        self.data_addr
    }

    /// Bound reporting address, if reporting is enabled.
    pub fn reporting_addr(&self) -> Option<SocketAddr> {
        self.reporting_addr
    }

    pub fn data_hub(&self) -> &Arc<RoutingHub> {
        &self.data_hub
    }

    pub fn reporting_hub(&self) -> Option<&Arc<RoutingHub>> {
        self.reporting_hub.as_ref()
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    /// Request every task to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for the pipeline tasks to finish.
    pub async fn join(self) -> Result<(), AdapterError> {
        for task in self.tasks {
            task.await?;
        }
        info!("Adapter stopped");
        Ok(())
    }
}

async fn bind(role: &'static str, addr: SocketAddr) -> Result<TcpListener, AdapterError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| AdapterError::Bind { role, addr, source })
}

fn spawn_endpoint(listener: TcpListener, state: Arc<EndpointState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = state.hub().name().to_string();
        if let Err(e) = endpoint::serve(listener, state).await {
            error!("[{}] Endpoint server failed: {}", name, e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local_config() -> AdapterConfig {
        let mut config = AdapterConfig::new(0, 0);
        config.tcp_rx.bind_address = [127, 0, 0, 1].into();
        config.data_tx.bind_address = [127, 0, 0, 1].into();
        config.reporting.bind_address = [127, 0, 0, 1].into();
        config.reporting.port = 0;
        config
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = local_config();
        config.tcp_rx.max_frame_size = 0;
        assert!(matches!(Adapter::new(config), Err(AdapterError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let adapter = Adapter::new(local_config()).expect("adapter");
        assert_eq!(adapter.config().data_tx.port, 0);
        let handle = adapter.start().await.expect("start");

        assert_ne!(handle.tcp_addr().port(), 0);
        assert_ne!(handle.data_addr().port(), 0);
        assert!(handle.reporting_addr().is_some());
        assert!(handle.reporting_hub().is_some());
        assert!(handle.is_running());

        handle.shutdown();
        assert!(!handle.is_running());
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("stopped in time")
            .expect("clean stop");
    }

    #[tokio::test]
    async fn test_reporting_disabled() {
        let mut config = local_config();
        config.reporting.enabled = false;
        let handle = Adapter::new(config)
            .expect("adapter")
            .start()
            .await
            .expect("start");

        assert!(handle.reporting_addr().is_none());
        assert!(handle.reporting_hub().is_none());

        handle.shutdown();
        handle.join().await.expect("clean stop");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let mut config = local_config();
        config.data_tx.port = taken.local_addr().expect("addr").port();

        let result = Adapter::new(config).expect("adapter").start().await;
        assert!(matches!(
            result,
            Err(AdapterError::Bind { role: "data_tx", .. })
        ));
    }
}
