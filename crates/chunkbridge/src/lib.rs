// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunk protocol adapter
//!
//! Accepts fragmented JSON documents from TCP producers, reassembles them
//! and republishes each document over WebSocket, one endpoint per document
//! type.
//!
//! # Features
//!
//! - **Reassembly**: per-connection framing and session continuity checks
//! - **Type Routing**: the first top-level JSON key selects the route
//! - **Backpressure by Drop**: full per-type queues drop new documents
//! - **Reporting**: queue depth published as `SystemInfo` documents
//!
//! # Quick Start
//!
//! ```bash
//! # Write a sample configuration, then run with it
//! chunkbridge gen-config --output chunkbridge.toml
//! chunkbridge --config chunkbridge.toml
//!
//! # Stream a document to a running adapter
//! chunkbridge send --to 127.0.0.1:10010 --file temperature.json
//! ```
//!
//! Subscribers connect to `ws://<host>:<data_tx.port>/DataTypes/<TypeKey>`
//! once the first document of that type has arrived.
//!
//! # Configuration File
//!
//! ```toml
//! environment = "lab"
//!
//! [tcp_rx]
//! port = 10010
//!
//! [data_tx]
//! port = 10012
//! queue_capacity = 100
//!
//! [reporting]
//! port = 10011
//!
//! [logging]
//! level = "info"
//! ```

pub mod acceptor;
pub mod adapter;
pub mod config;
pub mod endpoint;
pub mod hub;
pub mod logging;
pub mod protocol;
pub mod reassembler;
pub mod route;
pub mod session;
pub mod signal;
pub mod telemetry;

pub use adapter::{Adapter, AdapterError, AdapterHandle};
pub use config::{AdapterConfig, ConfigError, LogLevel};
pub use hub::{RouteError, RouteOutcome, RoutingHub};
pub use protocol::{fragment_message, FrameError, SessionHeader};
pub use reassembler::{ReassemblerStats, StreamReassembler};
pub use route::{ChunkRoute, RouteSnapshot, RouteStats};
pub use telemetry::{StatusRecord, TelemetrySink};
