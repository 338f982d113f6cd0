// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP acceptor for chunk producers.
//!
//! Each accepted connection gets its own task and its own
//! [`StreamReassembler`]; completed documents go to the shared queue the
//! routing hub drains. A failing connection only ends itself.

use crate::reassembler::{ReassemblerStats, StreamReassembler};
use crate::signal::wait_for_shutdown;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Per-connection read settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Bytes requested per read.
    pub read_buffer_size: usize,
    /// Largest accepted frame.
    pub max_frame_size: usize,
}

/// Accept loop feeding reassembled documents to the hub.
pub struct TcpAcceptor {
    listener: TcpListener,
    settings: ConnectionSettings,
    documents: mpsc::Sender<String>,
    shutdown: watch::Receiver<bool>,
}

impl TcpAcceptor {
    pub fn new(
        listener: TcpListener,
        settings: ConnectionSettings,
        documents: mpsc::Sender<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            settings,
            documents,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    pub async fn run(mut self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Chunk listener on tcp://{}", addr);
        }

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            info!("New producer connection from {}", peer_addr);

                            let settings = self.settings;
                            let documents = self.documents.clone();
                            let shutdown = self.shutdown.clone();
                            let span = info_span!("conn", peer = %peer_addr);

                            tokio::spawn(
                                async move {
                                    match handle_connection(stream, settings, documents, shutdown).await {
                                        Ok(stats) => info!(
                                            "Connection closed: {} messages, {} desyncs, {} resyncs",
                                            stats.messages_emitted, stats.desyncs, stats.resyncs
                                        ),
                                        Err(e) => warn!("Connection error: {}", e),
                                    }
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    info!("Chunk listener stopping");
                    break;
                }
            }
        }
    }
}

/// Read one producer stream to the end.
///
/// Returns the reassembler counters once the peer closes, the hub goes away
/// or shutdown is requested. Read errors are returned as-is.
pub async fn handle_connection<S>(
    mut stream: S,
    settings: ConnectionSettings,
    documents: mpsc::Sender<String>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<ReassemblerStats>
where
    S: AsyncRead + Unpin,
{
    let mut reassembler = StreamReassembler::new(settings.max_frame_size);
    let mut buf = vec![0u8; settings.read_buffer_size.max(1)];

    loop {
        let n = tokio::select! {
            result = stream.read(&mut buf) => result?,
            _ = wait_for_shutdown(&mut shutdown) => break,
        };

        if n == 0 {
            debug!("Peer closed stream");
            if reassembler.is_accumulating() || reassembler.buffered_len() > 0 {
                warn!(
                    "Peer closed mid-message ({} raw bytes pending)",
                    reassembler.buffered_len()
                );
            }
            break;
        }

        for document in reassembler.push(&buf[..n]) {
            if documents.send(document).await.is_err() {
                debug!("Document queue closed, dropping connection");
                return Ok(reassembler.stats());
            }
        }
    }

    Ok(reassembler.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fragment_message;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    const SETTINGS: ConnectionSettings = ConnectionSettings {
        read_buffer_size: 7,
        max_frame_size: 4096,
    };

    #[tokio::test]
    async fn test_connection_forwards_documents_in_order() {
        let (mut client, server) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(handle_connection(server, SETTINGS, tx, shutdown_rx));

        for (session, doc) in [(1, r#"{"Temperature":{"v":21}}"#), (2, r#"{"Pressure":3}"#)] {
            for frame in fragment_message(session, doc.as_bytes(), 10).expect("fragment") {
                client.write_all(&frame).await.expect("write");
            }
        }
        drop(client);

        let stats = task.await.expect("join").expect("connection");
        assert_eq!(stats.messages_emitted, 2);
        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"Temperature":{"v":21}}"#));
        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"Pressure":3}"#));
    }

    #[tokio::test]
    async fn test_connection_stops_when_queue_closes() {
        let (mut client, server) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(rx);

        let task = tokio::spawn(handle_connection(server, SETTINGS, tx, shutdown_rx));
        for frame in fragment_message(1, br#"{"A":1}"#, 64).expect("fragment") {
            client.write_all(&frame).await.expect("write");
        }

        let stats = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("stopped")
            .expect("join")
            .expect("connection");
        assert_eq!(stats.messages_emitted, 1);
    }

    #[tokio::test]
    async fn test_acceptor_serves_multiple_producers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let acceptor = TcpAcceptor::new(listener, SETTINGS, tx, shutdown_rx);
        let addr = acceptor.local_addr().expect("addr");
        let task = tokio::spawn(acceptor.run());

        for key in ["First", "Second"] {
            let mut producer = tokio::net::TcpStream::connect(addr).await.expect("connect");
            let doc = format!(r#"{{"{}":true}}"#, key);
            for frame in fragment_message(0, doc.as_bytes(), 5).expect("fragment") {
                producer.write_all(&frame).await.expect("write");
            }
            let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("document in time");
            assert_eq!(received, Some(doc));
        }

        shutdown_tx.send(true).expect("signal");
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("stopped")
            .expect("join");
    }
}
