// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber session.
//!
//! One session per upgraded connection, bound to one chunk type:
//! - Reader: drains control frames until close or error
//! - Writer: polls the type's queue and forwards each payload as text
//!
//! Both halves share a [`CloseSignal`]; whichever sees the end first sets it
//! and the other stops without waiting out its current poll. The session holds the route
//! [`Attachment`] until both halves are done.

use crate::route::{Attachment, ChunkRoute};
use crate::signal::{shutdown_requested, wait_for_shutdown, CloseSignal};
use crate::telemetry::TelemetrySink;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Timing of the writer loop.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Longest wait on the queue before re-checking for closure.
    pub poll_timeout: Duration,
    /// Minimum time between two depth records.
    pub stats_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            stats_interval: Duration::from_secs(1),
        }
    }
}

/// A subscriber attached to one chunk route.
pub struct SubscriberSession {
    session_id: String,
    attachment: Attachment,
    settings: SessionSettings,
    telemetry: Option<TelemetrySink>,
    shutdown: watch::Receiver<bool>,
    closed: CloseSignal,
}

impl SubscriberSession {
    pub fn new(
        attachment: Attachment,
        settings: SessionSettings,
        telemetry: Option<TelemetrySink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string()[..8].to_string();
        Self {
            session_id,
            attachment,
            settings,
            telemetry,
            shutdown,
            closed: CloseSignal::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Serve an upgraded WebSocket until either side closes.
    pub async fn run(self, socket: WebSocket) -> u64 {
        let (sink, stream) = socket.split();
        self.run_split(sink, stream).await
    }

    /// Serve a split transport. Returns the number of payloads written.
    pub async fn run_split<W, R, E>(self, sink: W, stream: R) -> u64
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let route = self.attachment.route();
        info!(
            "[{}] Subscriber attached to {}",
            self.session_id,
            route.endpoint_path()
        );

        let (_, sent) = tokio::join!(
            read_loop(stream, &self.closed, &self.session_id),
            write_loop(
                route,
                sink,
                &self.closed,
                &self.settings,
                self.telemetry.as_ref(),
                &self.shutdown,
                &self.session_id,
            ),
        );

        info!(
            "[{}] Session ended on {} ({} payloads sent)",
            self.session_id,
            route.endpoint_path(),
            sent
        );
        sent
    }
}

async fn read_loop<R, E>(mut stream: R, closed: &CloseSignal, session_id: &str)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    info!("[{}] Subscriber closed connection", session_id);
                    break;
                }
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                    debug!("[{}] Ignoring data frame from subscriber", session_id);
                }
                Some(Ok(_)) => {
                    // ping/pong handled by the transport
                }
                Some(Err(e)) => {
                    debug!("[{}] Read error: {}", session_id, e);
                    break;
                }
            },
            _ = closed.closed() => break,
        }
    }
    closed.close();
}

async fn write_loop<W>(
    route: &ChunkRoute,
    mut sink: W,
    closed: &CloseSignal,
    settings: &SessionSettings,
    telemetry: Option<&TelemetrySink>,
    shutdown: &watch::Receiver<bool>,
    session_id: &str,
) -> u64
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut shutdown = shutdown.clone();
    let mut sent = 0u64;
    let mut last_report = Instant::now();

    loop {
        if closed.is_closed() || shutdown_requested(&shutdown) {
            break;
        }

        let payload = tokio::select! {
            payload = route.get(settings.poll_timeout) => payload,
            _ = closed.closed() => break,
            _ = wait_for_shutdown(&mut shutdown) => break,
        };
        let Some(payload) = payload else {
            continue;
        };

        if closed.is_closed() {
            break;
        }

        if let Err(e) = sink.send(Message::Text(payload)).await {
            debug!("[{}] Write failed, closing: {}", session_id, e);
            break;
        }
        sent += 1;

        if let Some(telemetry) = telemetry {
            if last_report.elapsed() >= settings.stats_interval {
                telemetry.report_route(route);
                last_report = Instant::now();
            }
        }
    }

    closed.close();
    let _ = sink.close().await;
    sent
}
