// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber endpoint server.
//!
//! One upgrade handler serves every chunk type: the path parameter is looked
//! up in the hub, so routes created after startup need no registration.
//!
//! - `GET /DataTypes/{TypeKey}`: WebSocket stream of that type's documents
//! - `GET /DataTypes`: route snapshots
//! - `GET /health`: liveness and counters

use crate::hub::RoutingHub;
use crate::route::RouteSnapshot;
use crate::session::{SessionSettings, SubscriberSession};
use crate::signal::wait_for_shutdown;
use crate::telemetry::TelemetrySink;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state of one endpoint server.
pub struct EndpointState {
    hub: Arc<RoutingHub>,
    settings: SessionSettings,
    telemetry: Option<TelemetrySink>,
    shutdown: watch::Receiver<bool>,
    subscribers: AtomicUsize,
}

impl EndpointState {
    pub fn new(
        hub: Arc<RoutingHub>,
        settings: SessionSettings,
        telemetry: Option<TelemetrySink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            hub,
            settings,
            telemetry,
            shutdown,
            subscribers: AtomicUsize::new(0),
        }
    }

    pub fn hub(&self) -> &Arc<RoutingHub> {
        &self.hub
    }

    /// Sessions currently running.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<EndpointState>) -> Router {
    Router::new()
        .route("/DataTypes", get(list_handler))
        .route("/DataTypes/:type_key", get(subscribe_handler))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `state` on `listener` until shutdown.
pub async fn serve(listener: TcpListener, state: Arc<EndpointState>) -> std::io::Result<()> {
    let mut shutdown = state.shutdown.clone();
    let name = state.hub.name().to_string();
    if let Ok(addr) = listener.local_addr() {
        info!("[{}] Subscriber endpoint: ws://{}/DataTypes/<TypeKey>", name, addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown).await })
        .await?;

    info!("[{}] Subscriber endpoint stopped", name);
    Ok(())
}

/// WebSocket upgrade for one chunk type.
async fn subscribe_handler(
    ws: WebSocketUpgrade,
    Path(type_key): Path<String>,
    State(state): State<Arc<EndpointState>>,
) -> Response {
    let Some(route) = state.hub.lookup(&type_key) else {
        warn!("[{}] Subscription to unknown type '{}'", state.hub.name(), type_key);
        return (StatusCode::NOT_FOUND, format!("Unknown chunk type '{}'", type_key))
            .into_response();
    };

    let Some(attachment) = route.try_attach() else {
        warn!(
            "[{}] Subscription to '{}' refused: already attached",
            state.hub.name(),
            type_key
        );
        return (
            StatusCode::CONFLICT,
            format!("Chunk type '{}' already has a subscriber", type_key),
        )
            .into_response();
    };

    ws.on_upgrade(move |socket| async move {
        let session = SubscriberSession::new(
            attachment,
            state.settings,
            state.telemetry.clone(),
            state.shutdown.clone(),
        );
        let count = state.subscribers.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "[{}] Subscriber {} connected. Total: {}",
            state.hub.name(),
            session.session_id(),
            count
        );

        session.run(socket).await;

        let count = state.subscribers.fetch_sub(1, Ordering::Relaxed) - 1;
        info!("[{}] Subscriber disconnected. Total: {}", state.hub.name(), count);
    })
}

async fn list_handler(State(state): State<Arc<EndpointState>>) -> Json<Vec<RouteSnapshot>> {
    Json(state.hub.snapshots())
}

async fn health_handler(State(state): State<Arc<EndpointState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "hub": state.hub.name(),
        "routes": state.hub.len(),
        "subscribers": state.subscriber_count(),
        "attached": state.hub.attached_count(),
        "queue_capacity": state.hub.queue_capacity(),
    }))
}
