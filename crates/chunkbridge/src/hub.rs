// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing hub.
//!
//! Owns the registry of chunk type routes. The first document of a type
//! creates its route (queue plus subscriber endpoint); later documents reuse
//! it. The registry lock is held only for lookup-or-create; queue operations
//! go through the route's own channel.

use crate::route::{ChunkRoute, EnqueueResult, RouteSnapshot};
use crate::signal::wait_for_shutdown;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace};

/// Default per-type queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Errors extracting a type key from a document.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("document root is not an object")]
    NotAnObject,

    #[error("document has no top-level key")]
    EmptyDocument,
}

/// Outcome of routing one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued; `created` is true if this payload created the route.
    Enqueued { created: bool },
    /// Queue full, payload dropped.
    Dropped,
}

/// Extract the routing key: the first top-level key of a JSON object.
pub fn extract_type_key(document: &str) -> Result<String, RouteError> {
    let value: serde_json::Value = serde_json::from_str(document)?;
    let object = value.as_object().ok_or(RouteError::NotAnObject)?;
    object
        .keys()
        .next()
        .cloned()
        .ok_or(RouteError::EmptyDocument)
}

/// Registry of chunk type routes.
#[derive(Debug)]
pub struct RoutingHub {
    name: String,
    routes: DashMap<String, Arc<ChunkRoute>>,
    queue_capacity: usize,
}

impl RoutingHub {
    /// Create a hub whose routes queue up to `queue_capacity` payloads.
    pub fn new(name: impl Into<String>, queue_capacity: usize) -> Self {
        Self {
            name: name.into(),
            routes: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Route a payload to its type's queue, creating the route on first use.
    pub fn route(&self, type_key: &str, payload: String) -> RouteOutcome {
        let (route, created) = self.lookup_or_create(type_key);

        match route.try_enqueue(payload) {
            EnqueueResult::Enqueued => RouteOutcome::Enqueued { created },
            EnqueueResult::Full => {
                debug!(
                    "[{}] Queue for '{}' full ({}), dropping payload",
                    self.name,
                    type_key,
                    route.depth_status()
                );
                RouteOutcome::Dropped
            }
        }
    }

    /// Extract the type key of `document` and route it.
    pub fn route_document(&self, document: String) -> Result<RouteOutcome, RouteError> {
        let type_key = extract_type_key(&document)?;
        trace!("[{}] Routing '{}' ({} bytes)", self.name, type_key, document.len());
        Ok(self.route(&type_key, document))
    }

    /// Wait up to `timeout` for the next payload of `type_key`.
    ///
    /// `None` on timeout or when no such route exists.
    pub async fn get(&self, type_key: &str, timeout: Duration) -> Option<String> {
        let route = self.lookup(type_key)?;
        route.get(timeout).await
    }

    /// Find an existing route.
    pub fn lookup(&self, type_key: &str) -> Option<Arc<ChunkRoute>> {
        self.routes.get(type_key).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.routes.contains_key(type_key)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Known type keys, sorted.
    pub fn type_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.routes.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    /// All routes, sorted by type key.
    pub fn routes(&self) -> Vec<Arc<ChunkRoute>> {
        let mut routes: Vec<_> = self.routes.iter().map(|r| Arc::clone(r.value())).collect();
        routes.sort_by(|a, b| a.type_key().cmp(b.type_key()));
        routes
    }

    pub fn snapshots(&self) -> Vec<RouteSnapshot> {
        self.routes().iter().map(|r| r.snapshot()).collect()
    }

    /// Number of routes with a subscriber attached.
    pub fn attached_count(&self) -> usize {
        self.routes.iter().filter(|r| r.value().is_attached()).count()
    }

    /// Consume reassembled documents until the queue closes or shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut documents: mpsc::Receiver<String>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("[{}] Routing hub started", self.name);

        loop {
            tokio::select! {
                document = documents.recv() => {
                    let Some(document) = document else {
                        debug!("[{}] Document queue closed", self.name);
                        break;
                    };
                    if let Err(e) = self.route_document(document) {
                        error!("[{}] Error routing document: {}", self.name, e);
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("[{}] Routing hub stopped ({} routes)", self.name, self.len());
    }

    fn lookup_or_create(&self, type_key: &str) -> (Arc<ChunkRoute>, bool) {
        if let Some(route) = self.lookup(type_key) {
            return (route, false);
        }

        match self.routes.entry(type_key.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let route = Arc::new(ChunkRoute::new(type_key, self.queue_capacity));
                info!(
                    "[{}] ChunkType '{}' newly registered at {}",
                    self.name,
                    type_key,
                    route.endpoint_path()
                );
                entry.insert(Arc::clone(&route));
                (route, true)
            }
        }
    }
}
