// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunk type route: bounded queue, statistics and subscriber attachment.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

/// Path prefix of subscriber endpoints.
pub const ENDPOINT_PREFIX: &str = "/DataTypes";

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Enqueued,
    /// Queue at capacity; the new item was dropped.
    Full,
}

/// One message type: its queue and who is draining it.
#[derive(Debug)]
pub struct ChunkRoute {
    type_key: String,
    sender: mpsc::Sender<String>,
    // single consumer: whichever subscriber is attached
    receiver: Mutex<mpsc::Receiver<String>>,
    attached: AtomicBool,
    stats: RouteStats,
}

impl ChunkRoute {
    /// Create a route with a queue of `capacity` payloads.
    pub fn new(type_key: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            type_key: type_key.into(),
            sender,
            receiver: Mutex::new(receiver),
            attached: AtomicBool::new(false),
            stats: RouteStats::new(),
        }
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Subscriber endpoint path, e.g. `/DataTypes/Temperature`.
    pub fn endpoint_path(&self) -> String {
        format!("{}/{}", ENDPOINT_PREFIX, self.type_key)
    }

    /// Enqueue without waiting; a full queue drops the new payload.
    pub fn try_enqueue(&self, payload: String) -> EnqueueResult {
        let len = payload.len() as u64;
        match self.sender.try_send(payload) {
            Ok(()) => {
                self.stats.record_routed(len);
                EnqueueResult::Enqueued
            }
            // the route owns its receiver, so Closed cannot happen
            Err(mpsc::error::TrySendError::Full(_)) | Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.record_dropped();
                EnqueueResult::Full
            }
        }
    }

    /// Wait up to `timeout` for the next payload.
    pub async fn get(&self, timeout: Duration) -> Option<String> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(payload)) => {
                self.stats.record_delivered();
                Some(payload)
            }
            Ok(None) | Err(_) => None,
        }
    }

    /// Payloads currently queued.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Maximum queued payloads.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Status string reported by telemetry: `<depth>/<capacity>`.
    pub fn depth_status(&self) -> String {
        format!("{}/{}", self.depth(), self.capacity())
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Claim the route for one subscriber. `None` if already claimed.
    pub fn try_attach(self: &Arc<Self>) -> Option<Attachment> {
        self.attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Attachment {
                route: Arc::clone(self),
            })
    }

    pub fn stats(&self) -> &RouteStats {
        &self.stats
    }

    /// Point-in-time view of the route.
    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            type_key: self.type_key.clone(),
            endpoint: self.endpoint_path(),
            depth: self.depth(),
            capacity: self.capacity(),
            attached: self.is_attached(),
            messages_routed: self.stats.messages_routed.load(Ordering::Relaxed),
            bytes_routed: self.stats.bytes_routed.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            messages_delivered: self.stats.messages_delivered.load(Ordering::Relaxed),
            uptime_secs: self.stats.created.elapsed().as_secs(),
        }
    }
}

/// Exclusive subscriber claim on a route, released on drop.
#[derive(Debug)]
pub struct Attachment {
    route: Arc<ChunkRoute>,
}

impl Attachment {
    pub fn route(&self) -> &Arc<ChunkRoute> {
        &self.route
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.route.attached.store(false, Ordering::Release);
    }
}

/// Statistics for a route.
#[derive(Debug)]
pub struct RouteStats {
    /// Payloads accepted into the queue.
    pub messages_routed: AtomicU64,

    /// Bytes accepted into the queue.
    pub bytes_routed: AtomicU64,

    /// Payloads dropped on a full queue.
    pub messages_dropped: AtomicU64,

    /// Payloads taken by a subscriber.
    pub messages_delivered: AtomicU64,

    /// Route creation time.
    pub created: Instant,
}

impl Default for RouteStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteStats {
    pub fn new() -> Self {
        Self {
            messages_routed: AtomicU64::new(0),
            bytes_routed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    fn record_routed(&self, bytes: u64) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
        self.bytes_routed.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of route state and statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub type_key: String,
    pub endpoint: String,
    pub depth: usize,
    pub capacity: usize,
    pub attached: bool,
    pub messages_routed: u64,
    pub bytes_routed: u64,
    pub messages_dropped: u64,
    pub messages_delivered: u64,
    pub uptime_secs: u64,
}

impl RouteSnapshot {
    /// Calculate messages per second.
    pub fn messages_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.messages_routed as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}
