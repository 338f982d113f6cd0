// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cooperative stop signals.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{watch, Notify};

/// Resolve once shutdown is requested or the controlling sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Whether shutdown has been requested.
pub fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Closed flag shared by the reader and writer halves of one subscriber.
///
/// The writer polls [`CloseSignal::is_closed`]; the reader can also await
/// [`CloseSignal::closed`] so a failed write stops it promptly.
#[derive(Debug, Default)]
pub struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve once [`CloseSignal::close`] has been called.
    pub async fn closed(&self) {
        loop {
            // register before checking so a concurrent close is not missed
            let notified = self.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}
