// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queue-depth telemetry.
//!
//! Status records travel on their own bounded channel and are republished
//! as `{"SystemInfo": {...}}` documents through the reporting hub, so
//! consumers subscribe to `/DataTypes/SystemInfo` on the reporting port.

use crate::hub::RoutingHub;
use crate::route::ChunkRoute;
use crate::signal::wait_for_shutdown;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Type key of status documents.
pub const SYSTEM_INFO_KEY: &str = "SystemInfo";

/// Suffix appended to a type key to name its channel statistic.
pub const CHANNEL_SUFFIX: &str = "_Channel";

/// One status sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(rename = "StatEnvironment")]
    pub environment: String,
    #[serde(rename = "StatName")]
    pub name: String,
    #[serde(rename = "StatStatus")]
    pub status: String,
}

#[derive(Serialize)]
struct SystemInfoDocument<'a> {
    #[serde(rename = "SystemInfo")]
    system_info: &'a StatusRecord,
}

impl StatusRecord {
    pub fn new(
        environment: impl Into<String>,
        name: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            name: name.into(),
            status: status.into(),
        }
    }

    /// `<TypeKey>_Channel` with `<depth>/<capacity>`.
    pub fn channel_status(environment: impl Into<String>, route: &ChunkRoute) -> Self {
        Self::new(
            environment,
            format!("{}{}", route.type_key(), CHANNEL_SUFFIX),
            route.depth_status(),
        )
    }

    /// Serialize as a `SystemInfo` document.
    pub fn to_document(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SystemInfoDocument { system_info: self })
    }
}

/// Drop-on-full sender of status records.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    environment: Arc<str>,
    sender: mpsc::Sender<StatusRecord>,
}

impl TelemetrySink {
    /// Create a sink and the receiver the reporter drains.
    pub fn channel(
        environment: impl Into<Arc<str>>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<StatusRecord>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                environment: environment.into(),
                sender,
            },
            receiver,
        )
    }

    /// Queue a record; returns false if it was dropped.
    pub fn emit(&self, record: StatusRecord) -> bool {
        self.sender.try_send(record).is_ok()
    }

    /// Queue the depth record of `route`.
    pub fn report_route(&self, route: &ChunkRoute) -> bool {
        self.emit(StatusRecord::channel_status(&*self.environment, route))
    }
}

/// Publishes status records and samples data routes periodically.
pub struct TelemetryReporter {
    records: mpsc::Receiver<StatusRecord>,
    reporting_hub: Arc<RoutingHub>,
    data_hub: Arc<RoutingHub>,
    environment: Arc<str>,
    sample_interval: Duration,
}

impl TelemetryReporter {
    pub fn new(
        records: mpsc::Receiver<StatusRecord>,
        reporting_hub: Arc<RoutingHub>,
        data_hub: Arc<RoutingHub>,
        environment: impl Into<Arc<str>>,
        sample_interval: Duration,
    ) -> Self {
        Self {
            records,
            reporting_hub,
            data_hub,
            environment: environment.into(),
            sample_interval,
        }
    }

    /// Run until shutdown or until every sink is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Telemetry reporter started (sampling every {:?})",
            self.sample_interval
        );

        // interval() panics on a zero period
        let mut ticker = tokio::time::interval(self.sample_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                record = self.records.recv() => {
                    let Some(record) = record else {
                        debug!("Telemetry channel closed");
                        break;
                    };
                    self.publish(&record);
                }
                _ = ticker.tick() => {
                    self.sample_routes();
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("Telemetry reporter stopped");
    }

    /// Publish one depth record per data route.
    pub fn sample_routes(&self) {
        for route in self.data_hub.routes() {
            let record = StatusRecord::channel_status(&*self.environment, &route);
            self.publish(&record);
        }
    }

    fn publish(&self, record: &StatusRecord) {
        match record.to_document() {
            Ok(document) => {
                self.reporting_hub.route(SYSTEM_INFO_KEY, document);
            }
            Err(e) => warn!("Failed to serialize status record: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let record = StatusRecord::new("lab", "Temperature_Channel", "3/100");
        let doc = record.to_document().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&doc).expect("parse");

        assert_eq!(value["SystemInfo"]["StatEnvironment"], "lab");
        assert_eq!(value["SystemInfo"]["StatName"], "Temperature_Channel");
        assert_eq!(value["SystemInfo"]["StatStatus"], "3/100");
        assert_eq!(value.as_object().map(|o| o.len()), Some(1));
    }

    #[test]
    fn test_channel_status() {
        let route = ChunkRoute::new("Pressure", 10);
        route.try_enqueue("x".into());
        let record = StatusRecord::channel_status("env", &route);
        assert_eq!(record.name, "Pressure_Channel");
        assert_eq!(record.status, "1/10");
    }

    #[test]
    fn test_sink_drops_when_full() {
        let (sink, mut rx) = TelemetrySink::channel("env", 1);
        assert!(sink.emit(StatusRecord::new("env", "a", "0/1")));
        assert!(!sink.emit(StatusRecord::new("env", "b", "0/1")));

        assert_eq!(rx.try_recv().expect("record").name, "a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unread_system_info_keeps_oldest_samples() {
        let data_hub = Arc::new(RoutingHub::new("data", 8));
        let reporting_hub = Arc::new(RoutingHub::new("reporting", 2));
        let (_sink, rx) = TelemetrySink::channel("bench", 8);
        let reporter = TelemetryReporter::new(
            rx,
            Arc::clone(&reporting_hub),
            data_hub,
            "bench",
            Duration::from_secs(3600),
        );

        for status in ["1/8", "2/8", "3/8"] {
            reporter.publish(&StatusRecord::new("bench", "Temperature_Channel", status));
        }

        // a late subscriber sees the first samples; the newest was dropped
        let first = reporting_hub
            .get(SYSTEM_INFO_KEY, Duration::from_millis(100))
            .await
            .expect("first");
        let second = reporting_hub
            .get(SYSTEM_INFO_KEY, Duration::from_millis(100))
            .await
            .expect("second");
        assert!(first.contains("1/8"));
        assert!(second.contains("2/8"));
        assert!(reporting_hub
            .get(SYSTEM_INFO_KEY, Duration::from_millis(20))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_reporter_publishes_records_and_samples() {
        let data_hub = Arc::new(RoutingHub::new("data", 8));
        let reporting_hub = Arc::new(RoutingHub::new("reporting", 8));
        data_hub.route("Temperature", "{}".into());

        let (sink, rx) = TelemetrySink::channel("bench", 8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reporter = TelemetryReporter::new(
            rx,
            Arc::clone(&reporting_hub),
            Arc::clone(&data_hub),
            "bench",
            Duration::from_secs(3600),
        );
        let task = tokio::spawn(reporter.run(shutdown_rx));

        // first tick fires immediately and samples Temperature
        let first = reporting_hub
            .get(SYSTEM_INFO_KEY, Duration::from_secs(1))
            .await
            .expect("sampled record");
        assert!(first.contains("Temperature_Channel"));
        assert!(first.contains("1/8"));

        assert!(sink.emit(StatusRecord::new("bench", "Custom", "ok")));
        let second = reporting_hub
            .get(SYSTEM_INFO_KEY, Duration::from_secs(1))
            .await
            .expect("emitted record");
        assert!(second.contains("Custom"));

        shutdown_tx.send(true).expect("signal");
        task.await.expect("join");
    }
}
