//! The metrics adapter: installs a Prometheus exporter and describes the
//! counters the pipeline and lookup service emit against.

use std::net::SocketAddr;

use async_trait::async_trait;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::GeoError;
use crate::supervisor::Service as SupervisorService;

/// Rows durably written by the ingest pipeline.
pub const INGEST_ACCEPTED: &str = "geoloc.ingest.accepted";
/// Rows discarded by the ingest pipeline, labeled by `reason`.
pub const INGEST_DISCARDED: &str = "geoloc.ingest.discarded";
/// Lookup requests served, labeled by `status`.
pub const LOOKUP_REQUESTS: &str = "geoloc.lookup.requests";

fn describe() {
    describe_counter!(INGEST_ACCEPTED, "Geolocation rows durably written");
    describe_counter!(INGEST_DISCARDED, "Geolocation rows discarded, by reason");
    describe_counter!(LOOKUP_REQUESTS, "GeolocationByIP lookups served, by status");
}

/// The metrics listener, bound into the Lifecycle Supervisor. Installs the
/// global Prometheus recorder and its HTTP listener on `start`, and simply
/// waits for shutdown afterward — the listener itself runs on a background
/// task owned by the exporter.
pub struct MetricsListener {
    addr: SocketAddr,
    shutdown: Option<CancellationToken>,
}

impl MetricsListener {
    pub fn new(addr: SocketAddr) -> Self {
        MetricsListener { addr, shutdown: None }
    }
}

#[async_trait]
impl SupervisorService for MetricsListener {
    fn name(&self) -> &str {
        "metrics"
    }

    fn addr(&self) -> String {
        self.addr.to_string()
    }

    fn bind_shutdown(&mut self, shutdown: CancellationToken) {
        self.shutdown = Some(shutdown);
    }

    async fn start(self: Box<Self>) -> Result<(), GeoError> {
        let shutdown = self
            .shutdown
            .expect("bind_shutdown must be called before start");

        info!(addr = %self.addr, "metrics listener starting");

        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .install()
            .map_err(|err| GeoError::Setup(format!("installing metrics exporter: {}", err)))?;

        describe();

        shutdown.cancelled().await;
        Ok(())
    }
}
