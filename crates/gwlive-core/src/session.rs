//! Live session facade.
//!
//! [`LiveSession`] wires the [`ConnectionManager`] to the [`Pipeline`] over a
//! bounded inbound queue and feeds an injected [`SensorStateStore`]. It is the
//! one object a dashboard holds per logical session.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gwlive_core::{ConnectionOptions, Endpoint, LiveSession, MqttTransport, SensorStateStore};
//!
//! # async fn example() -> gwlive_core::Result<()> {
//! let store = Arc::new(SensorStateStore::new());
//! let options = ConnectionOptions::new(
//!     Endpoint::primary("mqtts://relay.example.com"),
//!     Some(Endpoint::fallback("mqtts://relay-fallback.example.com")),
//! );
//! let session = LiveSession::new(Arc::new(MqttTransport::default()), options, store);
//! session.open("token".into(), "tenantA").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::connection::{ConnectionManager, ConnectionStatus};
use crate::error::Result;
use crate::events::EventReceiver;
use crate::fence::GenerationFence;
use crate::metrics::{ConnectionMetricsSummary, PipelineMetricsSnapshot};
use crate::pipeline::{Pipeline, ReadingEvent, inbound_channel};
use crate::reconnect::ConnectionOptions;
use crate::store::SensorStateStore;
use crate::transport::{BearerToken, Transport};

/// Capacity of the applied-reading broadcast.
const READING_EVENT_CAPACITY: usize = 256;

/// Connection manager, pipeline and store for one dashboard session.
///
/// Must be created inside a tokio runtime; the pipeline runs as a background
/// task for the lifetime of the session.
#[derive(Debug)]
pub struct LiveSession {
    manager: ConnectionManager,
    pipeline: Pipeline,
    pipeline_task: JoinHandle<()>,
}

impl LiveSession {
    /// Create a session feeding `store`.
    pub fn new(
        transport: Arc<dyn Transport>,
        options: ConnectionOptions,
        store: Arc<SensorStateStore>,
    ) -> Self {
        let fence = GenerationFence::new();
        let (tx, rx) = inbound_channel(options.inbound_buffer);
        let pipeline = Pipeline::new(store, fence.clone(), READING_EVENT_CAPACITY);
        let pipeline_task = tokio::spawn(pipeline.clone().run(rx));
        let manager = ConnectionManager::new(transport, options, fence, tx);

        Self {
            manager,
            pipeline,
            pipeline_task,
        }
    }

    /// Open the live connection. See [`ConnectionManager::open`].
    pub async fn open(&self, token: BearerToken, tenant_id: &str) -> Result<()> {
        self.manager.open(token, tenant_id).await
    }

    /// Close the live connection. History is kept.
    pub async fn close(&self) {
        self.manager.close().await;
    }

    /// Close the connection and clear every sensor's state.
    pub async fn reset(&self) {
        self.manager.close().await;
        self.pipeline.store().clear();
        info!("Session reset, sensor state cleared");
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    /// Watch connection status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.manager.watch_status()
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> EventReceiver {
        self.manager.subscribe_events()
    }

    /// Subscribe to readings as they are applied.
    pub fn subscribe_readings(&self) -> broadcast::Receiver<ReadingEvent> {
        self.pipeline.subscribe()
    }

    /// The store this session feeds.
    pub fn store(&self) -> &Arc<SensorStateStore> {
        self.pipeline.store()
    }

    /// The connection manager.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Pipeline counters.
    pub fn pipeline_metrics(&self) -> PipelineMetricsSnapshot {
        self.pipeline.metrics().snapshot()
    }

    /// Connection counters.
    pub fn connection_metrics(&self) -> ConnectionMetricsSummary {
        self.manager.metrics().summary()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.pipeline_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::mock::MockTransport;
    use crate::transport::Endpoint;

    fn session(transport: &Arc<MockTransport>) -> LiveSession {
        let transport: Arc<dyn Transport> = transport.clone();
        LiveSession::new(
            transport,
            ConnectionOptions::new(Endpoint::primary("mqtt://primary"), None),
            Arc::new(SensorStateStore::new()),
        )
    }

    #[tokio::test]
    async fn test_reset_clears_store() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport);
        let mut readings = session.subscribe_readings();

        session.open("tok".into(), "tenantA").await.unwrap();
        transport.link(0).await.push(&br#"["tenantA", [5, 0, 1, "s1"]]"#[..]);
        readings.recv().await.unwrap();
        assert_eq!(session.store().len(), 1);

        session.close().await;
        assert_eq!(session.store().len(), 1);

        session.reset().await;
        assert!(session.store().is_empty());
        assert_eq!(session.status().state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_metrics_exposed() {
        let transport = Arc::new(MockTransport::new());
        let session = session(&transport);
        let mut readings = session.subscribe_readings();

        session.open("tok".into(), "tenantA").await.unwrap();
        let link = transport.link(0).await;
        link.push(&b"not json"[..]);
        link.push(&br#"["tenantA", [5, 0, 1, "s1"], [1]]"#[..]);
        readings.recv().await.unwrap();

        let metrics = session.pipeline_metrics();
        assert_eq!(metrics.messages_received, 2);
        assert_eq!(metrics.messages_dropped, 1);
        assert_eq!(metrics.tuples_skipped, 1);
        assert_eq!(session.connection_metrics().handshakes.success_count, 1);
    }
}
