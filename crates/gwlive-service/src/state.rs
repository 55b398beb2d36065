//! Application state shared across handlers.
//!
//! # Broadcast Channel Behavior
//!
//! The `updates_tx` broadcast channel fans live updates out to WebSocket
//! clients. A forwarding task copies every applied reading and every
//! connection status change from the [`LiveSession`] into it.
//!
//! - **Buffer size**: Configurable via `server.broadcast_buffer` (default: 100)
//! - **Message loss**: If a subscriber falls behind and the buffer fills, old messages are dropped
//! - **No blocking**: Senders never block; they succeed or drop messages for slow receivers
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//! broadcast_buffer = 200  # Larger buffer for slow clients
//! ```

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gwlive_core::{
    AnalyticsEngine, Catalog, ConnectionStatus, LiveSession, SensorReading, SensorStatus,
};

use crate::config::Config;

/// A live update pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveUpdate {
    /// A reading was applied to the store.
    Reading {
        /// Tenant id carried by the message.
        tenant_id: Option<String>,
        /// The reading.
        reading: SensorReading,
        /// Classification after applying it.
        status: SensorStatus,
    },
    /// The connection status changed.
    Connection(ConnectionStatus),
}

/// Shared application state.
pub struct AppState {
    /// The live session feeding the store.
    pub session: LiveSession,
    /// Sensor metadata catalog.
    pub catalog: Catalog,
    /// Status classification.
    pub analytics: AnalyticsEngine,
    /// Configuration as loaded at startup.
    pub config: Config,
    /// Broadcast channel for live updates.
    pub updates_tx: broadcast::Sender<LiveUpdate>,
    /// When the service started.
    pub started_at: OffsetDateTime,
    forwarder: JoinHandle<()>,
}

impl AppState {
    /// Create new application state around `session`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(session: LiveSession, config: Config) -> Arc<Self> {
        let (updates_tx, _) = broadcast::channel(config.server.broadcast_buffer.max(1));
        let catalog = config.catalog();
        let analytics = AnalyticsEngine::new(config.analytics.mode());

        let forwarder = tokio::spawn(forward_updates(
            session.subscribe_readings(),
            session.watch_status(),
            updates_tx.clone(),
            catalog.clone(),
            analytics,
        ));

        Arc::new(Self {
            session,
            catalog,
            analytics,
            config,
            updates_tx,
            started_at: OffsetDateTime::now_utc(),
            forwarder,
        })
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

async fn forward_updates(
    mut readings: broadcast::Receiver<gwlive_core::ReadingEvent>,
    mut status: tokio::sync::watch::Receiver<ConnectionStatus>,
    tx: broadcast::Sender<LiveUpdate>,
    catalog: Catalog,
    analytics: AnalyticsEngine,
) {
    loop {
        tokio::select! {
            event = readings.recv() => match event {
                Ok(event) => {
                    let status = analytics.classify(
                        Some(&event.reading),
                        catalog.get(&event.reading.sensor_id),
                    );
                    // Ignore error if no receivers
                    let _ = tx.send(LiveUpdate::Reading {
                        tenant_id: event.tenant_id,
                        reading: event.reading,
                        status,
                    });
                }
                Err(RecvError::Lagged(n)) => warn!("Update forwarder lagged, skipped {} readings", n),
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                let _ = tx.send(LiveUpdate::Connection(current));
            }
        }
    }
    debug!("Update forwarder stopped");
}
