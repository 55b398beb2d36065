//! WebSocket handler for live updates.
//!
//! A client first receives the current connection status and one `reading`
//! message per tracked sensor, then every live update as it happens.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::{AppState, LiveUpdate};

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws", get(ws_handler))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Current status followed by the latest reading of every tracked sensor.
pub fn snapshot(state: &AppState) -> Vec<LiveUpdate> {
    let mut updates = vec![LiveUpdate::Connection(state.session.status())];
    let mut current: Vec<_> = state.session.store().current_all().into_values().collect();
    current.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));

    updates.extend(current.into_iter().map(|reading| {
        let status = state
            .analytics
            .classify(Some(&reading), state.catalog.get(&reading.sensor_id));
        LiveUpdate::Reading {
            tenant_id: None,
            reading,
            status,
        }
    }));
    updates
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so nothing published meanwhile is missed.
    let mut rx = state.updates_tx.subscribe();

    info!("WebSocket client connected");

    for update in snapshot(&state) {
        if let Ok(json) = serde_json::to_string(&update)
            && sender.send(Message::Text(json.into())).await.is_err()
        {
            info!("WebSocket client disconnected during initial snapshot");
            return;
        }
    }

    debug!("Sent initial snapshot to WebSocket client");

    let mut send_task = tokio::spawn(async move {
        loop {
            let update = match rx.recv().await {
                Ok(update) => update,
                Err(RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} updates", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&update) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize update: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain client frames; pongs are answered by axum.
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwlive_core::{
        BearerToken, ConnectionOptions, ConnectionState, Endpoint, LiveSession, MockTransport,
        SensorStateStore, SensorStatus, Transport,
    };

    use crate::config::Config;

    fn create_test_state() -> (Arc<AppState>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let dyn_transport: Arc<dyn Transport> = transport.clone();
        let session = LiveSession::new(
            dyn_transport,
            ConnectionOptions::new(Endpoint::primary("mqtt://relay"), None),
            Arc::new(SensorStateStore::new()),
        );
        (AppState::new(session, Config::default()), transport)
    }

    #[tokio::test]
    async fn test_snapshot_empty() {
        let (state, _) = create_test_state();
        let updates = snapshot(&state);
        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0],
            LiveUpdate::Connection(status) if status.state == ConnectionState::Disconnected
        ));
    }

    #[tokio::test]
    async fn test_live_updates_forwarded() {
        let (state, transport) = create_test_state();
        let mut rx = state.updates_tx.subscribe();

        state
            .session
            .open(BearerToken::new("tok"), "tenantA")
            .await
            .unwrap();
        transport
            .link(0)
            .await
            .push(&br#"["tenantA", [1, 20, 50, "s1"]]"#[..]);

        let reading = loop {
            match rx.recv().await.unwrap() {
                LiveUpdate::Reading {
                    tenant_id,
                    reading,
                    status,
                } => {
                    assert_eq!(tenant_id.as_deref(), Some("tenantA"));
                    assert_eq!(status, SensorStatus::Critical);
                    break reading;
                }
                LiveUpdate::Connection(_) => continue,
            }
        };
        assert_eq!(reading.sensor_id, "s1");

        let updates = snapshot(&state);
        assert_eq!(updates.len(), 2);
        let json = serde_json::to_value(&updates[1]).unwrap();
        assert_eq!(json["type"], "reading");
        assert_eq!(json["status"], "critical");
    }
}
