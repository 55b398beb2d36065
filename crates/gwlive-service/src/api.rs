//! REST API endpoints for gwlive-service.
//!
//! These endpoints are the rendering layer's view of the live pipeline:
//! connection status, per-sensor state, chart data and analytics.
//!
//! # Concurrency
//!
//! Handlers never hold a lock across an await point. Sensor reads go through
//! the [`SensorStateStore`](gwlive_core::SensorStateStore) accessors, each of
//! which takes the store's read lock once; chart data uses
//! [`snapshot`](gwlive_core::SensorStateStore::snapshot) so the latest value
//! and the history always come from the same instant.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`].
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use gwlive_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use gwlive_core::charts::{self, Chart, ChartData, ChartKind};
use gwlive_core::metrics::{ConnectionMetricsSummary, PipelineMetricsSnapshot};
use gwlive_core::{
    AlertRecord, BearerToken, ConnectionStatus, GaugeLayout, HistoryPoint, SensorReading,
    SensorStatus, SummaryStats,
};

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // Session control
        .route("/api/session/open", post(session_open))
        .route("/api/session/close", post(session_close))
        .route("/api/session/reset", post(session_reset))
        // Sensor data
        .route("/api/sensors", get(list_sensors))
        .route("/api/sensors/{id}", get(get_sensor))
        .route("/api/sensors/{id}/history", get(get_history))
        .route("/api/sensors/{id}/charts/{kind}", get(get_chart))
        // Analytics
        .route("/api/analytics/summary", get(get_summary))
        .route("/api/alerts", get(get_alerts))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Seconds since the service started.
    pub uptime_seconds: u64,
    /// Connection state, generation, channel and last failure.
    pub connection: ConnectionStatus,
    /// Display text for the last failure, if any.
    pub last_error_message: Option<String>,
    /// Sensors currently tracked.
    pub sensors_tracked: usize,
    /// Decode/apply counters.
    pub pipeline: PipelineMetricsSnapshot,
    /// Handshake and reconnect counters.
    pub connection_metrics: ConnectionMetricsSummary,
}

fn status_response(state: &AppState) -> StatusResponse {
    let now = OffsetDateTime::now_utc();
    let connection = state.session.status();
    StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now,
        uptime_seconds: (now - state.started_at).whole_seconds().max(0) as u64,
        last_error_message: connection.last_error.as_ref().map(ToString::to_string),
        connection,
        sensors_tracked: state.session.store().len(),
        pipeline: state.session.pipeline_metrics(),
        connection_metrics: state.session.connection_metrics(),
    }
}

/// Get connection status and pipeline counters.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(status_response(&state))
}

/// Optional body for `POST /api/session/open`.
#[derive(Debug, Default, Deserialize)]
pub struct OpenRequest {
    /// Bearer token; falls back to the configured token.
    pub token: Option<String>,
    /// Tenant id; falls back to the configured tenant.
    pub tenant_id: Option<String>,
}

/// Open (or re-open) the live session.
///
/// The body is optional; missing fields come from the `[credentials]` config
/// section.
async fn session_open(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, AppError> {
    let request: OpenRequest = if body.is_empty() {
        OpenRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid request body: {}", e)))?
    };

    let configured = &state.config.credentials;
    let token = request
        .token
        .or_else(|| configured.token.clone())
        .unwrap_or_default();
    let tenant_id = request
        .tenant_id
        .or_else(|| configured.tenant_id.clone())
        .unwrap_or_default();

    info!("Opening session for tenant '{}'", tenant_id);
    state
        .session
        .open(BearerToken::new(token), &tenant_id)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(status_response(&state)))
}

/// Close the live session. Sensor history is kept.
async fn session_close(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.session.close().await;
    Json(status_response(&state))
}

/// Close the live session and clear all sensor state.
async fn session_reset(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.session.reset().await;
    Json(status_response(&state))
}

/// One sensor as listed by the API.
#[derive(Debug, Serialize)]
pub struct SensorResponse {
    pub sensor_id: String,
    /// Catalog name, or the id when uncatalogued.
    pub name: String,
    /// Unit symbol, if catalogued.
    pub unit: Option<String>,
    pub status: SensorStatus,
    /// Latest reading, absent while offline.
    pub latest: Option<SensorReading>,
    /// Number of history points held.
    pub history_len: usize,
}

fn sensor_response(state: &AppState, sensor_id: &str) -> SensorResponse {
    let snapshot = state.session.store().snapshot(sensor_id);
    let metadata = state.catalog.get(sensor_id);
    let latest = snapshot.as_ref().map(|s| s.latest.clone());

    SensorResponse {
        sensor_id: sensor_id.to_string(),
        name: state.catalog.display_name(sensor_id).to_string(),
        unit: metadata.and_then(|m| m.unit.clone()),
        status: state.analytics.classify(latest.as_ref(), metadata),
        history_len: snapshot.as_ref().map_or(0, |s| s.history.len()),
        latest,
    }
}

/// List every tracked or catalogued sensor, sorted by id.
async fn list_sensors(State(state): State<Arc<AppState>>) -> Json<Vec<SensorResponse>> {
    let mut ids: BTreeSet<String> = state.session.store().sensor_ids().into_iter().collect();
    ids.extend(state.catalog.ids().into_iter().map(str::to_string));

    Json(ids.iter().map(|id| sensor_response(&state, id)).collect())
}

/// Get one sensor.
async fn get_sensor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SensorResponse>, AppError> {
    if !state.catalog.contains(&id) && state.session.store().latest(&id).is_none() {
        return Err(AppError::NotFound(format!("Sensor '{}' not found", id)));
    }
    Ok(Json(sensor_response(&state, &id)))
}

/// History for one sensor, oldest first. Empty for unknown sensors.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Vec<HistoryPoint>> {
    Json(state.session.store().history_of(&id))
}

/// Query parameters for chart data.
#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    /// Width of the drawing surface, used to size gauge arcs.
    pub width: Option<f64>,
}

/// Chart data for one sensor.
async fn get_chart(
    State(state): State<Arc<AppState>>,
    Path((id, kind)): Path<(String, String)>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<ChartData<Chart>>, AppError> {
    let kind = kind
        .parse::<ChartKind>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let layout = match query.width {
        Some(width) if !width.is_finite() || width <= 0.0 => {
            return Err(AppError::BadRequest(format!(
                "width must be a positive number, got {}",
                width
            )));
        }
        Some(width) => GaugeLayout::for_width(width),
        None => GaugeLayout::default(),
    };

    let metadata = state
        .catalog
        .get(&id)
        .cloned()
        .unwrap_or_else(|| charts::default_metadata(&id));
    let snapshot = state.session.store().snapshot(&id);
    let (latest, history) = match &snapshot {
        Some(s) => (Some(&s.latest), s.history.as_slice()),
        None => (None, &[][..]),
    };

    Ok(Json(charts::render(kind, latest, history, &metadata, layout)))
}

/// Tenant-wide counts.
async fn get_summary(State(state): State<Arc<AppState>>) -> Json<SummaryStats> {
    Json(state.analytics.summary(state.session.store(), &state.catalog))
}

/// Active alerts, critical first.
async fn get_alerts(State(state): State<Arc<AppState>>) -> Json<Vec<AlertRecord>> {
    Json(state.analytics.alerts(state.session.store(), &state.catalog))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
