//! Live sensor telemetry service: relay connection plus HTTP API.
//!
//! This crate provides a service that:
//! - Opens the live relay session with configured credentials
//! - Keeps per-sensor state and history in memory
//! - Exposes a REST API for sensor state, chart data and analytics
//! - Pushes live readings and connection changes over WebSocket
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Connection status, last error and pipeline counters
//! - `POST /api/session/open` - Open the session (optional `{token, tenant_id}` body)
//! - `POST /api/session/close` - Close the session, keep history
//! - `POST /api/session/reset` - Close the session and clear sensor state
//! - `GET /api/sensors` - Every tracked or catalogued sensor
//! - `GET /api/sensors/{id}` - One sensor
//! - `GET /api/sensors/{id}/history` - History, oldest first
//! - `GET /api/sensors/{id}/charts/{kind}` - `gauge`, `line`, `bar`, `step` or `onoff` data
//!   (`?width=` sizes the gauge arcs)
//! - `GET /api/analytics/summary` - Tenant-wide counts
//! - `GET /api/alerts` - Active alerts
//! - `WS /api/ws` - Snapshot, then live updates
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/gwlive/service.toml`:
//!
//! ```toml
//! [connection]
//! primary_url = "mqtts://relay.example.com"
//! fallback_url = "mqtts://relay-fallback.example.com"
//!
//! [credentials]
//! tenant_id = "tenantA"
//!
//! [[sensors]]
//! sensor_id = "s1"
//! name = "Boiler pressure"
//! kind = "analog"
//! min_scale = 0.0
//! max_scale = 16.0
//! min_alarm = 2.0
//! max_alarm = 12.0
//! unit = "bar"
//! ```

pub mod api;
pub mod config;
pub mod state;
pub mod ws;

pub use config::{
    AnalyticsConfig, Config, ConfigError, ConnectionConfig, CredentialsConfig, ServerConfig,
    ValidationError,
};
pub use state::{AppState, LiveUpdate};
