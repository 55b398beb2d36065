//! Live telemetry pipeline for relayed industrial sensors.
//!
//! This crate connects to a live data relay, decodes the compact tuple wire
//! format, keeps the latest value and a bounded history per sensor, and
//! adapts that state into data for the dashboard renderer.
//!
//! # Features
//!
//! - **Connection management**: primary/fallback handshake, bounded reconnect,
//!   generation fencing on `close()`
//! - **Wire decoding**: pure, per-tuple skip reasons, no panics on bad input
//! - **Sensor state**: latest reading plus a 50-point history per sensor
//! - **Analytics**: status classification, summary counts, alert list
//! - **Chart adapters**: gauge, line, bar, step and on/off data
//! - **Gauge geometry**: value angle, SVG arc paths and color rule
//!
//! # Data flow
//!
//! ```text
//! Transport ─▶ ConnectionManager ─▶ inbound queue ─▶ Pipeline (decode) ─▶ SensorStateStore
//!                                                                           │
//!                                              AnalyticsEngine ◀────────────┤
//!                                              charts::render  ◀────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use gwlive_core::{AnalyticsEngine, Catalog, SensorStateStore, decoder};
//! use time::OffsetDateTime;
//!
//! let store = SensorStateStore::new();
//! let decoded = decoder::decode_payload(
//!     br#"["tenantA", [23.5, 0, 50, "s1"], [true, 10, 1, "s2"]]"#,
//!     OffsetDateTime::UNIX_EPOCH,
//! );
//! store.apply(&decoded.into_readings());
//!
//! let summary = AnalyticsEngine::default().summary(&store, &Catalog::new());
//! assert_eq!(summary.warning_alerts, 1);
//! assert_eq!(summary.critical_alerts, 0);
//! ```

pub mod analytics;
pub mod catalog;
pub mod charts;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod events;
pub mod fence;
pub mod geometry;
pub mod metrics;
pub mod mock;
pub mod mqtt;
pub mod pipeline;
pub mod reconnect;
pub mod session;
pub mod store;
pub mod transport;

// Core exports
pub use analytics::{
    AlertRecord, AnalyticsEngine, ClassificationMode, SensorStatus, Severity, SummaryStats,
};
pub use catalog::Catalog;
pub use charts::{Chart, ChartData, ChartKind, Domain};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use decoder::{Decoded, RawMessage, SkipReason, TupleOutcome};
pub use error::{Error, FailureReason, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, SessionEvent};
pub use fence::GenerationFence;
pub use geometry::{GaugeColor, GaugeLayout, Point};
pub use metrics::{ConnectionMetrics, OperationMetrics, PipelineMetrics};
pub use mock::{MockConnect, MockTransport};
pub use mqtt::MqttTransport;
pub use pipeline::{InboundMessage, Pipeline, ReadingEvent};
pub use reconnect::{ConnectionOptions, ReconnectOptions};
pub use session::LiveSession;
pub use store::{HISTORY_CAPACITY, SensorSnapshot, SensorState, SensorStateStore};
pub use transport::{BearerToken, Channel, Credentials, Endpoint, Link, QoS, Subscription, Transport};

// Re-export from gwlive-types
pub use gwlive_types::{
    HistoryPoint, ReadingValue, SensorKind, SensorMetadata, SensorReading, SensorType, StatusCode,
};
