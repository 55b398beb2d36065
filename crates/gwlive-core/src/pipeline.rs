//! Decode-and-apply pipeline.
//!
//! The connection manager writes [`InboundMessage`]s into a bounded channel;
//! the [`Pipeline`] drains it one message at a time, in arrival order, decodes
//! each message and applies the readings to the [`SensorStateStore`].
//!
//! Messages whose generation has been superseded by `close()` are discarded
//! under the [`GenerationFence`], so a late delivery from a torn-down link can
//! never reach the store.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use gwlive_types::SensorReading;

use crate::decoder::{Decoded, RawMessage, SkipReason, TupleOutcome, decode};
use crate::fence::GenerationFence;
use crate::metrics::PipelineMetrics;
use crate::store::SensorStateStore;

/// A raw message tagged with the generation of the link that received it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Connection generation.
    pub generation: u64,
    /// Message as received.
    pub message: RawMessage,
}

/// Sender half of the inbound queue.
pub type InboundSender = mpsc::Sender<InboundMessage>;

/// Receiver half of the inbound queue.
pub type InboundReceiver = mpsc::Receiver<InboundMessage>;

/// Create the bounded inbound queue.
pub fn inbound_channel(capacity: usize) -> (InboundSender, InboundReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Published once per reading applied to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingEvent {
    /// Tenant id carried by the message, if any.
    pub tenant_id: Option<String>,
    /// The applied reading.
    pub reading: SensorReading,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Readings were applied; some tuples may have been skipped.
    Applied {
        /// Readings applied.
        readings: usize,
        /// Tuples skipped.
        skipped: usize,
    },
    /// The payload was dropped whole.
    Dropped(SkipReason),
    /// The message belonged to a superseded generation.
    Stale,
}

/// Drains the inbound queue into the store.
#[derive(Debug, Clone)]
pub struct Pipeline {
    store: Arc<SensorStateStore>,
    fence: GenerationFence,
    metrics: Arc<PipelineMetrics>,
    readings: broadcast::Sender<ReadingEvent>,
}

impl Pipeline {
    /// Create a pipeline feeding `store`, fenced by `fence`.
    pub fn new(store: Arc<SensorStateStore>, fence: GenerationFence, event_capacity: usize) -> Self {
        let (readings, _) = broadcast::channel(event_capacity.max(1));
        Self {
            store,
            fence,
            metrics: Arc::new(PipelineMetrics::new()),
            readings,
        }
    }

    /// The store readings are applied to.
    pub fn store(&self) -> &Arc<SensorStateStore> {
        &self.store
    }

    /// Pipeline counters.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Subscribe to applied readings.
    pub fn subscribe(&self) -> broadcast::Receiver<ReadingEvent> {
        self.readings.subscribe()
    }

    /// Decode and apply one message.
    pub fn process(&self, inbound: InboundMessage) -> ProcessOutcome {
        self.metrics.record_received();
        let decoded = decode(&inbound.message);

        let applied = self.fence.run_if_current(inbound.generation, || match decoded {
            Decoded::Dropped(reason) => Err(reason),
            Decoded::Message {
                tenant_id,
                outcomes,
            } => {
                let mut readings = Vec::with_capacity(outcomes.len());
                let mut skipped = 0;
                for outcome in outcomes {
                    match outcome {
                        TupleOutcome::Reading(r) => readings.push(r),
                        TupleOutcome::Skipped(reason) => {
                            debug!("Skipping tuple: {}", reason);
                            skipped += 1;
                        }
                    }
                }
                self.store.apply(&readings);
                Ok((tenant_id, readings, skipped))
            }
        });

        match applied {
            None => {
                debug!(
                    "Discarding message from stale generation {}",
                    inbound.generation
                );
                self.metrics.record_stale();
                ProcessOutcome::Stale
            }
            Some(Err(reason)) => {
                debug!("Dropping message: {}", reason);
                self.metrics.record_dropped();
                ProcessOutcome::Dropped(reason)
            }
            Some(Ok((tenant_id, readings, skipped))) => {
                let count = readings.len();
                self.metrics.record_applied(count);
                self.metrics.record_skipped(skipped);
                trace!("Applied {} readings ({} skipped)", count, skipped);
                for reading in readings {
                    // Ignore error if no receivers
                    let _ = self.readings.send(ReadingEvent {
                        tenant_id: tenant_id.clone(),
                        reading,
                    });
                }
                ProcessOutcome::Applied {
                    readings: count,
                    skipped,
                }
            }
        }
    }

    /// Process messages until every sender has been dropped.
    pub async fn run(self, mut inbound: InboundReceiver) {
        while let Some(message) = inbound.recv().await {
            self.process(message);
        }
        debug!("Inbound queue closed, pipeline stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwlive_types::{ReadingValue, StatusCode};
    use time::OffsetDateTime;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            Arc::new(SensorStateStore::new()),
            GenerationFence::new(),
            16,
        )
    }

    fn inbound(generation: u64, payload: &'static str) -> InboundMessage {
        InboundMessage {
            generation,
            message: RawMessage::new(payload, OffsetDateTime::UNIX_EPOCH),
        }
    }

    #[test]
    fn test_process_applies_readings() {
        let p = pipeline();
        let outcome = p.process(inbound(
            0,
            r#"["tenantA", [23.5, 0, 50, "s1"], [true, 10, 1, "s2"], [1, 0]]"#,
        ));
        assert_eq!(
            outcome,
            ProcessOutcome::Applied {
                readings: 2,
                skipped: 1
            }
        );

        let s2 = p.store().latest("s2").unwrap();
        assert_eq!(s2.value, ReadingValue::Bool(true));
        assert_eq!(s2.status_code, StatusCode::WARNING);
        assert_eq!(p.store().history_of("s2")[0].numeric_value, 1.0);

        let m = p.metrics().snapshot();
        assert_eq!(m.messages_received, 1);
        assert_eq!(m.readings_applied, 2);
        assert_eq!(m.tuples_skipped, 1);
    }

    #[test]
    fn test_process_drops_non_array() {
        let p = pipeline();
        assert_eq!(
            p.process(inbound(0, r#"{"not":"an array"}"#)),
            ProcessOutcome::Dropped(SkipReason::NotAnArray)
        );
        assert!(p.store().is_empty());
        assert_eq!(p.metrics().snapshot().messages_dropped, 1);
    }

    #[test]
    fn test_process_discards_stale_generation() {
        let p = pipeline();
        p.fence.advance();
        assert_eq!(
            p.process(inbound(0, r#"["t", [1, 0, 1, "s1"]]"#)),
            ProcessOutcome::Stale
        );
        assert!(p.store().is_empty());
        assert_eq!(p.metrics().snapshot().stale_discarded, 1);
    }

    #[test]
    fn test_process_publishes_reading_events() {
        let p = pipeline();
        let mut rx = p.subscribe();
        p.process(inbound(0, r#"["tenantA", [4, 0, 1, "s1"]]"#));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.tenant_id.as_deref(), Some("tenantA"));
        assert_eq!(event.reading.sensor_id, "s1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_drains_in_order() {
        let p = pipeline();
        let store = Arc::clone(p.store());
        let (tx, rx) = inbound_channel(4);
        let handle = tokio::spawn(p.run(rx));

        tx.send(inbound(0, r#"["t", [1, 0, 1, "s1"]]"#)).await.unwrap();
        tx.send(inbound(0, r#"["t", [2, 0, 1, "s1"]]"#)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let values: Vec<f64> = store
            .history_of("s1")
            .iter()
            .map(|p| p.numeric_value)
            .collect();
        assert_eq!(values, vec![1.0, 2.0]);
        assert_eq!(store.latest("s1").unwrap().value, ReadingValue::Number(2.0));
    }
}
