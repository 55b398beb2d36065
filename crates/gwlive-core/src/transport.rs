//! Transport abstraction for the live relay connection.
//!
//! The [`ConnectionManager`](crate::connection::ConnectionManager) only ever
//! talks to a [`Transport`]; the MQTT client and the mock used in tests both
//! implement it. This keeps the handshake/fallback/reconnect policy
//! independent of the wire library.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Result;

/// Which of the two configured channels an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Tenant-scoped relay channel, always tried first.
    Primary,
    /// Unscoped relay channel, tried once when the primary handshake fails.
    Fallback,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Primary => write!(f, "primary"),
            Channel::Fallback => write!(f, "fallback"),
        }
    }
}

/// A relay address together with its channel role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Channel role.
    pub channel: Channel,
    /// Broker URL (`mqtt://host:port` or `mqtts://host:port`).
    pub url: String,
}

impl Endpoint {
    /// Primary endpoint.
    pub fn primary(url: impl Into<String>) -> Self {
        Self {
            channel: Channel::Primary,
            url: url.into(),
        }
    }

    /// Fallback endpoint.
    pub fn fallback(url: impl Into<String>) -> Self {
        Self {
            channel: Channel::Fallback,
            url: url.into(),
        }
    }
}

/// Bearer token issued by the identity provider.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for handing to the transport.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty or whitespace.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

impl From<&str> for BearerToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BearerToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Credentials required to open the stream.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer token.
    pub token: BearerToken,
    /// Tenant identifier.
    pub tenant_id: String,
}

/// Delivery guarantee requested for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery.
    AtLeastOnce,
    /// Exactly-once delivery.
    ExactlyOnce,
}

impl QoS {
    /// Map a numeric QoS level; anything above 2 is clamped to exactly-once.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }
}

/// Subscribe command issued after every successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Topic filter, e.g. `gw/+/#`.
    pub topic: String,
    /// Requested QoS.
    pub qos: QoS,
}

/// One message received on a live link.
#[derive(Debug, Clone)]
pub struct LinkMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Bytes,
    /// Timestamp stamped by the relay, if the transport carries one.
    pub server_timestamp: Option<OffsetDateTime>,
}

impl LinkMessage {
    /// Message without a relay timestamp.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            server_timestamp: None,
        }
    }

    /// Attach a relay timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.server_timestamp = Some(timestamp);
        self
    }
}

/// Something that can open links to the relay.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a link and complete the handshake.
    ///
    /// Returning `Ok` means the relay acknowledged the connection.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn Link>>;
}

/// An established, acknowledged connection.
#[async_trait]
pub trait Link: Send {
    /// Issue a subscribe command.
    async fn subscribe(&mut self, subscription: &Subscription) -> Result<()>;

    /// Wait for the next inbound message.
    ///
    /// `None` means the relay closed the link in an orderly way; `Some(Err)`
    /// means the link failed. Both are unexpected disconnects from the
    /// session's point of view.
    async fn recv(&mut self) -> Option<Result<LinkMessage>>;

    /// Tear the link down.
    async fn close(&mut self);
}
