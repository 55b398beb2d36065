//! Connection and reconnection options.
//!
//! [`ReconnectOptions`] controls how the
//! [`ConnectionManager`](crate::connection::ConnectionManager) recovers from an
//! unexpected disconnect. The default is three attempts with a fixed
//! two-second delay before each.
//!
//! [`ConnectionOptions`] bundles the endpoints, subscription and timeouts for
//! one session.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{Endpoint, QoS, Subscription};

/// Default tenant-wide topic filter.
pub const DEFAULT_TOPIC: &str = "gw/+/#";

/// Options for automatic reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectOptions {
    /// Maximum number of reconnection attempts.
    pub max_attempts: u32,
    /// Delay before each reconnection attempt.
    pub delay: Duration,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl ReconnectOptions {
    /// Create new reconnect options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options with the given delay before each attempt.
    pub fn fixed_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Never reconnect; an unexpected disconnect fails the session at once.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of reconnection attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay before each attempt.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Whether another attempt is allowed after `made` attempts.
    pub fn allows_attempt(&self, made: u32) -> bool {
        made < self.max_attempts
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts > 0 && self.delay.is_zero() {
            return Err(Error::InvalidConfig("delay must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Everything the connection manager needs besides credentials.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Tenant-scoped channel, tried first.
    pub primary: Endpoint,
    /// Unscoped channel, tried once if the primary handshake fails.
    pub fallback: Option<Endpoint>,
    /// Subscribe command issued after each handshake.
    pub subscription: Subscription,
    /// Upper bound on a single handshake.
    pub handshake_timeout: Duration,
    /// Capacity of the inbound message queue.
    pub inbound_buffer: usize,
    /// Reconnection policy.
    pub reconnect: ReconnectOptions,
}

impl ConnectionOptions {
    /// Options with defaults for everything but the endpoints.
    pub fn new(primary: Endpoint, fallback: Option<Endpoint>) -> Self {
        Self {
            primary,
            fallback,
            subscription: Subscription {
                topic: DEFAULT_TOPIC.to_string(),
                qos: QoS::AtLeastOnce,
            },
            handshake_timeout: Duration::from_secs(10),
            inbound_buffer: 256,
            reconnect: ReconnectOptions::default(),
        }
    }

    /// Set the subscription.
    pub fn subscription(mut self, topic: impl Into<String>, qos: QoS) -> Self {
        self.subscription = Subscription {
            topic: topic.into(),
            qos,
        };
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the inbound queue capacity.
    pub fn inbound_buffer(mut self, capacity: usize) -> Self {
        self.inbound_buffer = capacity;
        self
    }

    /// Set the reconnection policy.
    pub fn reconnect(mut self, reconnect: ReconnectOptions) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Endpoints in the order they are tried.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        std::iter::once(&self.primary).chain(self.fallback.as_ref())
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.subscription.topic.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "subscription topic must not be empty".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "handshake_timeout must be > 0".to_string(),
            ));
        }
        if self.inbound_buffer == 0 {
            return Err(Error::InvalidConfig(
                "inbound_buffer must be > 0".to_string(),
            ));
        }
        self.reconnect.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_options_default() {
        let opts = ReconnectOptions::default();
        assert_eq!(opts.max_attempts, 3);
        assert_eq!(opts.delay, Duration::from_secs(2));
    }

    #[test]
    fn test_allows_attempt() {
        let opts = ReconnectOptions::default();
        assert!(opts.allows_attempt(0));
        assert!(opts.allows_attempt(2));
        assert!(!opts.allows_attempt(3));
        assert!(!ReconnectOptions::disabled().allows_attempt(0));
    }

    #[test]
    fn test_reconnect_builders() {
        let opts = ReconnectOptions::fixed_delay(Duration::from_millis(500)).max_attempts(5);
        assert_eq!(opts.max_attempts, 5);
        assert_eq!(opts.delay, Duration::from_millis(500));
        assert_eq!(
            ReconnectOptions::new().delay(Duration::from_secs(1)).delay,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_reconnect_validate() {
        assert!(ReconnectOptions::default().validate().is_ok());
        assert!(
            ReconnectOptions::fixed_delay(Duration::ZERO)
                .validate()
                .is_err()
        );
        // A zero delay is harmless when reconnection is off.
        assert!(
            ReconnectOptions::disabled()
                .delay(Duration::ZERO)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_connection_options_defaults() {
        let opts = ConnectionOptions::new(Endpoint::primary("mqtt://a:1883"), None);
        assert_eq!(opts.subscription.topic, DEFAULT_TOPIC);
        assert_eq!(opts.subscription.qos, QoS::AtLeastOnce);
        assert_eq!(opts.handshake_timeout, Duration::from_secs(10));
        assert_eq!(opts.endpoints().count(), 1);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_connection_options_endpoint_order() {
        let opts = ConnectionOptions::new(
            Endpoint::primary("mqtt://a"),
            Some(Endpoint::fallback("mqtt://b")),
        );
        let urls: Vec<&str> = opts.endpoints().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["mqtt://a", "mqtt://b"]);
    }

    #[test]
    fn test_connection_options_validate() {
        let base = ConnectionOptions::new(Endpoint::primary("mqtt://a"), None);
        assert!(base.clone().subscription(" ", QoS::AtMostOnce).validate().is_err());
        assert!(base.clone().inbound_buffer(0).validate().is_err());
        assert!(
            base.clone()
                .handshake_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
