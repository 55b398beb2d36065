//! Error types for gwlive-core.
//!
//! This module defines the errors raised by the connection layer and the
//! human-readable [`FailureReason`] that is attached to the session status for
//! display.
//!
//! # Recovery Strategy
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::MissingCredential`] | Do not retry | Caller must supply a token and tenant |
//! | [`Error::Handshake`] | Try the fallback channel once | Primary channel may be unavailable |
//! | [`Error::Transport`] | Reconnect (bounded) | Connection was lost |
//! | [`Error::Timeout`] | Treated like a handshake failure | Broker did not acknowledge |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//! | [`Error::InvalidBrokerUrl`] | Do not retry | Fix configuration and restart |
//!
//! Malformed messages are deliberately absent from this list: the decoder
//! reports them as skipped tuples, never as errors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::Channel;

/// Errors that can occur while running a live telemetry session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bearer token or tenant identifier was empty.
    #[error("Missing credential: bearer token and tenant id are required")]
    MissingCredential,

    /// The broker refused or never acknowledged the handshake.
    #[error("Handshake failed on {channel} channel: {reason}")]
    Handshake {
        /// Channel the handshake was attempted on.
        channel: Channel,
        /// Description of the failure.
        reason: String,
    },

    /// An established link failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Broker URL could not be parsed.
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled by `close()`.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias using gwlive-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a session ended up in a non-connected state.
///
/// Unlike [`Error`] this is cheap to clone and serialisable, so it can ride
/// along with every status update sent to the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
#[non_exhaustive]
pub enum FailureReason {
    /// `open()` was called without a token or tenant.
    MissingCredential,
    /// Neither the primary nor the fallback channel completed a handshake.
    HandshakeFailure(String),
    /// The live link dropped without `close()` being called.
    UnexpectedDisconnect(String),
    /// Every reconnection attempt failed.
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error seen.
        last_error: String,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingCredential => {
                write!(f, "Sign-in required: no access token or tenant available")
            }
            FailureReason::HandshakeFailure(reason) => {
                write!(f, "Could not reach the live data relay: {}", reason)
            }
            FailureReason::UnexpectedDisconnect(reason) => {
                write!(f, "Connection to the live data relay was lost: {}", reason)
            }
            FailureReason::ReconnectExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "Gave up reconnecting after {} attempts: {}",
                attempts, last_error
            ),
        }
    }
}
