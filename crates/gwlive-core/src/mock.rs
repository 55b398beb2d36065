//! Mock transport for testing.
//!
//! This module provides a [`Transport`] that never touches the network, so the
//! connection manager and the full session can be exercised in unit and
//! integration tests.
//!
//! # Features
//!
//! - **Scripted handshakes**: queue accept/reject/hang outcomes per connect call
//! - **Link control**: push messages into, fail, or close any accepted link
//! - **Recording**: every connect attempt and subscribe command is recorded
//! - **Latency simulation**: add an artificial delay to every handshake
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use gwlive_core::mock::{MockConnect, MockTransport};
//!
//! let transport = Arc::new(MockTransport::new());
//! // Primary refuses, fallback accepts.
//! transport.script([MockConnect::reject("not authorised"), MockConnect::Accept]);
//! assert_eq!(transport.attempts().len(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::{Notify, mpsc};

use crate::error::{Error, Result};
use crate::transport::{Channel, Credentials, Endpoint, Link, LinkMessage, Subscription, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted outcome of one connect call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockConnect {
    /// Acknowledge the handshake.
    Accept,
    /// Refuse the handshake with a message.
    Reject(String),
    /// Never answer.
    Hang,
}

impl MockConnect {
    /// Shorthand for [`MockConnect::Reject`].
    pub fn reject(reason: impl Into<String>) -> Self {
        MockConnect::Reject(reason.into())
    }
}

/// One recorded connect call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// Endpoint that was dialled.
    pub endpoint: Endpoint,
    /// Tenant id presented.
    pub tenant_id: String,
}

#[derive(Debug)]
enum LinkCommand {
    Message(LinkMessage),
    Fail(String),
    Close,
}

/// Handle for driving one accepted [`MockLink`].
#[derive(Debug, Clone)]
pub struct MockLinkController {
    endpoint: Endpoint,
    tx: mpsc::UnboundedSender<LinkCommand>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    closed: Arc<AtomicBool>,
}

impl MockLinkController {
    /// Endpoint the link was opened on.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Channel the link was opened on.
    pub fn channel(&self) -> Channel {
        self.endpoint.channel
    }

    /// Deliver a payload without a relay timestamp.
    pub fn push(&self, payload: impl Into<Bytes>) {
        self.send(LinkCommand::Message(LinkMessage::new("gw/mock", payload)));
    }

    /// Deliver a payload stamped by the relay.
    pub fn push_at(&self, payload: impl Into<Bytes>, timestamp: OffsetDateTime) {
        self.send(LinkCommand::Message(
            LinkMessage::new("gw/mock", payload).with_timestamp(timestamp),
        ));
    }

    /// Break the link with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        self.send(LinkCommand::Fail(reason.into()));
    }

    /// Close the link from the relay side.
    pub fn close(&self) {
        self.send(LinkCommand::Close);
    }

    /// Subscribe commands received on this link.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        lock(&self.subscriptions).clone()
    }

    /// Whether the client closed the link.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn send(&self, command: LinkCommand) {
        // Link already dropped; nothing to deliver to.
        let _ = self.tx.send(command);
    }
}

/// A link produced by [`MockTransport`].
#[derive(Debug)]
pub struct MockLink {
    rx: mpsc::UnboundedReceiver<LinkCommand>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    closed: Arc<AtomicBool>,
    ended: bool,
}

#[async_trait]
impl Link for MockLink {
    async fn subscribe(&mut self, subscription: &Subscription) -> Result<()> {
        lock(&self.subscriptions).push(subscription.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<LinkMessage>> {
        if self.ended {
            return None;
        }
        match self.rx.recv().await {
            Some(LinkCommand::Message(message)) => Some(Ok(message)),
            Some(LinkCommand::Fail(reason)) => {
                self.ended = true;
                Some(Err(Error::Transport(reason)))
            }
            Some(LinkCommand::Close) | None => {
                self.ended = true;
                None
            }
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}

/// A scripted in-memory [`Transport`].
///
/// Connect calls consume the script front to back; once it is empty every
/// call is accepted.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockConnect>>,
    attempts: Mutex<Vec<ConnectAttempt>>,
    links: Mutex<Vec<MockLinkController>>,
    link_opened: Notify,
    connect_latency_ms: AtomicU64,
}

impl MockTransport {
    /// Transport that accepts every handshake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append outcomes to the script.
    pub fn script(&self, outcomes: impl IntoIterator<Item = MockConnect>) {
        lock(&self.script).extend(outcomes);
    }

    /// Delay every handshake by `latency`.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Every connect call so far.
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        lock(&self.attempts).clone()
    }

    /// Number of connect calls so far.
    pub fn attempt_count(&self) -> usize {
        lock(&self.attempts).len()
    }

    /// Controllers for every accepted link, oldest first.
    pub fn links(&self) -> Vec<MockLinkController> {
        lock(&self.links).clone()
    }

    /// Wait until the `index`-th link (0-based) has been accepted.
    pub async fn link(&self, index: usize) -> MockLinkController {
        loop {
            let notified = self.link_opened.notified();
            if let Some(link) = lock(&self.links).get(index).cloned() {
                return link;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn Link>> {
        lock(&self.attempts).push(ConnectAttempt {
            endpoint: endpoint.clone(),
            tenant_id: credentials.tenant_id.clone(),
        });

        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or(MockConnect::Accept);
        match outcome {
            MockConnect::Accept => {}
            MockConnect::Reject(reason) => {
                return Err(Error::Handshake {
                    channel: endpoint.channel,
                    reason,
                });
            }
            MockConnect::Hang => std::future::pending::<()>().await,
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        lock(&self.links).push(MockLinkController {
            endpoint: endpoint.clone(),
            tx,
            subscriptions: Arc::clone(&subscriptions),
            closed: Arc::clone(&closed),
        });
        self.link_opened.notify_waiters();

        Ok(Box::new(MockLink {
            rx,
            subscriptions,
            closed,
            ended: false,
        }))
    }
}
