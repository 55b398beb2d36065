//! Connection manager for the live event stream.
//!
//! The [`ConnectionManager`] owns exactly one logical session at a time. It
//! performs the handshake (primary channel, then one fallback attempt),
//! subscribes, forwards every inbound message in arrival order to the
//! pipeline's queue, and recovers from unexpected disconnects.
//!
//! # State machine
//!
//! ```text
//!              open()                 handshake ok
//! Disconnected ──────▶ Connecting ───────────────────▶ Connected
//!       ▲                  │ primary + fallback fail      │ link dropped
//!       │ close()          ▼                              ▼
//!       └──────────────  Failed ◀── attempts exhausted ─ Reconnecting
//!                                                         │ handshake ok
//!                                                         └──────▶ Connected
//! ```
//!
//! `close()` moves to `Disconnected` from any state. Each `open()` and
//! `close()` advances the [`GenerationFence`]; status updates and messages
//! from an older generation are ignored.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::decoder::RawMessage;
use crate::error::{Error, FailureReason, Result};
use crate::events::{EventDispatcher, EventReceiver, SessionEvent};
use crate::fence::GenerationFence;
use crate::metrics::ConnectionMetrics;
use crate::pipeline::{InboundMessage, InboundSender};
use crate::reconnect::ConnectionOptions;
use crate::transport::{BearerToken, Channel, Credentials, Endpoint, Link, Transport};

/// How long `close()` waits for the session task to tear its link down.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Connectivity state exposed to the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// First handshake in progress.
    Connecting,
    /// Subscribed and receiving.
    Connected,
    /// Recovering from an unexpected disconnect.
    Reconnecting,
    /// Gave up; call `open()` again.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of the session's connectivity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Generation the state belongs to.
    pub generation: u64,
    /// Channel of the live link, when connected.
    pub channel: Option<Channel>,
    /// Reason for the last failure or disconnect.
    pub last_error: Option<FailureReason>,
}

struct SessionTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the live connection and feeds the inbound queue.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    options: ConnectionOptions,
    fence: GenerationFence,
    inbound: InboundSender,
    status: Arc<watch::Sender<ConnectionStatus>>,
    events: EventDispatcher,
    metrics: Arc<ConnectionMetrics>,
    session: Mutex<Option<SessionTask>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("primary", &self.options.primary.url)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl ConnectionManager {
    /// Create a manager that writes to `inbound`, fenced by `fence`.
    pub fn new(
        transport: Arc<dyn Transport>,
        options: ConnectionOptions,
        fence: GenerationFence,
        inbound: InboundSender,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus {
            generation: fence.current(),
            ..ConnectionStatus::default()
        });
        Self {
            transport,
            options,
            fence,
            inbound,
            status: Arc::new(status),
            events: EventDispatcher::default(),
            metrics: Arc::new(ConnectionMetrics::new()),
            session: Mutex::new(None),
        }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Connection metrics.
    pub fn metrics(&self) -> &Arc<ConnectionMetrics> {
        &self.metrics
    }

    /// Options in use.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Start a session.
    ///
    /// Any existing session is torn down first. With an empty token or tenant
    /// the manager moves straight to `Failed` and no I/O is attempted.
    /// Otherwise this returns once the session task is running; follow
    /// progress through [`watch_status`](Self::watch_status).
    #[instrument(skip_all, fields(tenant = %tenant_id))]
    pub async fn open(&self, token: BearerToken, tenant_id: &str) -> Result<()> {
        self.options.validate()?;

        let mut session = self.session.lock().await;
        let generation = self.fence.advance();
        stop(session.take()).await;

        if token.is_empty() || tenant_id.trim().is_empty() {
            warn!("Refusing to open session without credentials");
            let reason = FailureReason::MissingCredential;
            self.status.send_replace(ConnectionStatus {
                state: ConnectionState::Failed,
                generation,
                channel: None,
                last_error: Some(reason.clone()),
            });
            self.events.send(SessionEvent::StateChanged {
                generation,
                state: ConnectionState::Failed,
            });
            self.events.send(SessionEvent::Failed { reason });
            return Err(Error::MissingCredential);
        }

        let cancel = CancellationToken::new();
        let worker = Worker {
            transport: Arc::clone(&self.transport),
            options: self.options.clone(),
            credentials: Credentials {
                token,
                tenant_id: tenant_id.to_string(),
            },
            generation,
            fence: self.fence.clone(),
            inbound: self.inbound.clone(),
            status: Arc::clone(&self.status),
            events: self.events.clone(),
            metrics: Arc::clone(&self.metrics),
            cancel: cancel.clone(),
        };
        worker.set_status(ConnectionState::Connecting, None, None);

        let handle = tokio::spawn(worker.run());
        *session = Some(SessionTask { cancel, handle });
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Always ends in `Disconnected`, whatever the prior state, including in
    /// the middle of a reconnect delay. Idempotent. Once this returns, no
    /// message from the closed session can reach the store.
    #[instrument(skip_all)]
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        let generation = self.fence.advance();
        let had_session = session.is_some();
        stop(session.take()).await;

        let previous = self.status.send_replace(ConnectionStatus {
            state: ConnectionState::Disconnected,
            generation,
            channel: None,
            last_error: None,
        });
        if had_session || previous.state != ConnectionState::Disconnected {
            info!("Session closed");
            self.events.send(SessionEvent::StateChanged {
                generation,
                state: ConnectionState::Disconnected,
            });
            self.events.send(SessionEvent::Closed);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.session.get_mut().take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

async fn stop(task: Option<SessionTask>) {
    let Some(task) = task else {
        return;
    };
    task.cancel.cancel();
    let abort = task.handle.abort_handle();
    if timeout(STOP_GRACE, task.handle).await.is_err() {
        debug!("Session task did not stop in time, aborting");
        abort.abort();
    }
}

enum PumpEnd {
    Cancelled,
    Disconnected(String),
}

/// State owned by one session task.
struct Worker {
    transport: Arc<dyn Transport>,
    options: ConnectionOptions,
    credentials: Credentials,
    generation: u64,
    fence: GenerationFence,
    inbound: InboundSender,
    status: Arc<watch::Sender<ConnectionStatus>>,
    events: EventDispatcher,
    metrics: Arc<ConnectionMetrics>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let (mut link, channel) = match self.handshake().await {
            Ok(connected) => connected,
            Err(Error::Cancelled) => return,
            Err(e) => {
                self.fail(FailureReason::HandshakeFailure(e.to_string()));
                return;
            }
        };
        self.set_status(ConnectionState::Connected, Some(channel), None);

        loop {
            let reason = match self.pump(link.as_mut()).await {
                PumpEnd::Cancelled => {
                    link.close().await;
                    return;
                }
                PumpEnd::Disconnected(reason) => reason,
            };
            link.close().await;

            warn!("Connection lost on {} channel: {}", channel, reason);
            self.metrics.record_disconnect();
            self.events.send(SessionEvent::Disconnected {
                error: reason.clone(),
            });
            self.set_status(
                ConnectionState::Reconnecting,
                None,
                Some(FailureReason::UnexpectedDisconnect(reason.clone())),
            );

            match self.reconnect(reason).await {
                Some(next) => link = next,
                None => return,
            }
        }
    }

    /// Try the primary channel, then the fallback once.
    async fn handshake(&self) -> Result<(Box<dyn Link>, Channel)> {
        let mut last_error = None;

        for endpoint in self.options.endpoints() {
            if endpoint.channel == Channel::Fallback {
                info!("Primary handshake failed, trying fallback {}", endpoint.url);
                self.events.send(SessionEvent::FallbackEngaged {
                    url: endpoint.url.clone(),
                });
            }

            let started = Instant::now();
            match self.connect_endpoint(endpoint).await {
                Ok(link) => {
                    self.metrics.handshakes.record_success(started.elapsed());
                    info!("Connected on {} channel ({})", endpoint.channel, endpoint.url);
                    self.events.send(SessionEvent::Connected {
                        channel: endpoint.channel,
                        url: endpoint.url.clone(),
                    });
                    self.events.send(SessionEvent::Subscribed {
                        topic: self.options.subscription.topic.clone(),
                    });
                    return Ok((link, endpoint.channel));
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    self.metrics.handshakes.record_failure(started.elapsed());
                    warn!("Handshake on {} channel failed: {}", endpoint.channel, e);
                    self.events.send(SessionEvent::HandshakeFailed {
                        channel: endpoint.channel,
                        error: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::InvalidConfig("no endpoints configured".to_string())))
    }

    /// Connect and subscribe, bounded by the handshake timeout.
    async fn connect_endpoint(&self, endpoint: &Endpoint) -> Result<Box<dyn Link>> {
        let limit = self.options.handshake_timeout;
        let attempt = async {
            let mut link = self.transport.connect(endpoint, &self.credentials).await?;
            if let Err(e) = link.subscribe(&self.options.subscription).await {
                link.close().await;
                return Err(Error::Handshake {
                    channel: endpoint.channel,
                    reason: format!("subscribe failed: {}", e),
                });
            }
            Ok(link)
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = timeout(limit, attempt) => result.unwrap_or_else(|_| Err(Error::Timeout {
                operation: format!("handshake on {} channel", endpoint.channel),
                duration: limit,
            })),
        }
    }

    /// Forward messages until the link ends or the session is cancelled.
    async fn pump(&self, link: &mut dyn Link) -> PumpEnd {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpEnd::Cancelled,
                received = link.recv() => received,
            };

            let message = match received {
                Some(Ok(message)) => message,
                Some(Err(e)) => return PumpEnd::Disconnected(e.to_string()),
                None => return PumpEnd::Disconnected("link closed by relay".to_string()),
            };

            let server_timestamp = message
                .server_timestamp
                .unwrap_or_else(OffsetDateTime::now_utc);
            let inbound = InboundMessage {
                generation: self.generation,
                message: RawMessage::new(message.payload, server_timestamp),
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpEnd::Cancelled,
                sent = self.inbound.send(inbound) => {
                    if sent.is_err() {
                        debug!("Inbound queue closed");
                        return PumpEnd::Cancelled;
                    }
                }
            }
        }
    }

    /// Bounded reconnection. Returns the new link, or `None` after failing
    /// or being cancelled.
    async fn reconnect(&self, mut last_error: String) -> Option<Box<dyn Link>> {
        let policy = &self.options.reconnect;
        let mut attempt = 0;

        while policy.allows_attempt(attempt) {
            let delay = policy.delay;
            attempt += 1;
            info!("Reconnection attempt {} in {:?}", attempt, delay);
            self.events.send(SessionEvent::ReconnectStarted { attempt });

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = sleep(delay) => {}
            }

            let started = Instant::now();
            match self.handshake().await {
                Ok((link, channel)) => {
                    self.metrics.reconnects.record_success(started.elapsed());
                    info!("Reconnected after {} attempts", attempt);
                    self.events.send(SessionEvent::ReconnectSucceeded { attempts: attempt });
                    self.set_status(ConnectionState::Connected, Some(channel), None);
                    return Some(link);
                }
                Err(Error::Cancelled) => return None,
                Err(e) => {
                    self.metrics.reconnects.record_failure(started.elapsed());
                    warn!("Reconnection attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                }
            }
        }

        self.fail(FailureReason::ReconnectExhausted {
            attempts: attempt,
            last_error,
        });
        None
    }

    fn fail(&self, reason: FailureReason) {
        error!("Session failed: {}", reason);
        if self.set_status(ConnectionState::Failed, None, Some(reason.clone())) {
            self.events.send(SessionEvent::Failed { reason });
        }
    }

    /// Publish a status update unless this worker's generation is stale.
    fn set_status(
        &self,
        state: ConnectionState,
        channel: Option<Channel>,
        last_error: Option<FailureReason>,
    ) -> bool {
        let generation = self.generation;
        let next = ConnectionStatus {
            state,
            generation,
            channel,
            last_error,
        };
        let changed = self.status.send_if_modified(|status| {
            if !self.fence.is_current(generation) || *status == next {
                return false;
            }
            *status = next;
            true
        });
        if changed {
            info!("Connection state -> {}", state);
            self.events
                .send(SessionEvent::StateChanged { generation, state });
        }
        changed
    }
}
