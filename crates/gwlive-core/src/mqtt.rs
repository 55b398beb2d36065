//! MQTT transport for the live data relay.
//!
//! The relay speaks MQTT 3.1.1. Credentials map onto the CONNECT packet:
//!
//! | MQTT field | Value |
//! |------------|-------|
//! | username | tenant id |
//! | password | bearer token |
//! | client id | configured prefix plus a random suffix |
//!
//! A handshake is complete when the broker answers with a successful CONNACK.
//! `mqtts://` URLs connect over native TLS.
//!
//! MQTT 3.1.1 publishes carry no timestamp, so [`LinkMessage::server_timestamp`]
//! is always `None` here and the connection manager stamps messages on
//! receipt.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, TlsConfiguration,
};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::{Channel, Credentials, Endpoint, Link, LinkMessage, QoS, Subscription, Transport};

/// Default MQTT keep-alive.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

const REQUEST_CAPACITY: usize = 64;
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// [`Transport`] backed by `rumqttc`.
#[derive(Debug, Clone)]
pub struct MqttTransport {
    client_id: String,
    keep_alive: Duration,
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new("gwlive")
    }
}

impl MqttTransport {
    /// Transport using `client_id` as the client id prefix.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }

    /// Set the keep-alive interval.
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    fn options(&self, endpoint: &Endpoint, credentials: &Credentials) -> Result<MqttOptions> {
        let (host, port, use_tls) =
            parse_broker_url(&endpoint.url).map_err(Error::InvalidBrokerUrl)?;

        let client_id = format!("{}-{:08x}", self.client_id, rand::random::<u32>());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options.set_credentials(credentials.tenant_id.clone(), credentials.token.expose());

        if use_tls {
            options.set_transport(rumqttc::Transport::tls_with_config(
                TlsConfiguration::Native,
            ));
        }
        Ok(options)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn Link>> {
        let options = self.options(endpoint, credentials)?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let channel = endpoint.channel;

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        debug!("CONNACK received from {}", endpoint.url);
                        break;
                    }
                    return Err(Error::Handshake {
                        channel,
                        reason: format!("broker refused connection: {:?}", ack.code),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::Handshake {
                        channel,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(Box::new(MqttLink {
            client,
            eventloop,
            channel,
        }))
    }
}

/// An acknowledged MQTT connection.
pub struct MqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
    channel: Channel,
}

impl std::fmt::Debug for MqttLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttLink")
            .field("channel", &self.channel)
            .finish()
    }
}

#[async_trait]
impl Link for MqttLink {
    async fn subscribe(&mut self, subscription: &Subscription) -> Result<()> {
        self.client
            .subscribe(subscription.topic.clone(), to_mqtt_qos(subscription.qos))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<LinkMessage>> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Some(Ok(LinkMessage::new(publish.topic, publish.payload)));
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(
                        "Subscription acknowledged on {} channel: {:?}",
                        self.channel, ack.return_codes
                    );
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(Error::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if self.client.try_disconnect().is_err() {
            return;
        }
        // Drive the event loop until the DISCONNECT has gone out.
        let flushed = tokio::time::timeout(CLOSE_GRACE, async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            debug!("Timed out flushing DISCONNECT on {} channel", self.channel);
        }
    }
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Parse an MQTT broker URL into (host, port, use_tls).
pub fn parse_broker_url(url: &str) -> std::result::Result<(String, u16, bool), String> {
    let (scheme, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        ("mqtt", stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        ("mqtts", stripped)
    } else {
        return Err("Invalid scheme: URL must start with mqtt:// or mqtts://".to_string());
    };

    let use_tls = scheme == "mqtts";
    let default_port = if use_tls { 8883 } else { 1883 };
    let rest = rest.trim_end_matches('/');

    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: {}", p))?;
        (h.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    Ok((host, port, use_tls))
}
