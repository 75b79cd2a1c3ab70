use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::BrokerSettings;
use super::message_manager::MQTTMessage;
use crate::simulator::error::SimulatorError;

/// Pause before polling again after a network error; rumqttc reconnects on the next poll
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
/// How long `disconnect` keeps driving the event loop to flush the DISCONNECT packet
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Outcome of a CONNECT handshake as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStatus {
    Accepted,
    Refused(String),
}

impl From<ConnectReturnCode> for ConnectStatus {
    fn from(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::Success => ConnectStatus::Accepted,
            refused => ConnectStatus::Refused(format!("{:?}", refused)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// We asked for the disconnect
    Requested,
    /// Connection dropped or was closed by the broker
    Network(String),
}

/// Notifications fired from the broker client's background task.
///
/// Implementations must not touch the simulated device state; they run concurrently with the
/// foreground loop and are meant for reporting only.
pub trait BrokerEvents: Send + Sync {
    fn on_connect(&self, status: ConnectStatus);
    fn on_publish(&self, packet_id: u16);
    fn on_disconnect(&self, reason: DisconnectReason);
}

/// Prints connection status lines for a single session.
#[derive(Debug, Clone)]
pub struct ConsoleEvents {
    address: String,
    client_id: String,
    topic: String,
}

impl ConsoleEvents {
    pub fn new(address: String, client_id: String, topic: String) -> Self {
        Self {
            address,
            client_id,
            topic,
        }
    }
}

impl BrokerEvents for ConsoleEvents {
    fn on_connect(&self, status: ConnectStatus) {
        match status {
            ConnectStatus::Accepted => {
                info!("✓ Connected to MQTT Broker: {}", self.address);
                info!("✓ Client ID: {}", self.client_id);
                info!("✓ Publishing to topic: {}", self.topic);
                info!("{}", "-".repeat(50));
            }
            ConnectStatus::Refused(code) => error!("✗ Connection failed, error code: {}", code),
        }
    }

    fn on_publish(&self, packet_id: u16) {
        trace!("Publish {} handed to the network", packet_id);
    }

    fn on_disconnect(&self, reason: DisconnectReason) {
        match reason {
            DisconnectReason::Requested => debug!("Disconnect sent to {}", self.address),
            DisconnectReason::Network(cause) => {
                warn!("✗ Disconnected from broker ({})", cause)
            }
        }
    }
}

/// Everything the simulator needs from a publish/subscribe client.
#[async_trait]
pub trait BrokerClient: Send {
    /// Performs the handshake; fails fast if the broker is unreachable or refuses.
    async fn connect(&mut self, settings: &BrokerSettings) -> Result<(), SimulatorError>;

    /// Hands network processing to a background task that reports through `events`.
    fn start_background_loop(
        &mut self,
        events: Arc<dyn BrokerEvents>,
    ) -> Result<(), SimulatorError>;

    async fn stop_background_loop(&mut self);

    /// Queues a message without waiting for the network.
    async fn publish(&mut self, message: MQTTMessage) -> Result<(), SimulatorError>;

    async fn disconnect(&mut self) -> Result<(), SimulatorError>;
}

struct BackgroundLoop {
    token: CancellationToken,
    handle: JoinHandle<EventLoop>,
}

/// [`BrokerClient`] backed by rumqttc.
///
/// The event loop is owned by the handler while connecting and disconnecting, and by the
/// background task in between. Stopping the task hands it back.
#[derive(Default)]
pub struct MqttHandler {
    state: ConnectionState,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    background: Option<BackgroundLoop>,
    handshake: Option<ConnectStatus>,
}

impl MqttHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }
}

#[async_trait]
impl BrokerClient for MqttHandler {
    async fn connect(&mut self, settings: &BrokerSettings) -> Result<(), SimulatorError> {
        let mut mqtt_options =
            MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
        mqtt_options
            .set_keep_alive(settings.keep_alive)
            .set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, settings.request_capacity);
        self.state = ConnectionState::Connecting;

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack.code),
                    Ok(event) => trace!(?event, "event before CONNACK"),
                    Err(e) => return Err(SimulatorError::Connection(e.to_string())),
                }
            }
        };

        let code = match tokio::time::timeout(settings.connect_timeout, handshake).await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                self.state = ConnectionState::Failed;
                return Err(e);
            }
            Err(_) => {
                self.state = ConnectionState::Failed;
                return Err(SimulatorError::Connection(format!(
                    "no CONNACK from {} within {:?}",
                    settings.address(),
                    settings.connect_timeout
                )));
            }
        };

        if code != ConnectReturnCode::Success {
            self.state = ConnectionState::Failed;
            return Err(SimulatorError::Connection(format!(
                "broker refused connection: {:?}",
                code
            )));
        }

        debug!("Handshake with {} complete", settings.address());
        self.state = ConnectionState::Connected;
        self.handshake = Some(code.into());
        self.client = Some(client);
        self.eventloop = Some(eventloop);
        Ok(())
    }

    fn start_background_loop(
        &mut self,
        events: Arc<dyn BrokerEvents>,
    ) -> Result<(), SimulatorError> {
        let Some(mut eventloop) = self.eventloop.take() else {
            return Err(SimulatorError::Connection(
                "background loop requested before connecting".to_string(),
            ));
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handshake = self.handshake.take();

        let handle = tokio::spawn(async move {
            if let Some(status) = handshake {
                events.on_connect(status);
            }

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    polled = eventloop.poll() => match polled {
                        Ok(event) => dispatch(events.as_ref(), event),
                        Err(e) => {
                            events.on_disconnect(DisconnectReason::Network(e.to_string()));
                            tokio::select! {
                                _ = cancelled.cancelled() => break,
                                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                            }
                        }
                    }
                }
            }

            debug!("MQTT background loop stopped");
            eventloop
        });

        self.background = Some(BackgroundLoop { token, handle });
        Ok(())
    }

    async fn stop_background_loop(&mut self) {
        let Some(background) = self.background.take() else {
            return;
        };

        background.token.cancel();
        match background.handle.await {
            Ok(eventloop) => self.eventloop = Some(eventloop),
            Err(e) => warn!("MQTT background loop ended abnormally: {}", e),
        }
    }

    async fn publish(&mut self, message: MQTTMessage) -> Result<(), SimulatorError> {
        let Some(client) = &self.client else {
            return Err(SimulatorError::Publish("not connected".to_string()));
        };

        let (topic, content) = message.into_parts();
        client
            .try_publish(topic, QoS::AtMostOnce, false, content)
            .map_err(|e| SimulatorError::Publish(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), SimulatorError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        self.state = ConnectionState::Disconnected;

        client
            .try_disconnect()
            .map_err(|e| SimulatorError::Connection(e.to_string()))?;

        let Some(mut eventloop) = self.eventloop.take() else {
            return Ok(());
        };

        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Event loop closed while disconnecting: {}", e);
                        break;
                    }
                }
            }
        };

        if tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await.is_err() {
            warn!("DISCONNECT was not flushed within {:?}", DISCONNECT_FLUSH_TIMEOUT);
        }
        Ok(())
    }
}

fn dispatch(events: &dyn BrokerEvents, event: Event) {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => events.on_connect(ack.code.into()),
        Event::Outgoing(Outgoing::Publish(packet_id)) => events.on_publish(packet_id),
        Event::Outgoing(Outgoing::Disconnect) => events.on_disconnect(DisconnectReason::Requested),
        Event::Incoming(Packet::Disconnect) => events.on_disconnect(DisconnectReason::Network(
            "broker closed the session".to_string(),
        )),
        other => trace!(?other, "MQTT event"),
    }
}
