//! Broker connection lifecycle
//!
//! ```text
//!              ┌─┐ ConnectFailed, retry after reconnect_delay
//!              ▼ │
//! Configured ──establish()──► Online ──run()──► Closed
//!     │                          │ ▲
//!     └── cancelled ──► Closed   └─┘ reconnect (rumqttc, next poll)
//! ```
//!
//! [`BrokerClient::connect`] builds the rumqttc client and spawns the session on
//! the tokio runtime. The returned [`BrokerClient`] stays with the caller for
//! subscribe/publish/disconnect; link state flows back through a `watch`
//! channel and notifications through an `mpsc` channel of [`BrokerEvent`]s.
//!
//! The session never waits on the event channel. If the owner stops draining
//! it, events are dropped so `poll()` keeps serving keepalives.

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS,
};
use statum::{machine, state};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{BrokerSettings, REQUEST_CAPACITY};
use super::error::{ConnectError, PublishError, SubscribeError};
use super::message_manager::{BrokerEvent, MQTTMessage};
use super::Publisher;

const EVENT_CAPACITY: usize = 100;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Failed => "connection failed",
            LinkState::Reconnecting => "reconnecting",
        };
        f.write_str(text)
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Configured, // options built, no CONNACK yet
    Online,     // CONNACK received, event loop running
    Closed,     // event loop left
}

#[machine]
pub struct BrokerSession<S: SessionState> {
    eventloop: EventLoop,
    settings: BrokerSettings,
    status: Arc<watch::Sender<LinkState>>,
    events: mpsc::Sender<BrokerEvent>,
    shutdown: CancellationToken,
}

impl<S: SessionState> BrokerSession<S> {
    fn emit(&self, event: BrokerEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event channel full, dropping broker event {:?}", event)
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, discarding broker event")
            }
        }
    }

    /// Sets `state` unless the owner already asked for a disconnect.
    fn set_state(&self, state: LinkState) {
        self.status.send_if_modified(|current| {
            if *current == LinkState::Disconnected || *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Returns true when cancelled while waiting.
    async fn wait_before_retry(&mut self) -> bool {
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = shutdown.cancelled() => true,
            _ = time::sleep(self.settings.reconnect_delay) => false,
        }
    }
}

impl BrokerSession<Configured> {
    pub fn configure(
        eventloop: EventLoop,
        settings: BrokerSettings,
        status: Arc<watch::Sender<LinkState>>,
        events: mpsc::Sender<BrokerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self::new(eventloop, settings, status, events, shutdown)
    }

    /// Polls until the first CONNACK and transitions to Online.
    ///
    /// A transport error, a non-zero return code or the connect timeout is
    /// reported as [`BrokerEvent::ConnectFailed`] and retried after the
    /// reconnect delay. Only cancellation gives up, straight to Closed.
    pub async fn establish(mut self) -> Result<BrokerSession<Online>, BrokerSession<Closed>> {
        let timeout = self.settings.connect_timeout;
        let shutdown = self.shutdown.clone();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => None,
                res = time::timeout(timeout, self.await_connack()) => {
                    Some(res.unwrap_or(Err(ConnectError::Timeout(timeout))))
                }
            };

            match outcome {
                Some(Ok(())) => {
                    info!("Connected to MQTT broker {}", self.settings);
                    self.set_state(LinkState::Connected);
                    self.emit(BrokerEvent::Connected);
                    return Ok(self.transition());
                }
                Some(Err(e)) if !shutdown.is_cancelled() => {
                    if attempt == 1 {
                        error!("Failed to connect to MQTT broker: {}", e);
                    } else {
                        debug!("Connect attempt {} failed: {}", attempt, e);
                    }
                    self.set_state(LinkState::Failed);
                    self.emit(BrokerEvent::ConnectFailed(e));
                    if self.wait_before_retry().await {
                        break;
                    }
                }
                _ => break,
            }
        }

        info!("Connect abandoned after disconnect request");
        self.status.send_replace(LinkState::Disconnected);
        Err(self.transition())
    }

    async fn await_connack(&mut self) -> Result<(), ConnectError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return if ack.code == ConnectReturnCode::Success {
                        Ok(())
                    } else {
                        Err(ConnectError::Rejected(ack.code))
                    };
                }
                Ok(event) => debug!("Event before CONNACK: {:?}", event),
                Err(ConnectionError::ConnectionRefused(code)) => {
                    return Err(ConnectError::Rejected(code))
                }
                Err(e) => return Err(ConnectError::Network(e.to_string())),
            }
        }
    }
}

impl BrokerSession<Online> {
    /// Receive loop. Runs until the client sends DISCONNECT, every client handle
    /// is dropped, or the session is cancelled.
    pub async fn run(mut self) -> BrokerSession<Closed> {
        let shutdown = self.shutdown.clone();

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Broker session cancelled");
                    break;
                }
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => self.on_connack(ack.code),
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = MQTTMessage::from_topic(publish.topic, publish.payload.to_vec());
                    info!(
                        "Received message: {} from topic: {}",
                        message.payload_text(),
                        message.topic()
                    );
                    self.emit(BrokerEvent::Message(message));
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!("Subscription acknowledged (pkid {})", ack.pkid)
                }
                Ok(Event::Incoming(Packet::PubComp(comp))) => {
                    debug!("Exactly-once publish completed (pkid {})", comp.pkid)
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("DISCONNECT sent, closing broker session");
                    break;
                }
                Ok(_) => {}
                Err(ConnectionError::RequestsDone) => {
                    info!("All client handles dropped, closing broker session");
                    break;
                }
                Err(ConnectionError::ConnectionRefused(code)) => {
                    self.on_connack(code);
                    if self.wait_before_retry().await {
                        break;
                    }
                }
                Err(e) => {
                    let state = *self.status.borrow();
                    if state == LinkState::Disconnected {
                        info!("Connection closed after disconnect request");
                        break;
                    }
                    self.set_state(LinkState::Reconnecting);
                    if state == LinkState::Connected {
                        warn!("Broker connection lost: {}", e);
                        self.emit(BrokerEvent::ConnectionLost(e.to_string()));
                    } else {
                        debug!("Reconnect attempt failed: {}", e);
                    }
                    if self.wait_before_retry().await {
                        break;
                    }
                }
            }
        }

        self.status.send_replace(LinkState::Disconnected);
        self.transition()
    }

    fn on_connack(&self, code: ConnectReturnCode) {
        if code == ConnectReturnCode::Success {
            info!("Reconnected to MQTT broker {}", self.settings);
            self.set_state(LinkState::Connected);
            self.emit(BrokerEvent::Connected);
        } else {
            let err = ConnectError::Rejected(code);
            warn!("Broker refused reconnect: {}", err);
            self.set_state(LinkState::Reconnecting);
            self.emit(BrokerEvent::ConnectionLost(err.to_string()));
        }
    }
}

impl BrokerSession<Closed> {
    pub fn close(self) {
        debug!("Broker session closed");
        self.emit(BrokerEvent::Closed);
    }
}

async fn drive_session(session: BrokerSession<Configured>) {
    let closed = match session.establish().await {
        Ok(online) => online.run().await,
        Err(closed) => closed,
    };
    closed.close();
}

/// Result of [`BrokerClient::connect`].
pub struct Connection {
    pub client: BrokerClient,
    pub events: mpsc::Receiver<BrokerEvent>,
    pub session: SessionHandle,
}

/// Owner-side handle of the background session task.
pub struct SessionHandle {
    task: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Waits up to `grace` for the session to finish, then cancels it.
    pub async fn close(self, grace: Duration) {
        let SessionHandle { mut task, shutdown } = self;
        match time::timeout(grace, &mut task).await {
            Ok(Ok(())) => debug!("Broker session task finished"),
            Ok(Err(e)) => error!("Broker session task failed: {}", e),
            Err(_) => {
                warn!("Broker session still running after {:?}, cancelling", grace);
                shutdown.cancel();
                task.abort();
            }
        }
    }
}

/// The single connection to the broker, as seen by its owner.
pub struct BrokerClient {
    client: AsyncClient,
    status: Arc<watch::Sender<LinkState>>,
    shutdown: CancellationToken,
    disconnected: bool,
}

impl BrokerClient {
    /// Starts connecting in the background.
    ///
    /// Only settings errors are returned here; the connect acknowledgement (or
    /// its failure) arrives later as [`BrokerEvent::Connected`] or
    /// [`BrokerEvent::ConnectFailed`]. A failed attempt is retried every
    /// reconnect delay until it succeeds or [`BrokerClient::disconnect`] is
    /// called. Must be called inside a tokio runtime.
    pub fn connect(settings: BrokerSettings) -> Result<Connection, ConnectError> {
        let options = settings.mqtt_options()?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (status, _) = watch::channel(LinkState::Connecting);
        let status = Arc::new(status);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let shutdown = CancellationToken::new();

        info!("Connecting to MQTT broker {}", settings);
        let session = BrokerSession::configure(
            eventloop,
            settings,
            status.clone(),
            event_tx,
            shutdown.clone(),
        );
        let task = tokio::spawn(drive_session(session));

        Ok(Connection {
            client: Self::from_parts(client, status, shutdown.clone()),
            events: event_rx,
            session: SessionHandle { task, shutdown },
        })
    }

    fn from_parts(
        client: AsyncClient,
        status: Arc<watch::Sender<LinkState>>,
        shutdown: CancellationToken,
    ) -> Self {
        BrokerClient {
            client,
            status,
            shutdown,
            disconnected: false,
        }
    }

    pub fn state(&self) -> LinkState {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected && self.state() == LinkState::Connected
    }

    /// Requests delivery of messages on `topic`. Re-subscribing is allowed.
    pub fn subscribe(&self, topic: &str) -> Result<(), SubscribeError> {
        if !self.is_connected() {
            return Err(SubscribeError::NotConnected);
        }
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| SubscribeError::Rejected(e.to_string()))?;
        debug!("Subscribe requested for {}", topic);
        Ok(())
    }

    /// Queues a publish without waiting for the broker.
    pub fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        self.client
            .try_publish(topic, qos, false, payload.to_vec())
            .map_err(|e| PublishError::Rejected(e.to_string()))?;
        debug!("Publish queued on {} ({:?})", topic, qos);
        Ok(())
    }

    /// Best-effort teardown. Repeated calls are no-ops.
    pub fn disconnect(&mut self) {
        if self.disconnected {
            debug!("Already disconnected");
            return;
        }
        self.disconnected = true;

        let flushed = self.state() == LinkState::Connected
            && match self.client.try_disconnect() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Could not queue DISCONNECT: {}", e);
                    false
                }
            };
        if !flushed {
            self.shutdown.cancel();
        }

        self.status.send_replace(LinkState::Disconnected);
        info!("Disconnected from MQTT broker");
    }
}

impl Publisher for BrokerClient {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError> {
        BrokerClient::publish(self, topic, payload, qos)
    }
}
