//! # MQTT Integration Module
//!
//! Owns the one connection this station keeps to its broker. The connection is
//! used for a single purpose: publishing the activation key when the operator
//! presses the button, plus an informational subscription on the same topic.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings, fixed client id, rumqttc options
//! ├── error.rs            - Connect, subscribe and publish errors
//! ├── message_manager.rs  - Inbound messages and session notifications
//! └── mqtt_handler.rs     - Session state machine and the client handle
//! ```
//!
//! ## Threading
//!
//! The rumqttc event loop runs on a tokio task. Everything the UI calls on
//! [`BrokerClient`] is non-blocking: requests are queued into the client's
//! request channel and the session task flushes them to the broker. Quality of
//! service retransmission is left to the protocol layer.
//!
//! ## Seam
//!
//! The [`Publisher`] trait is the only thing the publish controller knows about
//! the broker, which keeps the controller independent of the network.

pub mod config;
pub mod error;
pub mod message_manager;
pub mod mqtt_handler;

pub use error::{ConnectError, PublishError, SubscribeError};
pub use message_manager::{BrokerEvent, MQTTMessage};
pub use mqtt_handler::{BrokerClient, Connection, LinkState, SessionHandle};
pub use rumqttc::QoS;

/// Something that can queue a publish to the broker.
///
/// Implementations must return promptly and refuse to publish while the link
/// is down.
pub trait Publisher {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError>;
}
