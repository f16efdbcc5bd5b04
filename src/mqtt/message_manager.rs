use chrono::NaiveDateTime;
use std::fmt;

use super::error::ConnectError;

/// A message delivered by the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MQTTMessage {
    topic: String,
    payload: Vec<u8>,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} - {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.topic,
            self.payload_text()
        )
    }
}

impl MQTTMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        MQTTMessage {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Notifications the broker session pushes to its owner.
#[derive(Debug)]
pub enum BrokerEvent {
    /// CONNACK with return code 0, first connect or after a reconnect
    Connected,
    /// A connect attempt failed before CONNACK; the session retries after the
    /// reconnect delay until disconnected
    ConnectFailed(ConnectError),
    /// An established link dropped; the session keeps retrying
    ConnectionLost(String),
    Message(MQTTMessage),
    /// Session task finished
    Closed,
}
