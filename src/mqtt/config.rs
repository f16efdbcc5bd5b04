use crate::config::AppConfig;
use rumqttc::MqttOptions;
use std::fmt;
use std::time::Duration;

use super::error::ConnectError;

/// Fixed client identifier this station announces to the broker.
pub const CLIENT_ID: &str = "windows";

/// Pause between reconnect attempts after an established link drops.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Request channel capacity between the client handle and the event loop.
pub const REQUEST_CAPACITY: usize = 100;

#[derive(Clone, PartialEq)]
pub struct BrokerSettings {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.address, self.port)
    }
}

impl BrokerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        BrokerSettings {
            address: config.mqtt.broker.clone(),
            port: config.mqtt.port,
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
            keep_alive: Duration::from_secs(config.mqtt.keepalive_secs),
            connect_timeout: Duration::from_secs(config.mqtt.connect_timeout_secs),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Builds the rumqttc options, rejecting settings it would panic on.
    pub fn mqtt_options(&self) -> Result<MqttOptions, ConnectError> {
        if self.address.trim().is_empty() {
            return Err(ConnectError::InvalidSettings(
                "broker address is empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConnectError::InvalidSettings("broker port is 0".into()));
        }
        if self.keep_alive < Duration::from_secs(1) {
            return Err(ConnectError::InvalidSettings(
                "keepalive must be at least one second".into(),
            ));
        }

        let mut options = MqttOptions::new(CLIENT_ID, self.address.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        if !self.username.is_empty() {
            options.set_credentials(self.username.clone(), self.password.clone());
        }
        Ok(options)
    }
}
