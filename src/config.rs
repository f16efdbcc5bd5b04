//! # Application Configuration
//!
//! Loads the immutable startup configuration from a TOML file. The file carries
//! three sections:
//!
//! ```text
//! [mqtt]         broker, port, topic, key, qos, keepalive_secs, connect_timeout_secs
//! [credentials]  username, password
//! [ui]           title, width, height, start_label, stop_label, exit_label (optional)
//! ```
//!
//! The configuration is read once in `main` and never written back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const CONFIG_ENV_VAR: &str = "KEYSWITCH_CONFIG";
const LOCAL_CONFIG_FILE: &str = "conf.toml";
const CONFIG_DIR: &str = "keyswitch";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

/// Broker connection and activation message settings.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttSection {
    /// Broker hostname or IP
    pub broker: String,
    pub port: u16,
    /// Topic the activation key is published to and subscribed on
    pub topic: String,
    /// Payload of every activation publish
    pub key: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CredentialsSection {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for CredentialsSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsSection")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Window appearance and the three button labels.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct UiSection {
    pub title: String,
    pub width: f32,
    pub height: f32,
    pub start_label: String,
    pub stop_label: String,
    pub exit_label: String,
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            title: "Keyswitch".to_string(),
            width: 1920.0,
            height: 1080.0,
            start_label: "start".to_string(),
            stop_label: "stop".to_string(),
            exit_label: "exit".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub ui: UiSection,
}

fn default_qos() -> u8 {
    2
}

fn default_keepalive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

impl AppConfig {
    /// Resolves the config file location.
    ///
    /// `KEYSWITCH_CONFIG` wins, then `conf.toml` in the working directory,
    /// then `<config dir>/keyswitch/conf.toml`.
    pub fn locate() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            debug!("Using config path from {}", CONFIG_ENV_VAR);
            return Ok(PathBuf::from(path));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Ok(local);
        }

        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(LOCAL_CONFIG_FILE);
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mqtt = &self.mqtt;

        if mqtt.broker.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.broker must not be empty".into()));
        }
        if mqtt.port == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.port must be between 1 and 65535".into(),
            ));
        }
        if mqtt.topic.is_empty() {
            return Err(ConfigError::Invalid("mqtt.topic must not be empty".into()));
        }
        if mqtt.topic.contains(['+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "mqtt.topic '{}' must not contain wildcards",
                mqtt.topic
            )));
        }
        if mqtt.key.is_empty() {
            return Err(ConfigError::Invalid("mqtt.key must not be empty".into()));
        }
        if mqtt.qos > 2 {
            return Err(ConfigError::Invalid(format!(
                "mqtt.qos must be 0, 1 or 2, got {}",
                mqtt.qos
            )));
        }
        if mqtt.keepalive_secs == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.keepalive_secs must be at least 1".into(),
            ));
        }
        if mqtt.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.connect_timeout_secs must be at least 1".into(),
            ));
        }
        if self.ui.width <= 0.0 || self.ui.height <= 0.0 {
            return Err(ConfigError::Invalid(
                "ui.width and ui.height must be positive".into(),
            ));
        }

        Ok(())
    }
}
