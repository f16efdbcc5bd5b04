//! Error types for the broker client

use rumqttc::ConnectReturnCode;
use std::time::Duration;
use thiserror::Error;

/// Failure of a connect attempt.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Settings cannot be turned into a connection (empty host, port 0, ...)
    #[error("invalid broker settings: {0}")]
    InvalidSettings(String),

    /// Transport failed before a CONNACK arrived
    #[error("network error: {0}")]
    Network(String),

    /// Broker answered the CONNECT with a non-zero return code
    #[error("broker refused connection (code {code}): {0:?}", code = return_code_value(.0))]
    Rejected(ConnectReturnCode),

    /// No CONNACK within the configured timeout
    #[error("no connect acknowledgement after {0:?}")]
    Timeout(Duration),
}

impl ConnectError {
    /// Numeric CONNACK code, if the broker answered at all.
    pub fn return_code(&self) -> Option<u8> {
        match self {
            ConnectError::Rejected(code) => Some(return_code_value(code)),
            _ => None,
        }
    }

    /// Whether the broker rejected the supplied credentials.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            ConnectError::Rejected(
                ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized
            )
        )
    }
}

/// Wire value of an MQTT 3.1.1 CONNACK return code.
pub fn return_code_value(code: &ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("subscribe request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("publish request rejected: {0}")]
    Rejected(String),
}
