use std::fmt;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::mqtt::{PublishError, Publisher, QoS};

/// Position of the button sequence. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Idle,
    Activated,
    Completed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The message both activations publish.
#[derive(Clone, PartialEq, Eq)]
pub struct ActivationCommand {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl fmt::Debug for ActivationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationCommand")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .field("qos", &self.qos)
            .finish()
    }
}

impl ActivationCommand {
    pub fn from_config(config: &AppConfig) -> Self {
        ActivationCommand {
            topic: config.mqtt.topic.clone(),
            payload: config.mqtt.key.clone().into_bytes(),
            qos: qos_from_level(config.mqtt.qos),
        }
    }
}

/// Out-of-range levels fall back to exactly-once.
fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Button text for each state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonLabels {
    pub start: String,
    pub stop: String,
    pub exit: String,
}

impl Default for ButtonLabels {
    fn default() -> Self {
        Self {
            start: "start".to_string(),
            stop: "stop".to_string(),
            exit: "exit".to_string(),
        }
    }
}

impl ButtonLabels {
    pub fn from_config(config: &AppConfig) -> Self {
        ButtonLabels {
            start: config.ui.start_label.clone(),
            stop: config.ui.stop_label.clone(),
            exit: config.ui.exit_label.clone(),
        }
    }
}

/// What the UI should do after an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Relabel(String),
    Terminate,
}

/// Maps button presses to broker publishes.
///
/// ```text
/// Idle ──publish──► Activated ──publish──► Completed ──► Terminate
/// ```
///
/// A failed publish leaves the state where it was so the same press can be
/// retried.
pub struct PublishController<P: Publisher> {
    publisher: P,
    command: ActivationCommand,
    labels: ButtonLabels,
    state: ControllerState,
}

impl<P: Publisher> PublishController<P> {
    pub fn new(publisher: P, command: ActivationCommand, labels: ButtonLabels) -> Self {
        debug!("Publish controller ready: {:?}", command);
        PublishController {
            publisher,
            command,
            labels,
            state: ControllerState::Idle,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn label(&self) -> &str {
        match self.state {
            ControllerState::Idle => &self.labels.start,
            ControllerState::Activated => &self.labels.stop,
            ControllerState::Completed => &self.labels.exit,
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    pub fn activate(&mut self) -> Result<Step, PublishError> {
        let next = match self.state {
            ControllerState::Idle => ControllerState::Activated,
            ControllerState::Activated => ControllerState::Completed,
            ControllerState::Completed => {
                info!("Activation sequence complete, terminating");
                return Ok(Step::Terminate);
            }
        };

        if let Err(e) = self.publisher.publish(
            &self.command.topic,
            &self.command.payload,
            self.command.qos,
        ) {
            warn!("Activation publish failed in state {}: {}", self.state, e);
            return Err(e);
        }

        info!("Activation published on {}: {} -> {}", self.command.topic, self.state, next);
        self.state = next;
        Ok(Step::Relabel(self.label().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingPublisher {
        connected: Cell<bool>,
        calls: RefCell<Vec<(String, Vec<u8>, QoS)>>,
    }

    impl RecordingPublisher {
        fn connected() -> Self {
            let publisher = Self::default();
            publisher.connected.set(true);
            publisher
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), PublishError> {
            if !self.connected.get() {
                return Err(PublishError::NotConnected);
            }
            self.calls
                .borrow_mut()
                .push((topic.to_string(), payload.to_vec(), qos));
            Ok(())
        }
    }

    fn command() -> ActivationCommand {
        ActivationCommand {
            topic: "cmd/activate".into(),
            payload: b"SECRET123".to_vec(),
            qos: QoS::ExactlyOnce,
        }
    }

    fn controller(publisher: RecordingPublisher) -> PublishController<RecordingPublisher> {
        PublishController::new(publisher, command(), ButtonLabels::default())
    }

    #[test]
    fn test_full_sequence_publishes_twice_then_terminates() {
        let mut ctl = controller(RecordingPublisher::connected());
        assert_eq!(ctl.label(), "start");

        assert_eq!(ctl.activate(), Ok(Step::Relabel("stop".into())));
        assert_eq!(ctl.state(), ControllerState::Activated);

        assert_eq!(ctl.activate(), Ok(Step::Relabel("exit".into())));
        assert_eq!(ctl.state(), ControllerState::Completed);

        assert_eq!(ctl.activate(), Ok(Step::Terminate));

        let expected = (
            "cmd/activate".to_string(),
            b"SECRET123".to_vec(),
            QoS::ExactlyOnce,
        );
        assert_eq!(
            *ctl.publisher().calls.borrow(),
            vec![expected.clone(), expected]
        );
    }

    #[test]
    fn test_terminal_press_publishes_nothing() {
        let mut ctl = controller(RecordingPublisher::connected());
        ctl.activate().unwrap();
        ctl.activate().unwrap();
        let before = ctl.publisher().calls.borrow().len();

        assert_eq!(ctl.activate(), Ok(Step::Terminate));
        assert_eq!(ctl.activate(), Ok(Step::Terminate));
        assert_eq!(ctl.publisher().calls.borrow().len(), before);
        assert_eq!(ctl.state(), ControllerState::Completed);
    }

    #[test]
    fn test_failed_publish_keeps_idle() {
        let mut ctl = controller(RecordingPublisher::default());

        assert_eq!(ctl.activate(), Err(PublishError::NotConnected));
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert_eq!(ctl.label(), "start");
        assert!(ctl.publisher().calls.borrow().is_empty());
    }

    #[test]
    fn test_retry_after_failure_advances() {
        let mut ctl = controller(RecordingPublisher::default());
        assert!(ctl.activate().is_err());

        ctl.publisher().connected.set(true);
        assert_eq!(ctl.activate(), Ok(Step::Relabel("stop".into())));
        assert_eq!(ctl.publisher().calls.borrow().len(), 1);
    }

    #[test]
    fn test_failure_in_activated_state_does_not_advance() {
        let mut ctl = controller(RecordingPublisher::connected());
        ctl.activate().unwrap();

        ctl.publisher().connected.set(false);
        assert!(ctl.activate().is_err());
        assert_eq!(ctl.state(), ControllerState::Activated);
        assert_eq!(ctl.label(), "stop");
    }

    #[test]
    fn test_custom_labels() {
        let labels = ButtonLabels {
            start: "启动".into(),
            stop: "关闭".into(),
            exit: "退出".into(),
        };
        let mut ctl = PublishController::new(RecordingPublisher::connected(), command(), labels);

        assert_eq!(ctl.label(), "启动");
        assert_eq!(ctl.activate(), Ok(Step::Relabel("关闭".into())));
        assert_eq!(ctl.activate(), Ok(Step::Relabel("退出".into())));
    }

    #[test]
    fn test_command_from_config() {
        let config = AppConfig::from_toml_str(
            r#"
            [mqtt]
            broker = "broker.local"
            port = 1883
            topic = "cmd/activate"
            key = "SECRET123"
        "#,
        )
        .unwrap();

        let cmd = ActivationCommand::from_config(&config);
        assert_eq!(cmd.topic, "cmd/activate");
        assert_eq!(cmd.payload, b"SECRET123");
        assert_eq!(cmd.qos, QoS::ExactlyOnce);
        assert!(!format!("{:?}", cmd).contains("SECRET123"));
        assert_eq!(ButtonLabels::from_config(&config), ButtonLabels::default());
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_controller_idle() {
        use crate::mqtt::config::{BrokerSettings, RECONNECT_DELAY};
        use crate::mqtt::{BrokerClient, BrokerEvent};
        use std::time::Duration;

        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let settings = BrokerSettings {
            address: "127.0.0.1".into(),
            port,
            username: String::new(),
            password: String::new(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: RECONNECT_DELAY,
        };
        let mut conn = BrokerClient::connect(settings).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(10), conn.events.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(BrokerEvent::ConnectFailed(_))));

        let mut ctl = PublishController::new(conn.client, command(), ButtonLabels::default());
        assert_eq!(ctl.activate(), Err(PublishError::NotConnected));
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert_eq!(ctl.label(), "start");
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2), QoS::ExactlyOnce);
        assert_eq!(qos_from_level(7), QoS::ExactlyOnce);
    }
}
