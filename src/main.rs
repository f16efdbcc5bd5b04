pub mod config;
pub mod controller;
pub mod mqtt;
pub mod ui;

use crate::config::AppConfig;
use crate::controller::{ActivationCommand, ButtonLabels, PublishController};
use crate::mqtt::config::BrokerSettings;
use crate::mqtt::{BrokerClient, Connection};
use crate::ui::KeyswitchUI;
use color_eyre::{eyre::eyre, Result};
use eframe::egui;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// How long the session may take to flush DISCONNECT after the window closes.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = AppConfig::locate()?;
    let config = AppConfig::load(&config_path)?;

    let Connection {
        client,
        events,
        session,
    } = BrokerClient::connect(BrokerSettings::from_config(&config))
        .map_err(|e| eyre!("Failed to start broker connection: {}", e))?;

    let controller = PublishController::new(
        client,
        ActivationCommand::from_config(&config),
        ButtonLabels::from_config(&config),
    );
    let topic = config.mqtt.topic.clone();
    let title = config.ui.title.clone();

    info!("Starting UI");
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title.clone())
            .with_inner_size([config.ui.width, config.ui.height])
            .with_decorations(false)
            .with_resizable(false),
        centered: true,
        ..Default::default()
    };

    eframe::run_native(
        "Keyswitch",
        native_options,
        Box::new(move |cc| Ok(Box::new(KeyswitchUI::new(cc, controller, events, topic, title)))),
    )
    .map_err(|e| eyre!("UI terminated with error: {}", e))?;

    session.close(SHUTDOWN_GRACE).await;
    info!("Shutdown complete");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
