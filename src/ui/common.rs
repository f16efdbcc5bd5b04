//! # UI Common Components
//!
//! Colors, layout constants and the status model shared by the window.

use chrono::{Local, NaiveDateTime};
use eframe::egui::{Color32, Frame, Stroke};

use crate::mqtt::{BrokerEvent, LinkState};

/// Dark palette for the single-screen window.
pub struct UiColors;

impl UiColors {
    pub const MAIN_BG: Color32 = Color32::from_rgb(30, 30, 30);
    pub const EXTREME_BG: Color32 = Color32::from_rgb(20, 20, 20);
    pub const BORDER: Color32 = Color32::from_rgb(60, 60, 60);
    pub const TITLE: Color32 = Color32::WHITE;
    /// Connected status (green)
    pub const ACTIVE: Color32 = Color32::from_rgb(50, 200, 20);
    /// Disconnected or failed status (red)
    pub const INACTIVE: Color32 = Color32::from_rgb(200, 50, 20);
    /// Transitional status (amber)
    pub const PENDING: Color32 = Color32::from_rgb(220, 160, 20);
}

/// Fixed layout of the 1920x1080 reference window.
pub struct Layout;

impl Layout {
    pub const TITLE_POS: [f32; 2] = [200.0, 400.0];
    pub const TITLE_SIZE: [f32; 2] = [463.0, 150.0];
    pub const TITLE_FONT: f32 = 86.0;
    pub const BUTTON_POS: [f32; 2] = [200.0, 800.0];
    pub const BUTTON_SIZE: [f32; 2] = [463.0, 100.0];
    pub const BUTTON_FONT: f32 = 28.0;
}

pub fn link_color(state: LinkState) -> Color32 {
    match state {
        LinkState::Connected => UiColors::ACTIVE,
        LinkState::Connecting | LinkState::Reconnecting => UiColors::PENDING,
        LinkState::Disconnected | LinkState::Failed => UiColors::INACTIVE,
    }
}

pub fn status_frame() -> Frame {
    Frame::new()
        .stroke(Stroke::new(1.0, UiColors::BORDER))
        .fill(UiColors::EXTREME_BG)
        .inner_margin(4)
}

/// What the status bar shows besides the link state.
#[derive(Clone, Debug, Default)]
pub struct BrokerStatus {
    pub last_error: Option<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<NaiveDateTime>,
}

impl BrokerStatus {
    pub fn apply(&mut self, event: &BrokerEvent) {
        match event {
            BrokerEvent::Connected => self.last_error = None,
            BrokerEvent::ConnectFailed(e) => self.last_error = Some(e.to_string()),
            BrokerEvent::ConnectionLost(reason) => {
                self.last_error = Some(format!("connection lost: {}", reason))
            }
            BrokerEvent::Message(msg) => {
                self.messages_received += 1;
                self.last_activity = Some(msg.timestamp());
            }
            BrokerEvent::Closed => {}
        }
    }

    pub fn record_publish(&mut self) {
        self.messages_sent += 1;
        self.last_activity = Some(Local::now().naive_local());
    }

    pub fn report(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn summary(&self, state: LinkState) -> String {
        let mut text = format!(
            "{} | sent {} | received {}",
            state, self.messages_sent, self.messages_received
        );
        if let Some(at) = self.last_activity {
            text.push_str(&format!(" | last activity {}", at.format("%H:%M:%S")));
        }
        text
    }
}
