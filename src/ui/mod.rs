//! # Keyswitch User Interface
//!
//! One frameless window with a title and a single button. The button drives
//! the [`PublishController`]; everything the broker session reports is drained
//! from its event channel once per frame and shown in a status bar at the
//! bottom of the window.
//!
//! ## Frame Processing
//!
//! Requests a repaint every 33ms so broker events are picked up even when the
//! operator is not moving the mouse. Nothing in `update` blocks: publishing
//! only queues a request for the session task.

pub mod common;

use eframe::egui::{self, pos2, vec2, Button, CentralPanel, Frame, Label, Rect, RichText};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::controller::{PublishController, Step};
use crate::mqtt::{BrokerClient, BrokerEvent};

use self::common::{link_color, status_frame, BrokerStatus, Layout, UiColors};

pub struct KeyswitchUI {
    /// Button state machine, owns the broker handle
    controller: PublishController<BrokerClient>,

    /// Notifications from the broker session task
    events: mpsc::Receiver<BrokerEvent>,

    status: BrokerStatus,

    /// Topic subscribed after every connect acknowledgement
    topic: String,

    title: String,
}

impl KeyswitchUI {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        controller: PublishController<BrokerClient>,
        events: mpsc::Receiver<BrokerEvent>,
        topic: String,
        title: String,
    ) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);
        KeyswitchUI {
            controller,
            events,
            status: BrokerStatus::default(),
            topic,
            title,
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.status.apply(&event);
            match event {
                BrokerEvent::Connected => {
                    if let Err(e) = self.controller.publisher().subscribe(&self.topic) {
                        warn!("Subscribe to {} failed: {}", self.topic, e);
                        self.status.report(format!("subscribe failed: {}", e));
                    }
                }
                BrokerEvent::ConnectFailed(e) => warn!("Broker unavailable, retrying: {}", e),
                BrokerEvent::Message(msg) => debug!("Inbound: {}", msg),
                BrokerEvent::ConnectionLost(_) | BrokerEvent::Closed => {}
            }
        }
    }

    fn on_press(&mut self, ctx: &egui::Context) {
        match self.controller.activate() {
            Ok(Step::Relabel(label)) => {
                self.status.record_publish();
                debug!("Button now reads '{}'", label);
            }
            Ok(Step::Terminate) => {
                info!("Closing window");
                self.controller.publisher_mut().disconnect();
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
            Err(e) => {
                error!("Activation failed: {}", e);
                self.status.report(format!("publish failed: {}", e));
            }
        }
    }

    fn status_bar(&self, ui: &mut egui::Ui) {
        let state = self.controller.publisher().state();
        status_frame().show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.colored_label(link_color(state), "●");
                ui.label(self.status.summary(state));
                if let Some(err) = &self.status.last_error {
                    ui.colored_label(UiColors::INACTIVE, err);
                }
            });
        });
    }
}

impl eframe::App for KeyswitchUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        ctx.request_repaint_after(Duration::from_millis(33));

        egui::TopBottomPanel::bottom("status_panel")
            .show_separator_line(false)
            .frame(Frame::new().fill(UiColors::MAIN_BG))
            .show(ctx, |ui| self.status_bar(ui));

        CentralPanel::default()
            .frame(Frame::new().fill(UiColors::MAIN_BG))
            .show(ctx, |ui| {
                let title_rect = Rect::from_min_size(
                    pos2(Layout::TITLE_POS[0], Layout::TITLE_POS[1]),
                    vec2(Layout::TITLE_SIZE[0], Layout::TITLE_SIZE[1]),
                );
                ui.put(
                    title_rect,
                    Label::new(
                        RichText::new(&self.title)
                            .size(Layout::TITLE_FONT)
                            .color(UiColors::TITLE),
                    ),
                );

                let button_rect = Rect::from_min_size(
                    pos2(Layout::BUTTON_POS[0], Layout::BUTTON_POS[1]),
                    vec2(Layout::BUTTON_SIZE[0], Layout::BUTTON_SIZE[1]),
                );
                let button = Button::new(
                    RichText::new(self.controller.label()).size(Layout::BUTTON_FONT),
                );
                if ui.put(button_rect, button).clicked() {
                    self.on_press(ctx);
                }
            });
    }
}
