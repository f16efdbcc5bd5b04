//! Button-driven activation sequence
//!
//! [`publish_controller`] turns the operator's three button presses into two
//! broker publishes and a final exit signal:
//!
//! ```text
//! press ──► PublishController ──► Publisher::publish
//!                 │
//!                 └──► Step (new label | terminate) ──► UI
//! ```

pub mod publish_controller;

pub use publish_controller::{
    ActivationCommand, ButtonLabels, ControllerState, PublishController, Step,
};
