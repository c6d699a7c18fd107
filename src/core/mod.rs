//! Workflow controller core.
//!
//! The controller owns the single workflow state machine, mediates between
//! the countdown gate and the HTTP gateway, and talks to the presentation
//! layer through intent/event channels.

pub mod controller;
pub mod countdown;
pub mod event;
pub mod intent;
pub mod session;
pub mod state;

pub use controller::{Controller, ControllerConfig, ControllerHandle, spawn_controller};
pub use countdown::CountdownGate;
pub use event::Event;
pub use intent::Intent;
pub use session::Session;
pub use state::WorkflowState;
