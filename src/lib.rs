//! poisonctl: command-line control surface for a model data-poisoning lab
//! backend.
//!
//! The backend generates code, deliberately corrupts its own training data
//! on request, reverts that corruption, and compares poisoned output with a
//! clean reference. This crate supplies the client-side workflow: a guarded
//! state machine that puts the destructive poison call behind a mandatory
//! countdown, tracks outcomes, and exposes the compensating revert.

pub mod config;
pub mod core;
pub mod gateway;
pub mod logging;
pub mod models;
