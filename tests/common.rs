//! Shared helpers for poisonctl integration tests.

#![allow(dead_code)]

use std::time::Duration;

use poisonctl::config::GenerationParams;
use poisonctl::core::{ControllerConfig, ControllerHandle, Event, spawn_controller};
use poisonctl::gateway::BackendClient;
use poisonctl::models::OperationMode;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_PROMPT: &str = "Write a Python function that reverses a string.";
pub const TEST_CODE: &str = "def rev(s): return s[::-1]";

/// Gateway client pointed at a mock backend.
pub fn client_for(server: &MockServer) -> BackendClient {
    BackendClient::with_base_url(server.uri(), Duration::from_secs(5))
        .expect("client should build")
}

/// Controller config with test-friendly defaults.
pub fn controller_config(mode: OperationMode, countdown_secs: u32) -> ControllerConfig {
    ControllerConfig {
        mode,
        countdown_secs,
        poison_count: 10,
        block_name: "latest_block".to_string(),
        clean_block: "clean_block".to_string(),
        generation: GenerationParams {
            prompt: TEST_PROMPT.to_string(),
            max_new_tokens: 160,
            temperature: 0.2,
            num_beams: 4,
        },
    }
}

/// Spawn a controller against a mock backend.
pub fn start_controller(
    server: &MockServer,
    mode: OperationMode,
    countdown_secs: u32,
) -> ControllerHandle {
    spawn_controller(controller_config(mode, countdown_secs), client_for(server))
}

/// Next event or panic; every await in tests is bounded.
pub async fn next_event(handle: &ControllerHandle) -> Event {
    tokio::time::timeout(Duration::from_secs(10), handle.next_event())
        .await
        .expect("timed out waiting for an event")
        .expect("controller stopped unexpectedly")
}

/// Drain events until one matches, returning it. Panics on timeout.
pub async fn wait_for(
    handle: &ControllerHandle,
    mut matches: impl FnMut(&Event) -> bool,
) -> Event {
    loop {
        let event = next_event(handle).await;
        if matches(&event) {
            return event;
        }
    }
}

/// Mount a successful direct-mode generate endpoint.
pub async fn mount_generate(server: &MockServer, code: &str) {
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "model": "test-model",
            "code": code,
        })))
        .mount(server)
        .await;
}

/// Mount a successful direct-mode poison endpoint.
pub async fn mount_poison(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/poison"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "message": "done",
        })))
        .mount(server)
        .await;
}

/// Mount a successful direct-mode revert endpoint.
pub async fn mount_revert(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/revert_poison"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "message": "Poisoned data removed and model reverted to original weights.",
        })))
        .mount(server)
        .await;
}
