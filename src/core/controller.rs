//! Guarded operation workflow controller.
//!
//! Runs as a background task, receiving user intents and countdown ticks
//! over channels and emitting events back to the presentation layer. A
//! dispatched remote call is held as a single pending task while the loop
//! keeps serving intents, so at most one destructive or comparative
//! operation is ever in flight and a second request during that window is
//! rejected rather than queued. In-flight calls are never aborted; the
//! backend operation runs to completion whether or not anyone is watching.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{RwLock, mpsc};
use tokio::task::{JoinError, JoinHandle};

use crate::config::{Config, GenerationParams};
use crate::gateway::{BackendClient, GenerateOutcome};
use crate::logging;
use crate::models::{CompareReport, CompareRequest, OperationMode, OperationOutcome};

use super::countdown::CountdownGate;
use super::event::Event;
use super::intent::Intent;
use super::session::Session;
use super::state::WorkflowState;

// === Types ===

/// Controller configuration resolved from the CLI config.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Endpoint family for this session.
    pub mode: OperationMode,
    /// Seconds the poison confirmation countdown runs.
    pub countdown_secs: u32,
    /// Initial TPI count for poison requests.
    pub poison_count: u32,
    /// Ledger block name for generate/poison in ledger mode.
    pub block_name: String,
    /// Known-clean block name, the ledger revert target.
    pub clean_block: String,
    /// Generation parameter defaults.
    pub generation: GenerationParams,
}

impl ControllerConfig {
    /// Build from resolved CLI configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.operation_mode(),
            countdown_secs: config.countdown_secs(),
            poison_count: config.poison_count(),
            block_name: config.ledger_block(),
            clean_block: config.clean_block(),
            generation: config.generation_params(),
        }
    }
}

/// Handle to communicate with the controller.
#[derive(Clone)]
pub struct ControllerHandle {
    /// Send intents to the controller.
    pub tx_intent: mpsc::Sender<Intent>,
    /// Receive events from the controller.
    pub rx_event: Arc<RwLock<mpsc::Receiver<Event>>>,
}

impl ControllerHandle {
    /// Send an intent to the controller.
    pub async fn send(&self, intent: Intent) -> Result<()> {
        self.tx_intent.send(intent).await?;
        Ok(())
    }

    /// Receive the next event, if the controller is still running.
    pub async fn next_event(&self) -> Option<Event> {
        self.rx_event.write().await.recv().await
    }
}

/// Resolution of the single pending remote call.
enum OpResolution {
    Generate(GenerateOutcome),
    Poison(OperationOutcome),
    Revert(OperationOutcome),
    Compare(CompareReport),
}

// === Controller ===

/// The workflow state machine engine.
pub struct Controller {
    countdown_secs: u32,
    client: BackendClient,
    session: Session,
    state: WorkflowState,
    gate: CountdownGate,
    pending: Option<JoinHandle<OpResolution>>,
    rx_intent: mpsc::Receiver<Intent>,
    rx_tick: mpsc::Receiver<()>,
    tx_event: mpsc::Sender<Event>,
}

impl Controller {
    /// Create a controller and its handle.
    pub fn new(config: ControllerConfig, client: BackendClient) -> (Self, ControllerHandle) {
        let (tx_intent, rx_intent) = mpsc::channel(32);
        let (tx_event, rx_event) = mpsc::channel(256);
        let (tx_tick, rx_tick) = mpsc::channel(32);

        let session = Session::new(
            config.generation,
            config.mode,
            config.poison_count,
            config.block_name,
            config.clean_block,
        );

        let controller = Controller {
            countdown_secs: config.countdown_secs,
            client,
            session,
            state: WorkflowState::Idle,
            gate: CountdownGate::new(tx_tick),
            pending: None,
            rx_intent,
            rx_tick,
            tx_event,
        };

        let handle = ControllerHandle {
            tx_intent,
            rx_event: Arc::new(RwLock::new(rx_event)),
        };

        (controller, handle)
    }

    /// Run the controller event loop until shutdown.
    pub async fn run(mut self) {
        loop {
            if let Some(mut pending) = self.pending.take() {
                tokio::select! {
                    result = &mut pending => {
                        self.resolve(result).await;
                    }
                    maybe_intent = self.rx_intent.recv() => {
                        self.pending = Some(pending);
                        match maybe_intent {
                            // Shutdown does not abort the call; the backend
                            // operation runs to completion unobserved.
                            Some(Intent::Shutdown) | None => break,
                            Some(intent) => self.handle_intent(intent).await,
                        }
                    }
                    Some(()) = self.rx_tick.recv() => {
                        self.pending = Some(pending);
                        self.handle_tick().await;
                    }
                }
            } else {
                tokio::select! {
                    maybe_intent = self.rx_intent.recv() => {
                        match maybe_intent {
                            Some(Intent::Shutdown) | None => break,
                            Some(intent) => self.handle_intent(intent).await,
                        }
                    }
                    Some(()) = self.rx_tick.recv() => {
                        self.handle_tick().await;
                    }
                }
            }
        }
        logging::info("Workflow controller shut down");
    }

    async fn emit(&self, event: Event) {
        let _ = self.tx_event.send(event).await;
    }

    async fn reject(&self, reason: impl Into<String>) {
        let reason = reason.into();
        logging::info(format!(
            "Rejected intent in state {}: {reason}",
            self.state.label()
        ));
        self.emit(Event::rejected(reason)).await;
    }

    async fn handle_intent(&mut self, intent: Intent) {
        if self.pending.is_some() && intent.starts_operation() {
            self.reject(format!(
                "An operation is already in flight ({})",
                self.state.label()
            ))
            .await;
            return;
        }

        match intent {
            Intent::SubmitGenerate { prompt } => self.handle_generate(prompt).await,
            Intent::SetPrompt { prompt } => {
                self.session.prompt = prompt;
            }
            Intent::SetMaxNewTokens { value } => self.session.set_max_new_tokens(value),
            Intent::SetTemperature { value } => self.session.set_temperature(value),
            Intent::SetNumBeams { value } => self.session.set_num_beams(value),
            Intent::SetPoisonCount { requested } => {
                let count = self.session.set_poison_count(requested);
                self.emit(Event::PoisonCountSet { count }).await;
            }
            Intent::SetBlockRef { name } => {
                self.session.block_name = name.clone();
                self.emit(Event::BlockRefSet { name }).await;
            }
            Intent::SetMode { mode } => self.handle_set_mode(mode).await,
            Intent::RequestPoison => self.handle_request_poison().await,
            Intent::ConfirmPoison => self.handle_confirm_poison().await,
            Intent::CancelPoison => self.handle_cancel_poison().await,
            Intent::PauseCountdown => self.handle_pause().await,
            Intent::ResumeCountdown => self.handle_resume().await,
            Intent::RequestRevert => self.handle_request_revert().await,
            Intent::ConfirmRevert => self.handle_confirm_revert().await,
            Intent::CancelRevert => self.handle_cancel_revert().await,
            Intent::RequestCompare => self.handle_request_compare().await,
            Intent::AcknowledgeCompare => self.handle_acknowledge_compare().await,
            Intent::CancelCompare => self.handle_cancel_compare().await,
            Intent::Shutdown => unreachable!("Shutdown is handled in run()"),
        }
    }

    /// Apply the resolution of the pending remote call.
    async fn resolve(&mut self, result: Result<OpResolution, JoinError>) {
        match result {
            Ok(OpResolution::Generate(result)) => self.finish_generate(result).await,
            Ok(OpResolution::Poison(outcome)) => self.finish_poison(outcome).await,
            Ok(OpResolution::Revert(outcome)) => self.finish_revert(outcome).await,
            Ok(OpResolution::Compare(report)) => self.finish_compare(report).await,
            Err(err) => {
                // The call task itself died; route to the matching failed
                // terminal, never leave an in-flight state dangling.
                let outcome = OperationOutcome::failure(format!("Operation task failed: {err}"));
                match self.state {
                    WorkflowState::Poisoning => self.finish_poison(outcome).await,
                    WorkflowState::Reverting => self.finish_revert(outcome).await,
                    WorkflowState::Comparing => {
                        self.finish_compare(CompareReport {
                            ok: false,
                            is_correct: false,
                            clean_output: String::new(),
                            message: outcome.message,
                        })
                        .await;
                    }
                    _ => {
                        self.finish_generate(GenerateOutcome {
                            outcome,
                            code: None,
                        })
                        .await;
                    }
                }
            }
        }
    }

    // === Generation ===

    async fn handle_generate(&mut self, prompt: Option<String>) {
        if !matches!(
            self.state,
            WorkflowState::Idle | WorkflowState::Generated { .. }
        ) {
            self.reject(format!(
                "Generation is only available before poisoning (state: {})",
                self.state.label()
            ))
            .await;
            return;
        }

        if let Some(prompt) = prompt {
            self.session.prompt = prompt;
        }
        if self.session.prompt.trim().is_empty() {
            self.reject("Prompt is empty").await;
            return;
        }

        self.emit(Event::GenerationStarted).await;
        let client = self.client.clone();
        let mode = self.session.mode;
        let request = self.session.generate_request();
        self.pending = Some(tokio::spawn(async move {
            OpResolution::Generate(client.generate(mode, &request).await)
        }));
    }

    async fn finish_generate(&mut self, result: GenerateOutcome) {
        if result.outcome.ok {
            let code = result.code.unwrap_or_default();
            self.session.code = Some(code.clone());
            if let Some(block) = &result.outcome.block {
                self.session.last_block = Some(block.clone());
            }
            self.state = WorkflowState::Generated { code: code.clone() };
            self.emit(Event::GenerationFinished {
                outcome: result.outcome,
                code: Some(code),
            })
            .await;
        } else {
            // Failed generation clears any stale code.
            self.session.code = None;
            self.state = WorkflowState::Idle;
            self.emit(Event::GenerationFinished {
                outcome: result.outcome,
                code: None,
            })
            .await;
        }
    }

    // === Poison flow ===

    async fn handle_request_poison(&mut self) {
        if !self.state.can_request_poison(self.session.has_code()) {
            let reason = if self.session.has_code() {
                format!("Cannot open poison dialog while {}", self.state.label())
            } else {
                "Generate code before poisoning".to_string()
            };
            self.reject(reason).await;
            return;
        }

        let resume = Box::new(self.state.clone());
        self.gate.open(self.countdown_secs);
        self.state = WorkflowState::ConfirmingPoison {
            remaining: self.gate.remaining(),
            can_confirm: self.gate.can_confirm(),
            resume,
        };
        self.emit(Event::PoisonConfirmationOpened {
            countdown_secs: self.countdown_secs,
            count: self.session.poison_count(),
        })
        .await;
    }

    async fn handle_tick(&mut self) {
        if !matches!(self.state, WorkflowState::ConfirmingPoison { .. }) {
            // Tick from a ticker cancelled after the dialog went away.
            return;
        }
        let remaining = self.gate.tick();
        let can_confirm = self.gate.can_confirm();
        if let WorkflowState::ConfirmingPoison {
            remaining: r,
            can_confirm: c,
            ..
        } = &mut self.state
        {
            *r = remaining;
            *c = can_confirm;
        }
        self.emit(Event::CountdownTick {
            remaining,
            can_confirm,
        })
        .await;
    }

    async fn handle_confirm_poison(&mut self) {
        match &self.state {
            WorkflowState::ConfirmingPoison { .. } if self.gate.can_confirm() => {}
            WorkflowState::ConfirmingPoison { remaining, .. } => {
                let remaining = *remaining;
                self.reject(format!("Countdown still running ({remaining}s left)"))
                    .await;
                return;
            }
            _ => {
                self.reject("No poison confirmation is open").await;
                return;
            }
        }

        self.gate.close();
        self.state = WorkflowState::Poisoning;
        self.emit(Event::PoisonStarted).await;

        let client = self.client.clone();
        let mode = self.session.mode;
        let request = self.session.poison_request();
        self.pending = Some(tokio::spawn(async move {
            OpResolution::Poison(client.poison(mode, &request).await)
        }));
    }

    async fn finish_poison(&mut self, outcome: OperationOutcome) {
        if let Some(block) = &outcome.block {
            self.session.last_block = Some(block.clone());
        }
        let revert_available = outcome.ok;
        self.session.unreverted_poison = revert_available;
        self.state = WorkflowState::Poisoned {
            outcome: outcome.clone(),
            revert_available,
        };
        self.emit(Event::PoisonFinished {
            outcome,
            revert_available,
        })
        .await;
    }

    async fn handle_cancel_poison(&mut self) {
        if let WorkflowState::ConfirmingPoison { resume, .. } = &self.state {
            let resume = resume.clone();
            self.gate.close();
            self.state = *resume;
            self.emit(Event::ConfirmationClosed).await;
        } else {
            self.reject("No poison confirmation is open").await;
        }
    }

    async fn handle_pause(&mut self) {
        if matches!(self.state, WorkflowState::ConfirmingPoison { .. }) && !self.gate.is_paused() {
            self.gate.pause();
            self.emit(Event::CountdownPaused {
                remaining: self.gate.remaining(),
            })
            .await;
        } else {
            self.reject("No running countdown to pause").await;
        }
    }

    async fn handle_resume(&mut self) {
        if matches!(self.state, WorkflowState::ConfirmingPoison { .. }) && self.gate.is_paused() {
            self.gate.resume();
            self.emit(Event::CountdownResumed {
                remaining: self.gate.remaining(),
            })
            .await;
        } else {
            self.reject("No paused countdown to resume").await;
        }
    }

    // === Revert flow ===

    async fn handle_request_revert(&mut self) {
        if !self.state.can_request_revert(self.session.unreverted_poison) {
            self.reject("Nothing to revert").await;
            return;
        }
        let resume = Box::new(self.state.clone());
        self.state = WorkflowState::ConfirmingRevert { resume };
        self.emit(Event::RevertConfirmationOpened).await;
    }

    async fn handle_confirm_revert(&mut self) {
        if !matches!(self.state, WorkflowState::ConfirmingRevert { .. }) {
            self.reject("No revert confirmation is open").await;
            return;
        }

        self.state = WorkflowState::Reverting;
        self.emit(Event::RevertStarted).await;

        let client = self.client.clone();
        let mode = self.session.mode;
        let request = self.session.revert_request();
        self.pending = Some(tokio::spawn(async move {
            OpResolution::Revert(client.revert(mode, &request).await)
        }));
    }

    async fn finish_revert(&mut self, outcome: OperationOutcome) {
        // A failed revert leaves the poison in place and is retried by
        // re-requesting from Reverted; only success clears the flag.
        if outcome.ok {
            self.session.unreverted_poison = false;
        }
        self.state = WorkflowState::Reverted {
            outcome: outcome.clone(),
        };
        self.emit(Event::RevertFinished { outcome }).await;
    }

    async fn handle_cancel_revert(&mut self) {
        if let WorkflowState::ConfirmingRevert { resume } = &self.state {
            let resume = resume.clone();
            self.state = *resume;
            self.emit(Event::ConfirmationClosed).await;
        } else {
            self.reject("No revert confirmation is open").await;
        }
    }

    // === Compare flow ===

    async fn handle_request_compare(&mut self) {
        if !self
            .state
            .can_request_compare(self.session.has_code(), self.session.unreverted_poison)
        {
            self.reject("Compare requires a successful poison and generated code")
                .await;
            return;
        }
        let resume = Box::new(self.state.clone());
        self.state = WorkflowState::ConfirmingCompare { resume };
        self.emit(Event::CompareAckOpened).await;
    }

    async fn handle_acknowledge_compare(&mut self) {
        if !matches!(self.state, WorkflowState::ConfirmingCompare { .. }) {
            self.reject("No compare acknowledgment is open").await;
            return;
        }

        self.state = WorkflowState::Comparing;
        self.emit(Event::CompareStarted).await;

        let client = self.client.clone();
        let request = CompareRequest {
            prompt: self.session.prompt.clone(),
        };
        self.pending = Some(tokio::spawn(async move {
            OpResolution::Compare(client.compare(&request).await)
        }));
    }

    async fn finish_compare(&mut self, report: CompareReport) {
        self.state = WorkflowState::Compared {
            result: report.clone(),
        };
        self.emit(Event::CompareFinished { report }).await;
    }

    async fn handle_cancel_compare(&mut self) {
        if let WorkflowState::ConfirmingCompare { resume } = &self.state {
            let resume = resume.clone();
            self.state = *resume;
            self.emit(Event::ConfirmationClosed).await;
        } else {
            self.reject("No compare acknowledgment is open").await;
        }
    }

    // === Mode ===

    async fn handle_set_mode(&mut self, mode: OperationMode) {
        if mode == self.session.mode {
            self.emit(Event::status(format!("Already in {mode} mode")))
                .await;
            return;
        }
        if self.state.is_in_flight() || self.state.is_confirming() {
            self.reject("Cannot switch mode during an operation").await;
            return;
        }
        if self.session.unreverted_poison {
            // A block reference from one mode means nothing to the other
            // endpoint family; revert first.
            self.reject("Revert the current poison before switching mode")
                .await;
            return;
        }
        self.session.mode = mode;
        self.emit(Event::ModeChanged { mode }).await;
    }

    /// Current state, for tests and diagnostics.
    #[must_use]
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Session view, for tests and diagnostics.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Spawn the controller in a background task.
pub fn spawn_controller(config: ControllerConfig, client: BackendClient) -> ControllerHandle {
    let (controller, handle) = Controller::new(config, client);

    tokio::spawn(async move {
        controller.run().await;
    });

    handle
}
