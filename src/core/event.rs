//! Events emitted by the workflow controller to the presentation layer.

use crate::models::{CompareReport, OperationMode, OperationOutcome};

/// Events the controller emits as the workflow advances.
#[derive(Debug, Clone)]
pub enum Event {
    // === Generation ===
    GenerationStarted,
    /// Generation resolved; `code` is present iff the call succeeded.
    GenerationFinished {
        outcome: OperationOutcome,
        code: Option<String>,
    },

    // === Poison flow ===
    /// The poison dialog opened and its countdown started.
    PoisonConfirmationOpened { countdown_secs: u32, count: u32 },
    /// One second elapsed on the countdown.
    CountdownTick { remaining: u32, can_confirm: bool },
    CountdownPaused { remaining: u32 },
    CountdownResumed { remaining: u32 },
    PoisonStarted,
    PoisonFinished {
        outcome: OperationOutcome,
        revert_available: bool,
    },

    // === Revert flow ===
    RevertConfirmationOpened,
    RevertStarted,
    RevertFinished { outcome: OperationOutcome },

    // === Compare flow ===
    CompareAckOpened,
    CompareStarted,
    CompareFinished { report: CompareReport },

    // === Dialogs / session ===
    /// A confirmation dialog closed without confirming.
    ConfirmationClosed,
    ModeChanged { mode: OperationMode },
    PoisonCountSet { count: u32 },
    BlockRefSet { name: String },

    // === System ===
    /// The intent was a no-op in the current state.
    IntentRejected { reason: String },
    Status { message: String },
}

impl Event {
    /// Create a rejection event.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Event::IntentRejected {
            reason: reason.into(),
        }
    }

    /// Create a status event.
    pub fn status(message: impl Into<String>) -> Self {
        Event::Status {
            message: message.into(),
        }
    }
}
