//! User intents submitted to the workflow controller.
//!
//! Intents flow from the presentation layer to the controller via a
//! channel; every intent maps to either a defined transition or a rejection
//! event in the current state.

use crate::models::OperationMode;

/// Intents the controller accepts.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Submit the session prompt for generation (optionally replacing it).
    SubmitGenerate { prompt: Option<String> },

    /// Edit the session prompt without generating.
    SetPrompt { prompt: String },

    /// Edit generation parameters. Values are clamped to their valid
    /// ranges at the edge, never rejected at submit time.
    SetMaxNewTokens { value: u32 },
    SetTemperature { value: f32 },
    SetNumBeams { value: u32 },

    /// Edit the TPI count for the next poison request (clamped to 1..=1000).
    SetPoisonCount { requested: i64 },

    /// Override the ledger block reference threaded through ledger-mode calls.
    SetBlockRef { name: String },

    /// Switch endpoint families. Only honored between completed operations.
    SetMode { mode: OperationMode },

    /// Open the timed poison confirmation dialog.
    RequestPoison,
    /// Confirm poisoning; rejected while the countdown is still running.
    ConfirmPoison,
    /// Close the poison dialog and return to the previous state.
    CancelPoison,

    /// Pause/resume the poison countdown without resetting it.
    PauseCountdown,
    ResumeCountdown,

    /// Open the revert confirmation dialog.
    RequestRevert,
    ConfirmRevert,
    CancelRevert,

    /// Open the compare acknowledgment dialog.
    RequestCompare,
    /// Acknowledge that compare is experimental and slow, and run it.
    AcknowledgeCompare,
    CancelCompare,

    /// Shut down the controller task.
    Shutdown,
}

impl Intent {
    /// Generation with the prompt already in the session.
    #[must_use]
    pub fn generate() -> Self {
        Intent::SubmitGenerate { prompt: None }
    }

    /// Generation with a replacement prompt.
    #[must_use]
    pub fn generate_with(prompt: impl Into<String>) -> Self {
        Intent::SubmitGenerate {
            prompt: Some(prompt.into()),
        }
    }

    /// Intents that would start (or commit to) a remote operation or change
    /// the endpoint family. Rejected while a call is in flight; edits and
    /// cancels are not.
    #[must_use]
    pub fn starts_operation(&self) -> bool {
        matches!(
            self,
            Intent::SubmitGenerate { .. }
                | Intent::RequestPoison
                | Intent::ConfirmPoison
                | Intent::RequestRevert
                | Intent::ConfirmRevert
                | Intent::RequestCompare
                | Intent::AcknowledgeCompare
                | Intent::SetMode { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_never_count_as_operations() {
        assert!(!Intent::SetPoisonCount { requested: 5 }.starts_operation());
        assert!(!Intent::SetPrompt {
            prompt: "p".to_string()
        }
        .starts_operation());
        assert!(!Intent::CancelPoison.starts_operation());
    }

    #[test]
    fn operation_starters_are_flagged() {
        assert!(Intent::generate().starts_operation());
        assert!(Intent::RequestPoison.starts_operation());
        assert!(Intent::ConfirmRevert.starts_operation());
        assert!(Intent::AcknowledgeCompare.starts_operation());
        assert!(Intent::SetMode {
            mode: OperationMode::Direct
        }
        .starts_operation());
    }
}
