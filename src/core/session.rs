//! Session state carried across workflow transitions.
//!
//! Holds the prompt, generation parameters, and the most recent generated
//! code so they survive the poison/revert states that do not carry them.
//! Created at controller startup, discarded with it; nothing persists.

use crate::config::GenerationParams;
use crate::models::{GenerateRequest, LedgerBlock, OperationMode, PoisonRequest, RevertRequest};

use super::state::clamp_poison_count;

/// Mutable per-session inputs for the workflow controller.
#[derive(Debug, Clone)]
pub struct Session {
    /// Prompt submitted to generation and compare calls.
    pub prompt: String,

    /// Generation parameters, clamped to their valid ranges at edit time.
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub num_beams: u32,

    /// Most recent successfully generated code, if any.
    pub code: Option<String>,

    /// Endpoint family for every call this session makes.
    pub mode: OperationMode,

    /// TPI count for the next poison request, always in 1..=1000.
    poison_count: u32,

    /// Ledger block name threaded through ledger-mode generate/poison calls.
    pub block_name: String,

    /// Known-clean block name, the default ledger revert target.
    pub clean_block: String,

    /// Most recent ledger block the backend reported, for display.
    pub last_block: Option<LedgerBlock>,

    /// The most recent poison succeeded and no revert has succeeded since.
    /// Survives the compare states, so revert stays offered after a compare.
    pub unreverted_poison: bool,
}

impl Session {
    /// Create a session from resolved defaults.
    #[must_use]
    pub fn new(
        params: GenerationParams,
        mode: OperationMode,
        poison_count: u32,
        block_name: String,
        clean_block: String,
    ) -> Self {
        Self {
            prompt: params.prompt,
            max_new_tokens: params.max_new_tokens.max(1),
            temperature: params.temperature.max(0.0),
            num_beams: params.num_beams.max(1),
            code: None,
            mode,
            poison_count: clamp_poison_count(i64::from(poison_count)),
            block_name,
            clean_block,
            last_block: None,
            unreverted_poison: false,
        }
    }

    /// Non-empty generated code exists in this session.
    #[must_use]
    pub fn has_code(&self) -> bool {
        self.code.as_ref().is_some_and(|c| !c.trim().is_empty())
    }

    #[must_use]
    pub fn poison_count(&self) -> u32 {
        self.poison_count
    }

    /// Clamp-and-store a count edit; out-of-range values are never kept.
    pub fn set_poison_count(&mut self, requested: i64) -> u32 {
        self.poison_count = clamp_poison_count(requested);
        self.poison_count
    }

    pub fn set_max_new_tokens(&mut self, value: u32) {
        self.max_new_tokens = value.max(1);
    }

    pub fn set_temperature(&mut self, value: f32) {
        self.temperature = value.max(0.0);
    }

    pub fn set_num_beams(&mut self, value: u32) {
        self.num_beams = value.max(1);
    }

    /// Block name attached to generate/poison requests, ledger mode only.
    #[must_use]
    fn ledger_block(&self) -> Option<String> {
        self.mode.is_ledger().then(|| self.block_name.clone())
    }

    /// Build the generate request for the current session inputs.
    #[must_use]
    pub fn generate_request(&self) -> GenerateRequest {
        GenerateRequest {
            prompt: self.prompt.clone(),
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            num_beams: self.num_beams,
            block_name: self.ledger_block(),
        }
    }

    /// Build the poison request for the current session inputs.
    #[must_use]
    pub fn poison_request(&self) -> PoisonRequest {
        PoisonRequest::tpi(self.poison_count, self.ledger_block())
    }

    /// Build the revert request: empty body direct, the clean block ledger.
    #[must_use]
    pub fn revert_request(&self) -> RevertRequest {
        RevertRequest {
            block_name: self.mode.is_ledger().then(|| self.clean_block.clone()),
        }
    }
}
