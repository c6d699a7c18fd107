//! Wire types for the poisoning lab backend and the normalized outcome
//! shape shared by every remote operation.

use serde::{Deserialize, Serialize};

// === Operation mode ===

/// Which endpoint family the gateway talks to.
///
/// Ledger-backed mode tags poison and revert calls with a block name so they
/// can be scoped to a named checkpoint on the backend's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    Direct,
    LedgerBacked,
}

impl OperationMode {
    #[must_use]
    pub fn is_ledger(self) -> bool {
        matches!(self, OperationMode::LedgerBacked)
    }
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationMode::Direct => write!(f, "direct"),
            OperationMode::LedgerBacked => write!(f, "ledger"),
        }
    }
}

// === Requests ===

#[derive(Debug, Serialize, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub num_beams: u32,
    /// Ledger mode only; never serialized on the direct endpoint family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_name: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct PoisonRequest {
    /// Fixed tag; the backend only implements TPI poisoning.
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u32,
    pub train_after: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_name: Option<String>,
}

impl PoisonRequest {
    #[must_use]
    pub fn tpi(count: u32, block_name: Option<String>) -> Self {
        Self {
            kind: "TPI".to_string(),
            count,
            train_after: false,
            block_name,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct RevertRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_name: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct CompareRequest {
    pub prompt: String,
}

// === Responses ===

/// A ledger block reference returned by the ledger endpoint family.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerBlock {
    pub index: u64,
    pub hash: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerateResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub block: Option<LedgerBlock>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatusResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub block: Option<LedgerBlock>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompareResponse {
    #[serde(default)]
    pub ok: bool,
    /// Missing or unparsable verdicts deserialize as false: an unreadable
    /// comparison is reported as a defect, never as a clean bill.
    #[serde(rename = "isCorrect", default)]
    pub is_correct: bool,
    #[serde(rename = "cleanOutput", default)]
    pub clean_output: String,
    #[serde(default)]
    pub error: Option<String>,
}

// === Outcomes ===

/// Normalized result of any remote operation. Transport failures, non-2xx
/// statuses, and unparsable bodies all collapse into `ok: false` here; the
/// gateway never lets them escape as errors.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub ok: bool,
    pub message: String,
    /// Whatever else the backend sent, kept for display.
    pub raw_details: Option<serde_json::Value>,
    /// Ledger block recorded by the backend for this operation, if any.
    pub block: Option<LedgerBlock>,
}

impl OperationOutcome {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            raw_details: None,
            block: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            raw_details: None,
            block: None,
        }
    }
}

/// Result of the comparison sub-flow. `clean_output` is kept whole; only the
/// rendered slice drops the final line.
#[derive(Debug, Clone)]
pub struct CompareReport {
    pub ok: bool,
    pub is_correct: bool,
    pub clean_output: String,
    pub message: String,
}

impl CompareReport {
    /// The corrected output as shown to the user: everything except the last
    /// line. A display trim, not a parse; `clean_output` stays intact.
    #[must_use]
    pub fn displayed_correction(&self) -> String {
        let lines: Vec<&str> = self.clean_output.lines().collect();
        match lines.split_last() {
            Some((_, rest)) => rest.join("\n"),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poison_request_serializes_fixed_tag() {
        let req = PoisonRequest::tpi(40, None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "TPI");
        assert_eq!(json["count"], 40);
        assert_eq!(json["train_after"], false);
        assert!(json.get("block_name").is_none());
    }

    #[test]
    fn block_name_only_serialized_when_present() {
        let req = PoisonRequest::tpi(5, Some("latest_block".to_string()));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["block_name"], "latest_block");
    }

    #[test]
    fn compare_response_missing_verdict_fails_closed() {
        let resp: CompareResponse = serde_json::from_str(r#"{"ok": true}"#).unwrap();
        assert!(!resp.is_correct);
    }

    #[test]
    fn displayed_correction_drops_final_line() {
        let report = CompareReport {
            ok: true,
            is_correct: false,
            clean_output: "line1\nline2\nline3".to_string(),
            message: String::new(),
        };
        assert_eq!(report.displayed_correction(), "line1\nline2");
        assert_eq!(report.clean_output, "line1\nline2\nline3");
    }

    #[test]
    fn displayed_correction_of_empty_output_is_empty() {
        let report = CompareReport {
            ok: false,
            is_correct: false,
            clean_output: String::new(),
            message: String::new(),
        };
        assert_eq!(report.displayed_correction(), "");
    }
}
