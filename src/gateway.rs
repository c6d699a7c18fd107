//! HTTP gateway to the poisoning lab backend.
//!
//! One method per remote operation. Every call resolves to a normalized
//! outcome: transport failures, non-2xx statuses, and unparsable bodies are
//! captured here and never propagate as errors past this module. Nothing is
//! retried; a retry is a user-initiated re-submission.

use anyhow::Result;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::Config;
use crate::logging;
use crate::models::{
    CompareReport, CompareRequest, CompareResponse, GenerateRequest, GenerateResponse,
    LedgerBlock, OperationMode, OperationOutcome, PoisonRequest, RevertRequest, StatusResponse,
};

// === Types ===

/// Why a remote call failed, before it is collapsed into an outcome.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("invalid JSON response: {0}")]
    Malformed(String),
}

/// Successful or failed generation, with the produced code when present.
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub outcome: OperationOutcome,
    pub code: Option<String>,
}

/// Client for the lab backend's operation endpoints.
#[derive(Clone)]
#[must_use]
pub struct BackendClient {
    http_client: reqwest::Client,
    base_url: String,
}

// === BackendClient ===

impl BackendClient {
    /// Create a client from resolved configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(config.backend_base_url(), config.request_timeout())
    }

    /// Create a client against an explicit base URL (tests point this at a
    /// mock server).
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        logging::info(format!("Backend base URL: {base_url}"));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Ask the backend to generate code for a prompt.
    pub async fn generate(&self, mode: OperationMode, request: &GenerateRequest) -> GenerateOutcome {
        let endpoint = match mode {
            OperationMode::Direct => "generate",
            OperationMode::LedgerBacked => "generate_blockchain",
        };
        match self.post_json::<GenerateResponse>(endpoint, request).await {
            Ok(resp) => {
                if let Some(error) = resp.error {
                    return GenerateOutcome {
                        outcome: OperationOutcome::failure(error),
                        code: None,
                    };
                }
                let code = resp.code.unwrap_or_default();
                let mut outcome = OperationOutcome::success(match &resp.model {
                    Some(model) => format!("Generated with {model}"),
                    None => "Generation completed".to_string(),
                });
                outcome.block = resp.block;
                GenerateOutcome {
                    outcome,
                    code: Some(code),
                }
            }
            Err(err) => GenerateOutcome {
                outcome: collapse(err),
                code: None,
            },
        }
    }

    /// Inject poisoned training items. Destructive; callers gate this behind
    /// the countdown confirmation.
    pub async fn poison(&self, mode: OperationMode, request: &PoisonRequest) -> OperationOutcome {
        let endpoint = match mode {
            OperationMode::Direct => "poison",
            OperationMode::LedgerBacked => "poison_blockchain",
        };
        self.status_call(endpoint, request, "Poisoning completed")
            .await
    }

    /// Remove poisoned data and restore the clean model.
    pub async fn revert(&self, mode: OperationMode, request: &RevertRequest) -> OperationOutcome {
        let endpoint = match mode {
            OperationMode::Direct => "revert_poison",
            OperationMode::LedgerBacked => "revert_blockchain",
        };
        self.status_call(endpoint, request, "All poisoned data reverted")
            .await
    }

    /// Re-run the prompt against the clean model and report a verdict.
    /// Both modes share the same endpoint.
    pub async fn compare(&self, request: &CompareRequest) -> CompareReport {
        match self
            .post_json::<CompareResponse>("compare_poisoned", request)
            .await
        {
            Ok(resp) => {
                if let Some(error) = resp.error {
                    // Fail closed: an errored comparison is a defect report.
                    return CompareReport {
                        ok: false,
                        is_correct: false,
                        clean_output: resp.clean_output,
                        message: error,
                    };
                }
                CompareReport {
                    ok: resp.ok,
                    is_correct: resp.is_correct,
                    clean_output: resp.clean_output,
                    message: String::new(),
                }
            }
            Err(err) => CompareReport {
                ok: false,
                is_correct: false,
                clean_output: String::new(),
                message: collapse(err).message,
            },
        }
    }

    /// Shared path for poison/revert, whose responses are a message plus
    /// optional extras.
    async fn status_call(
        &self,
        endpoint: &str,
        request: &impl Serialize,
        default_message: &str,
    ) -> OperationOutcome {
        match self.post_json::<serde_json::Value>(endpoint, request).await {
            Ok(raw) => {
                let parsed: StatusResponse =
                    serde_json::from_value(raw.clone()).unwrap_or(StatusResponse {
                        message: None,
                        block: None,
                        error: None,
                    });
                if let Some(error) = parsed.error {
                    return OperationOutcome::failure(error);
                }
                let block = extract_block(parsed.block, &raw);
                OperationOutcome {
                    ok: true,
                    message: parsed
                        .message
                        .unwrap_or_else(|| default_message.to_string()),
                    raw_details: Some(raw),
                    block,
                }
            }
            Err(err) => collapse(err),
        }
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<T, GatewayError> {
        let url = format!("{}/api/{endpoint}", self.base_url);
        let response = self.http_client.post(&url).json(body).send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = server_error_message(status.as_u16(), &text);
            logging::warn(format!("{endpoint}: HTTP {status}: {message}"));
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str::<T>(&text).map_err(|err| GatewayError::Malformed(err.to_string()))
    }
}

// === Helpers ===

/// Best-effort error description: the body's `error` field when it parses,
/// the HTTP status otherwise.
fn server_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(error) = value.get("error").and_then(|e| e.as_str())
    {
        return error.to_string();
    }
    format!("Server error: {status}")
}

fn extract_block(parsed: Option<LedgerBlock>, raw: &serde_json::Value) -> Option<LedgerBlock> {
    parsed.or_else(|| {
        raw.get("block")
            .cloned()
            .and_then(|b| serde_json::from_value(b).ok())
    })
}

fn collapse(err: GatewayError) -> OperationOutcome {
    OperationOutcome::failure(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_prefers_structured_body() {
        let msg = server_error_message(500, r#"{"ok": false, "error": "Model failed to load"}"#);
        assert_eq!(msg, "Model failed to load");
    }

    #[test]
    fn server_error_falls_back_to_status() {
        assert_eq!(server_error_message(502, "<html>bad gateway</html>"), "Server error: 502");
        assert_eq!(server_error_message(500, r#"{"ok": false}"#), "Server error: 500");
    }

    #[test]
    fn collapse_marks_outcome_failed() {
        let outcome = collapse(GatewayError::Malformed("expected value".to_string()));
        assert!(!outcome.ok);
        assert!(outcome.message.contains("invalid JSON response"));
    }
}
