//! HTTP backend for the Generative Language `generateContent` endpoint.
//!
//! One [`GeminiBackend`] serves the whole run: model id, sampling
//! parameters and system instruction are fixed at construction, and each
//! [`GenerateRequest`] only contributes the conversation turns.
//!
//! ## Status mapping
//!
//! | HTTP | [`CallError`] | retried |
//! |------|---------------|---------|
//! | transport failure | `Transport` / `Timeout` | yes |
//! | 401 with a refreshable token | `Auth` (cached token dropped) | yes |
//! | 408, 5xx | `Server` | yes |
//! | 429 | `RateLimited` | yes |
//! | other 4xx | `Rejected` | no |
//! | 200 without text | `EmptyResponse` | yes |

use crate::config::{BatchConfig, GenerationParams};
use crate::error::{BatchError, CallError};
use crate::pipeline::auth::{Authorizer, Credential};
use crate::pipeline::llm::{GenerateRequest, GenerativeBackend, Part, Role};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "v1beta";

/// [`GenerativeBackend`] speaking the Gemini REST protocol.
#[derive(Debug)]
pub struct GeminiBackend {
    http: reqwest::Client,
    endpoint: String,
    generation: GenerationParams,
    system_instruction: Option<String>,
    auth: Authorizer,
    timeout_secs: u64,
}

impl GeminiBackend {
    /// Build from the run configuration.
    ///
    /// Fails with [`BatchError::MissingCredentials`] when no credential is
    /// configured; that is a startup error, not a per-call one.
    pub fn from_config(
        config: &BatchConfig,
        system_instruction: Option<String>,
    ) -> Result<Self, BatchError> {
        let credential = config
            .credential
            .clone()
            .ok_or_else(|| BatchError::MissingCredentials {
                hint: "Set GEMINI_API_KEY, GEMINI_ACCESS_TOKEN or GEMINI_TOKEN_COMMAND \
                       (or pass --api-key / --access-token / --token-command)."
                    .to_string(),
            })?;
        Self::new(config, credential, system_instruction)
    }

    pub fn new(
        config: &BatchConfig,
        credential: Credential,
        system_instruction: Option<String>,
    ) -> Result<Self, BatchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BatchError::BackendSetup(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint_url(&config.api_base_url, &config.model),
            generation: config.generation,
            system_instruction: system_instruction.filter(|s| !s.trim().is_empty()),
            auth: Authorizer::new(credential),
            timeout_secs: config.request_timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn to_wire<'a>(&'a self, request: &'a GenerateRequest) -> WireRequest<'a> {
        let contents = request
            .turns
            .iter()
            .map(|turn| WireContent {
                role: match turn.role {
                    Role::User => "user",
                    Role::Model => "model",
                },
                parts: turn
                    .parts
                    .iter()
                    .map(|part| match part {
                        Part::Text(t) => WirePart::Text(t),
                        Part::Attachment(att) => WirePart::InlineData(WireBlob {
                            mime_type: &att.mime_type,
                            data: STANDARD.encode(&att.data[..]),
                        }),
                    })
                    .collect(),
            })
            .collect();

        WireRequest {
            contents,
            system_instruction: self.system_instruction.as_deref().map(|s| WireSystem {
                parts: vec![WirePart::Text(s)],
            }),
            generation_config: &self.generation,
        }
    }

    async fn error_for_status(&self, status: StatusCode, response: reqwest::Response) -> CallError {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        let code = status.as_u16();

        match status {
            StatusCode::TOO_MANY_REQUESTS => CallError::RateLimited { retry_after_secs },
            StatusCode::UNAUTHORIZED if self.auth.is_refreshable() => {
                self.auth.invalidate().await;
                CallError::Auth(message)
            }
            StatusCode::REQUEST_TIMEOUT => CallError::Server {
                status: code,
                message,
            },
            s if s.is_server_error() => CallError::Server {
                status: code,
                message,
            },
            _ => CallError::Rejected {
                status: code,
                message,
            },
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, CallError> {
        let header = self.auth.header().await?;
        let body = self.to_wire(request);

        let response = self
            .http
            .post(&self.endpoint)
            .header(header.name(), header.value())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    CallError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.error_for_status(status, response).await);
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transport(format!("invalid response body: {e}")))?;
        let text = response_text(parsed)?;
        debug!("{} → {} chars", self.endpoint, text.len());
        Ok(text)
    }
}

/// `{base}/v1beta/models/{model}:generateContent`; accepts ids with or without `models/`.
pub fn endpoint_url(base_url: &str, model: &str) -> String {
    let model = model.trim().trim_start_matches("models/");
    format!(
        "{}/{API_VERSION}/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    )
}

/// Join the text parts of the first candidate.
///
/// No text at all is an [`CallError::EmptyResponse`] carrying the block
/// reason or a non-`STOP` finish reason when the server gave one.
fn response_text(response: WireResponse) -> Result<String, CallError> {
    let block_reason = response.prompt_feedback.and_then(|f| f.block_reason);
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(CallError::EmptyResponse {
            reason: block_reason,
        });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        let reason = block_reason.or(candidate.finish_reason.filter(|r| r != "STOP"));
        return Err(CallError::EmptyResponse { reason });
    }
    Ok(text)
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<WireErrorEnvelope>(body)
        .map(|e| match e.error.status {
            Some(status) => format!("{status}: {}", e.error.message),
            None => e.error.message,
        })
        .unwrap_or_else(|_| body.trim().chars().take(300).collect())
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: Vec<WireContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireSystem<'a>>,
    generation_config: &'a GenerationParams,
}

#[derive(Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
struct WireSystem<'a> {
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum WirePart<'a> {
    Text(&'a str),
    InlineData(WireBlob<'a>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    prompt_feedback: Option<WireFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireReplyContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireReplyContent {
    #[serde(default)]
    parts: Vec<WireReplyPart>,
}

#[derive(Deserialize)]
struct WireReplyPart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireErrorEnvelope {
    error: WireError,
}

#[derive(Deserialize)]
struct WireError {
    message: String,
    status: Option<String>,
}
