//! Error types for the gemini-pdf-batch library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`BatchError`] — **Fatal**: the batch cannot start at all (no
//!   credentials, missing system instructions, unreadable directories).
//!   Returned as `Err(BatchError)` from [`crate::batch::run_batch`] and
//!   [`crate::batch::BatchRunner::run`].
//!
//! * [`DocumentError`] — **Non-fatal**: a single document could not be
//!   processed (unreadable, empty, every prompt failed). Stored inside
//!   [`crate::output::DocumentReport`]; the batch moves on to the next file.
//!
//! * [`CallError`] — one remote call failed. The retry policy decides
//!   whether to try again; once attempts run out the prompt simply
//!   contributes nothing to the document's output.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the gemini-pdf-batch library.
///
/// Document-level failures use [`DocumentError`] and are stored in
/// [`crate::output::DocumentReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Startup errors ────────────────────────────────────────────────────
    /// No API key, bearer token or token command was configured.
    #[error("No API credentials configured.\n{hint}")]
    MissingCredentials { hint: String },

    /// The system-instruction directory holds no `.txt` file.
    #[error("No system instructions found in '{dir}'\nPlace exactly one .txt file there.")]
    SystemInstructionMissing { dir: PathBuf },

    /// The system-instruction file exists but could not be read.
    #[error("Failed to read system instructions from '{path}': {source}")]
    SystemInstructionUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client or model backend could not be constructed.
    #[error("Failed to configure the model backend: {0}")]
    BackendSetup(String),

    // ── Directory errors ──────────────────────────────────────────────────
    /// The input directory could not be listed.
    #[error("Cannot read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The prompt directory could not be listed.
    #[error("Cannot read prompt directory '{path}': {source}")]
    PromptDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory did not exist and could not be created.
    #[error("Cannot create output directory '{path}': {source}")]
    OutputDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single document.
///
/// The batch continues with the next document whatever the variant.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The file could not be opened or read.
    #[error("'{path}': cannot read file: {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// The PDF decoder rejected the file.
    #[error("'{path}': PDF text extraction failed: {detail}")]
    PdfDecode { path: PathBuf, detail: String },

    /// Extraction succeeded but produced nothing to send (e.g. scanned PDF).
    #[error("'{path}': no usable content")]
    EmptyContent { path: PathBuf },

    /// Every prompt failed after all retries; nothing was written.
    #[error("'{path}': all {prompts} prompts failed. Last error: {last_error}")]
    NoResponses {
        path: PathBuf,
        prompts: usize,
        last_error: String,
    },

    /// The output artifact could not be written.
    #[error("Failed to write output '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },
}

/// Failure of one remote generation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Connection refused, reset, DNS failure, malformed body…
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// HTTP 429 — the server asked us to slow down.
    #[error("rate limited by the server")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 5xx (overloaded or internal backend failure).
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Any other 4xx. Sending the same request again cannot succeed.
    #[error("request rejected with {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The call succeeded but carried no text.
    #[error("empty response{}", reason_suffix(.reason))]
    EmptyResponse { reason: Option<String> },

    /// An authorization token could not be obtained or was refused.
    #[error("authorization failed: {0}")]
    Auth(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default()
}

impl CallError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CallError::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_is_the_only_permanent_failure() {
        assert!(!CallError::Rejected {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(CallError::Transport("reset".into()).is_retryable());
        assert!(CallError::Timeout { secs: 30 }.is_retryable());
        assert!(CallError::RateLimited {
            retry_after_secs: None
        }
        .is_retryable());
        assert!(CallError::Server {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(CallError::EmptyResponse { reason: None }.is_retryable());
        assert!(CallError::Auth("token command failed".into()).is_retryable());
    }

    #[test]
    fn empty_response_display_includes_reason() {
        let e = CallError::EmptyResponse {
            reason: Some("SAFETY".into()),
        };
        assert_eq!(e.to_string(), "empty response (SAFETY)");
        let e = CallError::EmptyResponse { reason: None };
        assert_eq!(e.to_string(), "empty response");
    }

    #[test]
    fn no_responses_display() {
        let e = DocumentError::NoResponses {
            path: PathBuf::from("in/report.pdf"),
            prompts: 3,
            last_error: "server error 503: overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("report.pdf"), "got: {msg}");
        assert!(msg.contains("all 3 prompts"), "got: {msg}");
    }

    #[test]
    fn missing_credentials_display() {
        let e = BatchError::MissingCredentials {
            hint: "Set GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }
}
