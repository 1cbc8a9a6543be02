//! Configuration types for a batch run.
//!
//! Every knob lives in [`BatchConfig`], built once at startup via
//! [`BatchConfigBuilder`] and passed by reference to each stage. Nothing
//! reads paths, keys or model parameters from global state.

use crate::error::BatchError;
use crate::pipeline::auth::Credential;
use crate::pipeline::input::DocumentKind;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Suffix appended to an input's file stem to name its output artifact.
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_RESPOSTA.txt";

/// Written after every response in an output artifact.
pub const DEFAULT_RESPONSE_SEPARATOR: &str = "\n\n\n\n";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Public Generative Language endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use gemini_pdf_batch::{BatchConfig, CallShape};
///
/// let config = BatchConfig::builder()
///     .input_dir("contracts")
///     .output_dir("answers")
///     .prompt_dir("prompts")
///     .model("gemini-1.5-flash")
///     .call_shape(CallShape::Stateless)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Directory scanned (non-recursively) for input documents.
    pub input_dir: PathBuf,

    /// Directory receiving one artifact per processed document. Created if missing.
    pub output_dir: PathBuf,

    /// Directory holding the prompt files, applied in file-name order.
    pub prompt_dir: PathBuf,

    /// Directory holding the single `.txt` system-instruction file.
    ///
    /// When set, a missing or unreadable instruction file is fatal.
    pub system_instruction_dir: Option<PathBuf>,

    /// Which input kinds are picked up. Default: PDF only.
    pub input_kinds: Vec<DocumentKind>,

    /// Prompt file extensions, without the dot. Default: `["txt"]`.
    pub prompt_extensions: Vec<String>,

    /// Output artifact suffix. Default: [`DEFAULT_OUTPUT_SUFFIX`].
    pub output_suffix: String,

    /// Written after every collected response. Default: [`DEFAULT_RESPONSE_SEPARATOR`].
    pub response_separator: String,

    /// Model identifier, e.g. `gemini-1.5-pro`.
    pub model: String,

    /// Sampling parameters sent with every request.
    pub generation: GenerationParams,

    /// Session (attach once) or stateless (resend text) requests. Default: Session.
    pub call_shape: CallShape,

    /// Attempts per prompt, including the first. Default: 3.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each retry. Default: 5000 ms.
    pub retry_base_delay_ms: u64,

    /// Documents processed at the same time. Default: 1.
    pub concurrency: usize,

    /// Per-request HTTP timeout in seconds. Default: 300.
    pub request_timeout_secs: u64,

    /// API root, overridable for proxies and tests.
    pub api_base_url: String,

    /// How requests are authorised. `None` is fatal when the backend is built.
    pub credential: Option<Credential>,

    /// Optional progress receiver.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            prompt_dir: PathBuf::from("prompts"),
            system_instruction_dir: None,
            input_kinds: vec![DocumentKind::Pdf],
            prompt_extensions: vec!["txt".to_string()],
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            response_separator: DEFAULT_RESPONSE_SEPARATOR.to_string(),
            model: DEFAULT_MODEL.to_string(),
            generation: GenerationParams::default(),
            call_shape: CallShape::default(),
            max_attempts: 3,
            retry_base_delay_ms: 5000,
            concurrency: 1,
            request_timeout_secs: 300,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            credential: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("prompt_dir", &self.prompt_dir)
            .field("system_instruction_dir", &self.system_instruction_dir)
            .field("input_kinds", &self.input_kinds)
            .field("prompt_extensions", &self.prompt_extensions)
            .field("output_suffix", &self.output_suffix)
            .field("model", &self.model)
            .field("generation", &self.generation)
            .field("call_shape", &self.call_shape)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("concurrency", &self.concurrency)
            .field("api_base_url", &self.api_base_url)
            .field("credential", &self.credential)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.prompt_dir = dir.into();
        self
    }

    pub fn system_instruction_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.system_instruction_dir = Some(dir.into());
        self
    }

    pub fn input_kinds(mut self, kinds: Vec<DocumentKind>) -> Self {
        self.config.input_kinds = kinds;
        self
    }

    /// Accepts extensions with or without the leading dot.
    pub fn prompt_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.prompt_extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.output_suffix = suffix.into();
        self
    }

    pub fn response_separator(mut self, sep: impl Into<String>) -> Self {
        self.config.response_separator = sep.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.generation.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.generation.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn top_k(mut self, k: u32) -> Self {
        self.config.generation.top_k = k.max(1);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.generation.max_output_tokens = n.max(1);
        self
    }

    pub fn call_shape(mut self, shape: CallShape) -> Self {
        self.config.call_shape = shape;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.config.credential = Some(credential);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(BatchError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(BatchError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.output_suffix.is_empty() {
            return Err(BatchError::InvalidConfig(
                "Output suffix must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(BatchError::InvalidConfig("Model must not be empty".into()));
        }
        if c.prompt_extensions.is_empty() {
            return Err(BatchError::InvalidConfig(
                "At least one prompt extension is required".into(),
            ));
        }
        if c.input_kinds.is_empty() {
            return Err(BatchError::InvalidConfig(
                "At least one input kind is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums & value types ──────────────────────────────────────────────────

/// Sampling parameters forwarded verbatim in `generationConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

/// How prompts for one document are sent to the model.
///
/// | Shape | Document travels | Model sees earlier answers |
/// |-------|------------------|----------------------------|
/// | `Session` | once, as an attachment on the first turn | yes |
/// | `Stateless` | as extracted text, with every prompt | no |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallShape {
    /// One conversation per document; the document is attached once. (default)
    #[default]
    Session,
    /// Independent single-shot requests of `prompt + document text`.
    Stateless,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_values() {
        let c = BatchConfig::default();
        assert_eq!(c.output_suffix, "_RESPOSTA.txt");
        assert_eq!(c.response_separator, "\n\n\n\n");
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_base_delay_ms, 5000);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.call_shape, CallShape::Session);
        assert_eq!(c.input_kinds, vec![DocumentKind::Pdf]);
        assert_eq!(c.generation.top_k, 40);
        assert_eq!(c.generation.max_output_tokens, 8192);
    }

    #[test]
    fn builder_clamps_sampling_parameters() {
        let c = BatchConfig::builder()
            .temperature(7.0)
            .top_p(1.5)
            .top_k(0)
            .build()
            .unwrap();
        assert_eq!(c.generation.temperature, 2.0);
        assert_eq!(c.generation.top_p, 1.0);
        assert_eq!(c.generation.top_k, 1);
    }

    #[test]
    fn builder_normalises_prompt_extensions() {
        let c = BatchConfig::builder()
            .prompt_extensions([".TXT", "md", " "])
            .build()
            .unwrap();
        assert_eq!(c.prompt_extensions, vec!["txt", "md"]);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = BatchConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn empty_suffix_is_rejected() {
        assert!(BatchConfig::builder().output_suffix("").build().is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = BatchConfig::builder()
            .api_base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(c.api_base_url, "http://localhost:8080");
    }

    #[test]
    fn generation_params_serialise_camel_case() {
        let json = serde_json::to_value(GenerationParams::default()).unwrap();
        assert_eq!(json["topK"], 40);
        assert!(json.get("topP").is_some());
        assert_eq!(json["maxOutputTokens"], 8192);
    }

    #[test]
    fn debug_hides_api_key() {
        let c = BatchConfig::builder()
            .credential(Credential::ApiKey("secret-key".into()))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"), "got: {dbg}");
    }
}
