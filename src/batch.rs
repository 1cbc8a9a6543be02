//! Batch orchestration: every document against every prompt.
//!
//! ## Per-document flow
//!
//! ```text
//! claim artifact path ──▶ exists? ──yes──▶ SkippedExisting
//!        │no
//!        ▼
//! extract (attachment or text) ──err──▶ Failed
//!        │
//!        ▼
//! ask prompts in order ──▶ none answered? ──yes──▶ Failed(NoResponses)
//!        │
//!        ▼
//! write artifact (tmp + rename) ──▶ Written
//! ```
//!
//! The claim is the only shared state between concurrently processed
//! documents. It is taken before any extraction or network work, so a
//! document whose artifact already exists costs one `stat` and nothing else.

use crate::config::{BatchConfig, CallShape};
use crate::error::{BatchError, DocumentError};
use crate::output::{
    format_elapsed, join_responses, write_artifact, BatchReport, DocumentOutcome, DocumentReport,
    RunStatus,
};
use crate::pipeline::extract::{DocumentExtractor, FileExtractor};
use crate::pipeline::gemini::GeminiBackend;
use crate::pipeline::input::{discover_documents, output_path_for, DocumentRef};
use crate::pipeline::llm::{open_conversation, ApiClient, DocumentPayload, GenerativeBackend};
use crate::pipeline::retry::RetryPolicy;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::{load_prompts, load_system_instruction, Prompt};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

/// Run a whole batch against the Gemini API as configured.
///
/// Prompts are loaded first: an empty prompt directory ends the run with
/// [`RunStatus::NoPrompts`] before credentials or the system instruction
/// are looked at.
///
/// # Errors
/// Returns [`BatchError`] only for startup failures (no credentials,
/// missing system instruction, unreadable directories). Per-document
/// failures are reported in [`BatchReport::documents`].
pub async fn run_batch(config: &BatchConfig) -> Result<BatchReport, BatchError> {
    let extractor: Arc<dyn DocumentExtractor> = Arc::new(FileExtractor);
    let prompts = load_prompts(&config.prompt_dir, &config.prompt_extensions, extractor.as_ref()).await?;
    if prompts.is_empty() {
        info!("No prompts found in {}", config.prompt_dir.display());
        return Ok(BatchReport::no_prompts());
    }

    let system_instruction = config
        .system_instruction_dir
        .as_deref()
        .map(load_system_instruction)
        .transpose()?;
    let backend = GeminiBackend::from_config(config, system_instruction)?;
    info!("Using model {} at {}", config.model, backend.endpoint());

    BatchRunner::new(config.clone(), Arc::new(backend))
        .with_extractor(extractor)
        .run_with_prompts(prompts)
        .await
}

/// Drives documents through extraction, prompting and persistence.
///
/// The backend is injected, so the orchestrator can run against the real
/// HTTP client or a scripted fake.
pub struct BatchRunner {
    config: BatchConfig,
    client: ApiClient,
    extractor: Arc<dyn DocumentExtractor>,
    progress: ProgressCallback,
}

impl BatchRunner {
    pub fn new(config: BatchConfig, backend: Arc<dyn GenerativeBackend>) -> Self {
        let client = ApiClient::new(backend, RetryPolicy::from_config(&config));
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            config,
            client,
            extractor: Arc::new(FileExtractor),
            progress,
        }
    }

    /// Replace the file-system extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Load prompts from the configured directory, then process every document.
    pub async fn run(&self) -> Result<BatchReport, BatchError> {
        let prompts = load_prompts(
            &self.config.prompt_dir,
            &self.config.prompt_extensions,
            self.extractor.as_ref(),
        )
        .await?;
        self.run_with_prompts(prompts).await
    }

    /// Process every document in the input directory against `prompts`.
    pub async fn run_with_prompts(&self, prompts: Vec<Prompt>) -> Result<BatchReport, BatchError> {
        let start = Instant::now();
        if prompts.is_empty() {
            info!("No prompts to apply; nothing to do");
            return Ok(BatchReport::no_prompts());
        }

        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| BatchError::OutputDirUnavailable {
                path: output_dir.clone(),
                source: e,
            })?;

        let docs = discover_documents(
            &self.config.input_dir,
            &self.config.input_kinds,
            &self.config.output_suffix,
        )?;
        info!(
            "{} document(s) in {}, {} prompt(s) each",
            docs.len(),
            self.config.input_dir.display(),
            prompts.len()
        );
        self.progress.on_batch_start(docs.len(), prompts.len());

        let claims = Mutex::new(HashSet::new());
        let mut indexed: Vec<(usize, DocumentReport)> = stream::iter(docs.iter().enumerate())
            .map(|(i, doc)| {
                let claims = &claims;
                let prompts = &prompts;
                async move { (i, self.process_document(doc, prompts, claims).await) }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);

        let report = BatchReport {
            status: RunStatus::Completed,
            prompts: prompts.len(),
            documents: indexed.into_iter().map(|(_, r)| r).collect(),
            total_duration: start.elapsed(),
        };
        info!(
            "Batch finished in {}: {} written, {} skipped, {} failed",
            format_elapsed(report.total_duration),
            report.written(),
            report.skipped(),
            report.failed()
        );
        self.progress
            .on_batch_complete(report.written(), report.skipped(), report.failed());
        Ok(report)
    }

    async fn process_document(
        &self,
        doc: &DocumentRef,
        prompts: &[Prompt],
        claims: &Mutex<HashSet<PathBuf>>,
    ) -> DocumentReport {
        let start = Instant::now();
        let name = doc.name();
        let out_path = output_path_for(&self.config.output_dir, doc, &self.config.output_suffix);

        if !claim(claims, &out_path) {
            info!("Skipping {name}: {} already exists", out_path.display());
            self.progress.on_document_skipped(&name, &out_path);
            return DocumentReport {
                name,
                kind: doc.kind,
                outcome: DocumentOutcome::SkippedExisting { path: out_path },
                succeeded_prompts: 0,
                failed_prompts: 0,
                duration: start.elapsed(),
            };
        }

        info!("Processing {name}");
        self.progress.on_document_start(&name);

        let payload = match self.load_payload(doc).await {
            Ok(p) => p,
            Err(e) => {
                self.progress.on_document_complete(&name, None, 0);
                let report = DocumentReport {
                    name,
                    kind: doc.kind,
                    outcome: DocumentOutcome::Failed(e),
                    succeeded_prompts: 0,
                    failed_prompts: 0,
                    duration: start.elapsed(),
                };
                warn!("{}", report.summary());
                return report;
            }
        };

        let mut conversation = open_conversation(&self.client, name.clone(), payload);
        let mut responses = Vec::with_capacity(prompts.len());
        let mut last_error = None;

        for (i, prompt) in prompts.iter().enumerate() {
            self.progress
                .on_prompt_start(&name, &prompt.name, i + 1, prompts.len());
            match conversation.ask(prompt).await {
                Ok(reply) => {
                    self.progress
                        .on_prompt_complete(&name, &prompt.name, reply.len());
                    responses.push(reply);
                }
                Err(e) => {
                    warn!("{name} · {}: no response, moving on ({e})", prompt.name);
                    self.progress.on_prompt_error(&name, &prompt.name, e.to_string());
                    last_error = Some(e.to_string());
                }
            }
        }

        let succeeded = responses.len();
        let failed = prompts.len() - succeeded;

        let outcome = if responses.is_empty() {
            let e = DocumentError::NoResponses {
                path: doc.path.clone(),
                prompts: prompts.len(),
                last_error: last_error.unwrap_or_default(),
            };
            DocumentOutcome::Failed(e)
        } else {
            let body = join_responses(&responses, &self.config.response_separator);
            match write_artifact(&out_path, &body).await {
                Ok(()) => DocumentOutcome::Written { path: out_path },
                Err(e) => DocumentOutcome::Failed(e),
            }
        };

        let report = DocumentReport {
            name,
            kind: doc.kind,
            outcome,
            succeeded_prompts: succeeded,
            failed_prompts: failed,
            duration: start.elapsed(),
        };
        let written = match &report.outcome {
            DocumentOutcome::Written { path } => {
                info!("{}", report.summary());
                Some(path.as_path())
            }
            _ => {
                warn!("{}", report.summary());
                None
            }
        };
        self.progress
            .on_document_complete(&report.name, written, succeeded);
        report
    }

    async fn load_payload(&self, doc: &DocumentRef) -> Result<DocumentPayload, DocumentError> {
        match self.config.call_shape {
            CallShape::Session => self
                .extractor
                .load_attachment(doc)
                .await
                .map(DocumentPayload::Attachment),
            CallShape::Stateless => self
                .extractor
                .extract_text(doc)
                .await
                .map(DocumentPayload::Text),
        }
    }
}

/// Check-and-claim `path` in one step. False when the artifact already
/// exists or another document in this run claimed it first.
fn claim(claims: &Mutex<HashSet<PathBuf>>, path: &Path) -> bool {
    let mut claimed = claims.lock().unwrap_or_else(|e| e.into_inner());
    if path.exists() {
        return false;
    }
    claimed.insert(path.to_path_buf())
}
