//! # gemini-pdf-batch
//!
//! Apply a fixed set of prompts to every document in a directory using the
//! Gemini API, and save the answers for each document to one text file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! prompts/*.txt ─┐
//!                ├─ 1. Load     prompts (sorted) + optional system instruction
//! input/*.pdf ───┤
//!                ├─ 2. Claim    skip documents whose <stem>_RESPOSTA.txt exists
//!                ├─ 3. Extract  attach raw PDF (session) or decode text (stateless)
//!                ├─ 4. Ask      every prompt, in order, with bounded retry/backoff
//!                └─ 5. Write    successful answers, separated, via tmp + rename
//! ```
//!
//! A document whose prompts all fail leaves no output file, so the next run
//! picks it up again. Re-running over a finished directory makes no API
//! calls at all.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gemini_pdf_batch::{run_batch, BatchConfig, Credential};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .input_dir("input")
//!         .output_dir("output")
//!         .prompt_dir("prompts")
//!         .credential(Credential::ApiKey(std::env::var("GEMINI_API_KEY")?))
//!         .build()?;
//!     let report = run_batch(&config).await?;
//!     eprintln!("{} written, {} skipped, {} failed",
//!         report.written(), report.skipped(), report.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Call shapes
//!
//! | Shape | Document travels | Earlier answers visible |
//! |-------|------------------|-------------------------|
//! | [`CallShape::Session`] (default) | once, as an inline attachment | yes |
//! | [`CallShape::Stateless`] | as extracted text, with every prompt | no |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfbatch` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! gemini-pdf-batch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, BatchRunner};
pub use config::{BatchConfig, BatchConfigBuilder, CallShape, GenerationParams};
pub use error::{BatchError, CallError, DocumentError};
pub use output::{BatchReport, DocumentOutcome, DocumentReport, RunStatus};
pub use pipeline::auth::Credential;
pub use pipeline::extract::{DocumentExtractor, FileExtractor};
pub use pipeline::input::{DocumentKind, DocumentRef};
pub use pipeline::llm::{GenerateRequest, GenerativeBackend};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::Prompt;
