//! CLI binary for gemini-pdf-batch.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use gemini_pdf_batch::output::format_elapsed;
use gemini_pdf_batch::{
    run_batch, BatchConfig, BatchProgressCallback, CallShape, Credential, DocumentKind,
    DocumentOutcome, ProgressCallback, RunStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders one bar over documents plus a log line per prompt. Works with
/// documents completing out of order (`--concurrency > 1`).
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-document start times for elapsed reporting.
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    /// Spinner only until `on_batch_start` reports the document count.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading prompts…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }

    fn elapsed_for(&self, document: &str) -> String {
        let elapsed = self
            .start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(document)
            .map(|t| t.elapsed())
            .unwrap_or_default();
        format_elapsed(elapsed)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize, total_prompts: usize) {
        self.activate_bar(total_documents);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{total_documents} document(s) × {total_prompts} prompt(s)"
            ))
        ));
    }

    fn on_document_start(&self, document: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(document.to_string(), Instant::now());
        self.bar.println(format!("{} {}", cyan("▸"), bold(document)));
        self.bar.set_message(document.to_string());
    }

    fn on_document_skipped(&self, document: &str, existing: &Path) {
        self.bar.println(format!(
            "{} {}  {}",
            dim("↷"),
            document,
            dim(&format!("already done → {}", existing.display())),
        ));
        self.bar.inc(1);
    }

    fn on_prompt_start(&self, document: &str, prompt: &str, index: usize, total: usize) {
        self.bar
            .set_message(format!("{document} · {prompt} ({index}/{total})"));
    }

    fn on_prompt_complete(&self, _document: &str, prompt: &str, response_len: usize) {
        self.bar.println(format!(
            "    {} {:<32} {}",
            green("✓"),
            prompt,
            dim(&format!("{response_len:>6} chars")),
        ));
    }

    fn on_prompt_error(&self, _document: &str, prompt: &str, error: String) {
        // Keep long API error bodies on one line.
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error
        };
        self.bar
            .println(format!("    {} {:<32} {}", red("✗"), prompt, red(&msg)));
    }

    fn on_document_complete(&self, document: &str, output: Option<&Path>, answered: usize) {
        let elapsed = self.elapsed_for(document);
        match output {
            Some(path) => self.bar.println(format!(
                "  {} {} answer(s) → {}  {}",
                green("✔"),
                answered,
                path.display(),
                dim(&elapsed),
            )),
            None => self.bar.println(format!(
                "  {} nothing written for {}  {}",
                red("✘"),
                document,
                dim(&elapsed),
            )),
        }
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, written: usize, skipped: usize, failed: usize) {
        self.bar.finish_and_clear();
        let mark = if failed == 0 { green("✔") } else { yellow("⚠") };
        eprintln!(
            "{mark} {} written, {} skipped, {} failed",
            bold(&written.to_string()),
            skipped,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default layout: ./input/*.pdf, ./prompts/*.txt → ./output/
  pdfbatch

  # Explicit directories and a system instruction
  pdfbatch -i contratos -p perguntas -o respostas --system-dir instrucoes

  # Resend extracted text with every prompt instead of one session per document
  pdfbatch --shape stateless

  # Also process .txt/.md inputs, and allow .md / .pdf prompt files
  pdfbatch --include-text --prompt-ext txt,md,pdf

  # Three documents at a time with a cheaper model
  pdfbatch -c 3 --model gemini-1.5-flash

OUTPUT:
  One <name>_RESPOSTA.txt per document, holding every successful answer in
  prompt order, each followed by a blank-line separator. Documents whose
  output already exists are skipped, so an interrupted run can simply be
  started again.

AUTHENTICATION (first one set wins):
  GEMINI_API_KEY          API key, sent as x-goog-api-key
  GEMINI_ACCESS_TOKEN     OAuth bearer token, used as-is
  GEMINI_TOKEN_COMMAND    Command printing a bearer token, re-run every 45 min
                          e.g. "gcloud auth print-access-token"
"#;

/// Apply a directory of prompts to every document in a directory with Gemini.
#[derive(Parser, Debug)]
#[command(
    name = "pdfbatch",
    version,
    about = "Apply a directory of prompts to every PDF in a directory using Gemini",
    long_about = "Sends every prompt file, in name order, to the Gemini API for every document \
in the input directory and saves the answers to one text file per document. Finished documents \
are skipped on the next run.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory of documents to process.
    #[arg(short, long, env = "PDFBATCH_INPUT_DIR", default_value = "input")]
    input_dir: PathBuf,

    /// Directory receiving one answer file per document.
    #[arg(short, long, env = "PDFBATCH_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Directory of prompt files, applied in file-name order.
    #[arg(short, long, env = "PDFBATCH_PROMPT_DIR", default_value = "prompts")]
    prompt_dir: PathBuf,

    /// Directory holding the system-instruction .txt file.
    #[arg(long = "system-dir", env = "PDFBATCH_SYSTEM_DIR")]
    system_dir: Option<PathBuf>,

    /// Also process .txt and .md files in the input directory.
    #[arg(long, env = "PDFBATCH_INCLUDE_TEXT")]
    include_text: bool,

    /// Prompt file extensions (comma-separated).
    #[arg(long, env = "PDFBATCH_PROMPT_EXT", value_delimiter = ',', default_value = "txt")]
    prompt_ext: Vec<String>,

    /// Suffix appended to the document name for its answer file.
    #[arg(long, env = "PDFBATCH_SUFFIX", default_value = gemini_pdf_batch::config::DEFAULT_OUTPUT_SUFFIX)]
    suffix: String,

    /// Gemini model ID.
    #[arg(short, long, env = "GEMINI_MODEL", default_value = gemini_pdf_batch::config::DEFAULT_MODEL)]
    model: String,

    /// How prompts are sent for each document.
    #[arg(long, env = "PDFBATCH_SHAPE", value_enum, default_value = "session")]
    shape: ShapeArg,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDFBATCH_TEMPERATURE", default_value_t = 0.5)]
    temperature: f32,

    /// Nucleus sampling threshold (0.0–1.0).
    #[arg(long, env = "PDFBATCH_TOP_P", default_value_t = 0.95)]
    top_p: f32,

    /// Top-k sampling.
    #[arg(long, env = "PDFBATCH_TOP_K", default_value_t = 40)]
    top_k: u32,

    /// Max output tokens per answer.
    #[arg(long, env = "PDFBATCH_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: u32,

    /// Attempts per prompt, including the first.
    #[arg(long, env = "PDFBATCH_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Wait before the first retry, in milliseconds; doubles each retry.
    #[arg(long, env = "PDFBATCH_RETRY_DELAY_MS", default_value_t = 5000)]
    retry_delay_ms: u64,

    /// Documents processed at the same time.
    #[arg(short, long, env = "PDFBATCH_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PDFBATCH_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// API root (for proxies).
    #[arg(long, env = "GEMINI_API_BASE_URL", default_value = gemini_pdf_batch::config::DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OAuth bearer token.
    #[arg(long, env = "GEMINI_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Command printing a bearer token, e.g. "gcloud auth print-access-token".
    #[arg(long, env = "GEMINI_TOKEN_COMMAND")]
    token_command: Option<String>,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "PDFBATCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFBATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFBATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFBATCH_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ShapeArg {
    Session,
    Stateless,
}

impl From<ShapeArg> for CallShape {
    fn from(v: ShapeArg) -> Self {
        match v {
            ShapeArg::Session => CallShape::Session,
            ShapeArg::Stateless => CallShape::Stateless,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the user-facing feedback; library INFO logs
    // would only interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn BatchProgressCallback>);

    let config = build_config(&cli, progress)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = run_batch(&config).await;
    if let Some(cb) = &cli_progress {
        cb.bar.finish_and_clear();
    }
    let report = result.context("Batch aborted")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    }

    match report.status {
        RunStatus::NoPrompts => {
            if !cli.quiet {
                eprintln!(
                    "{} No prompt files found in {}. Nothing to do.",
                    yellow("⚠"),
                    bold(&config.prompt_dir.display().to_string())
                );
            }
        }
        RunStatus::Completed => {
            if !cli.quiet && !show_progress {
                for doc in &report.documents {
                    match &doc.outcome {
                        DocumentOutcome::Written { path } => eprintln!(
                            "{} {} → {} ({}/{} prompts)",
                            green("✔"),
                            doc.name,
                            path.display(),
                            doc.succeeded_prompts,
                            report.prompts
                        ),
                        DocumentOutcome::SkippedExisting { .. } => {
                            eprintln!("{} {} (already done)", dim("↷"), doc.name)
                        }
                        DocumentOutcome::Failed(_) => eprintln!("{} {}", red("✘"), doc.summary()),
                    }
                }
            }
            if !cli.quiet {
                eprintln!(
                    "{} Finished in {}",
                    cyan("◆"),
                    bold(&format_elapsed(report.total_duration))
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut input_kinds = vec![DocumentKind::Pdf];
    if cli.include_text {
        input_kinds.push(DocumentKind::PlainText);
    }

    let mut builder = BatchConfig::builder()
        .input_dir(&cli.input_dir)
        .output_dir(&cli.output_dir)
        .prompt_dir(&cli.prompt_dir)
        .input_kinds(input_kinds)
        .prompt_extensions(&cli.prompt_ext)
        .output_suffix(&cli.suffix)
        .model(&cli.model)
        .call_shape(cli.shape.into())
        .temperature(cli.temperature)
        .top_p(cli.top_p)
        .top_k(cli.top_k)
        .max_output_tokens(cli.max_tokens)
        .max_attempts(cli.max_attempts)
        .retry_base_delay_ms(cli.retry_delay_ms)
        .concurrency(cli.concurrency)
        .request_timeout_secs(cli.api_timeout)
        .api_base_url(&cli.api_base_url);

    if let Some(dir) = &cli.system_dir {
        builder = builder.system_instruction_dir(dir);
    }
    if let Some(credential) = credential_from(cli) {
        builder = builder.credential(credential);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// First configured credential: API key, then access token, then token command.
fn credential_from(cli: &Cli) -> Option<Credential> {
    let set = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(key) = set(&cli.api_key) {
        return Some(Credential::ApiKey(key));
    }
    if let Some(token) = set(&cli.access_token) {
        return Some(Credential::BearerToken(token));
    }
    cli.token_command
        .as_deref()
        .and_then(Credential::token_command)
}
