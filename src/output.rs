//! Run reports and output-artifact persistence.

use crate::error::DocumentError;
use crate::pipeline::input::DocumentKind;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every discovered document was attempted.
    Completed,
    /// The prompt directory yielded nothing; no document was looked at.
    NoPrompts,
}

/// What happened to one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentOutcome {
    /// At least one response was collected and the artifact written.
    Written { path: PathBuf },
    /// The artifact already existed; nothing was extracted or sent.
    SkippedExisting { path: PathBuf },
    /// Nothing was written.
    Failed(DocumentError),
}

/// Result of processing one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    /// Input file name.
    pub name: String,
    pub kind: DocumentKind,
    pub outcome: DocumentOutcome,
    /// Prompts that produced a response.
    pub succeeded_prompts: usize,
    /// Prompts that failed after all retries.
    pub failed_prompts: usize,
    pub duration: Duration,
}

impl DocumentReport {
    pub fn is_written(&self) -> bool {
        matches!(self.outcome, DocumentOutcome::Written { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, DocumentOutcome::SkippedExisting { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, DocumentOutcome::Failed(_))
    }

    /// One line for logs and the CLI, with elapsed time for attempted documents.
    pub fn summary(&self) -> String {
        let elapsed = format_elapsed(self.duration);
        match &self.outcome {
            DocumentOutcome::Written { path } => format!(
                "{}: {}/{} prompt(s) answered, saved to {} in {elapsed}",
                self.name,
                self.succeeded_prompts,
                self.succeeded_prompts + self.failed_prompts,
                path.display()
            ),
            DocumentOutcome::SkippedExisting { path } => {
                format!("{}: {} already exists", self.name, path.display())
            }
            DocumentOutcome::Failed(e) => {
                format!("{} failed after {elapsed}: {e}", self.name)
            }
        }
    }
}

/// Summary of a whole run. `documents` is in enumeration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub status: RunStatus,
    /// Number of prompts applied to each document.
    pub prompts: usize,
    pub documents: Vec<DocumentReport>,
    pub total_duration: Duration,
}

impl BatchReport {
    pub(crate) fn no_prompts() -> Self {
        BatchReport {
            status: RunStatus::NoPrompts,
            prompts: 0,
            documents: Vec::new(),
            total_duration: Duration::ZERO,
        }
    }

    pub fn written(&self) -> usize {
        self.documents.iter().filter(|d| d.is_written()).count()
    }

    pub fn skipped(&self) -> usize {
        self.documents.iter().filter(|d| d.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.documents.iter().filter(|d| d.is_failed()).count()
    }
}

/// `"{minutes}m {seconds}s"`, seconds truncated.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

/// Artifact body: every response followed by `separator`.
pub fn join_responses(responses: &[String], separator: &str) -> String {
    let mut out = String::with_capacity(
        responses.iter().map(|r| r.len() + separator.len()).sum(),
    );
    for r in responses {
        out.push_str(r);
        out.push_str(separator);
    }
    out
}

/// Write `contents` to `path` all at once: `<path>.tmp` first, then rename.
///
/// A crash mid-write leaves at most a stray `.tmp` file, never a truncated
/// artifact that a later run would mistake for finished work.
pub async fn write_artifact(path: &Path, contents: &str) -> Result<(), DocumentError> {
    let mut tmp_name: OsString = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let write_failed = |e: std::io::Error| DocumentError::WriteFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_failed)?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    Ok(())
}
