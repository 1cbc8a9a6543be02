//! Prompt and system-instruction loading.
//!
//! Prompts are plain files in one directory, applied to every document in
//! file-name order. Numbering them (`01_resumo.txt`, `02_riscos.txt`, …)
//! is the usual way to control that order. The system instruction is a
//! single `.txt` file in its own directory.

use crate::error::{BatchError, DocumentError};
use crate::pipeline::extract::DocumentExtractor;
use crate::pipeline::input::{DocumentKind, DocumentRef};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One named instruction applied to every document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// File name the prompt was loaded from; used in logs and reports.
    pub name: String,
    pub content: String,
}

impl Prompt {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Load every prompt file in `dir` whose extension is in `extensions`.
///
/// `.pdf` prompts go through the extractor's text path; anything else is
/// read as UTF-8. A file that cannot be read or is blank is dropped with a
/// warning. Only an unreadable directory is fatal.
pub async fn load_prompts(
    dir: &Path,
    extensions: &[String],
    extractor: &dyn DocumentExtractor,
) -> Result<Vec<Prompt>, BatchError> {
    let mut prompts = Vec::new();
    for path in list_files(dir, extensions).map_err(|e| BatchError::PromptDirUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let kind = DocumentKind::of_path(&path).unwrap_or(DocumentKind::PlainText);
        let doc = DocumentRef::new(path, kind);
        let name = doc.name();

        match extractor.extract_text(&doc).await {
            Ok(content) => {
                debug!("Loaded prompt {name} ({} chars)", content.len());
                prompts.push(Prompt { name, content });
            }
            Err(DocumentError::EmptyContent { .. }) => {
                warn!("Prompt {name} is empty, skipping");
            }
            Err(e) => {
                warn!("Skipping prompt {name}: {e}");
            }
        }
    }
    Ok(prompts)
}

/// Read the system instruction: the first `.txt` file in `dir` by name.
pub fn load_system_instruction(dir: &Path) -> Result<String, BatchError> {
    let files = list_files(dir, &["txt".to_string()]).map_err(|e| {
        BatchError::SystemInstructionUnreadable {
            path: dir.to_path_buf(),
            source: e,
        }
    })?;
    let Some(path) = files.into_iter().next() else {
        return Err(BatchError::SystemInstructionMissing {
            dir: dir.to_path_buf(),
        });
    };

    let text = std::fs::read_to_string(&path)
        .map_err(|e| BatchError::SystemInstructionUnreadable { path: path.clone(), source: e })?;
    debug!("System instruction from {} ({} chars)", path.display(), text.len());
    Ok(text)
}

/// Regular files directly in `dir` with one of `extensions` (case-insensitive), sorted by name.
fn list_files(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
