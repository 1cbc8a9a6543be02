//! Input enumeration: list the documents to process and tag each with its kind.
//!
//! The file extension is inspected exactly once, here. Downstream stages
//! receive a [`DocumentKind`] and never look at the path to decide how to
//! read a file.

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Declared type of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// `.pdf` — sent as an `application/pdf` attachment or decoded to text.
    Pdf,
    /// `.txt` / `.md` — read verbatim as UTF-8.
    PlainText,
}

impl DocumentKind {
    /// Map a file extension (without the dot, any case) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }

    /// Classify a path by its extension.
    pub fn of_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// MIME type used when the raw file travels as an attachment.
    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::PlainText => "text/plain",
        }
    }
}

/// One input file, tagged at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

impl DocumentRef {
    pub fn new(path: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// File name for log lines and reports.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// List the documents of the accepted kinds directly inside `dir`.
///
/// Results are sorted by file name so runs are reproducible across
/// platforms. Plain-text files that already carry `output_suffix` are
/// previous outputs, not inputs, and are left out.
pub fn discover_documents(
    dir: &Path,
    kinds: &[DocumentKind],
    output_suffix: &str,
) -> Result<Vec<DocumentRef>, BatchError> {
    let entries = std::fs::read_dir(dir).map_err(|e| BatchError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut docs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BatchError::InputDirUnreadable {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(kind) = DocumentKind::of_path(&path) else {
            continue;
        };
        if !kinds.contains(&kind) {
            continue;
        }
        if kind == DocumentKind::PlainText && is_output_artifact(&path, output_suffix) {
            debug!("Ignoring previous output {}", path.display());
            continue;
        }
        docs.push(DocumentRef::new(path, kind));
    }

    docs.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(docs)
}

/// Deterministic artifact path: `<output_dir>/<file stem><suffix>`.
pub fn output_path_for(output_dir: &Path, doc: &DocumentRef, suffix: &str) -> PathBuf {
    let mut name: OsString = doc
        .path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    output_dir.join(name)
}

fn is_output_artifact(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(suffix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("pdf"), Some(DocumentKind::Pdf));
        assert_eq!(
            DocumentKind::from_extension("Md"),
            Some(DocumentKind::PlainText)
        );
        assert_eq!(DocumentKind::from_extension("docx"), None);
    }

    #[test]
    fn output_path_uses_stem_and_suffix() {
        let doc = DocumentRef::new("/in/Contrato 12.pdf", DocumentKind::Pdf);
        let out = output_path_for(Path::new("/out"), &doc, "_RESPOSTA.txt");
        assert_eq!(out, PathBuf::from("/out/Contrato 12_RESPOSTA.txt"));
    }

    #[test]
    fn output_path_keeps_inner_dots() {
        let doc = DocumentRef::new("/in/v1.2.report.pdf", DocumentKind::Pdf);
        let out = output_path_for(Path::new("/out"), &doc, "_RESPOSTA.txt");
        assert_eq!(out, PathBuf::from("/out/v1.2.report_RESPOSTA.txt"));
    }

    #[test]
    fn discover_filters_sorts_and_skips_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("a.PDF"), b"%PDF").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("image.png"), b"png").unwrap();
        fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let docs = discover_documents(dir.path(), &[DocumentKind::Pdf], "_RESPOSTA.txt").unwrap();
        let names: Vec<String> = docs.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
        assert!(docs.iter().all(|d| d.kind == DocumentKind::Pdf));
    }

    #[test]
    fn discover_ignores_previous_outputs_among_text_inputs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("memo.txt"), b"hello").unwrap();
        fs::write(dir.path().join("memo_RESPOSTA.txt"), b"answer").unwrap();

        let docs = discover_documents(
            dir.path(),
            &[DocumentKind::Pdf, DocumentKind::PlainText],
            "_RESPOSTA.txt",
        )
        .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name(), "memo.txt");
        assert_eq!(docs[0].kind, DocumentKind::PlainText);
    }

    #[test]
    fn discover_missing_dir_is_fatal() {
        let err = discover_documents(
            Path::new("/definitely/not/here"),
            &[DocumentKind::Pdf],
            "_RESPOSTA.txt",
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::InputDirUnreadable { .. }));
    }
}
