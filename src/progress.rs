//! Progress-callback trait for batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the runner walks documents and prompts. The CLI uses it to
//! drive a terminal progress bar; library callers can forward events to a
//! channel, a database record, or nothing at all.
//!
//! # Example
//!
//! ```rust
//! use gemini_pdf_batch::{BatchProgressCallback, BatchConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     answered: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_prompt_complete(&self, document: &str, prompt: &str, response_len: usize) {
//!         self.answered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{document} / {prompt}: {response_len} chars");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { answered: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the batch runner as it processes documents.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1` the per-document methods may be called
/// concurrently for different documents. Implementations must protect
/// shared mutable state themselves (`Mutex`, atomics).
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after documents were discovered and prompts loaded.
    fn on_batch_start(&self, total_documents: usize, total_prompts: usize) {
        let _ = (total_documents, total_prompts);
    }

    /// A document was claimed and is about to be extracted.
    fn on_document_start(&self, document: &str) {
        let _ = document;
    }

    /// A document was skipped because its artifact already exists.
    fn on_document_skipped(&self, document: &str, existing: &Path) {
        let _ = (document, existing);
    }

    /// Just before a prompt is sent (first attempt only).
    ///
    /// `index` is 1-based.
    fn on_prompt_start(&self, document: &str, prompt: &str, index: usize, total: usize) {
        let _ = (document, prompt, index, total);
    }

    /// A prompt produced a non-empty response.
    fn on_prompt_complete(&self, document: &str, prompt: &str, response_len: usize) {
        let _ = (document, prompt, response_len);
    }

    /// A prompt failed after all retries.
    fn on_prompt_error(&self, document: &str, prompt: &str, error: String) {
        let _ = (document, prompt, error);
    }

    /// A document is finished. `output` is `Some` when an artifact was written.
    fn on_document_complete(&self, document: &str, output: Option<&Path>, answered: usize) {
        let _ = (document, output, answered);
    }

    /// Called once after every document was attempted.
    fn on_batch_complete(&self, written: usize, skipped: usize, failed: usize) {
        let _ = (written, skipped, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        prompts_started: AtomicUsize,
        prompts_done: AtomicUsize,
        prompt_errors: AtomicUsize,
        skipped: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_document_skipped(&self, _document: &str, _existing: &Path) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_prompt_start(&self, _document: &str, _prompt: &str, _index: usize, _total: usize) {
            self.prompts_started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_prompt_complete(&self, _document: &str, _prompt: &str, _response_len: usize) {
            self.prompts_done.fetch_add(1, Ordering::SeqCst);
        }

        fn on_prompt_error(&self, _document: &str, _prompt: &str, _error: String) {
            self.prompt_errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2, 3);
        cb.on_document_start("a.pdf");
        cb.on_prompt_start("a.pdf", "01.txt", 1, 3);
        cb.on_prompt_complete("a.pdf", "01.txt", 42);
        cb.on_prompt_error("a.pdf", "02.txt", "timeout".into());
        cb.on_document_complete("a.pdf", None, 1);
        cb.on_document_skipped("b.pdf", Path::new("out/b_RESPOSTA.txt"));
        cb.on_batch_complete(0, 1, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_prompt_start("a.pdf", "01.txt", 1, 2);
        tracker.on_prompt_complete("a.pdf", "01.txt", 100);
        tracker.on_prompt_start("a.pdf", "02.txt", 2, 2);
        tracker.on_prompt_error("a.pdf", "02.txt", "rate limited".into());
        tracker.on_document_skipped("b.pdf", Path::new("out/b_RESPOSTA.txt"));

        assert_eq!(tracker.prompts_started.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.prompts_done.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.prompt_errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10, 2);
        cb.on_batch_complete(10, 0, 0);
    }
}
