//! Model interaction: request types, the backend seam, and per-document conversations.
//!
//! Three layers, innermost first:
//!
//! 1. [`GenerativeBackend`] — one network round-trip, no retries. The HTTP
//!    implementation lives in [`crate::pipeline::gemini`]; tests plug in a
//!    scripted fake.
//! 2. [`ApiClient`] — wraps a backend in the [`RetryPolicy`] and treats an
//!    empty reply as a retryable failure.
//! 3. [`Conversation`] — what the orchestrator talks to for one document.
//!    [`SessionConversation`] attaches the document once and keeps the
//!    dialogue history; [`StatelessConversation`] sends `prompt + text` as
//!    independent requests. Both share the same client and retry policy.

use crate::error::CallError;
use crate::pipeline::retry::RetryPolicy;
use crate::prompts::Prompt;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// ── Request model ────────────────────────────────────────────────────────

/// Binary document content sent inline with a turn.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Attachment(Attachment),
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// True when any part carries binary document content.
    pub fn has_attachment(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Attachment(_)))
    }
}

/// Everything the model sees for one call, oldest turn first.
///
/// Model id, sampling parameters and system instruction belong to the
/// backend; they are identical for every call of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateRequest {
    pub turns: Vec<Turn>,
}

// ── Backend seam ─────────────────────────────────────────────────────────

/// A single remote generation call. Implementations do not retry.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, CallError>;
}

// ── Client ───────────────────────────────────────────────────────────────

/// A backend plus the retry policy shared by both call shapes.
#[derive(Clone)]
pub struct ApiClient {
    backend: Arc<dyn GenerativeBackend>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(backend: Arc<dyn GenerativeBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Send `request`, retrying transient failures and empty replies.
    pub async fn call(&self, label: &str, request: &GenerateRequest) -> Result<String, CallError> {
        let backend = &self.backend;
        self.retry
            .run(label, |attempt| async move {
                debug!(
                    "{label}: attempt {attempt}, {} turn(s)",
                    request.turns.len()
                );
                let text = backend.generate(request).await?;
                if text.trim().is_empty() {
                    return Err(CallError::EmptyResponse { reason: None });
                }
                Ok(text)
            })
            .await
    }
}

// ── Conversations ────────────────────────────────────────────────────────

/// What the orchestrator sends a document to.
#[derive(Debug, Clone)]
pub enum DocumentPayload {
    /// Raw file, attached once at the start of a session.
    Attachment(Attachment),
    /// Decoded text, inlined into every stateless request.
    Text(String),
}

/// The prompts of one document, asked in order.
#[async_trait]
pub trait Conversation: Send {
    /// Ask one prompt. A failure leaves the conversation usable for the next prompt.
    async fn ask(&mut self, prompt: &Prompt) -> Result<String, CallError>;
}

/// Open the conversation matching the payload.
///
/// An attachment yields a [`SessionConversation`]; text yields a
/// [`StatelessConversation`].
pub fn open_conversation<'a>(
    client: &'a ApiClient,
    document: impl Into<String>,
    payload: DocumentPayload,
) -> Box<dyn Conversation + 'a> {
    match payload {
        DocumentPayload::Attachment(att) => {
            Box::new(SessionConversation::new(client, document, att))
        }
        DocumentPayload::Text(text) => Box::new(StatelessConversation::new(client, document, text)),
    }
}

/// A per-document dialogue that attaches the document exactly once.
///
/// The attachment rides on the first turn that succeeds; if the first
/// prompt fails it stays pending for the next one. Only successful
/// exchanges enter the history, so a failed prompt leaves no trace.
pub struct SessionConversation<'a> {
    client: &'a ApiClient,
    document: String,
    pending: Option<Attachment>,
    history: Vec<Turn>,
}

impl<'a> SessionConversation<'a> {
    pub fn new(client: &'a ApiClient, document: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            client,
            document: document.into(),
            pending: Some(attachment),
            history: Vec::new(),
        }
    }

    /// Completed turns so far (user + model pairs).
    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

#[async_trait]
impl<'a> Conversation for SessionConversation<'a> {
    async fn ask(&mut self, prompt: &Prompt) -> Result<String, CallError> {
        let mut parts = vec![Part::Text(prompt.content.clone())];
        if let Some(att) = &self.pending {
            parts.push(Part::Attachment(att.clone()));
        }
        let user = Turn::user(parts);

        let mut turns = self.history.clone();
        turns.push(user.clone());
        let request = GenerateRequest { turns };

        let label = format!("{} · {}", self.document, prompt.name);
        let reply = self.client.call(&label, &request).await?;

        self.history.push(user);
        self.history.push(Turn::model(reply.clone()));
        self.pending = None;
        Ok(reply)
    }
}

/// Independent single-shot requests carrying the full document text.
pub struct StatelessConversation<'a> {
    client: &'a ApiClient,
    document: String,
    text: String,
}

impl<'a> StatelessConversation<'a> {
    pub fn new(client: &'a ApiClient, document: impl Into<String>, text: String) -> Self {
        Self {
            client,
            document: document.into(),
            text,
        }
    }
}

#[async_trait]
impl<'a> Conversation for StatelessConversation<'a> {
    async fn ask(&mut self, prompt: &Prompt) -> Result<String, CallError> {
        let body = format!("{}\n\n{}", prompt.content, self.text);
        let request = GenerateRequest {
            turns: vec![Turn::user(vec![Part::Text(body)])],
        };
        let label = format!("{} · {}", self.document, prompt.name);
        self.client.call(&label, &request).await
    }
}
