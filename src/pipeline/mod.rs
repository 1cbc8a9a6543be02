//! Pipeline stages for batch prompting.
//!
//! Each submodule implements one step; the orchestrator in
//! [`crate::batch`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ llm (conversation) ──▶ retry ──▶ gemini (HTTP)
//! (list)    (bytes/text)  (session/stateless)   (backoff)   (auth)
//! ```
//!
//! 1. [`input`]   — list and tag documents; map each to its artifact path
//! 2. [`extract`] — load the raw attachment or decode text; PDF decoding
//!    runs in `spawn_blocking`
//! 3. [`llm`]     — request model, backend seam, per-document conversations
//! 4. [`retry`]   — bounded exponential backoff shared by both call shapes
//! 5. [`gemini`]  — the only stage with network I/O
//! 6. [`auth`]    — API keys and refreshable bearer tokens

pub mod auth;
pub mod extract;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod retry;
