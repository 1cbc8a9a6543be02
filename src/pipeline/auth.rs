//! Request authorisation: static API keys and refreshable bearer tokens.
//!
//! A [`Credential`] is plain configuration. [`Authorizer`] turns it into a
//! header for each request, refreshing command-issued tokens when they are
//! older than their TTL or after the server rejected them with 401.

use crate::error::CallError;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Lifetime assumed for a command-issued token. Google access tokens last
/// an hour; refreshing earlier keeps long documents from hitting expiry
/// mid-session.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

/// Where request authorisation comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Static API key, sent as `x-goog-api-key`.
    ApiKey(String),
    /// Pre-issued bearer token, used until the process exits.
    BearerToken(String),
    /// Program whose trimmed stdout is a bearer token,
    /// e.g. `gcloud auth print-access-token`.
    TokenCommand { program: String, args: Vec<String> },
}

impl Credential {
    /// Split a shell-style command line on whitespace. Returns `None` when blank.
    pub fn token_command(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Credential::TokenCommand {
            program,
            args: words.collect(),
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credential::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
            Credential::TokenCommand { program, args } => f
                .debug_struct("TokenCommand")
                .field("program", program)
                .field("args", args)
                .finish(),
        }
    }
}

/// The header a request must carry.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeader {
    ApiKey(String),
    Bearer(String),
}

impl AuthHeader {
    pub fn name(&self) -> &'static str {
        match self {
            AuthHeader::ApiKey(_) => "x-goog-api-key",
            AuthHeader::Bearer(_) => "authorization",
        }
    }

    pub fn value(&self) -> String {
        match self {
            AuthHeader::ApiKey(key) => key.clone(),
            AuthHeader::Bearer(token) => format!("Bearer {token}"),
        }
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthHeader({}: <redacted>)", self.name())
    }
}

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

/// Produces an [`AuthHeader`] per request, caching command-issued tokens.
pub struct Authorizer {
    credential: Credential,
    ttl: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl Authorizer {
    pub fn new(credential: Credential) -> Self {
        Self::with_ttl(credential, DEFAULT_TOKEN_TTL)
    }

    pub fn with_ttl(credential: Credential, ttl: Duration) -> Self {
        Self {
            credential,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Header for the next request. Runs the token command if the cached
    /// token is missing or stale; a failing command is a retryable
    /// [`CallError::Auth`].
    pub async fn header(&self) -> Result<AuthHeader, CallError> {
        match &self.credential {
            Credential::ApiKey(key) => Ok(AuthHeader::ApiKey(key.clone())),
            Credential::BearerToken(token) => Ok(AuthHeader::Bearer(token.clone())),
            Credential::TokenCommand { program, args } => {
                let mut cached = self.cached.lock().await;
                if let Some(c) = cached.as_ref() {
                    if c.fetched_at.elapsed() < self.ttl {
                        return Ok(AuthHeader::Bearer(c.token.clone()));
                    }
                    debug!("Cached access token expired, refreshing");
                }
                let token = run_token_command(program, args).await?;
                *cached = Some(CachedToken {
                    token: token.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(AuthHeader::Bearer(token))
            }
        }
    }

    /// Whether a rejected token can be replaced by asking again.
    pub fn is_refreshable(&self) -> bool {
        matches!(self.credential, Credential::TokenCommand { .. })
    }

    /// Drop the cached token so the next [`header`](Self::header) call refreshes it.
    pub async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            info!("Access token rejected by server; will refresh before next attempt");
        }
    }
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("credential", &self.credential)
            .field("ttl", &self.ttl)
            .finish()
    }
}

async fn run_token_command(program: &str, args: &[String]) -> Result<String, CallError> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CallError::Auth(format!("cannot run '{program}': {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CallError::Auth(format!(
            "'{program}' exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(CallError::Auth(format!("'{program}' printed no token")));
    }
    debug!("Obtained access token from '{program}'");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_command_splits_words() {
        let c = Credential::token_command("gcloud auth print-access-token").unwrap();
        assert_eq!(
            c,
            Credential::TokenCommand {
                program: "gcloud".into(),
                args: vec!["auth".into(), "print-access-token".into()],
            }
        );
        assert!(Credential::token_command("   ").is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let dbg = format!("{:?}", Credential::ApiKey("AIza-secret".into()));
        assert!(!dbg.contains("AIza-secret"));
        let dbg = format!("{:?}", AuthHeader::Bearer("ya29.secret".into()));
        assert!(!dbg.contains("ya29.secret"));
    }

    #[test]
    fn header_names_and_values() {
        let h = AuthHeader::ApiKey("k".into());
        assert_eq!((h.name(), h.value()), ("x-goog-api-key", "k".to_string()));
        let h = AuthHeader::Bearer("t".into());
        assert_eq!((h.name(), h.value()), ("authorization", "Bearer t".to_string()));
    }

    #[tokio::test]
    async fn static_credentials_need_no_command() {
        let auth = Authorizer::new(Credential::ApiKey("k".into()));
        assert_eq!(auth.header().await.unwrap(), AuthHeader::ApiKey("k".into()));
        let auth = Authorizer::new(Credential::BearerToken("t".into()));
        assert_eq!(auth.header().await.unwrap(), AuthHeader::Bearer("t".into()));
    }

    #[tokio::test]
    async fn missing_program_is_retryable_auth_error() {
        let auth = Authorizer::new(Credential::TokenCommand {
            program: "definitely-not-a-real-token-program".into(),
            args: vec![],
        });
        let err = auth.header().await.unwrap_err();
        assert!(matches!(err, CallError::Auth(_)));
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_token_is_trimmed_and_cached() {
        let auth = Authorizer::new(Credential::TokenCommand {
            program: "echo".into(),
            args: vec!["tok-123".into()],
        });
        assert_eq!(
            auth.header().await.unwrap(),
            AuthHeader::Bearer("tok-123".into())
        );
        assert!(auth.cached.lock().await.is_some());

        auth.invalidate().await;
        assert!(auth.cached.lock().await.is_none());
        assert_eq!(
            auth.header().await.unwrap(),
            AuthHeader::Bearer("tok-123".into())
        );
    }
}
